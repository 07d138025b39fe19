//! Reseller Payment Server - Main Application Entry Point
//!
//! HTTP server for the settlement core of a gaming top-up marketplace: bKash
//! payment callbacks, reseller wallet funding, order processing and
//! storefront setup.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Payments**: bKash tokenized checkout
//! - **Authentication**: session bearer token with SHA-256 hashing
//! - **Format**: JSON requests/responses, redirects for the payment callback
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build the gateway client and notification sink
//! 5. Build HTTP router and start server on configured port

use std::sync::Arc;

use reseller_payment_server::{
    AppState,
    config::Config,
    db::{self, postgres::PgDatabase},
    gateway::bkash::BkashGateway,
    router,
    services::notification_service::{LogNotifier, Notifier, WebhookNotifier},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let gateway = BkashGateway::new(config.gateway_config())?;
    tracing::info!(base_url = %config.gateway_base_url, "Payment gateway configured");

    let notifier: Arc<dyn Notifier> = match (
        config.notification_webhook_url.clone(),
        config.notification_webhook_secret.clone(),
    ) {
        (Some(url), Some(secret)) => {
            tracing::info!(%url, "Notifications delivered by webhook");
            Arc::new(WebhookNotifier::new(url, secret)?)
        }
        _ => {
            tracing::info!("No notification webhook configured, notifications are logged only");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState {
        db: Arc::new(PgDatabase::new(pool)),
        gateway: Arc::new(gateway),
        notifier,
        settings: Arc::new(config.service_settings()),
    };

    let app = router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
