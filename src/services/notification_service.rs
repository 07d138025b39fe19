//! Notification sink for post-commit events.
//!
//! Services call [`Notifier::notify`] only after their transaction committed.
//! Delivery is fire-and-forget: a failed delivery is logged and never reaches
//! the caller, so it can never undo a committed effect.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Order,
    Wallet,
    Registration,
}

/// A message for one user.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

/// Fire-and-forget delivery capability.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink used when no webhook is configured: notifications only reach the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        tracing::info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            title = %notification.title,
            "{}",
            notification.message
        );
    }
}

/// Body POSTed to the notification webhook.
///
/// # Signature Verification
///
/// The request carries `X-Webhook-Signature: sha256=<hex>`, the
/// HMAC-SHA256 of the raw body under the shared secret.
#[derive(Debug, Serialize)]
pub struct NotificationPayload {
    pub event_type: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: Notification,
}

/// Delivers notifications to an HTTP endpoint with an HMAC-signed payload.
pub struct WebhookNotifier {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, secret: String) -> Result<Self, AppError> {
        validate_webhook_url(&url)?;
        if secret.is_empty() {
            return Err(AppError::Validation(
                "notification webhook secret must not be empty".to_string(),
            ));
        }

        // 5 seconds per delivery, so a slow receiver never piles up tasks
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))?;

        Ok(Self {
            url,
            secret,
            client,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        let payload = NotificationPayload {
            event_type: "notification.created".to_string(),
            event_id: Uuid::new_v4(),
            created_at: Utc::now(),
            data: notification,
        };
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize notification");
                return;
            }
        };
        let signature = generate_signature(&self.secret, &body);
        let request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", signature)
            .header("X-Webhook-Event-Id", payload.event_id.to_string())
            .body(body);
        let event_id = payload.event_id;

        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(%event_id, "notification delivered");
                }
                Ok(resp) => {
                    tracing::warn!(%event_id, status = %resp.status(), "notification rejected");
                }
                Err(e) => {
                    tracing::error!(%event_id, error = %e, "notification delivery failed");
                }
            }
        });
    }
}

/// A notification decided inside a transaction, sent once it has committed.
#[derive(Debug, Clone)]
pub enum Outbound {
    User(Notification),
    Admins {
        kind: NotificationKind,
        title: String,
        message: String,
        metadata: serde_json::Value,
    },
}

impl Outbound {
    pub async fn send(self, db: &dyn Database, notifier: &dyn Notifier) {
        match self {
            Outbound::User(notification) => notifier.notify(notification),
            Outbound::Admins {
                kind,
                title,
                message,
                metadata,
            } => notify_admins(db, notifier, kind, &title, &message, metadata).await,
        }
    }
}

/// Notify every active admin. Lookup failures are logged and swallowed.
pub async fn notify_admins(
    db: &dyn Database,
    notifier: &dyn Notifier,
    kind: NotificationKind,
    title: &str,
    message: &str,
    metadata: serde_json::Value,
) {
    let admins = async {
        let mut tx = db.begin().await?;
        tx.admin_ids().await
    }
    .await;

    match admins {
        Ok(ids) => {
            for user_id in ids {
                notifier.notify(Notification {
                    user_id,
                    kind,
                    title: title.to_string(),
                    message: message.to_string(),
                    metadata: metadata.clone(),
                });
            }
        }
        Err(e) => tracing::warn!(error = %e, "could not load admins to notify"),
    }
}

/// HMAC-SHA256 signature in the form `sha256=<hex>`.
fn generate_signature(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Validate webhook URL format.
///
/// # Rules
///
/// - Must be valid URL
/// - Must be HTTPS (HTTP localhost allowed for development)
/// - Maximum 2048 characters
fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > 2048 {
        return Err(AppError::Validation(
            "URL exceeds 2048 characters".to_string(),
        ));
    }

    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::Validation("Invalid webhook URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" if matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "0.0.0.0")) => {
            Ok(())
        }
        "http" => Err(AppError::Validation(
            "HTTP is only allowed for localhost. Use HTTPS for production.".to_string(),
        )),
        _ => Err(AppError::Validation(
            "URL must use HTTP or HTTPS".to_string(),
        )),
    }
}
