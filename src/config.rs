//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use std::time::Duration;

use crate::gateway::bkash::BkashConfig;
use crate::models::money::Money;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `GATEWAY_BASE_URL`, `GATEWAY_APP_KEY`, `GATEWAY_APP_SECRET`,
///   `GATEWAY_USERNAME`, `GATEWAY_PASSWORD` (required): bKash merchant credentials
/// - `GATEWAY_TIMEOUT_SECS` (optional): per-request gateway timeout, defaults to 30
/// - `CALLBACK_URL` (required): public URL of `GET /api/v1/payments/callback`
/// - `REGISTRATION_FEE` (optional): reseller registration fee in minor units, defaults to 100000
/// - `DNS_A_RECORD_TARGET`, `DNS_CNAME_TARGET` (required): records handed out in DNS challenges
/// - `NOTIFICATION_WEBHOOK_URL`, `NOTIFICATION_WEBHOOK_SECRET` (optional): notification delivery;
///   notifications are only logged when unset
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub gateway_base_url: String,
    pub gateway_app_key: String,
    pub gateway_app_secret: String,
    pub gateway_username: String,
    pub gateway_password: String,

    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    pub callback_url: String,

    #[serde(default = "default_registration_fee")]
    pub registration_fee: i64,

    pub dns_a_record_target: String,
    pub dns_cname_target: String,

    pub notification_webhook_url: Option<String>,
    pub notification_webhook_secret: Option<String>,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_gateway_timeout() -> u64 {
    30
}

/// 1000 BDT
fn default_registration_fee() -> i64 {
    100_000
}

/// Values the services read at request time.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub registration_fee: Money,
    pub dns_a_record: String,
    pub dns_cname_record: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: gateway_app_key -> GATEWAY_APP_KEY
        envy::from_env::<Config>()
    }

    pub fn gateway_config(&self) -> BkashConfig {
        BkashConfig {
            base_url: self.gateway_base_url.clone(),
            app_key: self.gateway_app_key.clone(),
            app_secret: self.gateway_app_secret.clone(),
            username: self.gateway_username.clone(),
            password: self.gateway_password.clone(),
            callback_url: self.callback_url.clone(),
            timeout: Duration::from_secs(self.gateway_timeout_secs),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            registration_fee: Money::from_minor(self.registration_fee),
            dns_a_record: self.dns_a_record_target.clone(),
            dns_cname_record: self.dns_cname_target.clone(),
        }
    }
}
