//! Reseller storefront models.
//!
//! A storefront is reached through its unique subdomain, or through a custom
//! domain once the reseller has proven ownership with a DNS challenge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "store_status", rename_all = "snake_case")]
pub enum StoreStatus {
    Pending,
    Active,
    Suspended,
}

/// Pricing and operational settings. Markups are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub default_markup: f64,
    pub minimum_markup: f64,
    pub maximum_markup: f64,
    pub auto_fulfillment: bool,
    pub low_balance_alert: Money,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            default_markup: 20.0,
            minimum_markup: 10.0,
            maximum_markup: 50.0,
            auto_fulfillment: true,
            low_balance_alert: Money::from_minor(100_00),
        }
    }
}

impl StoreSettings {
    /// Markups must be finite, non-negative and ordered
    /// `minimum <= default <= maximum`.
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, value) in [
            ("default_markup", self.default_markup),
            ("minimum_markup", self.minimum_markup),
            ("maximum_markup", self.maximum_markup),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Validation(format!(
                    "{name} must be a non-negative percentage"
                )));
            }
        }
        if self.minimum_markup > self.maximum_markup {
            return Err(AppError::Validation(
                "minimum_markup cannot exceed maximum_markup".to_string(),
            ));
        }
        if self.default_markup < self.minimum_markup || self.default_markup > self.maximum_markup {
            return Err(AppError::Validation(
                "default_markup must lie between minimum_markup and maximum_markup".to_string(),
            ));
        }
        if self.low_balance_alert.is_negative() {
            return Err(AppError::Validation(
                "low_balance_alert cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply(&mut self, patch: &StoreSettingsPatch) {
        if let Some(v) = patch.default_markup {
            self.default_markup = v;
        }
        if let Some(v) = patch.minimum_markup {
            self.minimum_markup = v;
        }
        if let Some(v) = patch.maximum_markup {
            self.maximum_markup = v;
        }
        if let Some(v) = patch.auto_fulfillment {
            self.auto_fulfillment = v;
        }
        if let Some(v) = patch.low_balance_alert {
            self.low_balance_alert = v;
        }
    }
}

/// DNS records a reseller must publish before a custom domain is verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsChallenge {
    pub a_record: String,
    pub cname_record: String,
    pub verification_token: String,
}

/// A reseller's storefront (the `stores` table).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Storefront {
    pub id: Uuid,
    pub reseller_id: Uuid,
    pub name: String,
    pub description: Option<String>,

    /// Globally unique DNS label
    pub subdomain: String,

    pub custom_domain: Option<String>,
    pub custom_domain_verified: bool,
    pub dns_challenge: Option<DnsChallenge>,
    pub settings: StoreSettings,
    pub status: StoreStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A storefront about to be inserted.
#[derive(Debug, Clone)]
pub struct NewStorefront {
    pub reseller_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub subdomain: String,
    pub settings: StoreSettings,
    pub status: StoreStatus,
}

/// Partial settings as accepted from clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettingsPatch {
    pub default_markup: Option<f64>,
    pub minimum_markup: Option<f64>,
    pub maximum_markup: Option<f64>,
    pub auto_fulfillment: Option<bool>,
    pub low_balance_alert: Option<Money>,
}

/// Request body for `POST /api/v1/reseller/store`.
#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub settings: StoreSettingsPatch,
}

/// Request body for `POST /api/v1/reseller/store/domain`.
///
/// An absent field leaves the setting alone; an empty `custom_domain`
/// removes the custom domain.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateDomainRequest {
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
}
