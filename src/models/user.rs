//! Users and the authenticated principal.
//!
//! Role and reseller status are closed enums. The auth middleware turns a
//! session into a `Principal` once; services only ever see the typed value.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum Role {
    Customer,
    Reseller,
    Admin,
}

/// Account status. For resellers it gates dashboard and storefront access
/// independently of the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "account_status", rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Active,
    Suspended,
}

/// Represents a user record from the database.
///
/// Resellers carry their prepaid wallet balance inline; the ledger lives in
/// `wallet_transactions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: Role,
    pub status: AccountStatus,
    pub business_name: Option<String>,

    /// Must be >= 0 (enforced by database CHECK constraint)
    pub wallet_balance: Money,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub business_name: Option<String>,
}

/// The caller of an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Customer { user_id: Uuid },
    Reseller { user_id: Uuid, status: AccountStatus },
    Admin { user_id: Uuid },
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role, status: AccountStatus) -> Self {
        match role {
            Role::Customer => Principal::Customer { user_id },
            Role::Reseller => Principal::Reseller { user_id, status },
            Role::Admin => Principal::Admin { user_id },
        }
    }

    pub fn user_id(&self) -> Uuid {
        match *self {
            Principal::Customer { user_id }
            | Principal::Reseller { user_id, .. }
            | Principal::Admin { user_id } => user_id,
        }
    }

    /// A reseller that is not suspended. Pending resellers may still set up
    /// their store and fund their wallet.
    pub fn reseller_id(&self) -> Result<Uuid, AppError> {
        match *self {
            Principal::Reseller { user_id, status } if status != AccountStatus::Suspended => {
                Ok(user_id)
            }
            Principal::Reseller { .. } => {
                Err(AppError::Unauthorized("reseller account is suspended".to_string()))
            }
            _ => Err(AppError::Unauthorized("reseller role required".to_string())),
        }
    }

    /// A reseller whose account has been approved.
    pub fn active_reseller_id(&self) -> Result<Uuid, AppError> {
        match *self {
            Principal::Reseller {
                user_id,
                status: AccountStatus::Active,
            } => Ok(user_id),
            Principal::Reseller { .. } => {
                Err(AppError::Unauthorized("reseller account is not active".to_string()))
            }
            _ => Err(AppError::Unauthorized("reseller role required".to_string())),
        }
    }

    pub fn admin_id(&self) -> Result<Uuid, AppError> {
        match *self {
            Principal::Admin { user_id } => Ok(user_id),
            _ => Err(AppError::Unauthorized("admin role required".to_string())),
        }
    }
}
