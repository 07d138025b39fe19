//! Wallet ledger models.
//!
//! Every change to a reseller's `wallet_balance` is paired with exactly one
//! `WalletEntry`, written in the same database transaction. Entries are never
//! updated after insert.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "wallet_entry_kind", rename_all = "snake_case")]
pub enum WalletEntryKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "wallet_entry_status", rename_all = "snake_case")]
pub enum WalletEntryStatus {
    Pending,
    Completed,
    Failed,
}

/// Represents a wallet ledger row from the `wallet_transactions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct WalletEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: WalletEntryKind,

    /// Always positive; the sign comes from `kind`
    pub amount: Money,

    pub description: String,
    pub status: WalletEntryStatus,

    /// Unique per effect (`payment:<id>`, `order:<id>`), so an effect can
    /// never be booked twice
    pub reference: String,

    pub created_at: DateTime<Utc>,
}

impl WalletEntry {
    /// Contribution of this entry to the balance.
    pub fn signed_amount(&self) -> Money {
        match (self.status, self.kind) {
            (WalletEntryStatus::Completed, WalletEntryKind::Credit) => self.amount,
            (WalletEntryStatus::Completed, WalletEntryKind::Debit) => -self.amount,
            _ => Money::ZERO,
        }
    }
}

/// A ledger row about to be appended.
#[derive(Debug, Clone)]
pub struct NewWalletEntry {
    pub kind: WalletEntryKind,
    pub amount: Money,
    pub description: String,
    pub reference: String,
}

impl NewWalletEntry {
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            WalletEntryKind::Credit => self.amount,
            WalletEntryKind::Debit => -self.amount,
        }
    }
}

/// Response body for `GET /api/v1/reseller/wallet`.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub balance: Money,
    pub transactions: Vec<WalletEntry>,
}
