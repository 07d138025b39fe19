//! Wallet service - balance changes and ledger reads.
//!
//! `credit` and `debit` run inside a caller-owned transaction so that the
//! balance change, its ledger row and the surrounding order or payment
//! transition commit together.
//!
//! # Balance Invariant
//!
//! `wallet_balance` always equals the sum of the signed completed ledger
//! entries, and never drops below zero. A debit that would overdraw is
//! rejected, never clamped.

use uuid::Uuid;

use crate::{
    db::{Database, DbTransaction},
    error::AppError,
    models::{
        money::Money,
        user::Principal,
        wallet::{NewWalletEntry, WalletEntry, WalletEntryKind, WalletResponse},
    },
};

/// Add money to a reseller wallet.
///
/// # Errors
///
/// - `Validation`: amount is zero or negative
/// - `NotFound`: wallet owner does not exist
/// - `Conflict`: the reference was already booked
pub async fn credit(
    tx: &mut dyn DbTransaction,
    user_id: Uuid,
    amount: Money,
    description: String,
    reference: String,
) -> Result<WalletEntry, AppError> {
    book(tx, user_id, WalletEntryKind::Credit, amount, description, reference).await
}

/// Remove money from a reseller wallet.
///
/// # Errors
///
/// - `Validation`: amount is zero or negative
/// - `InsufficientBalance`: balance does not cover the amount
/// - `NotFound`: wallet owner does not exist
/// - `Conflict`: the reference was already booked
pub async fn debit(
    tx: &mut dyn DbTransaction,
    user_id: Uuid,
    amount: Money,
    description: String,
    reference: String,
) -> Result<WalletEntry, AppError> {
    book(tx, user_id, WalletEntryKind::Debit, amount, description, reference).await
}

async fn book(
    tx: &mut dyn DbTransaction,
    user_id: Uuid,
    kind: WalletEntryKind,
    amount: Money,
    description: String,
    reference: String,
) -> Result<WalletEntry, AppError> {
    if !amount.is_positive() {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }

    tx.append_wallet_entry(
        user_id,
        &NewWalletEntry {
            kind,
            amount,
            description,
            reference,
        },
    )
    .await
}

/// Balance and ledger of the calling reseller, newest entry first.
pub async fn get_wallet(db: &dyn Database, principal: &Principal) -> Result<WalletResponse, AppError> {
    let reseller_id = principal.reseller_id()?;

    let mut tx = db.begin().await?;
    let user = tx
        .fetch_user(reseller_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Reseller".to_string()))?;
    let mut transactions = tx.wallet_entries(reseller_id).await?;
    tx.commit().await?;

    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(WalletResponse {
        balance: user.wallet_balance,
        transactions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDb;
    use crate::models::user::{AccountStatus, NewUser, Role};

    async fn reseller(db: &MemoryDb) -> Uuid {
        let mut tx = db.begin().await.unwrap();
        let user = tx
            .insert_user(&NewUser {
                email: "shop@example.com".to_string(),
                name: "Shop".to_string(),
                password_hash: "hash".to_string(),
                role: Role::Reseller,
                status: AccountStatus::Active,
                business_name: Some("Shop".to_string()),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user.id
    }

    #[tokio::test]
    async fn overdraw_is_rejected_without_mutation() {
        let db = MemoryDb::new();
        let id = reseller(&db).await;

        let mut tx = db.begin().await.unwrap();
        credit(&mut *tx, id, Money::from_minor(300), "top-up".into(), "payment:a".into())
            .await
            .unwrap();
        let err = debit(&mut *tx, id, Money::from_minor(301), "order".into(), "order:a".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance));
        tx.commit().await.unwrap();

        let user = db.user(id).await.unwrap();
        assert_eq!(user.wallet_balance, Money::from_minor(300));
        assert_eq!(db.ledger(id).await.len(), 1);
    }

    #[tokio::test]
    async fn reference_is_booked_once() {
        let db = MemoryDb::new();
        let id = reseller(&db).await;

        let mut tx = db.begin().await.unwrap();
        credit(&mut *tx, id, Money::from_minor(100), "top-up".into(), "payment:x".into())
            .await
            .unwrap();
        let err = credit(&mut *tx, id, Money::from_minor(100), "top-up".into(), "payment:x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn zero_amount_is_invalid() {
        let db = MemoryDb::new();
        let id = reseller(&db).await;

        let mut tx = db.begin().await.unwrap();
        let err = credit(&mut *tx, id, Money::ZERO, "nothing".into(), "payment:z".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn wallet_balance_matches_ledger() {
        let db = MemoryDb::new();
        let id = reseller(&db).await;

        let mut tx = db.begin().await.unwrap();
        credit(&mut *tx, id, Money::from_minor(500), "first".into(), "payment:1".into())
            .await
            .unwrap();
        debit(&mut *tx, id, Money::from_minor(200), "second".into(), "order:1".into())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let principal = Principal::new(id, Role::Reseller, AccountStatus::Active);
        let wallet = get_wallet(&db, &principal).await.unwrap();
        assert_eq!(wallet.balance, Money::from_minor(300));
        let total: Money = wallet.transactions.iter().map(|e| e.signed_amount()).sum();
        assert_eq!(total, wallet.balance);
        assert_eq!(wallet.transactions.len(), 2);
    }
}
