//! Database connection pool, migrations and the transactional storage seam.
//!
//! All domain writes go through a [`DbTransaction`]. A transaction is acquired
//! with [`Database::begin`], every precondition is read through it, every
//! write goes through it, and it ends with `commit`. Dropping a transaction
//! without committing rolls it back, so an early `?` return never leaves a
//! partial write behind.
//!
//! Two backends implement the seam:
//! - [`postgres::PgDatabase`]: row locks via `SELECT ... FOR UPDATE`
//! - [`memory::MemoryDb`]: transactions serialized over a working copy

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    order::Order,
    payment::{NewPayment, PaymentRecord},
    store::{NewStorefront, Storefront},
    user::{NewUser, Principal, User},
    wallet::{NewWalletEntry, WalletEntry},
};

pub mod memory;
pub mod postgres;

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// # Configuration
///
/// - Maximum connections: 5
/// - Connections are created lazily as needed
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each one runs only once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Entry point to storage.
#[async_trait]
pub trait Database: Send + Sync {
    /// Open a new transaction scope.
    async fn begin(&self) -> Result<Box<dyn DbTransaction>, AppError>;

    /// Cheap connectivity check for `/health`.
    async fn ping(&self) -> Result<(), AppError>;
}

/// One open transaction.
///
/// `fetch_*` methods for payments, orders, users and stores take a row lock
/// where the backend supports it, so the rows read for a precondition cannot
/// change before the transaction commits.
#[async_trait]
pub trait DbTransaction: Send {
    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    // Payments
    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<PaymentRecord, AppError>;
    async fn fetch_payment(&mut self, payment_id: &str) -> Result<Option<PaymentRecord>, AppError>;
    /// The completed (or already refunded) payment for an order, if any.
    async fn fetch_settled_order_payment(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<PaymentRecord>, AppError>;
    async fn update_payment(&mut self, payment: &PaymentRecord) -> Result<(), AppError>;

    // Orders
    async fn fetch_order(&mut self, order_id: Uuid) -> Result<Option<Order>, AppError>;
    async fn update_order(&mut self, order: &Order) -> Result<(), AppError>;
    /// Queue the order for the external fulfiller. Queueing twice is a no-op.
    async fn enqueue_fulfillment(&mut self, order_id: Uuid) -> Result<(), AppError>;

    // Users
    async fn fetch_user(&mut self, user_id: Uuid) -> Result<Option<User>, AppError>;
    async fn fetch_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError>;
    async fn insert_user(&mut self, user: &NewUser) -> Result<User, AppError>;
    async fn admin_ids(&mut self) -> Result<Vec<Uuid>, AppError>;
    async fn principal_for_session(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError>;

    // Wallet
    /// Apply the entry to the user's balance and append it to the ledger.
    ///
    /// Fails with `InsufficientBalance` if the balance would go negative and
    /// with `Conflict` if the entry's reference was already booked.
    async fn append_wallet_entry(
        &mut self,
        user_id: Uuid,
        entry: &NewWalletEntry,
    ) -> Result<WalletEntry, AppError>;
    async fn wallet_entries(&mut self, user_id: Uuid) -> Result<Vec<WalletEntry>, AppError>;

    // Stores
    async fn subdomain_taken(
        &mut self,
        subdomain: &str,
        except_store: Option<Uuid>,
    ) -> Result<bool, AppError>;
    async fn custom_domain_taken(
        &mut self,
        domain: &str,
        except_store: Option<Uuid>,
    ) -> Result<bool, AppError>;
    async fn fetch_store_for_reseller(
        &mut self,
        reseller_id: Uuid,
    ) -> Result<Option<Storefront>, AppError>;
    async fn insert_store(&mut self, store: &NewStorefront) -> Result<Storefront, AppError>;
    async fn update_store(&mut self, store: &Storefront) -> Result<(), AppError>;
}
