//! PostgreSQL storage backend.
//!
//! Every `fetch_*` used for a precondition locks its row with `FOR UPDATE`,
//! so two transactions touching the same order, wallet or payment are
//! serialized by the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, types::Json};
use uuid::Uuid;

use crate::db::{Database, DbPool, DbTransaction};
use crate::error::AppError;
use crate::models::{
    money::Money,
    order::Order,
    payment::{NewPayment, PaymentAnnotations, PaymentPurpose, PaymentRecord, PaymentStatus},
    store::{DnsChallenge, NewStorefront, StoreSettings, StoreStatus, Storefront},
    user::{AccountStatus, NewUser, Principal, Role, User},
    wallet::{NewWalletEntry, WalletEntry, WalletEntryStatus},
};

/// Storage backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgDatabase {
    pool: DbPool,
}

impl PgDatabase {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn DbTransaction>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// An open PostgreSQL transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

/// Map unique violations to `Conflict`, everything else to `Database`.
fn write_error(err: sqlx::Error, what: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{what} already exists"))
        }
        _ => AppError::Database(err),
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    payment_id: String,
    amount: Money,
    description: String,
    purpose: Json<PaymentPurpose>,
    status: PaymentStatus,
    gateway_trx_id: Option<String>,
    annotations: Json<PaymentAnnotations>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PaymentRow> for PaymentRecord {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            payment_id: row.payment_id,
            amount: row.amount,
            description: row.description,
            purpose: row.purpose.0,
            status: row.status,
            gateway_trx_id: row.gateway_trx_id,
            annotations: row.annotations.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: Uuid,
    reseller_id: Uuid,
    name: String,
    description: Option<String>,
    subdomain: String,
    custom_domain: Option<String>,
    custom_domain_verified: bool,
    dns_challenge: Option<Json<DnsChallenge>>,
    settings: Json<StoreSettings>,
    status: StoreStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoreRow> for Storefront {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id,
            reseller_id: row.reseller_id,
            name: row.name,
            description: row.description,
            subdomain: row.subdomain,
            custom_domain: row.custom_domain,
            custom_domain_verified: row.custom_domain_verified,
            dns_challenge: row.dns_challenge.map(|j| j.0),
            settings: row.settings.0,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl DbTransaction for PgTransaction {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<PaymentRecord, AppError> {
        let order_id = match payment.purpose {
            PaymentPurpose::Order { order_id } => Some(order_id),
            _ => None,
        };

        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (
                payment_id,
                payment_type,
                order_id,
                amount,
                description,
                purpose,
                status
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING id, payment_id, amount, description, purpose, status,
                      gateway_trx_id, annotations, created_at, updated_at
            "#,
        )
        .bind(&payment.payment_id)
        .bind(payment.purpose.payment_type().as_str())
        .bind(order_id)
        .bind(payment.amount)
        .bind(&payment.description)
        .bind(Json(&payment.purpose))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, "payment"))?;

        Ok(row.into())
    }

    async fn fetch_payment(&mut self, payment_id: &str) -> Result<Option<PaymentRecord>, AppError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, payment_id, amount, description, purpose, status,
                   gateway_trx_id, annotations, created_at, updated_at
            FROM payments
            WHERE payment_id = $1
            FOR UPDATE
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn fetch_settled_order_payment(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<PaymentRecord>, AppError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, payment_id, amount, description, purpose, status,
                   gateway_trx_id, annotations, created_at, updated_at
            FROM payments
            WHERE order_id = $1 AND status IN ('completed', 'refunded')
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_payment(&mut self, payment: &PaymentRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = $1,
                gateway_trx_id = $2,
                annotations = $3,
                updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(payment.status)
        .bind(&payment.gateway_trx_id)
        .bind(Json(&payment.annotations))
        .bind(payment.updated_at)
        .bind(payment.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn fetch_order(&mut self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(order)
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE orders SET status = $1, payment_status = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.updated_at)
        .bind(order.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn enqueue_fulfillment(&mut self, order_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO fulfillment_requests (order_id) VALUES ($1) ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(order_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn fetch_user(&mut self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(user)
    }

    async fn fetch_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(user)
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name, password_hash, role, status, business_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.status)
        .bind(&user.business_name)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, "user with this email"))?;

        Ok(user)
    }

    async fn admin_ids(&mut self) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE role = 'admin' AND status = 'active'",
        )
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(ids)
    }

    async fn principal_for_session(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, Role, AccountStatus)>(
            r#"
            SELECT u.id, u.role, u.status
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1 AND s.expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|(id, role, status)| Principal::new(id, role, status)))
    }

    async fn append_wallet_entry(
        &mut self,
        user_id: Uuid,
        entry: &NewWalletEntry,
    ) -> Result<WalletEntry, AppError> {
        // The CHECK (wallet_balance >= 0) constraint backs the service-level check
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET wallet_balance = wallet_balance + $1,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(entry.signed_amount())
        .bind(user_id)
        .execute(&mut *self.tx)
        .await;

        match updated {
            Ok(result) if result.rows_affected() == 0 => {
                return Err(AppError::NotFound("Wallet owner".to_string()));
            }
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_check_violation() => {
                return Err(AppError::InsufficientBalance);
            }
            Err(e) => return Err(e.into()),
        }

        let row = sqlx::query_as::<_, WalletEntry>(
            r#"
            INSERT INTO wallet_transactions (
                user_id,
                kind,
                amount,
                description,
                status,
                reference
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(entry.kind)
        .bind(entry.amount)
        .bind(&entry.description)
        .bind(WalletEntryStatus::Completed)
        .bind(&entry.reference)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, "wallet entry for this reference"))?;

        Ok(row)
    }

    async fn wallet_entries(&mut self, user_id: Uuid) -> Result<Vec<WalletEntry>, AppError> {
        let entries = sqlx::query_as::<_, WalletEntry>(
            "SELECT * FROM wallet_transactions WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(entries)
    }

    async fn subdomain_taken(
        &mut self,
        subdomain: &str,
        except_store: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM stores
                WHERE subdomain = $1
                AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(subdomain)
        .bind(except_store)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(taken)
    }

    async fn custom_domain_taken(
        &mut self,
        domain: &str,
        except_store: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM stores
                WHERE custom_domain = $1
                AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(domain)
        .bind(except_store)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(taken)
    }

    async fn fetch_store_for_reseller(
        &mut self,
        reseller_id: Uuid,
    ) -> Result<Option<Storefront>, AppError> {
        let row = sqlx::query_as::<_, StoreRow>(
            "SELECT * FROM stores WHERE reseller_id = $1 FOR UPDATE",
        )
        .bind(reseller_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_store(&mut self, store: &NewStorefront) -> Result<Storefront, AppError> {
        let row = sqlx::query_as::<_, StoreRow>(
            r#"
            INSERT INTO stores (reseller_id, name, description, subdomain, settings, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(store.reseller_id)
        .bind(&store.name)
        .bind(&store.description)
        .bind(&store.subdomain)
        .bind(Json(&store.settings))
        .bind(store.status)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, "store"))?;

        Ok(row.into())
    }

    async fn update_store(&mut self, store: &Storefront) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE stores
            SET name = $1,
                description = $2,
                subdomain = $3,
                custom_domain = $4,
                custom_domain_verified = $5,
                dns_challenge = $6,
                settings = $7,
                status = $8,
                updated_at = NOW()
            WHERE id = $9
            "#,
        )
        .bind(&store.name)
        .bind(&store.description)
        .bind(&store.subdomain)
        .bind(&store.custom_domain)
        .bind(store.custom_domain_verified)
        .bind(store.dns_challenge.as_ref().map(Json))
        .bind(Json(&store.settings))
        .bind(store.status)
        .bind(store.id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, "subdomain or custom domain"))?;

        Ok(())
    }
}
