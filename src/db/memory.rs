//! In-memory storage backend.
//!
//! A transaction holds the state lock for its whole lifetime and works on a
//! copy of the state; `commit` swaps the copy in, dropping the transaction
//! discards it. Transactions are therefore fully serialized, which is the
//! strongest isolation the Postgres backend approximates with row locks.
//! Used by the test-suite.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::db::{Database, DbTransaction};
use crate::error::AppError;
use crate::models::{
    money::Money,
    order::Order,
    payment::{NewPayment, PaymentAnnotations, PaymentPurpose, PaymentRecord, PaymentStatus},
    store::{NewStorefront, Storefront},
    user::{AccountStatus, NewUser, Principal, Role, User},
    wallet::{NewWalletEntry, WalletEntry, WalletEntryStatus},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    payments: HashMap<String, PaymentRecord>,
    orders: HashMap<Uuid, Order>,
    users: HashMap<Uuid, User>,
    wallet_entries: Vec<WalletEntry>,
    stores: HashMap<Uuid, Storefront>,
    sessions: HashMap<String, Uuid>,
    fulfillment_queue: Vec<Uuid>,
}

/// Storage held in process memory.
#[derive(Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order as the storefront checkout would.
    pub async fn insert_order(&self, order: Order) {
        self.state.lock().await.orders.insert(order.id, order);
    }

    /// Register a session token hash for a user.
    pub async fn insert_session(&self, token_hash: &str, user_id: Uuid) {
        self.state
            .lock()
            .await
            .sessions
            .insert(token_hash.to_string(), user_id);
    }

    pub async fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub async fn order(&self, order_id: Uuid) -> Option<Order> {
        self.state.lock().await.orders.get(&order_id).cloned()
    }

    pub async fn payment(&self, payment_id: &str) -> Option<PaymentRecord> {
        self.state.lock().await.payments.get(payment_id).cloned()
    }

    pub async fn ledger(&self, user_id: Uuid) -> Vec<WalletEntry> {
        self.state
            .lock()
            .await
            .wallet_entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn users_with_email(&self, email: &str) -> usize {
        self.state
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.email.eq_ignore_ascii_case(email))
            .count()
    }

    pub async fn fulfillment_queue(&self) -> Vec<Uuid> {
        self.state.lock().await.fulfillment_queue.clone()
    }

    pub async fn stores(&self) -> Vec<Storefront> {
        self.state.lock().await.stores.values().cloned().collect()
    }
}

#[async_trait]
impl Database for MemoryDb {
    async fn begin(&self) -> Result<Box<dyn DbTransaction>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// A serialized transaction over a working copy of the state.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl DbTransaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<PaymentRecord, AppError> {
        if self.working.payments.contains_key(&payment.payment_id) {
            return Err(AppError::Conflict("payment already exists".to_string()));
        }
        let now = Utc::now();
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            payment_id: payment.payment_id.clone(),
            amount: payment.amount,
            description: payment.description.clone(),
            purpose: payment.purpose.clone(),
            status: PaymentStatus::Pending,
            gateway_trx_id: None,
            annotations: PaymentAnnotations::default(),
            created_at: now,
            updated_at: now,
        };
        self.working
            .payments
            .insert(record.payment_id.clone(), record.clone());
        Ok(record)
    }

    async fn fetch_payment(&mut self, payment_id: &str) -> Result<Option<PaymentRecord>, AppError> {
        Ok(self.working.payments.get(payment_id).cloned())
    }

    async fn fetch_settled_order_payment(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<PaymentRecord>, AppError> {
        Ok(self
            .working
            .payments
            .values()
            .filter(|p| matches!(p.purpose, PaymentPurpose::Order { order_id: id } if id == order_id))
            .filter(|p| matches!(p.status, PaymentStatus::Completed | PaymentStatus::Refunded))
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn update_payment(&mut self, payment: &PaymentRecord) -> Result<(), AppError> {
        self.working
            .payments
            .insert(payment.payment_id.clone(), payment.clone());
        Ok(())
    }

    async fn fetch_order(&mut self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), AppError> {
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn enqueue_fulfillment(&mut self, order_id: Uuid) -> Result<(), AppError> {
        if !self.working.fulfillment_queue.contains(&order_id) {
            self.working.fulfillment_queue.push(order_id);
        }
        Ok(())
    }

    async fn fetch_user(&mut self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn fetch_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, AppError> {
        if self
            .working
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AppError::Conflict(
                "user with this email already exists".to_string(),
            ));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            name: user.name.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            status: user.status,
            business_name: user.business_name.clone(),
            wallet_balance: Money::ZERO,
            created_at: now,
            updated_at: now,
        };
        self.working.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn admin_ids(&mut self) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .working
            .users
            .values()
            .filter(|u| u.role == Role::Admin && u.status == AccountStatus::Active)
            .map(|u| u.id)
            .collect())
    }

    async fn principal_for_session(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError> {
        Ok(self
            .working
            .sessions
            .get(token_hash)
            .and_then(|id| self.working.users.get(id))
            .map(|u| Principal::new(u.id, u.role, u.status)))
    }

    async fn append_wallet_entry(
        &mut self,
        user_id: Uuid,
        entry: &NewWalletEntry,
    ) -> Result<WalletEntry, AppError> {
        if self
            .working
            .wallet_entries
            .iter()
            .any(|e| e.reference == entry.reference)
        {
            return Err(AppError::Conflict(
                "wallet entry for this reference already exists".to_string(),
            ));
        }
        let user = self
            .working
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("Wallet owner".to_string()))?;
        let balance = user
            .wallet_balance
            .checked_add(entry.signed_amount())
            .ok_or_else(|| AppError::Validation("wallet balance overflow".to_string()))?;
        if balance.is_negative() {
            return Err(AppError::InsufficientBalance);
        }
        let now = Utc::now();
        user.wallet_balance = balance;
        user.updated_at = now;

        let created = WalletEntry {
            id: Uuid::new_v4(),
            user_id,
            kind: entry.kind,
            amount: entry.amount,
            description: entry.description.clone(),
            status: WalletEntryStatus::Completed,
            reference: entry.reference.clone(),
            created_at: now,
        };
        self.working.wallet_entries.push(created.clone());
        Ok(created)
    }

    async fn wallet_entries(&mut self, user_id: Uuid) -> Result<Vec<WalletEntry>, AppError> {
        Ok(self
            .working
            .wallet_entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn subdomain_taken(
        &mut self,
        subdomain: &str,
        except_store: Option<Uuid>,
    ) -> Result<bool, AppError> {
        Ok(self
            .working
            .stores
            .values()
            .any(|s| s.subdomain == subdomain && Some(s.id) != except_store))
    }

    async fn custom_domain_taken(
        &mut self,
        domain: &str,
        except_store: Option<Uuid>,
    ) -> Result<bool, AppError> {
        Ok(self.working.stores.values().any(|s| {
            s.custom_domain.as_deref() == Some(domain) && Some(s.id) != except_store
        }))
    }

    async fn fetch_store_for_reseller(
        &mut self,
        reseller_id: Uuid,
    ) -> Result<Option<Storefront>, AppError> {
        Ok(self
            .working
            .stores
            .values()
            .find(|s| s.reseller_id == reseller_id)
            .cloned())
    }

    async fn insert_store(&mut self, store: &NewStorefront) -> Result<Storefront, AppError> {
        if self.working.stores.values().any(|s| {
            s.reseller_id == store.reseller_id || s.subdomain == store.subdomain
        }) {
            return Err(AppError::Conflict("store already exists".to_string()));
        }
        let now = Utc::now();
        let created = Storefront {
            id: Uuid::new_v4(),
            reseller_id: store.reseller_id,
            name: store.name.clone(),
            description: store.description.clone(),
            subdomain: store.subdomain.clone(),
            custom_domain: None,
            custom_domain_verified: false,
            dns_challenge: None,
            settings: store.settings.clone(),
            status: store.status,
            created_at: now,
            updated_at: now,
        };
        self.working.stores.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_store(&mut self, store: &Storefront) -> Result<(), AppError> {
        let clash = self.working.stores.values().any(|s| {
            s.id != store.id
                && (s.subdomain == store.subdomain
                    || (store.custom_domain.is_some() && s.custom_domain == store.custom_domain))
        });
        if clash {
            return Err(AppError::Conflict(
                "subdomain or custom domain already exists".to_string(),
            ));
        }
        let mut updated = store.clone();
        updated.updated_at = Utc::now();
        self.working.stores.insert(updated.id, updated);
        Ok(())
    }
}
