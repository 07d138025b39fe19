#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use reseller_payment_server::{
    AppState,
    config::ServiceSettings,
    db::{Database, memory::MemoryDb},
    error::AppError,
    gateway::{ExecutionResult, InitializePayment, InitializedPayment, PaymentGateway},
    models::{
        money::Money,
        order::{Order, OrderPaymentStatus, OrderStatus},
        payment::{NewPayment, PaymentPurpose, PaymentRecord},
        user::{AccountStatus, NewUser, Principal, Role, User},
        wallet::{NewWalletEntry, WalletEntryKind},
    },
    services::notification_service::{Notification, Notifier},
};

/// What the mock gateway answers when a payment is executed.
#[derive(Debug, Clone)]
pub enum Execution {
    Completed,
    Declined,
    Unreachable,
    /// Captured at the gateway, but the response never arrives
    ResponseLost,
}

/// Gateway double. Executions succeed unless scripted otherwise.
///
/// Like the real gateway it captures a payment once: executing a captured
/// payment again is rejected, and the status query reports it completed.
#[derive(Default)]
pub struct MockGateway {
    script: Mutex<HashMap<String, Execution>>,
    initialized: Mutex<Vec<InitializePayment>>,
    captured: Mutex<HashSet<String>>,
    execute_delay: Mutex<Option<Duration>>,
    counter: AtomicUsize,
    execute_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, payment_id: &str, execution: Execution) {
        self.script
            .lock()
            .unwrap()
            .insert(payment_id.to_string(), execution);
    }

    /// Make completed executions answer only after `delay`.
    pub fn delay_execution(&self, delay: Duration) {
        *self.execute_delay.lock().unwrap() = Some(delay);
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn initialized(&self) -> Vec<InitializePayment> {
        self.initialized.lock().unwrap().clone()
    }

    fn scripted(&self, payment_id: &str) -> Execution {
        self.script
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .unwrap_or(Execution::Completed)
    }
}

fn completed(payment_id: &str) -> ExecutionResult {
    ExecutionResult {
        status_code: "0000".to_string(),
        transaction_status: "Completed".to_string(),
        trx_id: Some(format!("TRX-{payment_id}")),
        status_message: Some("Successful".to_string()),
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn initialize_payment(
        &self,
        request: InitializePayment,
    ) -> Result<InitializedPayment, AppError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.initialized.lock().unwrap().push(request);
        Ok(InitializedPayment {
            payment_id: format!("MOCKPAY{n}"),
            redirect_url: format!("https://gateway.test/checkout/MOCKPAY{n}"),
        })
    }

    async fn execute_payment(&self, payment_id: &str) -> Result<ExecutionResult, AppError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);

        let already_captured = self.captured.lock().unwrap().contains(payment_id);
        if already_captured {
            return Ok(ExecutionResult {
                status_code: "2056".to_string(),
                transaction_status: String::new(),
                trx_id: None,
                status_message: Some("Invalid Payment State".to_string()),
            });
        }

        match self.scripted(payment_id) {
            Execution::Completed => {
                self.captured.lock().unwrap().insert(payment_id.to_string());
                let delay = *self.execute_delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(completed(payment_id))
            }
            Execution::ResponseLost => {
                self.captured.lock().unwrap().insert(payment_id.to_string());
                Err(AppError::Gateway("execute payment failed: timed out".to_string()))
            }
            Execution::Declined => Ok(ExecutionResult {
                status_code: "2023".to_string(),
                transaction_status: "Failed".to_string(),
                trx_id: None,
                status_message: Some("Insufficient Balance".to_string()),
            }),
            Execution::Unreachable => Err(AppError::Gateway("connection refused".to_string())),
        }
    }

    async fn query_payment(&self, payment_id: &str) -> Result<ExecutionResult, AppError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        if let Execution::Unreachable = self.scripted(payment_id) {
            return Err(AppError::Gateway("connection refused".to_string()));
        }
        let captured = self.captured.lock().unwrap().contains(payment_id);
        if captured {
            return Ok(completed(payment_id));
        }
        Ok(ExecutionResult {
            status_code: "0000".to_string(),
            transaction_status: "Initiated".to_string(),
            trx_id: None,
            status_message: None,
        })
    }
}

/// Notifier that keeps everything it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        registration_fee: Money::from_minor(100_000),
        dns_a_record: "203.0.113.10".to_string(),
        dns_cname_record: "stores.topup.test".to_string(),
    }
}

pub struct Harness {
    pub db: Arc<MemoryDb>,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            db: Arc::new(MemoryDb::new()),
            gateway: Arc::new(MockGateway::new()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            db: self.db.clone(),
            gateway: self.gateway.clone(),
            notifier: self.notifier.clone(),
            settings: Arc::new(settings()),
        }
    }
}

pub async fn seed_user(db: &MemoryDb, email: &str, role: Role, status: AccountStatus) -> User {
    let mut tx = db.begin().await.unwrap();
    let user = tx
        .insert_user(&NewUser {
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2VlZA$c2VlZA".to_string(),
            role,
            status,
            business_name: (role == Role::Reseller).then(|| format!("{email} business")),
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    user
}

/// An active reseller with `balance` already credited through the ledger.
pub async fn seed_reseller(db: &MemoryDb, email: &str, balance: i64) -> User {
    let user = seed_user(db, email, Role::Reseller, AccountStatus::Active).await;
    if balance > 0 {
        let mut tx = db.begin().await.unwrap();
        tx.append_wallet_entry(
            user.id,
            &NewWalletEntry {
                kind: WalletEntryKind::Credit,
                amount: Money::from_minor(balance),
                description: "Opening balance".to_string(),
                reference: format!("seed:{}", user.id),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }
    db.user(user.id).await.unwrap()
}

pub async fn seed_order(
    db: &MemoryDb,
    reseller_id: Option<Uuid>,
    customer_id: Option<Uuid>,
    cost: i64,
    total: i64,
    status: OrderStatus,
) -> Order {
    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        order_number: format!("ORD{}", &Uuid::new_v4().simple().to_string()[..8]).to_uppercase(),
        customer_id,
        reseller_id,
        cost: Money::from_minor(cost),
        total: Money::from_minor(total),
        status,
        payment_status: OrderPaymentStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    db.insert_order(order.clone()).await;
    order
}

pub async fn seed_payment(
    db: &MemoryDb,
    payment_id: &str,
    amount: i64,
    purpose: PaymentPurpose,
) -> PaymentRecord {
    let mut tx = db.begin().await.unwrap();
    let record = tx
        .insert_payment(&NewPayment {
            payment_id: payment_id.to_string(),
            amount: Money::from_minor(amount),
            description: "test payment".to_string(),
            purpose,
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    record
}

pub fn principal(user: &User) -> Principal {
    Principal::new(user.id, user.role, user.status)
}

/// Ledger sum for a user, to compare against the stored balance.
pub async fn ledger_sum(db: &MemoryDb, user_id: Uuid) -> Money {
    db.ledger(user_id)
        .await
        .iter()
        .map(|e| e.signed_amount())
        .sum()
}
