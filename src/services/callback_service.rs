//! Payment callback dispatcher.
//!
//! Turns the gateway's browser redirect into exactly one terminal effect and
//! always answers with a [`CallbackRedirect`], never an error.
//!
//! # Flow for `status=success`
//!
//! 1. Claim the pending record in a short transaction
//! 2. Confirm with the gateway (no transaction open); if execution is not
//!    reported completed, ask for the payment status before giving up
//! 3. Open a transaction and re-read the record under lock
//! 4. Apply the type handler and mark the record completed
//! 5. Commit, then send notifications
//!
//! Only the delivery holding the claim talks to the gateway or records a
//! failure. Other deliveries for the same payment wait until the record
//! leaves `pending` and replay its redirect. A record that is already
//! completed replays its success redirect without touching anything, so
//! redelivered callbacks are harmless.

use chrono::Utc;
use std::time::Duration;

use crate::{
    db::Database,
    error::AppError,
    gateway::{ExecutionResult, PaymentGateway},
    models::payment::{CallbackRedirect, GatewayStatus, PaymentRecord, PaymentStatus},
    services::{
        notification_service::{Notifier, Outbound},
        payment_handlers,
    },
};

/// A claim older than this belongs to a delivery that died mid-settlement.
const CLAIM_STALE_AFTER_SECS: i64 = 120;

/// How long a concurrent delivery waits for the claim holder to finish.
const CLAIM_WAIT: Duration = Duration::from_secs(60);

const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle `GET /api/v1/payments/callback?paymentID=...&status=...`.
pub async fn handle_callback(
    db: &dyn Database,
    gateway: &dyn PaymentGateway,
    notifier: &dyn Notifier,
    payment_id: Option<&str>,
    status: Option<&str>,
) -> CallbackRedirect {
    let (Some(payment_id), Some(status)) = (payment_id, status) else {
        tracing::warn!("callback without paymentID or status");
        return CallbackRedirect::Error;
    };

    let record = match load_record(db, payment_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!(payment_id, "callback for unknown payment");
            return CallbackRedirect::Error;
        }
        Err(e) => {
            tracing::error!(payment_id, error = %e, "failed to load payment");
            return CallbackRedirect::Error;
        }
    };

    if record.status != PaymentStatus::Pending {
        tracing::info!(payment_id, status = ?record.status, "callback for settled payment");
        return CallbackRedirect::for_settled(&record);
    }

    match GatewayStatus::parse(status) {
        Some(GatewayStatus::Success) => settle(db, gateway, notifier, payment_id).await,
        Some(outcome) => match close(db, payment_id, outcome).await {
            Ok(Some(redirect)) => redirect,
            Ok(None) => await_settlement(db, payment_id).await,
            Err(e) => {
                tracing::error!(payment_id, error = %e, "failed to close payment");
                CallbackRedirect::Error
            }
        },
        None => {
            tracing::warn!(payment_id, status, "callback with unknown status");
            CallbackRedirect::Error
        }
    }
}

async fn load_record(
    db: &dyn Database,
    payment_id: &str,
) -> Result<Option<PaymentRecord>, AppError> {
    let mut tx = db.begin().await?;
    let record = tx.fetch_payment(payment_id).await?;
    tx.commit().await?;
    Ok(record)
}

fn claim_is_live(record: &PaymentRecord) -> bool {
    record
        .annotations
        .settlement_claimed_at
        .is_some_and(|at| (Utc::now() - at).num_seconds() < CLAIM_STALE_AFTER_SECS)
}

enum Claim {
    Acquired,
    Settled(PaymentRecord),
    HeldElsewhere,
}

/// Mark the pending record as being settled by this delivery.
async fn claim(db: &dyn Database, payment_id: &str) -> Result<Claim, AppError> {
    let mut tx = db.begin().await?;
    let mut record = tx
        .fetch_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;

    if record.status != PaymentStatus::Pending {
        return Ok(Claim::Settled(record));
    }
    if claim_is_live(&record) {
        return Ok(Claim::HeldElsewhere);
    }
    if let Some(stale) = record.annotations.settlement_claimed_at {
        tracing::warn!(payment_id, claimed_at = %stale, "taking over stale settlement claim");
    }

    record.annotations.settlement_claimed_at = Some(Utc::now());
    tx.update_payment(&record).await?;
    tx.commit().await?;
    Ok(Claim::Acquired)
}

/// Wait for another delivery to take the record out of `pending`.
async fn await_settlement(db: &dyn Database, payment_id: &str) -> CallbackRedirect {
    tracing::info!(payment_id, "payment is being settled by another delivery, waiting");
    let deadline = tokio::time::Instant::now() + CLAIM_WAIT;

    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(CLAIM_POLL_INTERVAL).await;
        match load_record(db, payment_id).await {
            Ok(Some(record)) if record.status != PaymentStatus::Pending => {
                return CallbackRedirect::for_settled(&record);
            }
            Ok(Some(_)) => {}
            Ok(None) => return CallbackRedirect::Error,
            Err(e) => {
                tracing::error!(payment_id, error = %e, "failed to reload payment");
                return CallbackRedirect::Error;
            }
        }
    }

    tracing::warn!(payment_id, "gave up waiting for concurrent settlement");
    CallbackRedirect::Error
}

async fn settle(
    db: &dyn Database,
    gateway: &dyn PaymentGateway,
    notifier: &dyn Notifier,
    payment_id: &str,
) -> CallbackRedirect {
    match claim(db, payment_id).await {
        Ok(Claim::Acquired) => {}
        Ok(Claim::Settled(record)) => return CallbackRedirect::for_settled(&record),
        Ok(Claim::HeldElsewhere) => return await_settlement(db, payment_id).await,
        Err(e) => {
            tracing::error!(payment_id, error = %e, "failed to claim payment");
            return CallbackRedirect::Error;
        }
    }

    let execution = match confirm(gateway, payment_id).await {
        Ok(execution) => execution,
        Err(reason) => return record_failure(db, payment_id, reason).await,
    };

    match apply_settlement(db, payment_id, &execution).await {
        Ok((redirect, outbound)) => {
            for message in outbound {
                message.send(db, notifier).await;
            }
            redirect
        }
        Err(e) => {
            tracing::error!(payment_id, error = %e, "settlement aborted");
            record_failure(db, payment_id, e.to_string()).await
        }
    }
}

/// Execute the payment at the gateway.
///
/// The gateway rejects a second execution of a captured payment, and an
/// execution can be captured even though its response never arrived. So a
/// non-completed or failed execution is checked against the payment status
/// before it counts as a failure.
async fn confirm(gateway: &dyn PaymentGateway, payment_id: &str) -> Result<ExecutionResult, String> {
    let reason = match gateway.execute_payment(payment_id).await {
        Ok(execution) if execution.is_completed() => return Ok(execution),
        Ok(execution) => execution.failure_reason(),
        Err(e) => e.to_string(),
    };
    tracing::warn!(payment_id, %reason, "payment not completed by execution, querying status");

    match gateway.query_payment(payment_id).await {
        Ok(status) if status.is_completed() => {
            tracing::info!(payment_id, "gateway reports the payment as completed");
            Ok(status)
        }
        Ok(status) => {
            tracing::warn!(
                payment_id,
                transaction_status = %status.transaction_status,
                "payment not completed"
            );
            Err(reason)
        }
        Err(e) => {
            tracing::error!(payment_id, error = %e, "payment status query failed");
            Err(reason)
        }
    }
}

/// The one transaction in which a confirmed payment takes effect.
async fn apply_settlement(
    db: &dyn Database,
    payment_id: &str,
    execution: &ExecutionResult,
) -> Result<(CallbackRedirect, Vec<Outbound>), AppError> {
    let mut tx = db.begin().await?;

    let mut record = tx
        .fetch_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;

    if record.status != PaymentStatus::Pending {
        return Ok((CallbackRedirect::for_settled(&record), Vec::new()));
    }

    let outbound = payment_handlers::apply(&mut *tx, &record, execution.trx_id.as_deref()).await?;

    record.complete(execution.trx_id.clone())?;
    tx.update_payment(&record).await?;
    tx.commit().await?;

    tracing::info!(
        payment_id,
        payment_type = %record.payment_type(),
        amount = %record.amount,
        "payment completed"
    );

    Ok((CallbackRedirect::success_for(&record), outbound))
}

/// Durably mark a pending record failed after an aborted settlement.
///
/// If the record was completed meanwhile, its success redirect wins.
async fn record_failure(db: &dyn Database, payment_id: &str, reason: String) -> CallbackRedirect {
    match mark_failed(db, payment_id, reason).await {
        Ok(Some(record)) if record.status == PaymentStatus::Completed => {
            CallbackRedirect::success_for(&record)
        }
        Ok(_) => CallbackRedirect::Error,
        Err(e) => {
            tracing::error!(payment_id, error = %e, "failed to record payment failure");
            CallbackRedirect::Error
        }
    }
}

async fn mark_failed(
    db: &dyn Database,
    payment_id: &str,
    reason: String,
) -> Result<Option<PaymentRecord>, AppError> {
    let mut tx = db.begin().await?;
    let Some(mut record) = tx.fetch_payment(payment_id).await? else {
        return Ok(None);
    };
    if record.status == PaymentStatus::Pending {
        record.fail(reason)?;
        tx.update_payment(&record).await?;
        tx.commit().await?;
    }
    Ok(Some(record))
}

/// Record a failure or cancellation reported by the gateway redirect.
///
/// Returns `None` without writing when a success delivery is settling the
/// record right now.
async fn close(
    db: &dyn Database,
    payment_id: &str,
    outcome: GatewayStatus,
) -> Result<Option<CallbackRedirect>, AppError> {
    let mut tx = db.begin().await?;
    let mut record = tx
        .fetch_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;

    if record.status != PaymentStatus::Pending {
        return Ok(Some(CallbackRedirect::for_settled(&record)));
    }
    if claim_is_live(&record) {
        return Ok(None);
    }

    let redirect = match outcome {
        GatewayStatus::Cancel => {
            record.cancel("User cancelled the transaction")?;
            CallbackRedirect::Cancelled(record.payment_type())
        }
        _ => {
            record.fail("Payment failed at the gateway")?;
            CallbackRedirect::Failed(record.payment_type())
        }
    };

    tx.update_payment(&record).await?;
    tx.commit().await?;

    tracing::info!(payment_id, status = ?record.status, "payment closed by gateway redirect");

    Ok(Some(redirect))
}
