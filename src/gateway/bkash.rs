//! bKash tokenized checkout adapter.
//!
//! Every call grants a fresh id token, then issues the checkout request with
//! it. Amounts are sent as major-unit decimal strings in BDT.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::AppError;
use crate::gateway::{
    ExecutionResult, InitializePayment, InitializedPayment, PaymentGateway, STATUS_CODE_SUCCESS,
};

/// Credentials and endpoints for the bKash merchant API.
#[derive(Debug, Clone)]
pub struct BkashConfig {
    pub base_url: String,
    pub app_key: String,
    pub app_secret: String,
    pub username: String,
    pub password: String,
    /// Where bKash redirects the payer, with `paymentID` and `status` appended
    pub callback_url: String,
    pub timeout: Duration,
}

pub struct BkashGateway {
    config: BkashConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GrantTokenResponse {
    id_token: Option<String>,
    #[serde(rename = "statusCode")]
    status_code: Option<String>,
    #[serde(rename = "statusMessage")]
    status_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    #[serde(rename = "paymentID")]
    payment_id: Option<String>,
    #[serde(rename = "bkashURL")]
    bkash_url: Option<String>,
    #[serde(rename = "statusCode")]
    status_code: Option<String>,
    #[serde(rename = "statusMessage")]
    status_message: Option<String>,
}

/// Body of both the execute and the status endpoints.
#[derive(Debug, Deserialize)]
struct PaymentStateResponse {
    #[serde(rename = "statusCode")]
    status_code: Option<String>,
    #[serde(rename = "statusMessage")]
    status_message: Option<String>,
    #[serde(rename = "transactionStatus")]
    transaction_status: Option<String>,
    #[serde(rename = "trxID")]
    trx_id: Option<String>,
}

impl BkashGateway {
    pub fn new(mut config: BkashConfig) -> Result<Self, AppError> {
        url::Url::parse(&config.base_url)
            .map_err(|e| AppError::Validation(format!("invalid gateway base url: {e}")))?;
        url::Url::parse(&config.callback_url)
            .map_err(|e| AppError::Validation(format!("invalid callback url: {e}")))?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Gateway(format!("HTTP client error: {e}")))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/tokenized/checkout/{path}", self.config.base_url)
    }

    async fn grant_token(&self) -> Result<String, AppError> {
        let response: GrantTokenResponse = self
            .client
            .post(self.endpoint("token/grant"))
            .header("username", &self.config.username)
            .header("password", &self.config.password)
            .json(&json!({
                "app_key": self.config.app_key,
                "app_secret": self.config.app_secret,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Gateway(format!("token grant failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("malformed token response: {e}")))?;

        response.id_token.ok_or_else(|| {
            AppError::Gateway(format!(
                "token grant rejected: {} {}",
                response.status_code.unwrap_or_default(),
                response.status_message.unwrap_or_default()
            ))
        })
    }

    /// POST `{paymentID}` to a checkout endpoint that answers with the
    /// payment's state.
    async fn payment_call(&self, path: &str, payment_id: &str) -> Result<ExecutionResult, AppError> {
        let token = self.grant_token().await?;

        let response: PaymentStateResponse = self
            .client
            .post(self.endpoint(path))
            .header("Authorization", token)
            .header("X-APP-Key", &self.config.app_key)
            .json(&json!({ "paymentID": payment_id }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Gateway(format!("{path} request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("malformed {path} response: {e}")))?;

        Ok(ExecutionResult {
            status_code: response.status_code.unwrap_or_default(),
            transaction_status: response.transaction_status.unwrap_or_default(),
            trx_id: response.trx_id,
            status_message: response.status_message,
        })
    }
}

#[async_trait]
impl PaymentGateway for BkashGateway {
    fn name(&self) -> &'static str {
        "bkash"
    }

    async fn initialize_payment(
        &self,
        request: InitializePayment,
    ) -> Result<InitializedPayment, AppError> {
        let token = self.grant_token().await?;

        let response: CreatePaymentResponse = self
            .client
            .post(self.endpoint("create"))
            .header("Authorization", token)
            .header("X-APP-Key", &self.config.app_key)
            .json(&json!({
                "mode": "0011",
                "payerReference": request.reference,
                "callbackURL": self.config.callback_url,
                "amount": request.amount.to_decimal_string(),
                "currency": "BDT",
                "intent": "sale",
                "merchantInvoiceNumber": request.reference,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Gateway(format!("create payment failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("malformed create response: {e}")))?;

        match response {
            CreatePaymentResponse {
                payment_id: Some(payment_id),
                bkash_url: Some(redirect_url),
                status_code: Some(code),
                ..
            } if code == STATUS_CODE_SUCCESS => {
                tracing::info!(
                    payment_id = %payment_id,
                    payment_type = %request.payment_type,
                    amount = %request.amount,
                    "gateway payment created"
                );
                Ok(InitializedPayment {
                    payment_id,
                    redirect_url,
                })
            }
            other => Err(AppError::Gateway(format!(
                "create payment rejected: {} {}",
                other.status_code.unwrap_or_default(),
                other.status_message.unwrap_or_default()
            ))),
        }
    }

    async fn execute_payment(&self, payment_id: &str) -> Result<ExecutionResult, AppError> {
        self.payment_call("execute", payment_id).await
    }

    async fn query_payment(&self, payment_id: &str) -> Result<ExecutionResult, AppError> {
        self.payment_call("payment/status", payment_id).await
    }
}
