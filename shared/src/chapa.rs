//! Client for the Chapa payment gateway.
//!
//! Only the two calls the booking flow needs are wrapped: initializing a
//! hosted checkout and verifying a transaction by its reference.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::domain::PaymentStatus;

pub const DEFAULT_BASE_URL: &str = "https://api.chapa.co/v1";
const CHECKOUT_TITLE: &str = "ALX Travel App Payment";

#[derive(Debug, Error)]
pub enum ChapaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chapa rejected the request ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Chapa response is missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone)]
pub struct ChapaConfig {
    pub secret_key: String,
    pub base_url: String,
}

/// What the booking flow hands to the gateway to open a checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct InitializeRequest {
    pub amount: BigDecimal,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tx_ref: String,
    pub callback_url: String,
    pub return_url: String,
    pub booking_reference: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitializedTransaction {
    pub checkout_url: String,
    pub transaction_ref: String,
    pub status: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedTransaction {
    pub status: String,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub transaction_ref: Option<String>,
    pub message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &InitializeRequest) -> Result<InitializedTransaction, ChapaError>;

    async fn verify(&self, transaction_ref: &str) -> Result<VerifiedTransaction, ChapaError>;

    /// Local status for a transaction. A verification that cannot be completed counts as failed.
    async fn payment_status(&self, transaction_ref: &str) -> PaymentStatus {
        match self.verify(transaction_ref).await {
            Ok(verified) => PaymentStatus::from_chapa(&verified.status),
            Err(_) => PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Serialize)]
struct InitializePayload<'a> {
    amount: String,
    currency: &'a str,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    tx_ref: &'a str,
    callback_url: &'a str,
    return_url: &'a str,
    customization: Customization,
}

#[derive(Debug, Serialize)]
struct Customization {
    title: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    message: Option<serde_json::Value>,
    status: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    checkout_url: Option<String>,
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: Option<String>,
    amount: Option<BigDecimal>,
    currency: Option<String>,
    reference: Option<String>,
    tx_ref: Option<String>,
}

/// Chapa sends `message` either as a string or as a field-error object.
fn message_text(message: Option<serde_json::Value>) -> Option<String> {
    match message? {
        serde_json::Value::String(text) => Some(text),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct ChapaClient {
    config: ChapaConfig,
    client: Client,
}

impl ChapaClient {
    pub fn new(config: ChapaConfig) -> Result<Self, ChapaError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn into_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Envelope<T>, ChapaError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| message_text(envelope.message))
                .unwrap_or(body);
            return Err(ChapaError::Api { status, message });
        }
        Ok(response.json::<Envelope<T>>().await?)
    }
}

#[async_trait]
impl PaymentGateway for ChapaClient {
    async fn initialize(&self, request: &InitializeRequest) -> Result<InitializedTransaction, ChapaError> {
        let payload = InitializePayload {
            amount: request.amount.to_string(),
            currency: &request.currency,
            email: &request.email,
            first_name: &request.first_name,
            last_name: &request.last_name,
            tx_ref: &request.tx_ref,
            callback_url: &request.callback_url,
            return_url: &request.return_url,
            customization: Customization {
                title: CHECKOUT_TITLE.to_string(),
                description: format!("Payment for booking: {}", request.booking_reference),
            },
        };

        let response = self
            .client
            .post(self.url("transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(tx_ref = %request.tx_ref, "Error initializing payment: {}", e);
                e
            })?;

        let envelope = Self::into_envelope::<InitializeData>(response).await?;
        let data = envelope.data.ok_or(ChapaError::MissingField("data"))?;
        let checkout_url = data
            .checkout_url
            .filter(|url| !url.is_empty())
            .ok_or(ChapaError::MissingField("checkout_url"))?;

        info!(tx_ref = %request.tx_ref, "Payment initialized successfully");

        Ok(InitializedTransaction {
            checkout_url,
            transaction_ref: data.reference.unwrap_or_else(|| request.tx_ref.clone()),
            status: envelope.status,
            message: message_text(envelope.message),
        })
    }

    async fn verify(&self, transaction_ref: &str) -> Result<VerifiedTransaction, ChapaError> {
        let response = self
            .client
            .get(self.url(&format!("transaction/verify/{}", transaction_ref)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| {
                error!(tx_ref = %transaction_ref, "Error verifying payment: {}", e);
                e
            })?;

        let envelope = Self::into_envelope::<VerifyData>(response).await?;
        let data = envelope.data.ok_or(ChapaError::MissingField("data"))?;

        info!(tx_ref = %transaction_ref, status = ?data.status, "Payment verification successful");

        Ok(VerifiedTransaction {
            status: data.status.ok_or(ChapaError::MissingField("status"))?,
            amount: data.amount,
            currency: data.currency,
            transaction_ref: data.reference.or(data.tx_ref),
            message: message_text(envelope.message),
        })
    }
}
