//! Midtrans Snap client and payment-notification handling.
//!
//! Link creation uses the Snap transactions API. Notifications are signed with
//! `sha512(order_id + status_code + gross_amount + server_key)`.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use num_traits::ToPrimitive;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{CreateLinkRequest, PaymentGateway, PaymentLink};
use crate::error::PaymentError;
use crate::workflow::WebhookNotification;

pub const SANDBOX_BASE_URL: &str = "https://app.sandbox.midtrans.com";
const GATEWAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ITEM_NAME_MAX_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct MidtransConfig {
    pub server_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Offset the gateway uses for its wall-clock timestamps.
    pub utc_offset: FixedOffset,
}

#[derive(Clone)]
pub struct MidtransClient {
    client: Client,
    config: MidtransConfig,
}

#[derive(Debug, Serialize)]
struct SnapRequest {
    transaction_details: TransactionDetails,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    item_details: Vec<ItemDetail>,
    expiry: SnapExpiry,
}

#[derive(Debug, Serialize)]
struct TransactionDetails {
    order_id: String,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct ItemDetail {
    id: String,
    price: i64,
    quantity: i32,
    name: String,
}

#[derive(Debug, Serialize)]
struct SnapExpiry {
    start_time: String,
    unit: &'static str,
    duration: i64,
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: Option<String>,
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct SnapErrorResponse {
    #[serde(default)]
    error_messages: Vec<String>,
}

impl MidtransClient {
    pub fn new(config: MidtransConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn build_request(&self, request: &CreateLinkRequest, now: DateTime<Utc>) -> Result<SnapRequest, PaymentError> {
        // Snap only accepts whole rupiah amounts
        let gross_amount = request
            .amount
            .round(0)
            .to_i64()
            .filter(|amount| *amount > 0)
            .ok_or_else(|| PaymentError::Validation(format!("amount {} is out of range", request.amount)))?;

        let item_details = request
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(|d| ItemDetail {
                id: request.order_id.to_string(),
                price: gross_amount,
                quantity: 1,
                name: d.chars().take(ITEM_NAME_MAX_CHARS).collect(),
            })
            .into_iter()
            .collect();

        let duration = (request.expired_at - now).num_minutes().max(1);

        Ok(SnapRequest {
            transaction_details: TransactionDetails {
                order_id: request.order_id.to_string(),
                gross_amount,
            },
            item_details,
            expiry: SnapExpiry {
                start_time: now
                    .with_timezone(&self.config.utc_offset)
                    .format("%Y-%m-%d %H:%M:%S %z")
                    .to_string(),
                unit: "minutes",
                duration,
            },
        })
    }
}

#[async_trait]
impl PaymentGateway for MidtransClient {
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<PaymentLink, PaymentError> {
        let body = self.build_request(request, Utc::now())?;
        let url = format!("{}/snap/v1/transactions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(order_id = %request.order_id, error = %e, "Midtrans request failed");
                PaymentError::Gateway(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        debug!(status = %status, body = %text, "Midtrans snap response");

        if !status.is_success() {
            let messages = serde_json::from_str::<SnapErrorResponse>(&text)
                .map(|e| e.error_messages.join(", "))
                .unwrap_or_default();
            let message = if messages.is_empty() { text } else { messages };
            error!(order_id = %request.order_id, status = %status, message = %message, "Midtrans rejected payment link");
            return Err(PaymentError::Gateway(format!("{}: {}", status, message)));
        }

        let snap: SnapResponse = serde_json::from_str(&text)
            .map_err(|e| PaymentError::Gateway(format!("unexpected response: {}", e)))?;

        info!(order_id = %request.order_id, "Midtrans payment link created");

        Ok(PaymentLink {
            token: snap.token,
            redirect_url: snap.redirect_url,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaNumber {
    pub bank: Option<String>,
    pub va_number: Option<String>,
}

/// Payment notification posted by Midtrans to the webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MidtransNotification {
    pub order_id: String,
    pub transaction_status: String,
    pub transaction_id: Option<String>,
    pub status_code: Option<String>,
    pub gross_amount: Option<String>,
    pub signature_key: Option<String>,
    pub settlement_time: Option<String>,
    #[serde(default)]
    pub va_numbers: Vec<VaNumber>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
    pub payment_type: Option<String>,
}

pub fn notification_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

impl MidtransNotification {
    pub fn verify_signature(&self, server_key: &str) -> Result<(), PaymentError> {
        let (Some(status_code), Some(gross_amount), Some(signature)) = (
            self.status_code.as_deref(),
            self.gross_amount.as_deref(),
            self.signature_key.as_deref(),
        ) else {
            return Err(PaymentError::InvalidSignature);
        };

        let expected = notification_signature(&self.order_id, status_code, gross_amount, server_key);
        if expected.eq_ignore_ascii_case(signature) {
            Ok(())
        } else {
            Err(PaymentError::InvalidSignature)
        }
    }

    pub fn into_webhook(self, utc_offset: FixedOffset) -> Result<WebhookNotification, PaymentError> {
        let order_id = Uuid::parse_str(&self.order_id)
            .map_err(|_| PaymentError::Validation("order_id must be a valid UUID".to_string()))?;

        let paid_at = self
            .settlement_time
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_gateway_time(s, utc_offset))
            .transpose()?;

        let va = self.va_numbers.into_iter().next();
        let va_number = va.as_ref().and_then(|v| v.va_number.clone());
        let bank = va.and_then(|v| v.bank).or(self.bank);

        Ok(WebhookNotification {
            order_id,
            transaction_status: self.transaction_status,
            transaction_id: self.transaction_id,
            paid_at,
            va_number,
            bank,
            acquirer: self.acquirer,
        })
    }
}

/// Accepts RFC 3339 or the gateway's `YYYY-MM-DD HH:MM:SS` local time.
pub fn parse_gateway_time(value: &str, utc_offset: FixedOffset) -> Result<DateTime<Utc>, PaymentError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, GATEWAY_TIME_FORMAT)
        .map_err(|_| PaymentError::Validation(format!("invalid settlement time: {}", value)))?;

    utc_offset
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| PaymentError::Validation(format!("invalid settlement time: {}", value)))
}

/// Turns raw notifications into workflow input, checking the signature when a
/// server key is configured.
#[derive(Debug, Clone)]
pub struct NotificationVerifier {
    server_key: Option<String>,
    utc_offset: FixedOffset,
}

impl NotificationVerifier {
    pub fn new(server_key: Option<String>, utc_offset: FixedOffset) -> Self {
        Self {
            server_key,
            utc_offset,
        }
    }

    pub fn verify(&self, notification: MidtransNotification) -> Result<WebhookNotification, PaymentError> {
        if let Some(server_key) = &self.server_key {
            notification.verify_signature(server_key)?;
        }
        notification.into_webhook(self.utc_offset)
    }
}
