use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::PaymentError;

pub mod midtrans;

pub use midtrans::{MidtransClient, MidtransConfig, MidtransNotification, NotificationVerifier};

#[derive(Debug, Clone, PartialEq)]
pub struct CreateLinkRequest {
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub description: Option<String>,
    pub expired_at: DateTime<Utc>,
}

/// Hosted checkout page returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    pub token: Option<String>,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Any transport or validation problem comes back as `PaymentError::Gateway`.
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<PaymentLink, PaymentError>;
}
