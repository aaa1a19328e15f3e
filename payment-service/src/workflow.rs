//! Payment Workflow Engine.
//!
//! Creation calls the gateway first and then writes the payment and its
//! initial history row in one transaction. Webhooks update the payment and
//! append history in one transaction, then publish a status-change event once
//! the transaction has committed.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use num_traits::Zero;
use shared::PaymentEventMessage;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PaymentError;
use crate::gateway::{CreateLinkRequest, PaymentGateway};
use crate::models::*;
use crate::publisher::EventPublisher;
use crate::store::{PaymentListParams, PaymentStore, StoreTransaction};

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePayment {
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub description: Option<String>,
    pub expired_at: DateTime<Utc>,
}

/// Gateway callback already checked and normalised by the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookNotification {
    pub order_id: Uuid,
    pub transaction_status: String,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// The transition was written and a history row appended.
    Applied(Payment),
    /// Replay of the terminal status the payment already has; nothing was written.
    Duplicate(Payment),
}

impl WebhookOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            WebhookOutcome::Applied(payment) | WebhookOutcome::Duplicate(payment) => payment,
        }
    }
}

/// Runs `work` inside a store transaction: commit on `Ok`, roll back on `Err`.
/// Rollback failures are logged and the original error is returned.
pub async fn in_transaction<T, F>(store: &dyn PaymentStore, work: F) -> Result<T, PaymentError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut (dyn StoreTransaction + 'static)) -> BoxFuture<'t, Result<T, PaymentError>>
        + Send,
{
    let mut tx = store.begin().await?;

    match work(tx.as_mut()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback failed after {}: {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

pub struct PaymentWorkflow {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl PaymentWorkflow {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
        topic: String,
    ) -> Self {
        Self {
            store,
            gateway,
            publisher,
            topic,
        }
    }

    pub async fn list(&self, params: &PaymentListParams) -> Result<(Vec<Payment>, i64), PaymentError> {
        Ok(self.store.find_all_with_pagination(params).await?)
    }

    pub async fn get_by_uuid(&self, uuid: Uuid) -> Result<Payment, PaymentError> {
        Ok(self.store.find_by_uuid(uuid).await?)
    }

    pub async fn create_payment(&self, request: CreatePayment) -> Result<Payment, PaymentError> {
        if request.expired_at <= Utc::now() {
            return Err(PaymentError::ExpiredAtInvalid);
        }
        // the gateway charges whole units, so anything that rounds to zero is rejected here
        if request.amount.round(0) <= BigDecimal::zero() {
            return Err(PaymentError::Validation("amount must be at least 1".to_string()));
        }

        let link = self
            .gateway
            .create_link(&CreateLinkRequest {
                order_id: request.order_id,
                amount: request.amount.clone(),
                description: request.description.clone(),
                expired_at: request.expired_at,
            })
            .await?;

        info!(order_id = %request.order_id, "Payment link created");

        let new_payment = NewPayment {
            uuid: Uuid::new_v4(),
            order_id: request.order_id,
            amount: request.amount,
            status: PaymentStatus::Initial,
            payment_link: link.redirect_url,
            description: request.description,
            expired_at: request.expired_at,
        };

        let payment = in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let payment = tx.create_payment(new_payment).await?;
                tx.append_history(NewPaymentHistory {
                    payment_id: payment.id,
                    status: payment.status.history_status(),
                })
                .await?;
                Ok(payment)
            })
        })
        .await?;

        info!(order_id = %payment.order_id, payment_id = %payment.uuid, "Payment created");
        Ok(payment)
    }

    pub async fn handle_webhook(&self, notification: WebhookNotification) -> Result<WebhookOutcome, PaymentError> {
        let order_id = notification.order_id;
        self.store.find_by_order_id(order_id).await?;

        let incoming = PaymentStatusString::from_gateway(&notification.transaction_status)?;

        let update = PaymentUpdate {
            status: incoming.payment_status(),
            transaction_id: notification.transaction_id,
            invoice_link: None,
            paid_at: notification.paid_at,
            va_number: notification.va_number,
            bank: notification.bank,
            acquirer: notification.acquirer,
        };

        let outcome = in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let current = tx.find_by_order_id_for_update(order_id).await?;

                if current.status.is_terminal() {
                    if current.status == update.status {
                        return Ok(WebhookOutcome::Duplicate(current));
                    }
                    return Err(PaymentError::StatusAlreadyFinal {
                        current: current.status.to_string(),
                        incoming: update.status.to_string(),
                    });
                }

                let payment = tx.update_payment(order_id, update).await?;
                tx.append_history(NewPaymentHistory {
                    payment_id: payment.id,
                    status: incoming,
                })
                .await?;
                Ok(WebhookOutcome::Applied(payment))
            })
        })
        .await?;

        match &outcome {
            WebhookOutcome::Applied(payment) => {
                info!(order_id = %order_id, status = %payment.status, "Webhook applied");
            }
            WebhookOutcome::Duplicate(payment) => {
                info!(order_id = %order_id, status = %payment.status, "Duplicate webhook, republishing event only");
            }
        }

        self.publish_status(outcome.payment(), incoming).await?;
        Ok(outcome)
    }

    /// Runs after commit. A failure here is returned to the caller but leaves
    /// the stored payment as it is; the gateway redelivers the webhook.
    async fn publish_status(&self, payment: &Payment, status: PaymentStatusString) -> Result<(), PaymentError> {
        let message = PaymentEventMessage::status_changed(
            payment.order_id,
            payment.uuid,
            status.as_str(),
            payment.paid_at,
            Utc::now(),
        );
        let payload = message
            .to_bytes()
            .map_err(|e| PaymentError::Publish(e.to_string()))?;

        self.publisher
            .publish(&self.topic, &payment.order_id.to_string(), &payload)
            .await?;

        info!(order_id = %payment.order_id, event = %status.event_name(), "Payment event published");
        Ok(())
    }
}
