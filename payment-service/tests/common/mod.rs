#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use bigdecimal::BigDecimal;
use chrono::{Duration, FixedOffset, Utc};
use payment_service::api::{create_router, AppState};
use payment_service::error::PaymentError;
use payment_service::gateway::{CreateLinkRequest, NotificationVerifier, PaymentGateway, PaymentLink};
use payment_service::publisher::EventPublisher;
use payment_service::store::InMemoryPaymentStore;
use payment_service::workflow::{CreatePayment, PaymentWorkflow, WebhookNotification};
use shared::PaymentEventMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_TOPIC: &str = "payment-events-test";
pub const SCENARIO_ORDER_ID: &str = "6fa459ea-ee8a-3ca4-894e-db77e160355e";

pub struct FakeGateway {
    fail: AtomicBool,
    calls: Mutex<Vec<CreateLinkRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CreateLinkRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn link_for(order_id: Uuid) -> String {
        format!("https://app.sandbox.midtrans.com/snap/v2/vtweb/{}", order_id)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<PaymentLink, PaymentError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Gateway("401: Access denied".to_string()));
        }
        Ok(PaymentLink {
            token: Some(format!("token-{}", request.order_id)),
            redirect_url: Self::link_for(request.order_id),
        })
    }
}

pub struct RecordingPublisher {
    fail: AtomicBool,
    messages: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn topics(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _, _)| topic.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<PaymentEventMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PaymentError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Publish("broker unavailable".to_string()));
        }
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), key.to_string(), payload.to_vec()));
        Ok(())
    }
}

pub struct TestContext {
    pub store: InMemoryPaymentStore,
    pub gateway: Arc<FakeGateway>,
    pub publisher: Arc<RecordingPublisher>,
    pub workflow: Arc<PaymentWorkflow>,
}

impl TestContext {
    pub fn new() -> Self {
        let store = InMemoryPaymentStore::new();
        let gateway = Arc::new(FakeGateway::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let workflow = Arc::new(PaymentWorkflow::new(
            Arc::new(store.clone()),
            gateway.clone(),
            publisher.clone(),
            TEST_TOPIC.to_string(),
        ));

        Self {
            store,
            gateway,
            publisher,
            workflow,
        }
    }

    pub fn router(&self) -> Router {
        self.router_with_verifier(NotificationVerifier::new(None, jakarta()))
    }

    pub fn router_with_verifier(&self, notifications: NotificationVerifier) -> Router {
        create_router(AppState {
            workflow: self.workflow.clone(),
            notifications,
        })
    }
}

pub fn jakarta() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).unwrap()
}

pub fn create_request(order_id: Uuid) -> CreatePayment {
    CreatePayment {
        order_id,
        amount: BigDecimal::from(50000),
        description: Some("Booking lapangan".to_string()),
        expired_at: Utc::now() + Duration::days(1),
    }
}

pub fn webhook(order_id: Uuid, status: &str) -> WebhookNotification {
    WebhookNotification {
        order_id,
        transaction_status: status.to_string(),
        transaction_id: Some(format!("txn-{}", order_id)),
        paid_at: (status == "settlement").then(Utc::now),
        va_number: Some("8277012345678".to_string()),
        bank: Some("bca".to_string()),
        acquirer: None,
    }
}
