use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::{error, info};

use crate::error::PaymentError;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PaymentError>;
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer) -> Self {
        Self {
            producer,
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PaymentError> {
        let record = FutureRecord::to(topic).payload(payload).key(key);

        match self.producer.send(record, self.timeout).await {
            Ok((partition, offset)) => {
                info!(
                    "message is stored in topic({})/partition({})/offset({})",
                    topic, partition, offset
                );
                Ok(())
            }
            Err((e, _)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(PaymentError::Publish(e.to_string()))
            }
        }
    }
}
