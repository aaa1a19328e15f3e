use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PAYMENT_SERVICE_SENDER: &str = "payment-service";
pub const JSON_BODY_TYPE: &str = "JSON";

/// Status-change event emitted by the payment service after a webhook has been
/// committed. Downstream consumers deserialize this from the payment topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEventMessage {
    pub event: EventName,
    pub metadata: EventMetadata,
    pub body: EventBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub sender: String,
    pub sending_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    #[serde(rename = "type")]
    pub body_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEventData {
    #[serde(rename = "orderID")]
    pub order_id: Uuid,
    #[serde(rename = "paymentID")]
    pub payment_id: Uuid,
    pub status: String,
    #[serde(rename = "paidAt")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentEventMessage {
    /// Builds the envelope for a status string such as `settlement`. The event
    /// name is the uppercased status.
    pub fn status_changed(
        order_id: Uuid,
        payment_id: Uuid,
        status: &str,
        paid_at: Option<DateTime<Utc>>,
        sending_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event: EventName {
                name: status.to_uppercase(),
            },
            metadata: EventMetadata {
                sender: PAYMENT_SERVICE_SENDER.to_string(),
                sending_at: sending_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            body: EventBody {
                body_type: JSON_BODY_TYPE.to_string(),
                data: PaymentEventData {
                    order_id,
                    payment_id,
                    status: status.to_string(),
                    paid_at,
                },
            },
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn envelope_uses_downstream_field_names() {
        let order_id = Uuid::new_v4();
        let payment_id = Uuid::new_v4();
        let sent = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();

        let message =
            PaymentEventMessage::status_changed(order_id, payment_id, "settlement", Some(sent), sent);
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["event"]["name"], "SETTLEMENT");
        assert_eq!(json["metadata"]["sender"], "payment-service");
        assert_eq!(json["metadata"]["sendingAt"], "2024-05-01T10:30:00Z");
        assert_eq!(json["body"]["type"], "JSON");
        assert_eq!(json["body"]["data"]["orderID"], order_id.to_string());
        assert_eq!(json["body"]["data"]["paymentID"], payment_id.to_string());
        assert_eq!(json["body"]["data"]["status"], "settlement");
        assert!(json["body"]["data"]["paidAt"].is_string());
    }

    #[test]
    fn missing_paid_at_serializes_as_null() {
        let message = PaymentEventMessage::status_changed(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "expire",
            None,
            Utc::now(),
        );
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["event"]["name"], "EXPIRE");
        assert!(json["body"]["data"]["paidAt"].is_null());
    }
}
