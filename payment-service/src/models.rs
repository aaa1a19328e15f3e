use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{PaymentError, StoreError};

/// Lifecycle status persisted on the payment row as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Initial,
    Pending,
    Settlement,
    Expire,
}

impl PaymentStatus {
    pub fn code(self) -> i32 {
        match self {
            PaymentStatus::Initial => 0,
            PaymentStatus::Pending => 100,
            PaymentStatus::Settlement => 200,
            PaymentStatus::Expire => 300,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PaymentStatus::Initial),
            100 => Some(PaymentStatus::Pending),
            200 => Some(PaymentStatus::Settlement),
            300 => Some(PaymentStatus::Expire),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.history_status().as_str()
    }

    /// Settlement and expiry end the workflow; nothing moves a payment out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Settlement | PaymentStatus::Expire)
    }

    pub fn history_status(self) -> PaymentStatusString {
        match self {
            PaymentStatus::Initial => PaymentStatusString::Initial,
            PaymentStatus::Pending => PaymentStatusString::Pending,
            PaymentStatus::Settlement => PaymentStatusString::Settlement,
            PaymentStatus::Expire => PaymentStatusString::Expire,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String-coded status shared by the history log and the gateway notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatusString {
    Initial,
    Pending,
    Settlement,
    Expire,
}

impl PaymentStatusString {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatusString::Initial => "initial",
            PaymentStatusString::Pending => "pending",
            PaymentStatusString::Settlement => "settlement",
            PaymentStatusString::Expire => "expire",
        }
    }

    pub fn payment_status(self) -> PaymentStatus {
        match self {
            PaymentStatusString::Initial => PaymentStatus::Initial,
            PaymentStatusString::Pending => PaymentStatus::Pending,
            PaymentStatusString::Settlement => PaymentStatus::Settlement,
            PaymentStatusString::Expire => PaymentStatus::Expire,
        }
    }

    /// Parses a gateway `transaction_status`. `initial` is only ever assigned
    /// on creation, so the gateway cannot report it.
    pub fn from_gateway(s: &str) -> Result<Self, PaymentError> {
        match s.parse()? {
            PaymentStatusString::Initial => Err(PaymentError::UnsupportedStatus(s.to_string())),
            status => Ok(status),
        }
    }

    /// Name of the downstream event, e.g. `SETTLEMENT`.
    pub fn event_name(self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for PaymentStatusString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatusString {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(PaymentStatusString::Initial),
            "pending" => Ok(PaymentStatusString::Pending),
            "settlement" => Ok(PaymentStatusString::Settlement),
            "expire" => Ok(PaymentStatusString::Expire),
            other => Err(PaymentError::UnsupportedStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: i32,
    pub uuid: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub status: PaymentStatus,
    pub payment_link: String,
    pub invoice_link: Option<String>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
    pub transaction_id: Option<String>,
    pub description: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub uuid: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub status: PaymentStatus,
    pub payment_link: String,
    pub description: Option<String>,
    pub expired_at: DateTime<Utc>,
}

/// Fields a webhook may change. `None` leaves the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub invoice_link: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentHistory {
    pub id: i32,
    pub payment_id: i32,
    pub status: PaymentStatusString,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentHistory {
    pub payment_id: i32,
    pub status: PaymentStatusString,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::payments)]
pub struct DbPayment {
    pub id: i32,
    pub uuid: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub status: i32,
    pub payment_link: String,
    pub invoice_link: Option<String>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
    pub transaction_id: Option<String>,
    pub description: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct DbNewPayment {
    pub uuid: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub status: i32,
    pub payment_link: String,
    pub description: Option<String>,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::payments)]
pub struct DbPaymentChangeset {
    pub status: i32,
    pub transaction_id: Option<String>,
    pub invoice_link: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::payment_histories)]
pub struct DbPaymentHistory {
    pub id: i32,
    pub payment_id: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payment_histories)]
pub struct DbNewPaymentHistory {
    pub payment_id: i32,
    pub status: String,
}

impl TryFrom<DbPayment> for Payment {
    type Error = StoreError;

    fn try_from(row: DbPayment) -> Result<Self, Self::Error> {
        let status = PaymentStatus::from_code(row.status).ok_or_else(|| {
            StoreError::Storage(format!("unknown payment status code {}", row.status))
        })?;

        Ok(Self {
            id: row.id,
            uuid: row.uuid,
            order_id: row.order_id,
            amount: row.amount,
            status,
            payment_link: row.payment_link,
            invoice_link: row.invoice_link,
            va_number: row.va_number,
            bank: row.bank,
            acquirer: row.acquirer,
            transaction_id: row.transaction_id,
            description: row.description,
            paid_at: row.paid_at,
            expired_at: row.expired_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<DbPaymentHistory> for PaymentHistory {
    type Error = StoreError;

    fn try_from(row: DbPaymentHistory) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<PaymentStatusString>()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(Self {
            id: row.id,
            payment_id: row.payment_id,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<NewPayment> for DbNewPayment {
    fn from(payment: NewPayment) -> Self {
        Self {
            uuid: payment.uuid,
            order_id: payment.order_id,
            amount: payment.amount,
            status: payment.status.code(),
            payment_link: payment.payment_link,
            description: payment.description,
            expired_at: payment.expired_at,
        }
    }
}

impl DbPaymentChangeset {
    pub fn new(update: PaymentUpdate, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: update.status.code(),
            transaction_id: update.transaction_id,
            invoice_link: update.invoice_link,
            paid_at: update.paid_at,
            va_number: update.va_number,
            bank: update.bank,
            acquirer: update.acquirer,
            updated_at,
        }
    }
}

impl From<NewPaymentHistory> for DbNewPaymentHistory {
    fn from(history: NewPaymentHistory) -> Self {
        Self {
            payment_id: history.payment_id,
            status: history.status.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            PaymentStatus::Initial,
            PaymentStatus::Pending,
            PaymentStatus::Settlement,
            PaymentStatus::Expire,
        ] {
            assert_eq!(PaymentStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(PaymentStatus::from_code(42), None);
    }

    #[test]
    fn only_settlement_and_expire_are_terminal() {
        assert!(!PaymentStatus::Initial.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Settlement.is_terminal());
        assert!(PaymentStatus::Expire.is_terminal());
    }

    #[test]
    fn gateway_strings_map_to_statuses() {
        let status: PaymentStatusString = "settlement".parse().unwrap();
        assert_eq!(status.payment_status(), PaymentStatus::Settlement);
        assert_eq!(status.event_name(), "SETTLEMENT");

        assert_eq!(
            "capture".parse::<PaymentStatusString>(),
            Err(PaymentError::UnsupportedStatus("capture".to_string()))
        );
    }

    #[test]
    fn gateway_cannot_report_initial() {
        assert_eq!(
            PaymentStatusString::from_gateway("initial"),
            Err(PaymentError::UnsupportedStatus("initial".to_string()))
        );
        assert_eq!(
            PaymentStatusString::from_gateway("expire"),
            Ok(PaymentStatusString::Expire)
        );
        assert_eq!(
            "initial".parse::<PaymentStatusString>(),
            Ok(PaymentStatusString::Initial)
        );
    }

    #[test]
    fn unknown_status_code_in_row_is_a_storage_error() {
        let now = Utc::now();
        let row = DbPayment {
            id: 1,
            uuid: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount: BigDecimal::from(1000),
            status: 7,
            payment_link: "https://pay.example/x".to_string(),
            invoice_link: None,
            va_number: None,
            bank: None,
            acquirer: None,
            transaction_id: None,
            description: None,
            paid_at: None,
            expired_at: now,
            created_at: now,
            updated_at: now,
        };

        assert!(matches!(Payment::try_from(row), Err(StoreError::Storage(_))));
    }
}
