use thiserror::Error;
use tracing::error;

/// Failures reported by the Payment Store and History Log. Backend-specific
/// errors are folded into `Storage` so callers can compare by value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => StoreError::NotFound,
            other => StoreError::Storage(other.to_string()),
        }
    }
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for StoreError {
    fn from(err: bb8::RunError<E>) -> Self {
        StoreError::Storage(format!("connection pool: {}", err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),
    #[error("expired at must be in the future")]
    ExpiredAtInvalid,
    #[error("payment not found")]
    PaymentNotFound,
    #[error("unsupported transaction status: {0}")]
    UnsupportedStatus(String),
    #[error("invalid notification signature")]
    InvalidSignature,
    #[error("payment is already {current} and cannot become {incoming}")]
    StatusAlreadyFinal { current: String, incoming: String },
    #[error("payment gateway error: {0}")]
    Gateway(String),
    /// Carries the backend detail for logs; callers only ever see the fixed text.
    #[error("internal database error")]
    Storage(String),
    #[error("failed to publish payment event: {0}")]
    Publish(String),
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => PaymentError::PaymentNotFound,
            StoreError::Storage(message) => {
                error!(detail = %message, "Storage failure");
                PaymentError::Storage(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diesel_not_found_is_not_a_storage_failure() {
        assert_eq!(StoreError::from(diesel::result::Error::NotFound), StoreError::NotFound);
        assert_eq!(
            PaymentError::from(StoreError::NotFound),
            PaymentError::PaymentNotFound
        );
    }

    #[test]
    fn storage_detail_is_not_displayed() {
        let err = PaymentError::from(StoreError::Storage(
            "duplicate key value violates unique constraint \"payments_order_id_key\"".to_string(),
        ));
        assert!(matches!(err, PaymentError::Storage(_)));
        assert_eq!(err.to_string(), "internal database error");
    }
}
