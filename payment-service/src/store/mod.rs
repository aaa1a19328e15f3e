//! Payment Store and Payment History Log.
//!
//! Reads go straight through [`PaymentStore`]; every write happens on a
//! [`StoreTransaction`] handed out by [`PaymentStore::begin`], so the workflow
//! decides when a unit of work commits.

mod in_memory;
mod postgres;

pub use in_memory::{InMemoryPaymentStore, WriteOp};
pub use postgres::PgPaymentStore;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewPayment, NewPaymentHistory, Payment, PaymentHistory, PaymentUpdate};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Returns one page of payments and the total row count.
    async fn find_all_with_pagination(
        &self,
        params: &PaymentListParams,
    ) -> Result<(Vec<Payment>, i64), StoreError>;

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Payment, StoreError>;

    async fn find_by_order_id(&self, order_id: Uuid) -> Result<Payment, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// An open unit of work. Dropping it without calling [`commit`](Self::commit)
/// discards every write made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads the payment and holds a row lock until the transaction ends.
    async fn find_by_order_id_for_update(&mut self, order_id: Uuid) -> Result<Payment, StoreError>;

    async fn create_payment(&mut self, payment: NewPayment) -> Result<Payment, StoreError>;

    async fn update_payment(
        &mut self,
        order_id: Uuid,
        update: PaymentUpdate,
    ) -> Result<Payment, StoreError>;

    /// Appends one transition row to the history log.
    async fn append_history(
        &mut self,
        history: NewPaymentHistory,
    ) -> Result<PaymentHistory, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Id,
    Uuid,
    OrderId,
    Amount,
    Status,
    ExpiredAt,
    PaidAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: SortColumn,
    pub order: SortOrder,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            column: SortColumn::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentListParams {
    pub page: i64,
    pub limit: i64,
    pub sort: Sort,
}

impl PaymentListParams {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page,
            limit,
            sort: Sort::default(),
        }
    }

    pub fn with_sort(mut self, column: SortColumn, order: SortOrder) -> Self {
        self.sort = Sort { column, order };
        self
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(PaymentListParams::new(1, 10).offset(), 0);
        assert_eq!(PaymentListParams::new(2, 10).offset(), 10);
        assert_eq!(PaymentListParams::new(5, 25).offset(), 100);
    }

    #[test]
    fn page_zero_is_treated_as_first_page() {
        assert_eq!(PaymentListParams::new(0, 10).offset(), 0);
    }

    #[test]
    fn default_sort_is_newest_first() {
        let params = PaymentListParams::new(1, 10);
        assert_eq!(params.sort.column, SortColumn::CreatedAt);
        assert_eq!(params.sort.order, SortOrder::Desc);
    }
}
