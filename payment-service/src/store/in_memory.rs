use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{PaymentListParams, PaymentStore, Sort, SortColumn, SortOrder, StoreTransaction};
use crate::error::StoreError;
use crate::models::{NewPayment, NewPaymentHistory, Payment, PaymentHistory, PaymentUpdate};

/// Write operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    CreatePayment,
    UpdatePayment,
    AppendHistory,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct State {
    payments: Vec<Payment>,
    histories: Vec<PaymentHistory>,
    next_payment_id: i32,
    next_history_id: i32,
}

/// Process-local store with the same contract as the Postgres one. A
/// transaction holds the store lock from `begin` until it ends and stages its
/// writes in a private copy that only replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    state: Arc<AsyncMutex<State>>,
    failures: Arc<Mutex<HashSet<WriteOp>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: WriteOp) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).insert(op);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    pub async fn histories(&self) -> Vec<PaymentHistory> {
        self.state.lock().await.histories.clone()
    }

    pub async fn history_for(&self, payment_id: i32) -> Vec<PaymentHistory> {
        self.state
            .lock()
            .await
            .histories
            .iter()
            .filter(|h| h.payment_id == payment_id)
            .cloned()
            .collect()
    }
}

fn compare(a: &Payment, b: &Payment, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::Uuid => a.uuid.cmp(&b.uuid),
        SortColumn::OrderId => a.order_id.cmp(&b.order_id),
        SortColumn::Amount => a.amount.cmp(&b.amount),
        SortColumn::Status => a.status.code().cmp(&b.status.code()),
        SortColumn::ExpiredAt => a.expired_at.cmp(&b.expired_at),
        SortColumn::PaidAt => a.paid_at.cmp(&b.paid_at),
        SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
        SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}

fn sort_payments(payments: &mut [Payment], sort: Sort) {
    payments.sort_by(|a, b| {
        // insertion order breaks ties so pages stay stable
        let ordering = compare(a, b, sort.column).then(a.id.cmp(&b.id));
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_all_with_pagination(
        &self,
        params: &PaymentListParams,
    ) -> Result<(Vec<Payment>, i64), StoreError> {
        let state = self.state.lock().await;
        let mut payments = state.payments.clone();
        sort_payments(&mut payments, params.sort);

        let total = payments.len() as i64;
        let page = payments
            .into_iter()
            .skip(params.offset().max(0) as usize)
            .take(params.limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Payment, StoreError> {
        let state = self.state.lock().await;
        state
            .payments
            .iter()
            .find(|p| p.uuid == uuid)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_order_id(&self, order_id: Uuid) -> Result<Payment, StoreError> {
        let state = self.state.lock().await;
        state
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            staged,
            failures: self.failures.clone(),
        }))
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    staged: State,
    failures: Arc<Mutex<HashSet<WriteOp>>>,
}

impl InMemoryTransaction {
    fn check(&self, op: WriteOp) -> Result<(), StoreError> {
        let failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        if failures.contains(&op) {
            return Err(StoreError::Storage(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find_by_order_id_for_update(&mut self, order_id: Uuid) -> Result<Payment, StoreError> {
        self.staged
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_payment(&mut self, payment: NewPayment) -> Result<Payment, StoreError> {
        self.check(WriteOp::CreatePayment)?;

        if self
            .staged
            .payments
            .iter()
            .any(|p| p.order_id == payment.order_id || p.uuid == payment.uuid)
        {
            return Err(StoreError::Storage(format!(
                "duplicate key for order {}",
                payment.order_id
            )));
        }

        self.staged.next_payment_id += 1;
        let now = Utc::now();
        let created = Payment {
            id: self.staged.next_payment_id,
            uuid: payment.uuid,
            order_id: payment.order_id,
            amount: payment.amount,
            status: payment.status,
            payment_link: payment.payment_link,
            invoice_link: None,
            va_number: None,
            bank: None,
            acquirer: None,
            transaction_id: None,
            description: payment.description,
            paid_at: None,
            expired_at: payment.expired_at,
            created_at: now,
            updated_at: now,
        };
        self.staged.payments.push(created.clone());
        Ok(created)
    }

    async fn update_payment(
        &mut self,
        order_id: Uuid,
        update: PaymentUpdate,
    ) -> Result<Payment, StoreError> {
        self.check(WriteOp::UpdatePayment)?;

        let payment = self
            .staged
            .payments
            .iter_mut()
            .find(|p| p.order_id == order_id)
            .ok_or(StoreError::NotFound)?;

        payment.status = update.status;
        if update.transaction_id.is_some() {
            payment.transaction_id = update.transaction_id;
        }
        if update.invoice_link.is_some() {
            payment.invoice_link = update.invoice_link;
        }
        if update.paid_at.is_some() {
            payment.paid_at = update.paid_at;
        }
        if update.va_number.is_some() {
            payment.va_number = update.va_number;
        }
        if update.bank.is_some() {
            payment.bank = update.bank;
        }
        if update.acquirer.is_some() {
            payment.acquirer = update.acquirer;
        }
        payment.updated_at = Utc::now();

        Ok(payment.clone())
    }

    async fn append_history(
        &mut self,
        history: NewPaymentHistory,
    ) -> Result<PaymentHistory, StoreError> {
        self.check(WriteOp::AppendHistory)?;

        if !self.staged.payments.iter().any(|p| p.id == history.payment_id) {
            return Err(StoreError::Storage(format!(
                "payment {} does not exist",
                history.payment_id
            )));
        }

        self.staged.next_history_id += 1;
        let now = Utc::now();
        let row = PaymentHistory {
            id: self.staged.next_history_id,
            payment_id: history.payment_id,
            status: history.status,
            created_at: now,
            updated_at: now,
        };
        self.staged.histories.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.check(WriteOp::Commit)?;
        let InMemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentStatus, PaymentStatusString};
    use bigdecimal::BigDecimal;
    use chrono::Duration;

    fn new_payment(amount: i64) -> NewPayment {
        NewPayment {
            uuid: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount: BigDecimal::from(amount),
            status: PaymentStatus::Initial,
            payment_link: "https://pay.example/link".to_string(),
            description: None,
            expired_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn committed_payment_is_readable() {
        let store = InMemoryPaymentStore::new();
        let mut tx = store.begin().await.unwrap();
        let payment = tx.create_payment(new_payment(1000)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.find_by_uuid(payment.uuid).await.unwrap().id, payment.id);
    }

    #[tokio::test]
    async fn rollback_discards_staged_rows() {
        let store = InMemoryPaymentStore::new();
        let mut tx = store.begin().await.unwrap();
        let payment = tx.create_payment(new_payment(1000)).await.unwrap();
        tx.append_history(NewPaymentHistory {
            payment_id: payment.id,
            status: PaymentStatusString::Initial,
        })
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert!(store.payments().await.is_empty());
        assert!(store.histories().await.is_empty());
    }

    #[tokio::test]
    async fn dropped_transaction_behaves_like_rollback() {
        let store = InMemoryPaymentStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.create_payment(new_payment(1000)).await.unwrap();
        }
        assert!(store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_storage_error() {
        let store = InMemoryPaymentStore::new();
        store.fail_on(WriteOp::CreatePayment);

        let mut tx = store.begin().await.unwrap();
        let err = tx.create_payment(new_payment(1000)).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[tokio::test]
    async fn pagination_respects_sort_and_offset() {
        let store = InMemoryPaymentStore::new();
        let mut tx = store.begin().await.unwrap();
        for amount in [300, 100, 200] {
            tx.create_payment(new_payment(amount)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let params = PaymentListParams::new(1, 2).with_sort(SortColumn::Amount, SortOrder::Asc);
        let (page, total) = store.find_all_with_pagination(&params).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            page.iter().map(|p| p.amount.clone()).collect::<Vec<_>>(),
            vec![BigDecimal::from(100), BigDecimal::from(200)]
        );

        let params = PaymentListParams::new(2, 2).with_sort(SortColumn::Amount, SortOrder::Asc);
        let (page, _) = store.find_all_with_pagination(&params).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].amount, BigDecimal::from(300));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let store = InMemoryPaymentStore::new();
        assert_eq!(
            store.find_by_order_id(Uuid::new_v4()).await.unwrap_err(),
            StoreError::NotFound
        );
    }
}
