use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::pg::Pg;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use tracing::debug;
use uuid::Uuid;

use super::{PaymentListParams, PaymentStore, Sort, SortColumn, SortOrder, StoreTransaction};
use crate::error::StoreError;
use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;
type OwnedConnection =
    bb8::PooledConnection<'static, AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

macro_rules! order_by {
    ($query:expr, $column:expr, $order:expr) => {
        match $order {
            SortOrder::Asc => $query.order($column.asc()),
            SortOrder::Desc => $query.order($column.desc()),
        }
    };
}

fn sorted(
    query: payments::BoxedQuery<'static, Pg>,
    sort: Sort,
) -> payments::BoxedQuery<'static, Pg> {
    match sort.column {
        SortColumn::Id => order_by!(query, payments::id, sort.order),
        SortColumn::Uuid => order_by!(query, payments::uuid, sort.order),
        SortColumn::OrderId => order_by!(query, payments::order_id, sort.order),
        SortColumn::Amount => order_by!(query, payments::amount, sort.order),
        SortColumn::Status => order_by!(query, payments::status, sort.order),
        SortColumn::ExpiredAt => order_by!(query, payments::expired_at, sort.order),
        SortColumn::PaidAt => order_by!(query, payments::paid_at, sort.order),
        SortColumn::CreatedAt => order_by!(query, payments::created_at, sort.order),
        SortColumn::UpdatedAt => order_by!(query, payments::updated_at, sort.order),
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_all_with_pagination(
        &self,
        params: &PaymentListParams,
    ) -> Result<(Vec<Payment>, i64), StoreError> {
        let mut conn = self.pool.get().await?;

        let rows = sorted(payments::table.into_boxed(), params.sort)
            .limit(params.limit)
            .offset(params.offset())
            .load::<DbPayment>(&mut conn)
            .await?;

        let total = payments::table
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let payments = rows
            .into_iter()
            .map(Payment::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((payments, total))
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Payment, StoreError> {
        let mut conn = self.pool.get().await?;
        let row = payments::table
            .filter(payments::uuid.eq(uuid))
            .first::<DbPayment>(&mut conn)
            .await?;
        Payment::try_from(row)
    }

    async fn find_by_order_id(&self, order_id: Uuid) -> Result<Payment, StoreError> {
        let mut conn = self.pool.get().await?;
        let row = payments::table
            .filter(payments::order_id.eq(order_id))
            .first::<DbPayment>(&mut conn)
            .await?;
        Payment::try_from(row)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let mut conn = self.pool.get_owned().await?;
        AnsiTransactionManager::begin_transaction(&mut *conn).await?;
        Ok(Box::new(PgTransaction { conn }))
    }
}

/// Transaction pinned to one pooled connection. If it is dropped while still
/// open, the pool sees a broken transaction manager and closes the connection,
/// which makes Postgres roll the work back.
pub struct PgTransaction {
    conn: OwnedConnection,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn find_by_order_id_for_update(&mut self, order_id: Uuid) -> Result<Payment, StoreError> {
        let row = payments::table
            .filter(payments::order_id.eq(order_id))
            .for_update()
            .first::<DbPayment>(&mut *self.conn)
            .await?;
        Payment::try_from(row)
    }

    async fn create_payment(&mut self, payment: NewPayment) -> Result<Payment, StoreError> {
        let row = diesel::insert_into(payments::table)
            .values(DbNewPayment::from(payment))
            .get_result::<DbPayment>(&mut *self.conn)
            .await?;
        debug!(payment_id = row.id, "Inserted payment row");
        Payment::try_from(row)
    }

    async fn update_payment(
        &mut self,
        order_id: Uuid,
        update: PaymentUpdate,
    ) -> Result<Payment, StoreError> {
        let changeset = DbPaymentChangeset::new(update, Utc::now());
        let row = diesel::update(payments::table.filter(payments::order_id.eq(order_id)))
            .set(changeset)
            .get_result::<DbPayment>(&mut *self.conn)
            .await?;
        Payment::try_from(row)
    }

    async fn append_history(
        &mut self,
        history: NewPaymentHistory,
    ) -> Result<PaymentHistory, StoreError> {
        let row = diesel::insert_into(payment_histories::table)
            .values(DbNewPaymentHistory::from(history))
            .get_result::<DbPaymentHistory>(&mut *self.conn)
            .await?;
        PaymentHistory::try_from(row)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        AnsiTransactionManager::commit_transaction(&mut *self.conn).await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        AnsiTransactionManager::rollback_transaction(&mut *self.conn).await?;
        Ok(())
    }
}
