use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{PgConnection, QueryResult, RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::{
        payments::{InsertPaymentEntity, PaymentEntity, RecordedPayment},
        subscriptions::SubscriptionEntity,
    },
    repositories::payments::PaymentRepository,
    schema::{member_subscriptions, payments},
    value_objects::{enums::payment_statuses::PaymentStatus, money::checked_sum},
};

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Locks the subscription row for the rest of the transaction.
pub(crate) fn lock_subscription(
    tx: &mut PgConnection,
    subscription_id: Uuid,
) -> QueryResult<Option<SubscriptionEntity>> {
    member_subscriptions::table
        .find(subscription_id)
        .select(SubscriptionEntity::as_select())
        .for_update()
        .first::<SubscriptionEntity>(tx)
        .optional()
}

/// Sets `paid_amount_minor` to the sum of completed payments and bumps `version`.
pub(crate) fn reconcile_paid_amount(
    tx: &mut PgConnection,
    subscription_id: Uuid,
) -> QueryResult<SubscriptionEntity> {
    let amounts = payments::table
        .filter(payments::subscription_id.eq(subscription_id))
        .filter(payments::payment_status.eq(PaymentStatus::Completed.to_string()))
        .select(payments::amount_minor)
        .load::<i64>(tx)?;
    let paid_amount_minor = checked_sum(amounts).ok_or_else(|| {
        diesel::result::Error::QueryBuilderError(
            format!("paid amount of subscription {subscription_id} overflows").into(),
        )
    })?;

    update(member_subscriptions::table.find(subscription_id))
        .set((
            member_subscriptions::paid_amount_minor.eq(paid_amount_minor),
            member_subscriptions::version.eq(member_subscriptions::version + 1),
            member_subscriptions::updated_at.eq(Utc::now()),
        ))
        .returning(SubscriptionEntity::as_select())
        .get_result::<SubscriptionEntity>(tx)
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn record_and_reconcile(
        &self,
        payment: InsertPaymentEntity,
    ) -> Result<Option<RecordedPayment>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<RecordedPayment>> {
            let mut conn = db_pool.get()?;

            let recorded = conn.transaction::<Option<RecordedPayment>, diesel::result::Error, _>(|tx| {
                if lock_subscription(tx, payment.subscription_id)?.is_none() {
                    return Ok(None);
                }

                // A retried payment id keeps the row written by the first attempt.
                insert_into(payments::table)
                    .values(&payment)
                    .on_conflict(payments::id)
                    .do_nothing()
                    .execute(tx)?;

                let stored = payments::table
                    .find(payment.id)
                    .select(PaymentEntity::as_select())
                    .first::<PaymentEntity>(tx)?;
                let subscription = reconcile_paid_amount(tx, payment.subscription_id)?;

                Ok(Some(RecordedPayment {
                    payment: stored,
                    subscription,
                }))
            })?;

            Ok(recorded)
        })
        .await?
    }

    async fn reconcile(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let reconciled = conn.transaction::<Option<SubscriptionEntity>, diesel::result::Error, _>(|tx| {
                if lock_subscription(tx, subscription_id)?.is_none() {
                    return Ok(None);
                }
                reconcile_paid_amount(tx, subscription_id).map(Some)
            })?;

            Ok(reconciled)
        })
        .await?
    }

    async fn list_by_subscription(&self, subscription_id: Uuid) -> Result<Vec<PaymentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<PaymentEntity>> {
            let mut conn = db_pool.get()?;

            let payments = payments::table
                .filter(payments::subscription_id.eq(subscription_id))
                .order((payments::payment_date.asc(), payments::created_at.asc()))
                .select(PaymentEntity::as_select())
                .load::<PaymentEntity>(&mut conn)?;

            Ok(payments)
        })
        .await?
    }
}
