use anyhow::Result;
use async_trait::async_trait;
use diesel::{
    PgConnection, QueryResult, RunQueryDsl, insert_into, prelude::*, result::Error as DieselError,
    update,
};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use super::payments::reconcile_paid_amount;
use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::subscriptions::{
        NewSubscriptionBundle, SubscriptionChangeset, SubscriptionEntity, SupersedeSubscription,
        UpgradedSubscriptions,
    },
    repositories::subscriptions::SubscriptionRepository,
    schema::{member_subscriptions, payments, training_sessions},
    value_objects::enums::session_statuses::SessionStatus,
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

fn guarded_update(
    conn: &mut PgConnection,
    subscription_id: Uuid,
    expected_version: i32,
    changes: &SubscriptionChangeset,
) -> QueryResult<Option<SubscriptionEntity>> {
    update(
        member_subscriptions::table
            .filter(member_subscriptions::id.eq(subscription_id))
            .filter(member_subscriptions::version.eq(expected_version)),
    )
    .set((
        changes,
        member_subscriptions::version.eq(member_subscriptions::version + 1),
    ))
    .returning(SubscriptionEntity::as_select())
    .get_result::<SubscriptionEntity>(conn)
    .optional()
}

/// Writes a new subscription with its claimed sessions and purchase payments.
/// A claim that no longer covers every selected session rolls the whole
/// transaction back.
fn insert_bundle(tx: &mut PgConnection, bundle: &NewSubscriptionBundle) -> QueryResult<SubscriptionEntity> {
    let subscription = &bundle.subscription;

    insert_into(member_subscriptions::table)
        .values(subscription)
        .execute(tx)?;

    if !bundle.counted_session_ids.is_empty() {
        let claimed = update(
            training_sessions::table
                .filter(training_sessions::id.eq_any(bundle.counted_session_ids.clone()))
                .filter(training_sessions::member_id.eq(subscription.member_id))
                .filter(training_sessions::status.eq(SessionStatus::Completed.to_string()))
                .filter(training_sessions::counted_in_subscription_id.is_null()),
        )
        .set(training_sessions::counted_in_subscription_id.eq(Some(subscription.id)))
        .execute(tx)?;

        if claimed != bundle.counted_session_ids.len() {
            return Err(DieselError::RollbackTransaction);
        }
    }

    if !bundle.payments.is_empty() {
        insert_into(payments::table)
            .values(&bundle.payments)
            .execute(tx)?;
    }

    reconcile_paid_amount(tx, subscription.id)
}

/// `RollbackTransaction` marks a guard that did not hold; nothing was written.
fn guard_outcome<T>(result: QueryResult<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DieselError::RollbackTransaction) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let subscription = member_subscriptions::table
                .find(subscription_id)
                .select(SubscriptionEntity::as_select())
                .first::<SubscriptionEntity>(&mut conn)
                .optional()?;

            Ok(subscription)
        })
        .await?
    }

    async fn list_by_member(&self, member_id: Uuid) -> Result<Vec<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let subscriptions = member_subscriptions::table
                .filter(member_subscriptions::member_id.eq(member_id))
                .order(member_subscriptions::created_at.desc())
                .select(SubscriptionEntity::as_select())
                .load::<SubscriptionEntity>(&mut conn)?;

            Ok(subscriptions)
        })
        .await?
    }

    async fn list_predecessors(&self, successor_id: Uuid) -> Result<Vec<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let predecessors = member_subscriptions::table
                .filter(member_subscriptions::upgraded_to_id.eq(successor_id))
                .select(SubscriptionEntity::as_select())
                .load::<SubscriptionEntity>(&mut conn)?;

            Ok(predecessors)
        })
        .await?
    }

    async fn update_guarded(
        &self,
        subscription_id: Uuid,
        expected_version: i32,
        changes: SubscriptionChangeset,
    ) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;
            Ok(guarded_update(&mut conn, subscription_id, expected_version, &changes)?)
        })
        .await?
    }

    async fn create_subscription(
        &self,
        bundle: NewSubscriptionBundle,
    ) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            guard_outcome(conn.transaction::<SubscriptionEntity, DieselError, _>(|tx| {
                insert_bundle(tx, &bundle)
            }))
        })
        .await?
    }

    async fn create_upgrade(
        &self,
        bundle: NewSubscriptionBundle,
        supersede: SupersedeSubscription,
    ) -> Result<Option<UpgradedSubscriptions>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<UpgradedSubscriptions>> {
            let mut conn = db_pool.get()?;

            guard_outcome(conn.transaction::<UpgradedSubscriptions, DieselError, _>(|tx| {
                let successor = insert_bundle(tx, &bundle)?;
                let predecessor = guarded_update(
                    tx,
                    supersede.predecessor_id,
                    supersede.expected_version,
                    &supersede.changes,
                )?
                .ok_or(DieselError::RollbackTransaction)?;

                Ok(UpgradedSubscriptions {
                    predecessor,
                    successor,
                })
            }))
        })
        .await?
    }
}
