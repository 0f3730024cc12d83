use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::training_sessions::TrainingSessionEntity,
    repositories::training_sessions::TrainingSessionRepository,
    schema::training_sessions,
    value_objects::enums::{session_statuses::SessionStatus, session_types::SessionType},
};

pub struct TrainingSessionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl TrainingSessionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl TrainingSessionRepository for TrainingSessionPostgres {
    async fn find_latest_trial(&self, member_id: Uuid) -> Result<Option<TrainingSessionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<TrainingSessionEntity>> {
            let mut conn = db_pool.get()?;

            let trial = training_sessions::table
                .filter(training_sessions::member_id.eq(member_id))
                .filter(training_sessions::session_type.eq(SessionType::Trial.to_string()))
                .order(training_sessions::scheduled_start.desc())
                .select(TrainingSessionEntity::as_select())
                .first::<TrainingSessionEntity>(&mut conn)
                .optional()?;

            Ok(trial)
        })
        .await?
    }

    async fn list_uncounted_completed_contractual_since(
        &self,
        member_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<TrainingSessionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<TrainingSessionEntity>> {
            let mut conn = db_pool.get()?;

            let sessions = training_sessions::table
                .filter(training_sessions::member_id.eq(member_id))
                .filter(training_sessions::session_type.eq(SessionType::Contractual.to_string()))
                .filter(training_sessions::status.eq(SessionStatus::Completed.to_string()))
                .filter(training_sessions::scheduled_start.ge(since))
                .filter(training_sessions::counted_in_subscription_id.is_null())
                .order(training_sessions::scheduled_start.asc())
                .select(TrainingSessionEntity::as_select())
                .load::<TrainingSessionEntity>(&mut conn)?;

            Ok(sessions)
        })
        .await?
    }

    async fn list_counted_in(&self, subscription_id: Uuid) -> Result<Vec<TrainingSessionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<TrainingSessionEntity>> {
            let mut conn = db_pool.get()?;

            let sessions = training_sessions::table
                .filter(training_sessions::counted_in_subscription_id.eq(subscription_id))
                .order(training_sessions::scheduled_start.asc())
                .select(TrainingSessionEntity::as_select())
                .load::<TrainingSessionEntity>(&mut conn)?;

            Ok(sessions)
        })
        .await?
    }
}
