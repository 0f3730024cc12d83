use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::entities::training_sessions::TrainingSessionEntity;

/// Read side of the externally owned sessions table. The single field this
/// engine writes (`counted_in_subscription_id`) is claimed inside the
/// subscription-creation transaction, see `SubscriptionRepository`.
#[automock]
#[async_trait]
pub trait TrainingSessionRepository {
    /// Most recent trial session by `scheduled_start`, any status.
    async fn find_latest_trial(&self, member_id: Uuid) -> Result<Option<TrainingSessionEntity>>;

    /// Completed contractual sessions at or after `since` that no subscription
    /// has counted yet, oldest first.
    async fn list_uncounted_completed_contractual_since(
        &self,
        member_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<TrainingSessionEntity>>;

    async fn list_counted_in(&self, subscription_id: Uuid) -> Result<Vec<TrainingSessionEntity>>;
}
