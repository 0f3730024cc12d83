use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::subscriptions::{
    NewSubscriptionBundle, SubscriptionChangeset, SubscriptionEntity, SupersedeSubscription,
    UpgradedSubscriptions,
};

/// Writes return `Ok(None)` when a guard rejects them (stale `version`, or a
/// retroactive session claimed by someone else). Nothing is written in that case.
#[automock]
#[async_trait]
pub trait SubscriptionRepository {
    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn list_by_member(&self, member_id: Uuid) -> Result<Vec<SubscriptionEntity>>;

    /// Subscriptions whose `upgraded_to_id` points at `successor_id`.
    async fn list_predecessors(&self, successor_id: Uuid) -> Result<Vec<SubscriptionEntity>>;

    /// Applies `changes` only if the row is still at `expected_version`.
    async fn update_guarded(
        &self,
        subscription_id: Uuid,
        expected_version: i32,
        changes: SubscriptionChangeset,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Inserts the subscription, claims its retroactive sessions, records the
    /// initial payment and reconciles `paid_amount_minor`, atomically.
    async fn create_subscription(
        &self,
        bundle: NewSubscriptionBundle,
    ) -> Result<Option<SubscriptionEntity>>;

    /// [`Self::create_subscription`] for the successor plus the guarded
    /// cancellation of the predecessor, atomically.
    async fn create_upgrade(
        &self,
        bundle: NewSubscriptionBundle,
        supersede: SupersedeSubscription,
    ) -> Result<Option<UpgradedSubscriptions>>;
}
