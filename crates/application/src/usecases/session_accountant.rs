use std::sync::Arc;

use domain::{
    entities::subscriptions::SubscriptionChangeset,
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        subscription_lifecycle::{self, QuotaChange},
        subscriptions::SubscriptionModel,
    },
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{ConflictPolicy, load_subscription};
use crate::{
    errors::{AccountingError, AccountingResult},
    interfaces::clock::Clock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionOperation {
    Consume,
    Restore,
}

impl SessionOperation {
    fn name(&self) -> &'static str {
        match self {
            SessionOperation::Consume => "consume",
            SessionOperation::Restore => "restore",
        }
    }
}

/// Meters session usage against a subscription's quota.
///
/// Each call is a version-guarded read-modify-write: two racing calls on the
/// same subscription can never both apply against the same counter value.
pub struct SessionAccountantUseCase<S, C>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Clock + 'static,
{
    subscription_repo: Arc<S>,
    clock: Arc<C>,
    policy: ConflictPolicy,
}

impl<S, C> SessionAccountantUseCase<S, C>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Clock + 'static,
{
    pub fn new(subscription_repo: Arc<S>, clock: Arc<C>, policy: ConflictPolicy) -> Self {
        Self {
            subscription_repo,
            clock,
            policy,
        }
    }

    pub async fn consume_session(&self, subscription_id: Uuid) -> AccountingResult<SubscriptionModel> {
        self.apply(subscription_id, SessionOperation::Consume).await
    }

    /// Gives back one session, e.g. when a counted session is cancelled.
    pub async fn restore_session(&self, subscription_id: Uuid) -> AccountingResult<SubscriptionModel> {
        self.apply(subscription_id, SessionOperation::Restore).await
    }

    async fn apply(
        &self,
        subscription_id: Uuid,
        operation: SessionOperation,
    ) -> AccountingResult<SubscriptionModel> {
        for attempt in 1..=self.policy.max_attempts {
            let subscription = load_subscription(self.subscription_repo.as_ref(), subscription_id).await?;
            let status = subscription.lifecycle_status()?;

            let change = match operation {
                SessionOperation::Consume => {
                    subscription_lifecycle::consume_session(status, subscription.quota())
                }
                SessionOperation::Restore => {
                    subscription_lifecycle::restore_session(status, subscription.quota())
                }
            }
            .map_err(|violation| {
                warn!(
                    %subscription_id,
                    operation = operation.name(),
                    status = %status,
                    used_sessions = subscription.used_sessions,
                    total_sessions = subscription.total_sessions,
                    reason = %violation,
                    "session_accountant: operation rejected"
                );
                AccountingError::from(violation)
            })?;

            let updated = self
                .subscription_repo
                .update_guarded(
                    subscription_id,
                    subscription.version,
                    self.changeset(change),
                )
                .await
                .map_err(|err| {
                    error!(
                        %subscription_id,
                        operation = operation.name(),
                        db_error = ?err,
                        "session_accountant: failed to write session usage"
                    );
                    AccountingError::PersistenceFailure(err)
                })?;

            match updated {
                Some(updated) => {
                    info!(
                        %subscription_id,
                        operation = operation.name(),
                        used_sessions = updated.used_sessions,
                        total_sessions = updated.total_sessions,
                        status = %change.status,
                        "session_accountant: session usage updated"
                    );
                    if change.status != status {
                        info!(
                            %subscription_id,
                            from = %status,
                            to = %change.status,
                            "session_accountant: subscription status changed by quota"
                        );
                    }
                    return Ok(SubscriptionModel::new(updated, change.status));
                }
                None => {
                    warn!(
                        %subscription_id,
                        operation = operation.name(),
                        attempt,
                        expected_version = subscription.version,
                        "session_accountant: version conflict, retrying"
                    );
                }
            }
        }

        warn!(
            %subscription_id,
            operation = operation.name(),
            max_attempts = self.policy.max_attempts,
            "session_accountant: giving up after repeated version conflicts"
        );
        Err(AccountingError::ConcurrencyConflict(subscription_id))
    }

    fn changeset(&self, change: QuotaChange) -> SubscriptionChangeset {
        SubscriptionChangeset {
            used_sessions: Some(change.used_sessions),
            status: Some(change.status.to_string()),
            updated_at: Some(self.clock.now()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interfaces::clock::MockClock,
        usecases::test_support::{fixed_clock, sample_subscription},
    };
    use domain::{
        entities::subscriptions::SubscriptionEntity,
        repositories::subscriptions::MockSubscriptionRepository,
        value_objects::enums::subscription_statuses::SubscriptionStatus,
    };
    use mockall::predicate::{always, eq};

    fn accountant(
        subscription_repo: MockSubscriptionRepository,
    ) -> SessionAccountantUseCase<MockSubscriptionRepository, MockClock> {
        SessionAccountantUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(fixed_clock()),
            ConflictPolicy::new(3),
        )
    }

    fn applied(mut subscription: SubscriptionEntity, changes: SubscriptionChangeset) -> SubscriptionEntity {
        changes.apply_to(&mut subscription);
        subscription
    }

    #[tokio::test]
    async fn consuming_the_last_session_expires_the_subscription() {
        let mut subscription = sample_subscription();
        subscription.used_sessions = 9;
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .with(eq(subscription_id))
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo
            .expect_update_guarded()
            .with(eq(subscription_id), eq(1), always())
            .times(1)
            .returning(move |_, _, changes| Ok(Some(applied(subscription.clone(), changes))));

        let updated = accountant(subscription_repo)
            .consume_session(subscription_id)
            .await
            .unwrap();

        assert_eq!(updated.used_sessions, 10);
        assert_eq!(updated.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn consuming_a_paused_subscription_writes_nothing() {
        let mut subscription = sample_subscription();
        subscription.status = SubscriptionStatus::Paused.to_string();
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(subscription.clone())));
        subscription_repo.expect_update_guarded().never();

        let err = accountant(subscription_repo)
            .consume_session(subscription_id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AccountingError::InvalidStateTransition {
                from: SubscriptionStatus::Paused,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn restore_reactivates_a_quota_expired_subscription() {
        let mut subscription = sample_subscription();
        subscription.used_sessions = 10;
        subscription.status = SubscriptionStatus::Expired.to_string();
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo
            .expect_update_guarded()
            .returning(move |_, _, changes| Ok(Some(applied(subscription.clone(), changes))));

        let updated = accountant(subscription_repo)
            .restore_session(subscription_id)
            .await
            .unwrap();

        assert_eq!(updated.used_sessions, 9);
        assert_eq!(updated.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn lost_version_race_is_retried_from_a_fresh_read() {
        let stale = sample_subscription();
        let subscription_id = stale.id;
        let mut fresh = stale.clone();
        fresh.used_sessions = 1;
        fresh.version = 2;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut seq = mockall::Sequence::new();
        subscription_repo
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(stale.clone())));
        subscription_repo
            .expect_update_guarded()
            .with(eq(subscription_id), eq(1), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(None));
        let reloaded = fresh.clone();
        subscription_repo
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(reloaded.clone())));
        subscription_repo
            .expect_update_guarded()
            .with(eq(subscription_id), eq(2), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _, changes| Ok(Some(applied(fresh.clone(), changes))));

        let updated = accountant(subscription_repo)
            .consume_session(subscription_id)
            .await
            .unwrap();

        assert_eq!(updated.used_sessions, 2);
    }

    #[tokio::test]
    async fn gives_up_with_a_conflict_after_max_attempts() {
        let subscription = sample_subscription();
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .times(3)
            .returning(move |_| Ok(Some(subscription.clone())));
        subscription_repo
            .expect_update_guarded()
            .times(3)
            .returning(|_, _, _| Ok(None));

        let err = accountant(subscription_repo)
            .consume_session(subscription_id)
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::ConcurrencyConflict(id) if id == subscription_id));
    }

    #[tokio::test]
    async fn missing_subscription_is_not_found() {
        let subscription_id = Uuid::new_v4();
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_find_by_id().returning(|_| Ok(None));

        let err = accountant(subscription_repo)
            .restore_session(subscription_id)
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::SubscriptionNotFound(id) if id == subscription_id));
    }
}
