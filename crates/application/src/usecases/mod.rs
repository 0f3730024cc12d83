pub mod credit_calculator;
pub mod invariants;
pub mod payment_recorder;
pub mod retroactive_counter;
pub mod session_accountant;
pub mod subscription_ledger;

#[cfg(test)]
pub(crate) mod test_support;

use domain::{
    entities::{plans::PlanEntity, subscriptions::SubscriptionEntity},
    repositories::{plans::PlanRepository, subscriptions::SubscriptionRepository},
};
use tracing::error;
use uuid::Uuid;

use crate::errors::{AccountingError, AccountingResult};

/// How many times an optimistic read-modify-write is re-run after losing a
/// version race before `ConcurrencyConflict` is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    pub max_attempts: u32,
}

impl ConflictPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

pub(crate) async fn load_subscription<S>(
    subscription_repo: &S,
    subscription_id: Uuid,
) -> AccountingResult<SubscriptionEntity>
where
    S: SubscriptionRepository + Send + Sync + ?Sized,
{
    subscription_repo
        .find_by_id(subscription_id)
        .await
        .map_err(|err| {
            error!(
                %subscription_id,
                db_error = ?err,
                "accounting: failed to load subscription"
            );
            AccountingError::PersistenceFailure(err)
        })?
        .ok_or(AccountingError::SubscriptionNotFound(subscription_id))
}

/// Inactive catalog entries cannot be purchased and are reported as missing.
pub(crate) async fn load_active_plan<P>(plan_repo: &P, plan_id: Uuid) -> AccountingResult<PlanEntity>
where
    P: PlanRepository + Send + Sync + ?Sized,
{
    match plan_repo.find_by_id(plan_id).await.map_err(|err| {
        error!(
            %plan_id,
            db_error = ?err,
            "accounting: failed to load plan"
        );
        AccountingError::PersistenceFailure(err)
    })? {
        Some(plan) if plan.is_active => Ok(plan),
        _ => Err(AccountingError::PlanNotFound(plan_id)),
    }
}
