//! Read-only consistency audit of one subscription against its payments,
//! counted sessions and upgrade chain. Nothing here writes.

use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Utc};
use domain::{
    entities::subscriptions::SubscriptionEntity,
    repositories::{
        payments::PaymentRepository, subscriptions::SubscriptionRepository,
        training_sessions::TrainingSessionRepository,
    },
    value_objects::{
        enums::{session_statuses::SessionStatus, subscription_statuses::SubscriptionStatus},
        money::checked_sum,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::load_subscription;
use crate::{
    errors::{AccountingError, AccountingResult},
    interfaces::clock::Clock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Money or quota is wrong.
    Critical,
    High,
    /// May be legitimate, e.g. an expiry written by an external time-based job.
    Medium,
}

impl Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub invariant: String,
    pub description: String,
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantReport {
    pub subscription_id: Uuid,
    pub checked_at: DateTime<Utc>,
    pub checks_run: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

const QUOTA_BOUNDS: &str = "quota_bounds";
const PAID_AMOUNT_RECONCILED: &str = "paid_amount_reconciled";
const EXPIRED_BY_QUOTA: &str = "expired_by_quota";
const UPGRADE_CHAIN: &str = "upgrade_chain";
const COUNTED_SESSIONS_COMPLETED: &str = "counted_sessions_completed";
const CHECKS_RUN: usize = 5;

pub struct InvariantAuditUseCase<S, T, Pay, C>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    T: TrainingSessionRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    C: Clock + 'static,
{
    subscription_repo: Arc<S>,
    session_repo: Arc<T>,
    payment_repo: Arc<Pay>,
    clock: Arc<C>,
}

impl<S, T, Pay, C> InvariantAuditUseCase<S, T, Pay, C>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    T: TrainingSessionRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    C: Clock + 'static,
{
    pub fn new(
        subscription_repo: Arc<S>,
        session_repo: Arc<T>,
        payment_repo: Arc<Pay>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            subscription_repo,
            session_repo,
            payment_repo,
            clock,
        }
    }

    pub async fn check(&self, subscription_id: Uuid) -> AccountingResult<InvariantReport> {
        let subscription = load_subscription(self.subscription_repo.as_ref(), subscription_id).await?;

        let mut violations = Vec::new();
        violations.extend(check_quota_bounds(&subscription));
        violations.extend(self.check_paid_amount(&subscription).await?);
        violations.extend(check_expired_by_quota(&subscription));
        violations.extend(self.check_upgrade_chain(&subscription).await?);
        violations.extend(self.check_counted_sessions(&subscription).await?);

        let healthy = violations.is_empty();
        if healthy {
            info!(%subscription_id, "invariants: all checks passed");
        } else {
            for violation in &violations {
                warn!(
                    %subscription_id,
                    invariant = %violation.invariant,
                    severity = %violation.severity,
                    description = %violation.description,
                    "invariants: violation found"
                );
            }
        }

        Ok(InvariantReport {
            subscription_id,
            checked_at: self.clock.now(),
            checks_run: CHECKS_RUN,
            violations,
            healthy,
        })
    }

    async fn check_paid_amount(
        &self,
        subscription: &SubscriptionEntity,
    ) -> AccountingResult<Option<InvariantViolation>> {
        let subscription_id = subscription.id;
        let payments = self
            .payment_repo
            .list_by_subscription(subscription_id)
            .await
            .map_err(|err| {
                error!(%subscription_id, db_error = ?err, "invariants: failed to list payments");
                AccountingError::PersistenceFailure(err)
            })?;

        // `None` when the completed payments overflow, which never reconciles.
        let completed_sum = checked_sum(
            payments
                .iter()
                .filter(|payment| payment.is_completed())
                .map(|payment| payment.amount_minor),
        );

        Ok((completed_sum != Some(subscription.paid_amount_minor)).then(|| InvariantViolation {
            invariant: PAID_AMOUNT_RECONCILED.to_string(),
            description: "paid amount differs from the sum of completed payments".to_string(),
            context: json!({
                "paid_amount_minor": subscription.paid_amount_minor,
                "completed_payments_minor": completed_sum,
                "payments": payments.len(),
            }),
            severity: ViolationSeverity::Critical,
        }))
    }

    async fn check_upgrade_chain(
        &self,
        subscription: &SubscriptionEntity,
    ) -> AccountingResult<Option<InvariantViolation>> {
        let Some(successor_id) = subscription.upgraded_to_id else {
            return Ok(None);
        };
        let subscription_id = subscription.id;

        let successor = self
            .subscription_repo
            .find_by_id(successor_id)
            .await
            .map_err(|err| {
                error!(%successor_id, db_error = ?err, "invariants: failed to load successor");
                AccountingError::PersistenceFailure(err)
            })?;
        let predecessors = self
            .subscription_repo
            .list_predecessors(successor_id)
            .await
            .map_err(|err| {
                error!(%successor_id, db_error = ?err, "invariants: failed to list predecessors");
                AccountingError::PersistenceFailure(err)
            })?;

        let violation = |description: &str| InvariantViolation {
            invariant: UPGRADE_CHAIN.to_string(),
            description: description.to_string(),
            context: json!({
                "successor_id": successor_id,
                "predecessors": predecessors.iter().map(|p| p.id).collect::<Vec<_>>(),
            }),
            severity: ViolationSeverity::High,
        };

        let Some(successor) = successor else {
            return Ok(Some(violation("successor subscription does not exist")));
        };
        if predecessors.len() != 1 {
            return Ok(Some(violation("successor is not linked from exactly one subscription")));
        }
        let referenced = successor
            .notes
            .as_deref()
            .is_some_and(|notes| notes.contains(&subscription_id.to_string()));
        if !referenced {
            return Ok(Some(violation("successor notes do not reference this subscription")));
        }
        Ok(None)
    }

    async fn check_counted_sessions(
        &self,
        subscription: &SubscriptionEntity,
    ) -> AccountingResult<Option<InvariantViolation>> {
        let subscription_id = subscription.id;
        let counted = self
            .session_repo
            .list_counted_in(subscription_id)
            .await
            .map_err(|err| {
                error!(%subscription_id, db_error = ?err, "invariants: failed to list counted sessions");
                AccountingError::PersistenceFailure(err)
            })?;

        let not_completed: Vec<Uuid> = counted
            .iter()
            .filter(|session| session.status() != Some(SessionStatus::Completed))
            .map(|session| session.id)
            .collect();

        Ok((!not_completed.is_empty()).then(|| InvariantViolation {
            invariant: COUNTED_SESSIONS_COMPLETED.to_string(),
            description: "sessions counted in this subscription are not completed".to_string(),
            context: json!({ "session_ids": not_completed }),
            severity: ViolationSeverity::High,
        }))
    }
}

fn check_quota_bounds(subscription: &SubscriptionEntity) -> Option<InvariantViolation> {
    let within = 0 <= subscription.used_sessions && subscription.used_sessions <= subscription.total_sessions;

    (!within).then(|| InvariantViolation {
        invariant: QUOTA_BOUNDS.to_string(),
        description: "used sessions outside 0..=total sessions".to_string(),
        context: json!({
            "used_sessions": subscription.used_sessions,
            "total_sessions": subscription.total_sessions,
        }),
        severity: ViolationSeverity::Critical,
    })
}

fn check_expired_by_quota(subscription: &SubscriptionEntity) -> Option<InvariantViolation> {
    let expired = subscription.lifecycle_status().ok() == Some(SubscriptionStatus::Expired);

    (expired && subscription.used_sessions != subscription.total_sessions).then(|| InvariantViolation {
        invariant: EXPIRED_BY_QUOTA.to_string(),
        description: "expired with sessions left; only valid if expired by end date".to_string(),
        context: json!({
            "used_sessions": subscription.used_sessions,
            "total_sessions": subscription.total_sessions,
            "end_date": subscription.end_date,
        }),
        severity: ViolationSeverity::Medium,
    })
}
