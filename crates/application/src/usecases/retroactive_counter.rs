use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::{
    entities::training_sessions::TrainingSessionEntity,
    repositories::training_sessions::TrainingSessionRepository,
    value_objects::enums::{session_statuses::SessionStatus, session_types::SessionType},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::{AccountingError, AccountingResult};

/// Completed sessions a new subscription should absorb.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetroactiveSelection {
    pub trial_started_at: Option<DateTime<Utc>>,
    /// Oldest first, at most the new plan's quota.
    pub session_ids: Vec<Uuid>,
    /// Eligible sessions beyond the quota. They stay uncounted and remain
    /// available to a later subscription.
    pub excess_count: usize,
}

impl RetroactiveSelection {
    pub fn counted(&self) -> i32 {
        i32::try_from(self.session_ids.len()).unwrap_or(i32::MAX)
    }

    pub fn note(&self) -> Option<String> {
        let trial_started_at = self.trial_started_at?;
        let mut note = format!(
            "Retroactively counted {} completed session(s) taken since the trial on {}.",
            self.session_ids.len(),
            trial_started_at.date_naive()
        );
        if self.excess_count > 0 {
            note.push_str(&format!(
                " {} further completed session(s) exceed the plan quota and were left uncounted.",
                self.excess_count
            ));
        }
        Some(note)
    }
}

/// Finds completed contractual sessions taken after a member's latest trial
/// that no subscription has counted yet.
pub struct RetroactiveCounter<T>
where
    T: TrainingSessionRepository + Send + Sync + 'static,
{
    session_repo: Arc<T>,
}

impl<T> RetroactiveCounter<T>
where
    T: TrainingSessionRepository + Send + Sync + 'static,
{
    pub fn new(session_repo: Arc<T>) -> Self {
        Self { session_repo }
    }

    /// Selection only; the sessions are claimed when the subscription is written.
    pub async fn select_for(
        &self,
        member_id: Uuid,
        total_sessions: i32,
    ) -> AccountingResult<RetroactiveSelection> {
        let trial = self
            .session_repo
            .find_latest_trial(member_id)
            .await
            .map_err(|err| {
                error!(
                    %member_id,
                    db_error = ?err,
                    "retroactive_counter: failed to load latest trial session"
                );
                AccountingError::PersistenceFailure(err)
            })?;

        let Some(trial) = trial else {
            info!(%member_id, "retroactive_counter: no trial session, nothing to count");
            return Ok(RetroactiveSelection::default());
        };

        let mut eligible: Vec<TrainingSessionEntity> = self
            .session_repo
            .list_uncounted_completed_contractual_since(member_id, trial.scheduled_start)
            .await
            .map_err(|err| {
                error!(
                    %member_id,
                    trial_session_id = %trial.id,
                    db_error = ?err,
                    "retroactive_counter: failed to list eligible sessions"
                );
                AccountingError::PersistenceFailure(err)
            })?
            .into_iter()
            .filter(|session| is_eligible(session, trial.scheduled_start))
            .collect();
        eligible.sort_by_key(|session| session.scheduled_start);

        let quota = usize::try_from(total_sessions.max(0)).unwrap_or_default();
        let excess_count = eligible.len().saturating_sub(quota);
        if excess_count > 0 {
            warn!(
                %member_id,
                eligible = eligible.len(),
                quota,
                excess_count,
                "retroactive_counter: more completed sessions than the plan covers, leaving the excess uncounted"
            );
        }

        let session_ids: Vec<Uuid> = eligible
            .into_iter()
            .take(quota)
            .map(|session| session.id)
            .collect();

        info!(
            %member_id,
            trial_session_id = %trial.id,
            counted = session_ids.len(),
            "retroactive_counter: sessions selected"
        );

        Ok(RetroactiveSelection {
            trial_started_at: Some(trial.scheduled_start),
            session_ids,
            excess_count,
        })
    }
}

fn is_eligible(session: &TrainingSessionEntity, since: DateTime<Utc>) -> bool {
    session.session_type() == Some(SessionType::Contractual)
        && session.status() == Some(SessionStatus::Completed)
        && session.counted_in_subscription_id.is_none()
        && session.scheduled_start >= since
}
