use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use domain::{
    entities::{
        payments::InsertPaymentEntity,
        plans::PlanEntity,
        subscriptions::{
            InsertSubscriptionEntity, NewSubscriptionBundle, SubscriptionChangeset,
            SubscriptionEntity, SupersedeSubscription,
        },
    },
    repositories::{
        plans::PlanRepository, subscriptions::SubscriptionRepository,
        training_sessions::TrainingSessionRepository,
    },
    value_objects::{
        enums::{payment_methods::PaymentMethod, subscription_statuses::SubscriptionStatus},
        money::{checked_sum, format_minor},
        subscription_lifecycle::{self, LifecycleAction, LifecycleViolation, SessionQuota},
        subscriptions::{PlanDto, SubscriptionModel, UpgradeCreditModel},
    },
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    ConflictPolicy,
    credit_calculator::{calculate_upgrade_credit, upgrade_credit_breakdown},
    load_active_plan, load_subscription,
    payment_recorder::PaymentDraft,
    retroactive_counter::{RetroactiveCounter, RetroactiveSelection},
};
use crate::{
    errors::{AccountingError, AccountingResult},
    interfaces::clock::{Clock, today},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionInput {
    pub member_id: Uuid,
    pub plan_id: Uuid,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub initial_payment_amount_minor: Option<i64>,
    #[serde(default)]
    pub include_signup_fee: bool,
    /// Amount of the signup fee settled at purchase, recorded as its own payment.
    #[serde(default)]
    pub signup_fee_paid_minor: Option<i64>,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(skip)]
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeSubscriptionInput {
    pub current_subscription_id: Uuid,
    pub new_plan_id: Uuid,
    /// Credit the caller computed; must match the server-side value exactly.
    pub credit_amount_minor: i64,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    #[serde(skip)]
    pub created_by: Option<Uuid>,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Cash
}

/// Result of an upgrade. `charged_minor` is what the member pays for the
/// successor and `credit_minor` the predecessor value applied to it. The
/// successor's `paid_amount_minor` counts both, so it includes credit that
/// was applied rather than collected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpgradeOutcome {
    pub predecessor: SubscriptionModel,
    pub successor: SubscriptionModel,
    pub credit_minor: i64,
    pub charged_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LedgerTransition {
    Pause { reason: Option<String> },
    Resume,
    Cancel { reason: Option<String> },
}

impl LedgerTransition {
    fn action(&self) -> LifecycleAction {
        match self {
            LedgerTransition::Pause { .. } => LifecycleAction::Pause,
            LedgerTransition::Resume => LifecycleAction::Resume,
            LedgerTransition::Cancel { .. } => LifecycleAction::Cancel,
        }
    }

    fn apply(
        &self,
        subscription: &SubscriptionEntity,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<(SubscriptionStatus, SubscriptionChangeset), LifecycleViolation> {
        match self {
            LedgerTransition::Pause { reason } => {
                let next = status.pause()?;
                Ok((
                    next,
                    SubscriptionChangeset {
                        status: Some(next.to_string()),
                        pause_start_date: Some(Some(now)),
                        pause_end_date: Some(None),
                        pause_reason: Some(reason.clone()),
                        updated_at: Some(now),
                        ..Default::default()
                    },
                ))
            }
            LedgerTransition::Resume => {
                let next = status.resume()?;
                Ok((
                    next,
                    SubscriptionChangeset {
                        status: Some(next.to_string()),
                        pause_end_date: Some(Some(now)),
                        updated_at: Some(now),
                        ..Default::default()
                    },
                ))
            }
            LedgerTransition::Cancel { reason } => {
                let next = status.cancel()?;
                let cancellation = match reason {
                    Some(reason) => format!("Cancelled: {reason}"),
                    None => "Cancelled.".to_string(),
                };
                Ok((
                    next,
                    SubscriptionChangeset {
                        status: Some(next.to_string()),
                        notes: Some(join_notes([subscription.notes.clone(), Some(cancellation)])),
                        updated_at: Some(now),
                        ..Default::default()
                    },
                ))
            }
        }
    }
}

/// Plan terms, dates and payments of a subscription about to be written.
struct SubscriptionDraft {
    member_id: Uuid,
    plan: PlanEntity,
    start_date: NaiveDate,
    include_signup_fee: bool,
    charge_minor: i64,
    credit_minor: i64,
    signup_fee_paid_minor: i64,
    payment_method: PaymentMethod,
    notes: Option<String>,
    created_by: Option<Uuid>,
}

/// Creates subscriptions from the plan catalog and drives their lifecycle.
pub struct SubscriptionLedgerUseCase<P, S, T, C>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    T: TrainingSessionRepository + Send + Sync + 'static,
    C: Clock + 'static,
{
    plan_repo: Arc<P>,
    subscription_repo: Arc<S>,
    retroactive_counter: RetroactiveCounter<T>,
    clock: Arc<C>,
    policy: ConflictPolicy,
}

impl<P, S, T, C> SubscriptionLedgerUseCase<P, S, T, C>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    T: TrainingSessionRepository + Send + Sync + 'static,
    C: Clock + 'static,
{
    pub fn new(
        plan_repo: Arc<P>,
        subscription_repo: Arc<S>,
        session_repo: Arc<T>,
        clock: Arc<C>,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            plan_repo,
            subscription_repo,
            retroactive_counter: RetroactiveCounter::new(session_repo),
            clock,
            policy,
        }
    }

    pub async fn list_active_plans(&self) -> AccountingResult<Vec<PlanDto>> {
        let plans = self.plan_repo.list_active_plans().await.map_err(|err| {
            error!(db_error = ?err, "subscription_ledger: failed to list plans");
            AccountingError::PersistenceFailure(err)
        })?;

        Ok(plans.into_iter().map(PlanDto::from).collect())
    }

    pub async fn create(&self, input: CreateSubscriptionInput) -> AccountingResult<SubscriptionModel> {
        let member_id = input.member_id;
        info!(
            %member_id,
            plan_id = %input.plan_id,
            "subscription_ledger: create subscription requested"
        );

        let charge_minor = non_negative("initial_payment_amount_minor", input.initial_payment_amount_minor)?;
        let signup_fee_paid_minor = non_negative("signup_fee_paid_minor", input.signup_fee_paid_minor)?;
        if !input.include_signup_fee && signup_fee_paid_minor > 0 {
            return Err(AccountingError::InvalidInput(
                "signup fee paid without including the signup fee".to_string(),
            ));
        }

        let plan = load_active_plan(self.plan_repo.as_ref(), input.plan_id).await?;
        let draft = SubscriptionDraft {
            member_id,
            plan,
            start_date: input
                .start_date
                .unwrap_or_else(|| today(self.clock.as_ref())),
            include_signup_fee: input.include_signup_fee,
            charge_minor,
            credit_minor: 0,
            signup_fee_paid_minor,
            payment_method: input.payment_method,
            notes: input.notes,
            created_by: input.created_by,
        };

        for attempt in 1..=self.policy.max_attempts {
            let bundle = self.bundle(&draft).await?;
            let subscription_id = bundle.subscription.id;

            let created = self
                .subscription_repo
                .create_subscription(bundle)
                .await
                .map_err(|err| {
                    error!(
                        %member_id,
                        %subscription_id,
                        db_error = ?err,
                        "subscription_ledger: failed to create subscription"
                    );
                    AccountingError::PersistenceFailure(err)
                })?;

            match created {
                Some(created) => {
                    info!(
                        %member_id,
                        %subscription_id,
                        plan_name = %created.plan_name,
                        used_sessions = created.used_sessions,
                        total_sessions = created.total_sessions,
                        paid_amount_minor = created.paid_amount_minor,
                        "subscription_ledger: subscription created"
                    );
                    let status = created.lifecycle_status()?;
                    return Ok(SubscriptionModel::new(created, status));
                }
                None => {
                    warn!(
                        %member_id,
                        attempt,
                        "subscription_ledger: retroactive sessions claimed concurrently, retrying"
                    );
                }
            }
        }

        Err(self.give_up(member_id, "create"))
    }

    pub async fn pause(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
    ) -> AccountingResult<SubscriptionModel> {
        self.transition(subscription_id, LedgerTransition::Pause { reason })
            .await
    }

    pub async fn resume(&self, subscription_id: Uuid) -> AccountingResult<SubscriptionModel> {
        self.transition(subscription_id, LedgerTransition::Resume).await
    }

    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
    ) -> AccountingResult<SubscriptionModel> {
        self.transition(subscription_id, LedgerTransition::Cancel { reason })
            .await
    }

    pub async fn calculate_upgrade_credit(
        &self,
        subscription_id: Uuid,
    ) -> AccountingResult<UpgradeCreditModel> {
        let subscription = load_subscription(self.subscription_repo.as_ref(), subscription_id).await?;
        Ok(upgrade_credit_breakdown(&subscription))
    }

    /// Replaces a live subscription with one on `new_plan_id`. The successor is
    /// charged the new price less the unused-session credit and never the
    /// signup fee; the predecessor is cancelled and linked to it in the same write.
    pub async fn upgrade(&self, input: UpgradeSubscriptionInput) -> AccountingResult<UpgradeOutcome> {
        let current_id = input.current_subscription_id;
        info!(
            %current_id,
            new_plan_id = %input.new_plan_id,
            credit_amount_minor = input.credit_amount_minor,
            "subscription_ledger: upgrade requested"
        );

        let plan = load_active_plan(self.plan_repo.as_ref(), input.new_plan_id).await?;
        let start_date = input
            .effective_date
            .unwrap_or_else(|| today(self.clock.as_ref()));

        for attempt in 1..=self.policy.max_attempts {
            let current = load_subscription(self.subscription_repo.as_ref(), current_id).await?;
            let status = current.lifecycle_status()?;
            let cancelled = status.supersede().map_err(|violation| {
                warn!(
                    %current_id,
                    status = %status,
                    reason = %violation,
                    "subscription_ledger: upgrade rejected"
                );
                AccountingError::from(violation)
            })?;

            let computed_minor = calculate_upgrade_credit(&current);
            if computed_minor != input.credit_amount_minor {
                warn!(
                    %current_id,
                    supplied_minor = input.credit_amount_minor,
                    computed_minor,
                    "subscription_ledger: upgrade credit mismatch"
                );
                return Err(AccountingError::CreditMismatch {
                    supplied_minor: input.credit_amount_minor,
                    computed_minor,
                });
            }

            let charged_minor = (plan.price_minor - computed_minor).max(0);
            let draft = SubscriptionDraft {
                member_id: current.member_id,
                plan: plan.clone(),
                start_date,
                include_signup_fee: false,
                charge_minor: charged_minor,
                credit_minor: computed_minor.min(plan.price_minor),
                signup_fee_paid_minor: 0,
                payment_method: input.payment_method,
                notes: Some(format!(
                    "Upgraded from subscription {current_id} with a credit of {}.",
                    format_minor(computed_minor)
                )),
                created_by: input.created_by,
            };
            let bundle = self.bundle(&draft).await?;
            let successor_id = bundle.subscription.id;
            let now = self.clock.now();
            let supersede = SupersedeSubscription {
                predecessor_id: current_id,
                expected_version: current.version,
                changes: SubscriptionChangeset {
                    status: Some(cancelled.to_string()),
                    upgraded_to_id: Some(Some(successor_id)),
                    updated_at: Some(now),
                    ..Default::default()
                },
            };

            let upgraded = self
                .subscription_repo
                .create_upgrade(bundle, supersede)
                .await
                .map_err(|err| {
                    error!(
                        %current_id,
                        %successor_id,
                        db_error = ?err,
                        "subscription_ledger: failed to write upgrade"
                    );
                    AccountingError::PersistenceFailure(err)
                })?;

            match upgraded {
                Some(upgraded) => {
                    info!(
                        %current_id,
                        %successor_id,
                        credit_minor = computed_minor,
                        charged_minor,
                        "subscription_ledger: subscription upgraded"
                    );
                    let predecessor_status = upgraded.predecessor.lifecycle_status()?;
                    let successor_status = upgraded.successor.lifecycle_status()?;
                    return Ok(UpgradeOutcome {
                        predecessor: SubscriptionModel::new(upgraded.predecessor, predecessor_status),
                        successor: SubscriptionModel::new(upgraded.successor, successor_status),
                        credit_minor: computed_minor,
                        charged_minor,
                    });
                }
                None => {
                    warn!(
                        %current_id,
                        attempt,
                        expected_version = current.version,
                        "subscription_ledger: upgrade lost a concurrent write, retrying"
                    );
                }
            }
        }

        Err(self.give_up(current_id, "upgrade"))
    }

    pub async fn get_subscription(&self, subscription_id: Uuid) -> AccountingResult<SubscriptionModel> {
        let subscription = load_subscription(self.subscription_repo.as_ref(), subscription_id).await?;
        let status = subscription.lifecycle_status()?;
        Ok(SubscriptionModel::new(subscription, status))
    }

    pub async fn list_member_subscriptions(
        &self,
        member_id: Uuid,
    ) -> AccountingResult<Vec<SubscriptionModel>> {
        let subscriptions = self
            .subscription_repo
            .list_by_member(member_id)
            .await
            .map_err(|err| {
                error!(
                    %member_id,
                    db_error = ?err,
                    "subscription_ledger: failed to list member subscriptions"
                );
                AccountingError::PersistenceFailure(err)
            })?;

        subscriptions
            .into_iter()
            .map(|subscription| {
                let status = subscription.lifecycle_status()?;
                Ok(SubscriptionModel::new(subscription, status))
            })
            .collect()
    }

    async fn transition(
        &self,
        subscription_id: Uuid,
        transition: LedgerTransition,
    ) -> AccountingResult<SubscriptionModel> {
        let action = transition.action();

        for attempt in 1..=self.policy.max_attempts {
            let subscription = load_subscription(self.subscription_repo.as_ref(), subscription_id).await?;
            let status = subscription.lifecycle_status()?;
            let (next, changes) = transition
                .apply(&subscription, status, self.clock.now())
                .map_err(|violation| {
                    warn!(
                        %subscription_id,
                        action = %action,
                        status = %status,
                        reason = %violation,
                        "subscription_ledger: transition rejected"
                    );
                    AccountingError::from(violation)
                })?;

            let updated = self
                .subscription_repo
                .update_guarded(subscription_id, subscription.version, changes)
                .await
                .map_err(|err| {
                    error!(
                        %subscription_id,
                        action = %action,
                        db_error = ?err,
                        "subscription_ledger: failed to write transition"
                    );
                    AccountingError::PersistenceFailure(err)
                })?;

            match updated {
                Some(updated) => {
                    info!(
                        %subscription_id,
                        from = %status,
                        to = %next,
                        "subscription_ledger: subscription status changed"
                    );
                    return Ok(SubscriptionModel::new(updated, next));
                }
                None => {
                    warn!(
                        %subscription_id,
                        action = %action,
                        attempt,
                        expected_version = subscription.version,
                        "subscription_ledger: version conflict, retrying"
                    );
                }
            }
        }

        Err(self.give_up(subscription_id, "transition"))
    }

    /// Builds a fresh bundle per attempt so a retry re-selects the
    /// retroactive sessions and never reuses ids of a rolled-back write.
    async fn bundle(&self, draft: &SubscriptionDraft) -> AccountingResult<NewSubscriptionBundle> {
        let plan = &draft.plan;
        let end_date = end_date(draft.start_date, plan.duration_months)?;
        let duration_days = i32::try_from((end_date - draft.start_date).num_days())
            .map_err(|_| AccountingError::InvalidInput("plan duration out of range".to_string()))?;

        let selection = self
            .retroactive_counter
            .select_for(draft.member_id, plan.sessions_count)
            .await?;
        let used_sessions = selection.counted();
        let status = subscription_lifecycle::initial_status(SessionQuota {
            used: used_sessions,
            total: plan.sessions_count,
        });

        let signup_fee_minor = if draft.include_signup_fee {
            plan.signup_fee_minor
        } else {
            0
        };
        let now = self.clock.now();
        let subscription_id = Uuid::new_v4();
        let payments = self.purchase_payments(draft, subscription_id, now);
        let paid_amount_minor = checked_sum(payments.iter().map(|payment| payment.amount_minor))
            .ok_or_else(|| {
                AccountingError::InvalidInput("purchase payments overflow the paid amount".to_string())
            })?;

        Ok(NewSubscriptionBundle {
            subscription: InsertSubscriptionEntity {
                id: subscription_id,
                member_id: draft.member_id,
                plan_id: plan.id,
                plan_name: plan.name.clone(),
                total_sessions: plan.sessions_count,
                used_sessions,
                total_amount_minor: plan.price_minor,
                signup_fee_minor,
                signup_fee_paid: signup_fee_minor > 0 && draft.signup_fee_paid_minor >= signup_fee_minor,
                paid_amount_minor,
                duration_days,
                start_date: draft.start_date,
                end_date,
                status: status.to_string(),
                notes: join_notes([draft.notes.clone(), selection_note(&selection)]),
                created_by: draft.created_by,
                version: 1,
                created_at: now,
                updated_at: now,
            },
            counted_session_ids: selection.session_ids,
            payments,
        })
    }

    fn purchase_payments(
        &self,
        draft: &SubscriptionDraft,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> Vec<InsertPaymentEntity> {
        let payment = |amount_minor: i64, payment_method: PaymentMethod, notes: &str| {
            PaymentDraft {
                subscription_id,
                member_id: draft.member_id,
                amount_minor,
                payment_method,
                payment_date: draft.start_date,
                reference: None,
                notes: Some(notes.to_string()),
                processed_by: draft.created_by,
            }
            .completed(Uuid::new_v4(), now)
        };

        let mut payments = Vec::new();
        if draft.charge_minor > 0 {
            payments.push(payment(draft.charge_minor, draft.payment_method, "Initial payment"));
        }
        if draft.signup_fee_paid_minor > 0 {
            payments.push(payment(draft.signup_fee_paid_minor, draft.payment_method, "Signup fee"));
        }
        // Applied, not collected: it moves no money but counts towards the paid amount.
        if draft.credit_minor > 0 {
            payments.push(payment(draft.credit_minor, PaymentMethod::Credit, "Upgrade credit"));
        }
        payments
    }

    fn give_up(&self, id: Uuid, operation: &'static str) -> AccountingError {
        warn!(
            %id,
            operation,
            max_attempts = self.policy.max_attempts,
            "subscription_ledger: giving up after repeated conflicts"
        );
        AccountingError::ConcurrencyConflict(id)
    }
}

fn non_negative(field: &str, amount: Option<i64>) -> AccountingResult<i64> {
    match amount.unwrap_or(0) {
        amount if amount < 0 => Err(AccountingError::InvalidInput(format!(
            "{field} must not be negative"
        ))),
        amount => Ok(amount),
    }
}

fn end_date(start_date: NaiveDate, duration_months: i32) -> AccountingResult<NaiveDate> {
    u32::try_from(duration_months)
        .ok()
        .and_then(|months| start_date.checked_add_months(Months::new(months)))
        .ok_or_else(|| {
            AccountingError::InvalidInput(format!(
                "plan duration of {duration_months} months is out of range"
            ))
        })
}

fn selection_note(selection: &RetroactiveSelection) -> Option<String> {
    if selection.session_ids.is_empty() && selection.excess_count == 0 {
        return None;
    }
    selection.note()
}

fn join_notes<const N: usize>(notes: [Option<String>; N]) -> Option<String> {
    let joined = notes
        .into_iter()
        .flatten()
        .filter(|note| !note.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interfaces::clock::MockClock,
        usecases::test_support::{fixed_clock, fixed_now, sample_plan, sample_subscription},
    };
    use chrono::TimeZone;
    use domain::{
        entities::{subscriptions::UpgradedSubscriptions, training_sessions::TrainingSessionEntity},
        repositories::{
            plans::MockPlanRepository, subscriptions::MockSubscriptionRepository,
            training_sessions::MockTrainingSessionRepository,
        },
        value_objects::enums::{session_statuses::SessionStatus, session_types::SessionType},
    };
    use mockall::predicate::{always, eq, function};

    type Ledger = SubscriptionLedgerUseCase<
        MockPlanRepository,
        MockSubscriptionRepository,
        MockTrainingSessionRepository,
        MockClock,
    >;

    fn ledger(
        plan_repo: MockPlanRepository,
        subscription_repo: MockSubscriptionRepository,
        session_repo: MockTrainingSessionRepository,
    ) -> Ledger {
        SubscriptionLedgerUseCase::new(
            Arc::new(plan_repo),
            Arc::new(subscription_repo),
            Arc::new(session_repo),
            Arc::new(fixed_clock()),
            ConflictPolicy::new(3),
        )
    }

    fn plans_with(plan: PlanEntity) -> MockPlanRepository {
        let mut plan_repo = MockPlanRepository::new();
        let plan_id = plan.id;
        plan_repo
            .expect_find_by_id()
            .with(eq(plan_id))
            .returning(move |_| Ok(Some(plan.clone())));
        plan_repo
    }

    fn no_trial() -> MockTrainingSessionRepository {
        let mut session_repo = MockTrainingSessionRepository::new();
        session_repo.expect_find_latest_trial().returning(|_| Ok(None));
        session_repo
    }

    fn completed(member_id: Uuid, session_type: SessionType, day: u32) -> TrainingSessionEntity {
        TrainingSessionEntity {
            id: Uuid::new_v4(),
            member_id,
            session_type: session_type.to_string(),
            status: SessionStatus::Completed.to_string(),
            scheduled_start: Utc.with_ymd_and_hms(2026, 3, day, 18, 0, 0).unwrap(),
            counted_in_subscription_id: None,
        }
    }

    fn create_input(member_id: Uuid, plan_id: Uuid) -> CreateSubscriptionInput {
        CreateSubscriptionInput {
            member_id,
            plan_id,
            start_date: None,
            initial_payment_amount_minor: None,
            include_signup_fee: false,
            signup_fee_paid_minor: None,
            payment_method: PaymentMethod::Card,
            notes: None,
            created_by: None,
        }
    }

    fn applied(mut subscription: SubscriptionEntity, changes: &SubscriptionChangeset) -> SubscriptionEntity {
        changes.apply_to(&mut subscription);
        subscription
    }

    #[tokio::test]
    async fn list_active_plans_maps_catalog_rows() {
        let plan = sample_plan(Uuid::new_v4());
        let plan_id = plan.id;
        let mut plan_repo = MockPlanRepository::new();
        plan_repo
            .expect_list_active_plans()
            .times(1)
            .returning(move || Ok(vec![plan.clone()]));

        let plans = ledger(
            plan_repo,
            MockSubscriptionRepository::new(),
            MockTrainingSessionRepository::new(),
        )
        .list_active_plans()
        .await
        .unwrap();

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].id, plan_id);
    }

    #[tokio::test]
    async fn create_snapshots_plan_terms_and_counts_sessions_since_trial() {
        let member_id = Uuid::new_v4();
        let plan = sample_plan(Uuid::new_v4());
        let plan_id = plan.id;
        let trial = completed(member_id, SessionType::Trial, 1);
        let first = completed(member_id, SessionType::Contractual, 2);
        let second = completed(member_id, SessionType::Contractual, 3);
        let claimed = vec![first.id, second.id];

        let mut session_repo = MockTrainingSessionRepository::new();
        session_repo
            .expect_find_latest_trial()
            .returning(move |_| Ok(Some(trial.clone())));
        session_repo
            .expect_list_uncounted_completed_contractual_since()
            .returning(move |_, _| Ok(vec![first.clone(), second.clone()]));

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_create_subscription()
            .with(function(move |bundle: &NewSubscriptionBundle| {
                bundle.counted_session_ids == claimed
                    && bundle.payments.len() == 2
                    && bundle.payments.iter().all(|p| p.payment_status == "completed")
            }))
            .times(1)
            .returning(|bundle| Ok(Some(SubscriptionEntity::from(bundle.subscription))));

        let mut input = create_input(member_id, plan_id);
        input.start_date = NaiveDate::from_ymd_opt(2026, 3, 4);
        input.initial_payment_amount_minor = Some(4_000);
        input.include_signup_fee = true;
        input.signup_fee_paid_minor = Some(2_500);
        input.notes = Some("Front desk sale".to_string());

        let created = ledger(plans_with(plan), subscription_repo, session_repo)
            .create(input)
            .await
            .unwrap();

        assert_eq!(created.plan_name, "10 Sessions");
        assert_eq!(created.total_sessions, 10);
        assert_eq!(created.used_sessions, 2);
        assert_eq!(created.total_amount_minor, 10_000);
        assert_eq!(created.signup_fee_minor, 2_500);
        assert!(created.signup_fee_paid);
        assert_eq!(created.balance.paid_amount_minor, 6_500);
        assert_eq!(created.balance.outstanding_minor, 6_000);
        assert_eq!(created.end_date, NaiveDate::from_ymd_opt(2026, 6, 4).unwrap());
        assert_eq!(created.duration_days, 92);
        assert_eq!(created.status, SubscriptionStatus::Active);
        let notes = created.notes.unwrap();
        assert!(notes.starts_with("Front desk sale\n"));
        assert!(notes.contains("Retroactively counted 2 completed session(s)"));
    }

    #[tokio::test]
    async fn create_with_unknown_or_inactive_plan_fails() {
        let mut inactive = sample_plan(Uuid::new_v4());
        inactive.is_active = false;
        let inactive_id = inactive.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_create_subscription().never();

        let err = ledger(plans_with(inactive), subscription_repo, no_trial())
            .create(create_input(Uuid::new_v4(), inactive_id))
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::PlanNotFound(id) if id == inactive_id));
    }

    #[tokio::test]
    async fn create_retries_when_a_retroactive_claim_falls_short() {
        let plan = sample_plan(Uuid::new_v4());
        let plan_id = plan.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut seq = mockall::Sequence::new();
        subscription_repo
            .expect_create_subscription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        subscription_repo
            .expect_create_subscription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|bundle| Ok(Some(SubscriptionEntity::from(bundle.subscription))));

        let created = ledger(plans_with(plan), subscription_repo, no_trial())
            .create(create_input(Uuid::new_v4(), plan_id))
            .await
            .unwrap();

        assert_eq!(created.used_sessions, 0);
        assert_eq!(created.start_date, fixed_now().date_naive());
    }

    #[tokio::test]
    async fn create_rejects_negative_payment() {
        let mut input = create_input(Uuid::new_v4(), Uuid::new_v4());
        input.initial_payment_amount_minor = Some(-1);

        let mut plan_repo = MockPlanRepository::new();
        plan_repo.expect_find_by_id().never();

        let err = ledger(plan_repo, MockSubscriptionRepository::new(), no_trial())
            .create(input)
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn pause_records_reason_and_start() {
        let subscription = sample_subscription();
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo
            .expect_update_guarded()
            .with(eq(subscription_id), eq(1), always())
            .times(1)
            .returning(move |_, _, changes| Ok(Some(applied(subscription.clone(), &changes))));

        let paused = ledger(MockPlanRepository::new(), subscription_repo, no_trial())
            .pause(subscription_id, Some("Injury".to_string()))
            .await
            .unwrap();

        assert_eq!(paused.status, SubscriptionStatus::Paused);
        assert_eq!(paused.pause_start_date, Some(fixed_now()));
        assert_eq!(paused.pause_reason.as_deref(), Some("Injury"));
        assert_eq!(paused.used_sessions, 0);
    }

    #[tokio::test]
    async fn resume_of_an_active_subscription_is_rejected() {
        let subscription = sample_subscription();
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(subscription.clone())));
        subscription_repo.expect_update_guarded().never();

        let err = ledger(MockPlanRepository::new(), subscription_repo, no_trial())
            .resume(subscription_id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AccountingError::InvalidStateTransition {
                from: SubscriptionStatus::Active,
                action: LifecycleAction::Resume,
            }
        ));
    }

    #[tokio::test]
    async fn cancel_appends_the_reason_to_notes() {
        let mut subscription = sample_subscription();
        subscription.notes = Some("Gift".to_string());
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo
            .expect_update_guarded()
            .returning(move |_, _, changes| Ok(Some(applied(subscription.clone(), &changes))));

        let cancelled = ledger(MockPlanRepository::new(), subscription_repo, no_trial())
            .cancel(subscription_id, Some("Moved away".to_string()))
            .await
            .unwrap();

        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("Gift\nCancelled: Moved away"));
    }

    #[tokio::test]
    async fn upgrade_rejects_a_stale_credit() {
        let mut current = sample_subscription();
        current.used_sessions = 4;
        let current_id = current.id;
        let plan = sample_plan(Uuid::new_v4());
        let plan_id = plan.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(current.clone())));
        subscription_repo.expect_create_upgrade().never();

        let err = ledger(plans_with(plan), subscription_repo, no_trial())
            .upgrade(UpgradeSubscriptionInput {
                current_subscription_id: current_id,
                new_plan_id: plan_id,
                credit_amount_minor: 5_000,
                effective_date: None,
                payment_method: PaymentMethod::Card,
                created_by: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AccountingError::CreditMismatch {
                supplied_minor: 5_000,
                computed_minor: 6_000,
            }
        ));
    }

    #[tokio::test]
    async fn upgrade_charges_price_less_credit_and_links_predecessor() {
        let mut current = sample_subscription();
        current.used_sessions = 4;
        current.paid_amount_minor = 10_000;
        let current_id = current.id;
        let mut plan = sample_plan(Uuid::new_v4());
        plan.price_minor = 15_000;
        plan.sessions_count = 20;
        let plan_id = plan.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = current.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo
            .expect_create_upgrade()
            .with(
                function(|bundle: &NewSubscriptionBundle| {
                    let amounts: Vec<(i64, &str)> = bundle
                        .payments
                        .iter()
                        .map(|p| (p.amount_minor, p.payment_method.as_str()))
                        .collect();
                    bundle.subscription.signup_fee_minor == 0
                        && amounts == vec![(9_000, "card"), (6_000, "credit")]
                }),
                function(move |supersede: &SupersedeSubscription| {
                    supersede.predecessor_id == current_id
                        && supersede.expected_version == 1
                        && supersede.changes.status.as_deref() == Some("cancelled")
                }),
            )
            .times(1)
            .returning(move |bundle, supersede| {
                Ok(Some(UpgradedSubscriptions {
                    predecessor: applied(current.clone(), &supersede.changes),
                    successor: SubscriptionEntity::from(bundle.subscription),
                }))
            });

        let outcome = ledger(plans_with(plan), subscription_repo, no_trial())
            .upgrade(UpgradeSubscriptionInput {
                current_subscription_id: current_id,
                new_plan_id: plan_id,
                credit_amount_minor: 6_000,
                effective_date: None,
                payment_method: PaymentMethod::Card,
                created_by: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.credit_minor, 6_000);
        assert_eq!(outcome.charged_minor, 9_000);
        assert_eq!(outcome.predecessor.status, SubscriptionStatus::Cancelled);
        assert_eq!(outcome.predecessor.upgraded_to_id, Some(outcome.successor.id));
        assert_eq!(outcome.successor.signup_fee_minor, 0);
        assert_eq!(outcome.successor.balance.paid_amount_minor, 15_000);
        assert_eq!(outcome.successor.balance.outstanding_minor, 0);
        assert!(
            outcome
                .successor
                .notes
                .unwrap()
                .contains(&format!("Upgraded from subscription {current_id} with a credit of 60.00."))
        );
    }

    #[tokio::test]
    async fn upgrade_of_a_cancelled_subscription_is_rejected() {
        let mut current = sample_subscription();
        current.status = SubscriptionStatus::Cancelled.to_string();
        let current_id = current.id;
        let plan = sample_plan(Uuid::new_v4());
        let plan_id = plan.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(current.clone())));

        let err = ledger(plans_with(plan), subscription_repo, no_trial())
            .upgrade(UpgradeSubscriptionInput {
                current_subscription_id: current_id,
                new_plan_id: plan_id,
                credit_amount_minor: 10_000,
                effective_date: None,
                payment_method: PaymentMethod::Cash,
                created_by: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AccountingError::InvalidStateTransition {
                from: SubscriptionStatus::Cancelled,
                action: LifecycleAction::Upgrade,
            }
        ));
    }
}
