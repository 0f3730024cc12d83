//! In-process store behind the same repository traits as Postgres.
//!
//! All state sits behind one mutex, so every trait method is atomic. Writes
//! yield to the scheduler before taking the lock, which lets concurrent
//! read-modify-write callers interleave the way they would against a database.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use domain::{
    entities::{
        payments::{InsertPaymentEntity, PaymentEntity, RecordedPayment},
        plans::PlanEntity,
        subscriptions::{
            NewSubscriptionBundle, SubscriptionChangeset, SubscriptionEntity,
            SupersedeSubscription, UpgradedSubscriptions,
        },
        training_sessions::TrainingSessionEntity,
    },
    repositories::{
        payments::PaymentRepository, plans::PlanRepository,
        subscriptions::SubscriptionRepository, training_sessions::TrainingSessionRepository,
    },
    value_objects::{
        enums::{session_statuses::SessionStatus, session_types::SessionType},
        money::checked_sum,
    },
};

#[derive(Debug, Default)]
struct MemoryState {
    plans: HashMap<Uuid, PlanEntity>,
    subscriptions: HashMap<Uuid, SubscriptionEntity>,
    sessions: HashMap<Uuid, TrainingSessionEntity>,
    /// Insertion order is the listing order.
    payments: Vec<PaymentEntity>,
}

impl MemoryState {
    fn guarded_update(
        &mut self,
        subscription_id: Uuid,
        expected_version: i32,
        changes: &SubscriptionChangeset,
    ) -> Option<SubscriptionEntity> {
        let subscription = self
            .subscriptions
            .get_mut(&subscription_id)
            .filter(|subscription| subscription.version == expected_version)?;
        changes.apply_to(subscription);
        Some(subscription.clone())
    }

    fn can_claim(&self, member_id: Uuid, session_ids: &[Uuid]) -> bool {
        session_ids.iter().all(|session_id| {
            self.sessions.get(session_id).is_some_and(|session| {
                session.member_id == member_id
                    && session.status() == Some(SessionStatus::Completed)
                    && session.counted_in_subscription_id.is_none()
            })
        })
    }

    /// Caller must have checked [`Self::can_claim`]. Nothing is written when the
    /// purchase payments overflow the paid amount.
    fn insert_bundle(&mut self, bundle: NewSubscriptionBundle) -> Result<Option<SubscriptionEntity>> {
        let subscription_id = bundle.subscription.id;
        checked_sum(bundle.payments.iter().map(|payment| payment.amount_minor))
            .ok_or_else(|| anyhow!("paid amount of subscription {subscription_id} overflows"))?;

        let subscription = SubscriptionEntity::from(bundle.subscription);
        self.subscriptions.insert(subscription_id, subscription);

        for session_id in &bundle.counted_session_ids {
            if let Some(session) = self.sessions.get_mut(session_id) {
                session.counted_in_subscription_id = Some(subscription_id);
            }
        }
        self.payments
            .extend(bundle.payments.into_iter().map(PaymentEntity::from));

        self.reconcile(subscription_id)
    }

    /// Sum of completed payments plus `pending_minor`, failing on overflow.
    fn paid_total(&self, subscription_id: Uuid, pending_minor: i64) -> Result<i64> {
        checked_sum(
            self.payments
                .iter()
                .filter(|payment| payment.subscription_id == subscription_id && payment.is_completed())
                .map(|payment| payment.amount_minor)
                .chain(std::iter::once(pending_minor)),
        )
        .ok_or_else(|| anyhow!("paid amount of subscription {subscription_id} overflows"))
    }

    fn reconcile(&mut self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let paid_amount_minor = self.paid_total(subscription_id, 0)?;

        let Some(subscription) = self.subscriptions.get_mut(&subscription_id) else {
            return Ok(None);
        };
        subscription.paid_amount_minor = paid_amount_minor;
        subscription.version += 1;
        subscription.updated_at = Utc::now();
        Ok(Some(subscription.clone()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    pub fn insert_plan(&self, plan: PlanEntity) -> Result<()> {
        self.state()?.plans.insert(plan.id, plan);
        Ok(())
    }

    pub fn insert_session(&self, session: TrainingSessionEntity) -> Result<()> {
        self.state()?.sessions.insert(session.id, session);
        Ok(())
    }

    /// Stores a row as is, bypassing every guard. For seeding and repair scenarios.
    pub fn insert_subscription(&self, subscription: SubscriptionEntity) -> Result<()> {
        self.state()?
            .subscriptions
            .insert(subscription.id, subscription);
        Ok(())
    }

    /// Appends a payment without reconciling, as an external writer would.
    pub fn insert_payment(&self, payment: InsertPaymentEntity) -> Result<()> {
        self.state()?.payments.push(PaymentEntity::from(payment));
        Ok(())
    }

    pub fn session(&self, session_id: Uuid) -> Result<Option<TrainingSessionEntity>> {
        Ok(self.state()?.sessions.get(&session_id).cloned())
    }
}

#[async_trait]
impl PlanRepository for MemoryStore {
    async fn find_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        Ok(self.state()?.plans.get(&plan_id).cloned())
    }

    async fn list_active_plans(&self) -> Result<Vec<PlanEntity>> {
        let mut plans: Vec<PlanEntity> = self
            .state()?
            .plans
            .values()
            .filter(|plan| plan.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|plan| plan.price_minor);
        Ok(plans)
    }
}

#[async_trait]
impl TrainingSessionRepository for MemoryStore {
    async fn find_latest_trial(&self, member_id: Uuid) -> Result<Option<TrainingSessionEntity>> {
        Ok(self
            .state()?
            .sessions
            .values()
            .filter(|session| {
                session.member_id == member_id && session.session_type() == Some(SessionType::Trial)
            })
            .max_by_key(|session| session.scheduled_start)
            .cloned())
    }

    async fn list_uncounted_completed_contractual_since(
        &self,
        member_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<TrainingSessionEntity>> {
        let mut sessions: Vec<TrainingSessionEntity> = self
            .state()?
            .sessions
            .values()
            .filter(|session| {
                session.member_id == member_id
                    && session.session_type() == Some(SessionType::Contractual)
                    && session.status() == Some(SessionStatus::Completed)
                    && session.scheduled_start >= since
                    && session.counted_in_subscription_id.is_none()
            })
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.scheduled_start);
        Ok(sessions)
    }

    async fn list_counted_in(&self, subscription_id: Uuid) -> Result<Vec<TrainingSessionEntity>> {
        let mut sessions: Vec<TrainingSessionEntity> = self
            .state()?
            .sessions
            .values()
            .filter(|session| session.counted_in_subscription_id == Some(subscription_id))
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.scheduled_start);
        Ok(sessions)
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        Ok(self.state()?.subscriptions.get(&subscription_id).cloned())
    }

    async fn list_by_member(&self, member_id: Uuid) -> Result<Vec<SubscriptionEntity>> {
        let mut subscriptions: Vec<SubscriptionEntity> = self
            .state()?
            .subscriptions
            .values()
            .filter(|subscription| subscription.member_id == member_id)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subscriptions)
    }

    async fn list_predecessors(&self, successor_id: Uuid) -> Result<Vec<SubscriptionEntity>> {
        Ok(self
            .state()?
            .subscriptions
            .values()
            .filter(|subscription| subscription.upgraded_to_id == Some(successor_id))
            .cloned()
            .collect())
    }

    async fn update_guarded(
        &self,
        subscription_id: Uuid,
        expected_version: i32,
        changes: SubscriptionChangeset,
    ) -> Result<Option<SubscriptionEntity>> {
        tokio::task::yield_now().await;
        Ok(self
            .state()?
            .guarded_update(subscription_id, expected_version, &changes))
    }

    async fn create_subscription(
        &self,
        bundle: NewSubscriptionBundle,
    ) -> Result<Option<SubscriptionEntity>> {
        tokio::task::yield_now().await;
        let mut state = self.state()?;

        if !state.can_claim(bundle.subscription.member_id, &bundle.counted_session_ids) {
            return Ok(None);
        }
        state.insert_bundle(bundle)
    }

    async fn create_upgrade(
        &self,
        bundle: NewSubscriptionBundle,
        supersede: SupersedeSubscription,
    ) -> Result<Option<UpgradedSubscriptions>> {
        tokio::task::yield_now().await;
        let mut state = self.state()?;

        let predecessor_current = state
            .subscriptions
            .get(&supersede.predecessor_id)
            .is_some_and(|subscription| subscription.version == supersede.expected_version);
        if !predecessor_current
            || !state.can_claim(bundle.subscription.member_id, &bundle.counted_session_ids)
        {
            return Ok(None);
        }

        let successor = state
            .insert_bundle(bundle)?
            .ok_or_else(|| anyhow!("successor vanished while inserting"))?;
        let predecessor = state
            .guarded_update(
                supersede.predecessor_id,
                supersede.expected_version,
                &supersede.changes,
            )
            .ok_or_else(|| anyhow!("predecessor changed while holding the lock"))?;

        Ok(Some(UpgradedSubscriptions {
            predecessor,
            successor,
        }))
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn record_and_reconcile(
        &self,
        payment: InsertPaymentEntity,
    ) -> Result<Option<RecordedPayment>> {
        tokio::task::yield_now().await;
        let mut state = self.state()?;

        if !state.subscriptions.contains_key(&payment.subscription_id) {
            return Ok(None);
        }

        let existing = state
            .payments
            .iter()
            .find(|existing| existing.id == payment.id)
            .cloned();
        let subscription_id = payment.subscription_id;
        let stored = match existing {
            // Returned as stored so the caller can tell a retry from a reused id.
            Some(existing) => existing,
            None => {
                state.paid_total(subscription_id, payment.amount_minor)?;
                let stored = PaymentEntity::from(payment);
                state.payments.push(stored.clone());
                stored
            }
        };

        Ok(state
            .reconcile(subscription_id)?
            .map(|subscription| RecordedPayment {
                payment: stored,
                subscription,
            }))
    }

    async fn reconcile(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        tokio::task::yield_now().await;
        self.state()?.reconcile(subscription_id)
    }

    async fn list_by_subscription(&self, subscription_id: Uuid) -> Result<Vec<PaymentEntity>> {
        Ok(self
            .state()?
            .payments
            .iter()
            .filter(|payment| payment.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}
