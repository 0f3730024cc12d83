#![allow(dead_code)]

use std::sync::Arc;

use application::{
    interfaces::clock::Clock,
    usecases::{
        ConflictPolicy, invariants::InvariantAuditUseCase, payment_recorder::PaymentRecorderUseCase,
        session_accountant::SessionAccountantUseCase, subscription_ledger::SubscriptionLedgerUseCase,
    },
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use domain::{
    entities::{plans::PlanEntity, training_sessions::TrainingSessionEntity},
    value_objects::enums::{session_statuses::SessionStatus, session_types::SessionType},
};
use infra::memory::MemoryStore;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Day 0 of every scenario.
pub fn day(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap() + Duration::days(offset)
}

pub type Ledger = SubscriptionLedgerUseCase<MemoryStore, MemoryStore, MemoryStore, FixedClock>;
pub type Accountant = SessionAccountantUseCase<MemoryStore, FixedClock>;
pub type Recorder = PaymentRecorderUseCase<MemoryStore, MemoryStore, FixedClock>;
pub type Audit = InvariantAuditUseCase<MemoryStore, MemoryStore, MemoryStore, FixedClock>;

pub struct Gym {
    pub store: Arc<MemoryStore>,
    pub ledger: Ledger,
    pub accountant: Arc<Accountant>,
    pub recorder: Recorder,
    pub audit: Audit,
}

impl Gym {
    pub fn open_on(now: DateTime<Utc>, policy: ConflictPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock(now));

        Self {
            ledger: SubscriptionLedgerUseCase::new(
                Arc::clone(&store),
                Arc::clone(&store),
                Arc::clone(&store),
                Arc::clone(&clock),
                policy,
            ),
            accountant: Arc::new(SessionAccountantUseCase::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                policy,
            )),
            recorder: PaymentRecorderUseCase::new(
                Arc::clone(&store),
                Arc::clone(&store),
                Arc::clone(&clock),
            ),
            audit: InvariantAuditUseCase::new(
                Arc::clone(&store),
                Arc::clone(&store),
                Arc::clone(&store),
                Arc::clone(&clock),
            ),
            store,
        }
    }

    pub fn open() -> Self {
        Self::open_on(day(3), ConflictPolicy::default())
    }

    pub fn add_plan(&self, name: &str, price_minor: i64, signup_fee_minor: i64, sessions_count: i32) -> Uuid {
        let plan = PlanEntity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price_minor,
            signup_fee_minor,
            sessions_count,
            duration_months: 3,
            is_active: true,
        };
        let plan_id = plan.id;
        self.store.insert_plan(plan).unwrap();
        plan_id
    }

    pub fn add_session(
        &self,
        member_id: Uuid,
        session_type: SessionType,
        status: SessionStatus,
        on_day: i64,
    ) -> Uuid {
        let session = TrainingSessionEntity {
            id: Uuid::new_v4(),
            member_id,
            session_type: session_type.to_string(),
            status: status.to_string(),
            scheduled_start: day(on_day),
            counted_in_subscription_id: None,
        };
        let session_id = session.id;
        self.store.insert_session(session).unwrap();
        session_id
    }
}
