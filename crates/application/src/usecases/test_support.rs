use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use domain::{
    entities::{plans::PlanEntity, subscriptions::SubscriptionEntity},
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};
use uuid::Uuid;

use crate::interfaces::clock::MockClock;

pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
}

pub(crate) fn fixed_clock() -> MockClock {
    let mut clock = MockClock::new();
    clock.expect_now().return_const(fixed_now());
    clock
}

pub(crate) fn sample_plan(id: Uuid) -> PlanEntity {
    PlanEntity {
        id,
        name: "10 Sessions".to_string(),
        price_minor: 10_000,
        signup_fee_minor: 2_500,
        sessions_count: 10,
        duration_months: 3,
        is_active: true,
    }
}

pub(crate) fn sample_subscription() -> SubscriptionEntity {
    let now = fixed_now();
    SubscriptionEntity {
        id: Uuid::new_v4(),
        member_id: Uuid::new_v4(),
        plan_id: Uuid::new_v4(),
        plan_name: "10 Sessions".to_string(),
        total_sessions: 10,
        used_sessions: 0,
        total_amount_minor: 10_000,
        signup_fee_minor: 0,
        signup_fee_paid: false,
        paid_amount_minor: 0,
        duration_days: 92,
        start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        status: SubscriptionStatus::Active.to_string(),
        pause_start_date: None,
        pause_end_date: None,
        pause_reason: None,
        upgraded_to_id: None,
        notes: None,
        created_by: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}
