use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::{plans::PlanEntity, subscriptions::SubscriptionEntity},
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};

/// Amount owed against a subscription. Overpayment is reported as
/// `credit_balance_minor` rather than as a negative outstanding amount.
///
/// `paid_amount_minor` is the sum of completed payments. For a subscription
/// created by an upgrade this includes the `credit` payment carrying the
/// predecessor's unused value, which was applied rather than collected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionBalance {
    pub total_due_minor: i64,
    pub paid_amount_minor: i64,
    pub outstanding_minor: i64,
    pub credit_balance_minor: i64,
}

impl SubscriptionBalance {
    pub fn of(subscription: &SubscriptionEntity) -> Self {
        let total_due_minor = subscription.total_due_minor();
        let difference = i128::from(total_due_minor) - i128::from(subscription.paid_amount_minor);

        Self {
            total_due_minor,
            paid_amount_minor: subscription.paid_amount_minor,
            outstanding_minor: saturate(difference.max(0)),
            credit_balance_minor: saturate((-difference).max(0)),
        }
    }
}

fn saturate(amount: i128) -> i64 {
    i64::try_from(amount).unwrap_or(if amount < 0 { i64::MIN } else { i64::MAX })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionModel {
    pub id: Uuid,
    pub member_id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub total_sessions: i32,
    pub used_sessions: i32,
    pub remaining_sessions: i32,
    pub total_amount_minor: i64,
    pub signup_fee_minor: i64,
    pub signup_fee_paid: bool,
    pub duration_days: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: SubscriptionStatus,
    pub pause_start_date: Option<DateTime<Utc>>,
    pub pause_end_date: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub upgraded_to_id: Option<Uuid>,
    pub notes: Option<String>,
    pub balance: SubscriptionBalance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionModel {
    pub fn new(subscription: SubscriptionEntity, status: SubscriptionStatus) -> Self {
        let balance = SubscriptionBalance::of(&subscription);
        let remaining_sessions = subscription.quota().remaining();

        Self {
            id: subscription.id,
            member_id: subscription.member_id,
            plan_id: subscription.plan_id,
            plan_name: subscription.plan_name,
            total_sessions: subscription.total_sessions,
            used_sessions: subscription.used_sessions,
            remaining_sessions,
            total_amount_minor: subscription.total_amount_minor,
            signup_fee_minor: subscription.signup_fee_minor,
            signup_fee_paid: subscription.signup_fee_paid,
            duration_days: subscription.duration_days,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            status,
            pause_start_date: subscription.pause_start_date,
            pause_end_date: subscription.pause_end_date,
            pause_reason: subscription.pause_reason,
            upgraded_to_id: subscription.upgraded_to_id,
            notes: subscription.notes,
            balance,
            created_at: subscription.created_at,
            updated_at: subscription.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanDto {
    pub id: Uuid,
    pub name: String,
    pub price_minor: i64,
    pub signup_fee_minor: i64,
    pub sessions_count: i32,
    pub duration_months: i32,
}

impl From<PlanEntity> for PlanDto {
    fn from(value: PlanEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            price_minor: value.price_minor,
            signup_fee_minor: value.signup_fee_minor,
            sessions_count: value.sessions_count,
            duration_months: value.duration_months,
        }
    }
}

/// Upgrade credit for a subscription, as shown to staff before upgrading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpgradeCreditModel {
    pub subscription_id: Uuid,
    pub remaining_sessions: i32,
    pub price_per_session_minor: i64,
    pub credit_minor: i64,
}
