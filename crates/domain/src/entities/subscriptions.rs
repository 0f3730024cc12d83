use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    entities::payments::InsertPaymentEntity,
    schema::member_subscriptions,
    value_objects::{
        enums::subscription_statuses::SubscriptionStatus, subscription_lifecycle::SessionQuota,
    },
};

/// A member subscription with the plan terms snapshotted at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = member_subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub member_id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub total_sessions: i32,
    pub used_sessions: i32,
    pub total_amount_minor: i64,
    pub signup_fee_minor: i64,
    pub signup_fee_paid: bool,
    pub paid_amount_minor: i64,
    pub duration_days: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub pause_start_date: Option<DateTime<Utc>>,
    pub pause_end_date: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub upgraded_to_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionEntity {
    pub fn lifecycle_status(&self) -> Result<SubscriptionStatus> {
        SubscriptionStatus::from_str(&self.status).ok_or_else(|| {
            anyhow!(
                "subscription {} has unknown status {:?}",
                self.id,
                self.status
            )
        })
    }

    pub fn quota(&self) -> SessionQuota {
        SessionQuota {
            used: self.used_sessions,
            total: self.total_sessions,
        }
    }

    /// Plan price plus the signup fee charged at purchase, saturating at `i64::MAX`.
    pub fn total_due_minor(&self) -> i64 {
        self.total_amount_minor.saturating_add(self.signup_fee_minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = member_subscriptions)]
pub struct InsertSubscriptionEntity {
    pub id: Uuid,
    pub member_id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub total_sessions: i32,
    pub used_sessions: i32,
    pub total_amount_minor: i64,
    pub signup_fee_minor: i64,
    pub signup_fee_paid: bool,
    pub paid_amount_minor: i64,
    pub duration_days: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<InsertSubscriptionEntity> for SubscriptionEntity {
    fn from(value: InsertSubscriptionEntity) -> Self {
        Self {
            id: value.id,
            member_id: value.member_id,
            plan_id: value.plan_id,
            plan_name: value.plan_name,
            total_sessions: value.total_sessions,
            used_sessions: value.used_sessions,
            total_amount_minor: value.total_amount_minor,
            signup_fee_minor: value.signup_fee_minor,
            signup_fee_paid: value.signup_fee_paid,
            paid_amount_minor: value.paid_amount_minor,
            duration_days: value.duration_days,
            start_date: value.start_date,
            end_date: value.end_date,
            status: value.status,
            pause_start_date: None,
            pause_end_date: None,
            pause_reason: None,
            upgraded_to_id: None,
            notes: value.notes,
            created_by: value.created_by,
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// Fields a guarded update may touch. `None` leaves a column as is;
/// `Some(None)` clears a nullable column. `version` is bumped by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, AsChangeset)]
#[diesel(table_name = member_subscriptions)]
pub struct SubscriptionChangeset {
    pub used_sessions: Option<i32>,
    pub status: Option<String>,
    pub pause_start_date: Option<Option<DateTime<Utc>>>,
    pub pause_end_date: Option<Option<DateTime<Utc>>>,
    pub pause_reason: Option<Option<String>>,
    pub upgraded_to_id: Option<Option<Uuid>>,
    pub notes: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SubscriptionChangeset {
    /// Applies the changeset the way the store does, including the version bump.
    pub fn apply_to(&self, subscription: &mut SubscriptionEntity) {
        if let Some(used_sessions) = self.used_sessions {
            subscription.used_sessions = used_sessions;
        }
        if let Some(status) = &self.status {
            subscription.status = status.clone();
        }
        if let Some(pause_start_date) = self.pause_start_date {
            subscription.pause_start_date = pause_start_date;
        }
        if let Some(pause_end_date) = self.pause_end_date {
            subscription.pause_end_date = pause_end_date;
        }
        if let Some(pause_reason) = &self.pause_reason {
            subscription.pause_reason = pause_reason.clone();
        }
        if let Some(upgraded_to_id) = self.upgraded_to_id {
            subscription.upgraded_to_id = upgraded_to_id;
        }
        if let Some(notes) = &self.notes {
            subscription.notes = notes.clone();
        }
        if let Some(updated_at) = self.updated_at {
            subscription.updated_at = updated_at;
        }
        subscription.version += 1;
    }
}

/// Everything that must land together when a subscription is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscriptionBundle {
    pub subscription: InsertSubscriptionEntity,
    /// Completed sessions to mark as counted in the new subscription. The
    /// write fails as a whole if any of them has been claimed meanwhile.
    pub counted_session_ids: Vec<Uuid>,
    /// Payments taken at purchase, recorded before `paid_amount_minor` is reconciled.
    pub payments: Vec<InsertPaymentEntity>,
}

/// Predecessor cancellation written in the same transaction as its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupersedeSubscription {
    pub predecessor_id: Uuid,
    pub expected_version: i32,
    pub changes: SubscriptionChangeset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradedSubscriptions {
    pub predecessor: SubscriptionEntity,
    pub successor: SubscriptionEntity,
}
