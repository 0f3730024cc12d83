use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    entities::subscriptions::SubscriptionEntity, schema::payments,
    value_objects::enums::payment_statuses::PaymentStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub member_id: Uuid,
    pub amount_minor: i64,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PaymentEntity {
    pub fn is_completed(&self) -> bool {
        self.payment_status == PaymentStatus::Completed.as_str()
    }
}

/// Payments are append-only: there is no changeset for this table.
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub member_id: Uuid,
    pub amount_minor: i64,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<InsertPaymentEntity> for PaymentEntity {
    fn from(value: InsertPaymentEntity) -> Self {
        Self {
            id: value.id,
            subscription_id: value.subscription_id,
            member_id: value.member_id,
            amount_minor: value.amount_minor,
            payment_method: value.payment_method,
            payment_status: value.payment_status,
            payment_date: value.payment_date,
            reference: value.reference,
            notes: value.notes,
            processed_by: value.processed_by,
            created_at: value.created_at,
        }
    }
}

/// Result of inserting a payment and reconciling its subscription in one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPayment {
    pub payment: PaymentEntity,
    pub subscription: SubscriptionEntity,
}
