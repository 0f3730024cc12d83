use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::payments::PaymentEntity,
    value_objects::{
        enums::{payment_methods::PaymentMethod, payment_statuses::PaymentStatus},
        subscriptions::SubscriptionBalance,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentModel {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub member_id: Uuid,
    pub amount_minor: i64,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentEntity> for PaymentModel {
    fn from(value: PaymentEntity) -> Self {
        Self {
            id: value.id,
            subscription_id: value.subscription_id,
            member_id: value.member_id,
            amount_minor: value.amount_minor,
            payment_method: PaymentMethod::from_str(&value.payment_method),
            payment_status: PaymentStatus::from_str(&value.payment_status),
            payment_date: value.payment_date,
            reference: value.reference,
            notes: value.notes,
            processed_by: value.processed_by,
            created_at: value.created_at,
        }
    }
}

/// A recorded payment together with the subscription balance after reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub payment: PaymentModel,
    pub balance: SubscriptionBalance,
}
