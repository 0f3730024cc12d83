use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::subscription_plans;

/// Catalog entry. Read-only to the accounting engine.
#[derive(Debug, Clone, PartialEq, Eq, Identifiable, Selectable, Queryable, Insertable)]
#[diesel(table_name = subscription_plans)]
pub struct PlanEntity {
    pub id: Uuid,
    pub name: String,
    pub price_minor: i64,
    pub signup_fee_minor: i64,
    pub sessions_count: i32,
    pub duration_months: i32,
    pub is_active: bool,
}
