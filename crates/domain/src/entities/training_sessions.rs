use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    schema::training_sessions,
    value_objects::enums::{session_statuses::SessionStatus, session_types::SessionType},
};

#[derive(Debug, Clone, PartialEq, Eq, Identifiable, Selectable, Queryable, Insertable)]
#[diesel(table_name = training_sessions)]
pub struct TrainingSessionEntity {
    pub id: Uuid,
    pub member_id: Uuid,
    pub session_type: String,
    pub status: String,
    pub scheduled_start: DateTime<Utc>,
    pub counted_in_subscription_id: Option<Uuid>,
}

impl TrainingSessionEntity {
    pub fn session_type(&self) -> Option<SessionType> {
        SessionType::from_str(&self.session_type)
    }

    pub fn status(&self) -> Option<SessionStatus> {
        SessionStatus::from_str(&self.status)
    }
}
