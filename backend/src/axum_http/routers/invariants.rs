use std::sync::Arc;

use application::{interfaces::clock::SystemClock, usecases::invariants::InvariantAuditUseCase};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
};
use infra::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{
        payments::PaymentPostgres, subscriptions::SubscriptionPostgres,
        training_sessions::TrainingSessionPostgres,
    },
};
use uuid::Uuid;

use super::respond;
use crate::auth::AuthStaff;

type Audit =
    InvariantAuditUseCase<SubscriptionPostgres, TrainingSessionPostgres, PaymentPostgres, SystemClock>;

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let audit = InvariantAuditUseCase::new(
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(TrainingSessionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PaymentPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SystemClock),
    );

    Router::new()
        .route("/subscriptions/:id/invariants", get(check))
        .with_state(Arc::new(audit))
}

pub async fn check(
    State(audit): State<Arc<Audit>>,
    _staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    respond("check_invariants", StatusCode::OK, audit.check(subscription_id).await)
}
