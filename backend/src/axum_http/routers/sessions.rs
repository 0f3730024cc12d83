use std::sync::Arc;

use application::{
    interfaces::clock::SystemClock,
    usecases::{ConflictPolicy, session_accountant::SessionAccountantUseCase},
};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::post,
};
use infra::postgres::{
    postgres_connection::PgPoolSquad, repositories::subscriptions::SubscriptionPostgres,
};
use tracing::info;
use uuid::Uuid;

use super::respond;
use crate::auth::AuthStaff;

type Accountant = SessionAccountantUseCase<SubscriptionPostgres, SystemClock>;

pub fn routes(db_pool: Arc<PgPoolSquad>, policy: ConflictPolicy) -> Router {
    let accountant = SessionAccountantUseCase::new(
        Arc::new(SubscriptionPostgres::new(db_pool)),
        Arc::new(SystemClock),
        policy,
    );

    Router::new()
        .route("/subscriptions/:id/sessions/consume", post(consume))
        .route("/subscriptions/:id/sessions/restore", post(restore))
        .with_state(Arc::new(accountant))
}

pub async fn consume(
    State(accountant): State<Arc<Accountant>>,
    staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    info!(staff_id = %staff.staff_id, %subscription_id, "sessions: consume received");
    respond(
        "consume_session",
        StatusCode::OK,
        accountant.consume_session(subscription_id).await,
    )
}

pub async fn restore(
    State(accountant): State<Arc<Accountant>>,
    staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    info!(staff_id = %staff.staff_id, %subscription_id, "sessions: restore received");
    respond(
        "restore_session",
        StatusCode::OK,
        accountant.restore_session(subscription_id).await,
    )
}
