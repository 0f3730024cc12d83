use std::sync::Arc;

use application::{
    interfaces::clock::SystemClock,
    usecases::payment_recorder::{PaymentRecorderUseCase, RecordPaymentInput},
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use infra::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{payments::PaymentPostgres, subscriptions::SubscriptionPostgres},
};
use tracing::info;
use uuid::Uuid;

use super::respond;
use crate::auth::AuthStaff;

type Recorder = PaymentRecorderUseCase<SubscriptionPostgres, PaymentPostgres, SystemClock>;

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let recorder = PaymentRecorderUseCase::new(
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PaymentPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SystemClock),
    );

    Router::new()
        .route("/payments", post(record))
        .route("/subscriptions/:id/payments", get(list))
        .route("/subscriptions/:id/payments/reconcile", post(reconcile))
        .with_state(Arc::new(recorder))
}

pub async fn record(
    State(recorder): State<Arc<Recorder>>,
    staff: AuthStaff,
    Json(mut payload): Json<RecordPaymentInput>,
) -> Response {
    info!(
        staff_id = %staff.staff_id,
        subscription_id = %payload.subscription_id,
        amount_minor = payload.amount_minor,
        "payments: record received"
    );
    payload.processed_by = Some(staff.staff_id);
    respond("record_payment", StatusCode::CREATED, recorder.record(payload).await)
}

pub async fn list(
    State(recorder): State<Arc<Recorder>>,
    _staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    respond(
        "list_payments",
        StatusCode::OK,
        recorder.list_payments(subscription_id).await,
    )
}

pub async fn reconcile(
    State(recorder): State<Arc<Recorder>>,
    staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    info!(staff_id = %staff.staff_id, %subscription_id, "payments: reconcile received");
    respond(
        "reconcile_payments",
        StatusCode::OK,
        recorder.reconcile(subscription_id).await,
    )
}
