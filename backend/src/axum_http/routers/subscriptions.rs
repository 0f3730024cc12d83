use std::sync::Arc;

use application::{
    interfaces::clock::SystemClock,
    usecases::{
        ConflictPolicy,
        subscription_ledger::{
            CreateSubscriptionInput, SubscriptionLedgerUseCase, UpgradeSubscriptionInput,
        },
    },
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
    repositories::{
        plans::PlanPostgres, subscriptions::SubscriptionPostgres,
        training_sessions::TrainingSessionPostgres,
    },
};
use tracing::info;
use uuid::Uuid;

use super::{ReasonBody, respond};
use crate::auth::AuthStaff;

type Ledger =
    SubscriptionLedgerUseCase<PlanPostgres, SubscriptionPostgres, TrainingSessionPostgres, SystemClock>;

pub fn routes(db_pool: Arc<PgPoolSquad>, policy: ConflictPolicy) -> Router {
    let ledger = SubscriptionLedgerUseCase::new(
        Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(TrainingSessionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SystemClock),
        policy,
    );

    Router::new()
        .route("/plans", get(list_plans))
        .route("/subscriptions", post(create))
        .route("/subscriptions/upgrade", post(upgrade))
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/upgrade-credit", get(upgrade_credit))
        .route("/subscriptions/:id/pause", post(pause))
        .route("/subscriptions/:id/resume", post(resume))
        .route("/subscriptions/:id/cancel", post(cancel))
        .route("/members/:member_id/subscriptions", get(list_member_subscriptions))
        .with_state(Arc::new(ledger))
}

pub async fn list_plans(State(ledger): State<Arc<Ledger>>, _staff: AuthStaff) -> Response {
    respond("list_plans", StatusCode::OK, ledger.list_active_plans().await)
}

pub async fn create(
    State(ledger): State<Arc<Ledger>>,
    staff: AuthStaff,
    Json(mut payload): Json<CreateSubscriptionInput>,
) -> Response {
    info!(
        staff_id = %staff.staff_id,
        member_id = %payload.member_id,
        plan_id = %payload.plan_id,
        "subscriptions: create received"
    );
    payload.created_by = Some(staff.staff_id);
    respond("create_subscription", StatusCode::CREATED, ledger.create(payload).await)
}

pub async fn upgrade(
    State(ledger): State<Arc<Ledger>>,
    staff: AuthStaff,
    Json(mut payload): Json<UpgradeSubscriptionInput>,
) -> Response {
    info!(
        staff_id = %staff.staff_id,
        current_subscription_id = %payload.current_subscription_id,
        new_plan_id = %payload.new_plan_id,
        "subscriptions: upgrade received"
    );
    payload.created_by = Some(staff.staff_id);
    respond("upgrade_subscription", StatusCode::CREATED, ledger.upgrade(payload).await)
}

pub async fn get_subscription(
    State(ledger): State<Arc<Ledger>>,
    _staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    respond(
        "get_subscription",
        StatusCode::OK,
        ledger.get_subscription(subscription_id).await,
    )
}

pub async fn list_member_subscriptions(
    State(ledger): State<Arc<Ledger>>,
    _staff: AuthStaff,
    Path(member_id): Path<Uuid>,
) -> Response {
    respond(
        "list_member_subscriptions",
        StatusCode::OK,
        ledger.list_member_subscriptions(member_id).await,
    )
}

pub async fn upgrade_credit(
    State(ledger): State<Arc<Ledger>>,
    _staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    respond(
        "upgrade_credit",
        StatusCode::OK,
        ledger.calculate_upgrade_credit(subscription_id).await,
    )
}

pub async fn pause(
    State(ledger): State<Arc<Ledger>>,
    staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> Response {
    info!(staff_id = %staff.staff_id, %subscription_id, "subscriptions: pause received");
    let reason = body.and_then(|Json(body)| body.reason);
    respond("pause", StatusCode::OK, ledger.pause(subscription_id, reason).await)
}

pub async fn resume(
    State(ledger): State<Arc<Ledger>>,
    staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    info!(staff_id = %staff.staff_id, %subscription_id, "subscriptions: resume received");
    respond("resume", StatusCode::OK, ledger.resume(subscription_id).await)
}

pub async fn cancel(
    State(ledger): State<Arc<Ledger>>,
    staff: AuthStaff,
    Path(subscription_id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> Response {
    info!(staff_id = %staff.staff_id, %subscription_id, "subscriptions: cancel received");
    let reason = body.and_then(|Json(body)| body.reason);
    respond("cancel", StatusCode::OK, ledger.cancel(subscription_id, reason).await)
}
