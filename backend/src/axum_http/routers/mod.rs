pub mod invariants;
pub mod payments;
pub mod sessions;
pub mod subscriptions;

use application::errors::AccountingResult;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error_responses::AppError;

/// Optional body of pause and cancel requests.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) fn respond<T: Serialize>(label: &str, status: StatusCode, result: AccountingResult<T>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => map_error(label, err.into()),
    }
}

fn map_error(label: &str, err: AppError) -> Response {
    let status = err.status();
    if status.is_client_error() {
        warn!(
            status = status.as_u16(),
            error = %err,
            "backend: {} rejected",
            label
        );
    }
    err.into_response()
}
