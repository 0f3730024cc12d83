use application::errors::AccountingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Accounting(err) => match err {
                AccountingError::PlanNotFound(_) | AccountingError::SubscriptionNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                AccountingError::InvalidStateTransition { .. }
                | AccountingError::CreditMismatch { .. }
                | AccountingError::PaymentIdConflict(_)
                | AccountingError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
                AccountingError::QuotaExhausted { .. } | AccountingError::NothingToRestore => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AccountingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                AccountingError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Don't leak internal error detail to client
            error!(error = ?self, "backend: request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}
