use crate::time_arithmetic::TimeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    InvalidTimeFormat(#[from] TimeError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("This time overlaps with another appointment")]
    Conflict { with: Option<Uuid> },
    #[error("Appointment was changed by another request, reload and try again")]
    Stale(Uuid),
    #[error("Appointment outside business hours")]
    OutsideBusinessHours,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SchedulingError::Validation(_)
            | SchedulingError::InvalidTimeFormat(_)
            | SchedulingError::OutsideBusinessHours
            | SchedulingError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            SchedulingError::NotFound(_) => StatusCode::NOT_FOUND,
            SchedulingError::Conflict { .. } | SchedulingError::Stale(_) => StatusCode::CONFLICT,
            SchedulingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for SchedulingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        SchedulingError::Validation(errors.to_string())
    }
}

impl IntoResponse for SchedulingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            SchedulingError::Internal(detail) => {
                error!(%detail, "Request failed with internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}
