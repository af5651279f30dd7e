//! Engine error to HTTP response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdk_engine::EngineError;
use pdk_workflow::WorkflowError;
use tracing::error;

use crate::api_types::ErrorResponse;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }
}

pub fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::RoleNotAuthorized { .. } => StatusCode::FORBIDDEN,
        WorkflowError::PoleConflict { .. }
        | WorkflowError::TransitionNotAllowed { .. }
        | WorkflowError::InvalidCurrentState { .. }
        | WorkflowError::InvalidRollbackTarget { .. } => StatusCode::CONFLICT,
        WorkflowError::MissingPrecondition { .. } | WorkflowError::InvalidAssignee { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Workflow(w) => ApiError::new(status_for(&w), w.code(), w.to_string()),
            EngineError::Storage(e) => {
                // Details stay in the log.
                error!(error = %format!("{e:#}"), "storage failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE",
                    "internal storage error",
                )
            }
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        EngineError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
