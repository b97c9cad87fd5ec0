use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use specflow::{ErrorKind, WorkflowError};
use thiserror::Error;

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Workflow(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::PreconditionFailed => StatusCode::CONFLICT,
                ErrorKind::MalformedRecord => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::IoFailure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let label = match &self {
            ApiError::BadRequest(_) => "Bad request",
            ApiError::Workflow(e) => match e.kind() {
                ErrorKind::NotFound => "Not found",
                ErrorKind::PreconditionFailed => "Precondition failed",
                ErrorKind::MalformedRecord => "Malformed record",
                ErrorKind::IoFailure => "Internal server error",
            },
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }
        (status, Json(ErrorResponse::with_details(label, self.to_string()))).into_response()
    }
}
