use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::application::ports::storage_backend::StorageError;
use crate::domain::files::naming::NameError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `error`.
    pub status: String,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

#[derive(Debug)]
pub enum ApiError {
    Storage(StorageError),
    /// Request rejected before reaching storage (malformed or oversized body).
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::Storage(StorageError::InvalidInput(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Storage(err) => status_of(err),
            ApiError::Rejected { status, .. } => *status,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        match self {
            ApiError::Storage(err) => {
                let (name, size, limit) = match err {
                    StorageError::NotFound(n) | StorageError::NameConflict(n) => {
                        (Some(n.clone()), None, None)
                    }
                    StorageError::SizeExceeded { size, limit } => (None, Some(*size), Some(*limit)),
                    _ => (None, None, None),
                };
                ErrorResponse {
                    status: "error".into(),
                    kind: err.kind().into(),
                    message: err.to_string(),
                    name,
                    size,
                    limit,
                }
            }
            ApiError::Rejected { status, message } => ErrorResponse {
                status: "error".into(),
                kind: if *status == StatusCode::PAYLOAD_TOO_LARGE {
                    "SizeExceeded".into()
                } else {
                    "InvalidInput".into()
                },
                message: message.clone(),
                name: None,
                size: None,
                limit: None,
            },
        }
    }
}

pub fn status_of(err: &StorageError) -> StatusCode {
    match err {
        StorageError::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::NameConflict(_) => StatusCode::CONFLICT,
        StorageError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        StorageError::Unauthenticated => StatusCode::UNAUTHORIZED,
        StorageError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorageError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<NameError> for ApiError {
    fn from(err: NameError) -> Self {
        ApiError::Storage(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Storage(err @ (StorageError::BackendUnavailable(_) | StorageError::Unknown(_))) => {
                tracing::error!(error = ?err, kind = err.kind(), "request_failed");
            }
            other => tracing::debug!(error = ?other, "request_rejected"),
        }
        (self.status(), Json(self.body())).into_response()
    }
}
