use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tradeos_core::errors::{DatabaseError, Error as CoreError, SyncError};
use tradeos_onec::ErrorKind as ClientErrorKind;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Database(DatabaseError::NotFound(_)) => StatusCode::NOT_FOUND,
        CoreError::Database(DatabaseError::UniqueViolation(_)) => StatusCode::CONFLICT,
        CoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Validation(_) | CoreError::InvalidConfigValue(_) => StatusCode::BAD_REQUEST,
        CoreError::Sync(SyncError::TaskNotFound(_)) => StatusCode::NOT_FOUND,
        CoreError::Sync(SyncError::IntegrationDisabled(_) | SyncError::TaskFinished(_)) => {
            StatusCode::CONFLICT
        }
        CoreError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::OneC(e) => match e.kind() {
            ClientErrorKind::Auth | ClientErrorKind::Response => StatusCode::BAD_GATEWAY,
            ClientErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        },
        CoreError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Core(e) => core_status(e),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
