use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use super::resolver::ResolveError;
use crate::core::QueueError;

/// Failures as the HTTP client sees them. The display text is the
/// response body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Permission denied!")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error("Queue not exists!")]
    QueueNotFound,

    #[error("Queue is empty!")]
    QueueEmpty,

    #[error("File not found!")]
    FileNotFound,

    #[error("{0}")]
    NotAcceptable(&'static str),

    #[error("Internal server error!")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::QueueNotFound | ApiError::FileNotFound => StatusCode::NOT_FOUND,
            ApiError::QueueEmpty => StatusCode::GONE,
            ApiError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Resolution failure while serving a blob. A missing file is a 404
    /// here, whereas on SET it is a 406.
    pub(crate) fn on_read(err: ResolveError) -> Self {
        match err {
            ResolveError::FileNotFound(_) => ApiError::FileNotFound,
            other => other.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(_) => ApiError::QueueNotFound,
            QueueError::Empty(_) => ApiError::QueueEmpty,
            QueueError::InvalidInput(reason) => ApiError::BadRequest(reason),
            QueueError::CapacityExhausted(_) | QueueError::DurabilityFailure(_) => {
                warn!("request rejected: {}", err);
                ApiError::Internal
            }
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidLocator(_) => ApiError::NotAcceptable("Record name not valid!"),
            ResolveError::FileNotFound(_) => ApiError::NotAcceptable("File not exists!"),
            ResolveError::RecordNotFound(_) => ApiError::NotAcceptable("Record not exists!"),
            ResolveError::NotConfigured => ApiError::NotAcceptable("Record storage is not configured!"),
            ResolveError::Io(_) | ResolveError::Database(_) => {
                error!("payload resolution failed: {}", err);
                ApiError::Internal
            }
        }
    }
}
