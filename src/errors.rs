use crate::models::TransactionId;
use axum::http::StatusCode;
use thiserror::Error;

/// Why the remote backend is not in use.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("remote backend is not configured")]
    ConfigurationAbsent,
    #[error("remote backend failed to initialise: {0}")]
    InitFailure(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),
    #[error("{0}")]
    Write(String),
    #[error("transaction {0} not found")]
    NotFound(TransactionId),
    /// The backend refused the session even after a token refresh.
    #[error("session expired: {0}")]
    Unauthorized(String),
}

/// Rejected input. Raised before any backend call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("date is required")]
    MissingDate,
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("remote backend is not active")]
    Unavailable,
    #[error("email and password (min 6 characters) are required")]
    InvalidInput,
    #[error("{0}")]
    Rejected(String),
    #[error("identity provider unreachable: {0}")]
    Transport(String),
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            StoreError::Query(_) | StoreError::Write(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::Unavailable | AuthError::InvalidInput => StatusCode::BAD_REQUEST,
            AuthError::Rejected(_) => StatusCode::UNAUTHORIZED,
            AuthError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
