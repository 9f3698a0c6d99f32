use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by the data-access layer and the user service.
///
/// Domain outcomes (`DuplicateEmail`, `NotFound`) are distinct variants so
/// callers branch on the tag, never on the message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("connection pool unavailable: {0}")]
    PoolUnavailable(&'static str),

    #[error("connection pool is already connected")]
    AlreadyConnected,

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("user with email {0} already exists")]
    DuplicateEmail(String),

    #[error("user {0} not found")]
    NotFound(i64),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("{0}")]
    Validation(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => AppError::PoolUnavailable("timed out waiting for a connection"),
            sqlx::Error::PoolClosed => AppError::PoolUnavailable("pool is closed"),
            other => AppError::Query(other),
        }
    }
}

impl AppError {
    /// True when the backend rejected a write because of a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Query(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::PoolUnavailable(_) => "POOL_UNAVAILABLE",
            AppError::AlreadyConnected => "INTERNAL_ERROR",
            AppError::Query(_) | AppError::Migrate(_) => "DATABASE_ERROR",
            AppError::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PasswordHash(_) => "INTERNAL_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::PoolUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DuplicateEmail(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AlreadyConnected
            | AppError::Query(_)
            | AppError::Migrate(_)
            | AppError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message; infrastructure details stay in the logs.
    fn user_message(&self) -> String {
        match self {
            AppError::DuplicateEmail(_) | AppError::NotFound(_) | AppError::Validation(_) => {
                self.to_string()
            }
            AppError::PoolUnavailable(reason) => {
                tracing::warn!(%reason, "pool unavailable");
                "Service temporarily unavailable".into()
            }
            other => {
                tracing::error!(error = ?other, "request failed");
                "An internal error occurred".into()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.user_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}
