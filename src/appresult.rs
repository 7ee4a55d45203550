use std::fmt::{Debug, Display};

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: anyhow::Error,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self { status, error: anyhow::Error::msg(msg) }
    }

    pub fn bad_request(msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "User not authenticated")
    }

    pub fn forbidden(msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn unprocessable(msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }

    /// Prefixes the message the user sees, keeping the status.
    pub fn context(self, msg: impl Display + Send + Sync + 'static) -> Self {
        Self { status: self.status, error: self.error.context(msg) }
    }

    /// Full `prefix: cause` chain, as shown in the toast.
    pub fn message(&self) -> String {
        format!("{:#}", self.error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{:#}\n{}", self.error, self.error.backtrace());
        } else {
            tracing::debug!(status = %self.status, "{:#}", self.error);
        }

        (
            self.status,
            Json(json!({ "error": self.message() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, error: err.into() }
    }
}

/// `.context(..)` for whole results, so call sites read like anyhow's.
pub trait ResultExt<T> {
    fn context(self, msg: &'static str) -> AppResult<T>;
}

impl<T> ResultExt<T> for AppResult<T> {
    fn context(self, msg: &'static str) -> AppResult<T> {
        self.map_err(|e| e.context(msg))
    }
}

/// True when the database rejected a write because of a UNIQUE constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.is_unique_violation())
}
