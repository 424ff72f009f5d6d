use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Every failure a request can end in. Each variant maps to one HTTP status
/// and one machine-readable reason string.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("no price configured for service {service_id} and size {size}")]
    PriceNotFound { service_id: i32, size: String },

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("object storage failure: {0}")]
    ObjectStorage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidInput(_)
            | AppError::InvalidStatus(_)
            | AppError::PriceNotFound { .. } => StatusCode::BAD_REQUEST,
            AppError::ObjectStorage(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::InvalidStatus(_) => "INVALID_STATUS",
            AppError::PriceNotFound { .. } => "PRICE_NOT_FOUND",
            AppError::Storage(_) => "STORAGE_FAILURE",
            AppError::ObjectStorage(_) => "OBJECT_STORAGE_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    /// Unique and foreign key violations become `Conflict`; any other store
    /// error is kept as is.
    pub fn on_constraint(e: sqlx::Error, msg: &str) -> Self {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
                debug!("constraint violation: {}", db.message());
                AppError::conflict(msg)
            }
            _ => AppError::Storage(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    msg: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = if status.is_server_error() {
            error!("{} ({})", self, self.code());
            // database and internal details stay in the log
            match &self {
                AppError::ObjectStorage(_) => self.to_string(),
                _ => "Server Error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            code: self.code(),
            msg,
        };
        (status, Json(body)).into_response()
    }
}
