use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    /// Failure reported by a backing service; the message is passed through.
    #[error("{0}")]
    Remote(String),

    #[error("Could not allocate a unique school ID after {attempts} attempts")]
    IdAllocationExhausted { attempts: u32 },

    #[error("Plan '{tier}' was updated, but propagating it to schools failed: {reason}")]
    PropagationFailed { tier: String, reason: String },

    #[error("Deletion must be confirmed by repeating the school ID")]
    ConfirmationRequired,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Provider(String),

    #[error("Too many attempts. Try again in a few minutes.")]
    RateLimited,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::ConfirmationRequired => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Remote(_) | AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::IdAllocationExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::PropagationFailed { .. } | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => AppError::not_found("Document", path),
            StoreError::AlreadyExists(path) => {
                AppError::Conflict(format!("Document already exists: {path}"))
            }
            StoreError::InvalidPath(_) | StoreError::InvalidField { .. } => {
                AppError::Validation(e.to_string())
            }
            StoreError::Database(_) | StoreError::Unavailable(_) => AppError::Remote(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "Unexpected server error".to_string()
            }
            e => {
                if status.is_server_error() {
                    tracing::error!("{}", e);
                }
                e.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Process initialisation failures. Startup either completes fully or stops
/// with one of these.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Could not connect to the document store: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Could not connect to Redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Could not prepare blob storage: {0}")]
    Blobs(#[source] std::io::Error),

    #[error("Could not bind listener on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let e: AppError = StoreError::NotFound("platformConfig/plans".into()).into();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);

        let e: AppError = StoreError::Unavailable("connection reset".into()).into();
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
        assert!(e.to_string().contains("connection reset"));

        let e: AppError = StoreError::AlreadyExists("schools/SCH2026-10000".into()).into();
        assert_eq!(e.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn exhaustion_is_distinct_from_remote_failure() {
        let e = AppError::IdAllocationExhausted { attempts: 25 };
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(e.to_string().contains("25"));
    }
}
