use axiant::CacheError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use core_access::AccountError;
use serde_json::json;
use std::fmt::Debug;
use tracing::{error, warn};

const INTERNAL: &str = "An internal server error occurred.";
const UNAVAILABLE: &str = "Database connection unavailable. Please try again later.";

// Client errors are the caller's concern and are not logged here.
fn log_failure(kind: &str, status: StatusCode, err: &impl Debug) {
    if status == StatusCode::SERVICE_UNAVAILABLE {
        warn!("{kind}: {err:?}");
    } else if status.is_server_error() {
        error!("{kind}: {err:?}");
    }
}

/// A custom error type for the server application.
///
/// This enum encapsulates different kinds of errors that can occur within the server,
/// allowing them to be converted into appropriate HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors originating from the cache, provider and reconciliation layers.
    Cache(CacheError),
    /// Errors originating from the account lifecycle.
    Account(AccountError),
    /// A malformed request rejected by the handler itself.
    BadRequest(String),
    /// Generic internal server errors.
    Internal(anyhow::Error),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err)
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        AppError::Account(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, error_message) = match self {
            AppError::Cache(err) => {
                let status = match &err {
                    CacheError::Validation(_) | CacheError::Conflict(_) => StatusCode::BAD_REQUEST,
                    CacheError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                log_failure("CacheError", status, &err);
                let message = match err {
                    CacheError::Validation(msg) | CacheError::Conflict(msg) => msg,
                    CacheError::Connectivity(_) => UNAVAILABLE.to_string(),
                    _ => INTERNAL.to_string(),
                };
                (status, message)
            }
            AppError::Account(err) => {
                let status = match &err {
                    AccountError::Validation(_)
                    | AccountError::Conflict(_)
                    | AccountError::AlreadyVerified
                    | AccountError::InvalidCode(_) => StatusCode::BAD_REQUEST,
                    AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                    AccountError::NotVerified => StatusCode::FORBIDDEN,
                    AccountError::NotFound(_) => StatusCode::NOT_FOUND,
                    AccountError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
                    AccountError::Storage(_) | AccountError::Hashing(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                log_failure("AccountError", status, &err);
                let message = match err {
                    AccountError::Validation(msg) => msg,
                    AccountError::Conflict(_) => "Email already exists".to_string(),
                    AccountError::NotFound(_) => "User not found".to_string(),
                    AccountError::InvalidCredentials => "Invalid credentials".to_string(),
                    AccountError::InvalidCode(_) => "Invalid or expired OTP".to_string(),
                    AccountError::Connectivity(_) => UNAVAILABLE.to_string(),
                    AccountError::Storage(_) | AccountError::Hashing(_) => INTERNAL.to_string(),
                    other => other.to_string(),
                };
                (status, message)
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Internal(err) => {
                error!("Internal server error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status_code, body).into_response()
    }
}
