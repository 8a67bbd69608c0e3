//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use settlehook_core::{RegistryError, ValidationError};
use tracing::{error, warn};

/// Management API errors with HTTP status code mapping
///
/// - `400 Bad Request`: invalid registration input, status transitions or IDs
/// - `404 Not Found`: the referenced subscription does not exist
/// - `500 Internal Server Error`: registry backend failures
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("Invalid subscription id: {value}")]
    InvalidId { value: String },

    #[error("Subscription not found: {id}")]
    NotFound { id: String },

    /// Details are logged; the client gets a generic message
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::InvalidInput(e) => ApiError::InvalidInput(e),
            RegistryError::Storage { message } => ApiError::Internal { message },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidInput(_) | Self::InvalidId { .. } => {
                warn!(error = %self, "Rejected management request");
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Internal { ref message } => {
                error!(error = %message, "Internal server error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error occurred. Please try again later.".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to load configuration: {message}")]
    Load { message: String },
}
