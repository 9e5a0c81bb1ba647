// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Structured error body returned by the HTTP surface.
#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Serialize, Debug)]
struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Errors of the application shell: configuration, start-up and admin routes.
///
/// The credential core never produces these. `KeyManager` signals absence with
/// `None` and the resilience wrapper folds every failure into its envelope.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String, line: Option<usize> },

    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParsing(#[from] serde_yaml::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client build error: {0}")]
    HttpClientBuild(#[source] reqwest::Error),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not Found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn config_validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    fn to_status_and_details(&self) -> (StatusCode, ErrorDetails) {
        match self {
            // --- 5xx: log internals, send a generic message ---
            Self::ConfigNotFound { path } => {
                error!(config.path = %path, "Configuration file not found");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "CONFIG_ERROR".to_string(),
                        message: "Internal server configuration error".to_string(),
                        details: None,
                    },
                )
            }
            Self::ConfigParse { message, .. } | Self::ConfigValidation { message, .. } => {
                error!("Configuration error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "CONFIG_ERROR".to_string(),
                        message: "Internal server configuration error".to_string(),
                        details: None,
                    },
                )
            }
            Self::Io(e) => {
                error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "IO_ERROR".to_string(),
                        message: "Internal server error during IO operation".to_string(),
                        details: None,
                    },
                )
            }
            Self::YamlParsing(e) => {
                error!("YAML parsing error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "CONFIG_PARSE_ERROR".to_string(),
                        message: "Failed to parse configuration file".to_string(),
                        details: None,
                    },
                )
            }
            Self::HttpClientBuild(e) => {
                error!("HTTP client build error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "HTTP_CLIENT_BUILD_ERROR".to_string(),
                        message: "Internal server error building HTTP client".to_string(),
                        details: None,
                    },
                )
            }

            // --- 4xx ---
            Self::Json(e) => (
                StatusCode::BAD_REQUEST,
                ErrorDetails {
                    error_type: "JSON_PROCESSING_ERROR".to_string(),
                    message: "Failed to process JSON payload".to_string(),
                    details: Some(e.to_string()),
                },
            ),
            Self::UnknownService(service) => (
                StatusCode::NOT_FOUND,
                ErrorDetails {
                    error_type: "UNKNOWN_SERVICE".to_string(),
                    message: format!("No credentials are configured for service '{service}'"),
                    details: None,
                },
            ),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorDetails {
                    error_type: "UNAUTHORIZED".to_string(),
                    message: "Authentication token is missing or invalid".to_string(),
                    details: None,
                },
            ),
            Self::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetails {
                    error_type: "NOT_FOUND".to_string(),
                    message: format!("Resource not found: {resource}"),
                    details: None,
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_details) = self.to_status_and_details();
        let body = Json(ErrorResponse {
            error: error_details,
        });
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
