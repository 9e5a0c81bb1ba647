// src/resilience/error.rs

use std::time::Duration;
use thiserror::Error;

/// Why a single upstream attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP client gave up on its own timer; the limit is not known here.
    #[error("request timed out: {0}")]
    ClientTimeout(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// HTTP status reported to the key manager, if the upstream sent one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Timeout(_) | Self::ClientTimeout(_) | Self::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            Self::status(status.as_u16(), e.to_string())
        } else if e.is_timeout() {
            Self::ClientTimeout(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Turn a non-2xx response into a [`FetchError::Status`].
pub fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::status(
            status.as_u16(),
            status.canonical_reason().unwrap_or("upstream error"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_only_for_http_errors() {
        assert_eq!(FetchError::status(429, "Too Many Requests").status_code(), Some(429));
        assert_eq!(FetchError::Timeout(Duration::from_secs(5)).status_code(), None);
        assert_eq!(FetchError::transport("connection reset").status_code(), None);
    }

    #[test]
    fn client_timeout_does_not_claim_a_duration() {
        let err = FetchError::ClientTimeout("operation timed out".to_string());
        assert_eq!(err.to_string(), "request timed out: operation timed out");
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn display_includes_code() {
        let err = FetchError::status(503, "Service Unavailable");
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }
}
