use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Credentials were rejected. Never retried.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Rate limited by metadata service")]
    RateLimited,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Request timed out")]
    Timeout,
    /// A stop was requested before the request could be sent.
    #[error("Lookup cancelled")]
    Cancelled,
}

impl LookupError {
    /// Whether the request may succeed if repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unauthorized(_) | Self::Cancelled)
    }

    /// Short name used in log events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::NetworkError(_) => "network_error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Map an unsuccessful HTTP status to an error.
    #[must_use]
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Unauthorized(format!("HTTP {status}: {}", body.trim()))
            }
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Self::Timeout,
            _ => Self::NetworkError(format!("HTTP {status}: {}", body.trim())),
        }
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::NetworkError(error.to_string())
        }
    }
}
