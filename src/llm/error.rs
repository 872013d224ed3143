//! Model service errors
//!
//! Every transport, auth, or rate-limit failure surfaces to the caller as an
//! [`LlmError`]. The core never retries; `is_retryable` is exposed for callers
//! that want their own policy.

use std::time::Duration;
use thiserror::Error;

/// Model service failure with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP response from the model service
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::auth(format!("Authentication failed: {body}")),
            429 => {
                let err = Self::new(LlmErrorKind::RateLimit, format!("Rate limited: {body}"));
                match retry_after_hint(body) {
                    Some(delay) => err.with_retry_after(delay),
                    None => err,
                }
            }
            400 => Self::new(LlmErrorKind::InvalidRequest, format!("Invalid request: {body}")),
            500..=599 => Self::new(LlmErrorKind::ServerError, format!("Server error: {body}")),
            _ => Self::unknown(format!("HTTP {status}: {body}")),
        }
    }
}

fn retry_after_hint(body: &str) -> Option<Duration> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    let secs = parsed.get("error")?.get("retry_after")?.as_f64()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Network issues, timeouts
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (400)
    InvalidRequest,
    Unknown,
}

impl LlmErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(LlmError::from_status(401, "").kind, LlmErrorKind::Auth);
        assert_eq!(LlmError::from_status(403, "").kind, LlmErrorKind::Auth);
        assert_eq!(LlmError::from_status(400, "").kind, LlmErrorKind::InvalidRequest);
        assert_eq!(LlmError::from_status(503, "").kind, LlmErrorKind::ServerError);
        assert_eq!(LlmError::from_status(418, "").kind, LlmErrorKind::Unknown);
    }

    #[test]
    fn test_rate_limit_parses_retry_after() {
        let err = LlmError::from_status(429, r#"{"error":{"retry_after":2.5}}"#);
        assert_eq!(err.kind, LlmErrorKind::RateLimit);
        assert_eq!(err.retry_after, Some(Duration::from_millis(2500)));

        let err = LlmError::from_status(429, "slow down");
        assert!(err.retry_after.is_none());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(LlmErrorKind::Network.is_retryable());
        assert!(LlmErrorKind::RateLimit.is_retryable());
        assert!(!LlmErrorKind::Auth.is_retryable());
        assert!(!LlmErrorKind::InvalidRequest.is_retryable());
    }
}
