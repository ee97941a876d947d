//! Failure value produced by the Google API collaborators.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{NormalizedError, UpstreamFailure};
use crate::types::Error;

/// A failed Google API call, as observed at the HTTP layer.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiFailure {
    /// HTTP status, absent when the request never got a response.
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub message: String,
    /// Response body, JSON when it parsed, raw text otherwise.
    pub body: Option<Value>,
    /// Parsed `Retry-After` header.
    pub retry_after: Option<Duration>,
    /// Self-reported transient failure (timeouts, refused connections).
    pub transient: bool,
    /// Credentials could not be obtained; the request was never sent.
    pub auth: bool,
}

impl ApiFailure {
    /// Failure carrying an HTTP response.
    pub fn http(status: u16, status_text: impl Into<String>, body: Option<Value>) -> Self {
        let status_text = status_text.into();
        Self {
            status: Some(status),
            status_text: (!status_text.is_empty()).then_some(status_text),
            message: format!("Request failed with status code {}", status),
            body,
            retry_after: None,
            transient: false,
            auth: false,
        }
    }

    /// Failure without an HTTP response.
    pub fn other(message: impl Into<String>, transient: bool) -> Self {
        Self {
            status: None,
            status_text: None,
            message: message.into(),
            body: None,
            retry_after: None,
            transient,
            auth: false,
        }
    }

    /// Credential failure. Never retried and surfaced as [`Error::Auth`].
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            auth: true,
            ..Self::other(message, false)
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }
}

impl UpstreamFailure for ApiFailure {
    fn raw(&self) -> Value {
        match self.status {
            Some(status) => json!({
                "message": self.message,
                "response": {
                    "status": status,
                    "statusText": self.status_text,
                    "data": self.body,
                }
            }),
            None => json!({ "message": self.message }),
        }
    }

    fn retryable_override(&self) -> Option<bool> {
        if self.auth {
            return Some(false);
        }
        self.transient.then_some(true)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    fn into_error(self, normalized: NormalizedError) -> Error {
        if self.auth {
            Error::Auth(self.message)
        } else {
            Error::from(normalized)
        }
    }
}


impl From<reqwest::Error> for ApiFailure {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect();
        match err.status() {
            Some(status) => Self {
                transient,
                ..Self::http(status.as_u16(), status.canonical_reason().unwrap_or(""), None)
            },
            None => Self::other(err.to_string(), transient),
        }
    }
}

/// Parse a `Retry-After` header: delay-seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::normalize;
    use chrono::TimeZone;

    #[test]
    fn test_http_failure_normalizes_structured_body() {
        let failure = ApiFailure::http(
            403,
            "Forbidden",
            Some(json!({
                "error": {
                    "code": 403,
                    "message": "Rate Limit Exceeded",
                    "errors": [{"message": "Rate Limit Exceeded", "domain": "usageLimits", "reason": "rateLimitExceeded"}]
                }
            })),
        );

        let n = failure.normalized();
        assert_eq!(n.http_status, 403);
        assert_eq!(n.reason.as_deref(), Some("rateLimitExceeded"));
        assert!(n.is_retryable);
        assert_eq!(failure.retryable_override(), None);
    }

    #[test]
    fn test_http_failure_without_body_uses_status() {
        let n = ApiFailure::http(502, "Bad Gateway", None).normalized();
        assert_eq!(n.http_status, 502);
        assert!(n.is_retryable);
    }

    #[test]
    fn test_transport_failure_self_reports() {
        let failure = ApiFailure::other("operation timed out", true);
        assert_eq!(failure.retryable_override(), Some(true));
        assert_eq!(normalize(&failure.raw()).message, "operation timed out");

        let fatal = ApiFailure::other("invalid url", false);
        assert_eq!(fatal.retryable_override(), None);
        assert!(!fatal.normalized().is_retryable);
    }

    #[test]
    fn test_auth_failure_is_terminal() {
        let failure = ApiFailure::auth("token endpoint returned 503");
        assert!(failure.auth);
        assert_eq!(failure.retryable_override(), Some(false));

        let n = failure.normalized();
        let err = failure.into_error(n);
        assert_eq!(err.code(), "AUTH_ERROR");
        assert_eq!(err.to_string(), "auth error: token endpoint returned 503");
    }

    #[test]
    fn test_parse_retry_after() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after("Mon, 01 Jan 2024 00:00:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Sun, 31 Dec 2023 23:59:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }
}
