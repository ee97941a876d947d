//! Upstream error normalization.
//!
//! Google client libraries surface failures in several loosely-typed shapes:
//! a structured `response.data.error` body, a bare HTTP response, objects that
//! only carry `code` or `status`, plain messages, strings and numbers. This
//! module classifies the raw value into an [`ErrorShape`] and folds every shape
//! into one [`NormalizedError`] with a retryability verdict.
//!
//! Normalization is total: it never fails and never mutates its input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Message used when nothing in the input describes the failure.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred";

/// Status assumed when no extraction step yields one.
pub const DEFAULT_HTTP_STATUS: u16 = 500;

/// Upstream reason codes that are transient regardless of HTTP status.
pub const RETRYABLE_REASONS: [&str; 4] = [
    "rateLimitExceeded",
    "quotaExceeded",
    "backendError",
    "internalServerError",
];

/// Keywords that mark the integer right after them as an HTTP status.
const STATUS_KEYWORDS: [&str; 4] = ["status", "code", "http", "error"];

// =============================================================================
// Normalized error
// =============================================================================

/// One entry of an upstream `error.errors` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
}

/// Which extraction step produced `http_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    StructuredError,
    HttpResponse,
    CodeProperty,
    StatusProperty,
    MessageText,
    Default,
}

/// Uniform shape of every upstream failure.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message} (HTTP {http_status})")]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    pub http_status: u16,
    pub message: String,
    /// Upstream symbolic status, e.g. `INVALID_ARGUMENT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    pub details: Vec<ErrorDetail>,
    pub is_retryable: bool,
    pub status_source: StatusSource,
    /// The raw input, kept for diagnostics.
    #[serde(skip)]
    pub original_error: Value,
}

impl NormalizedError {
    /// True when `http_status` was assumed rather than read from the input.
    pub fn has_default_status(&self) -> bool {
        self.status_source == StatusSource::Default
    }

    /// True when `reason` is one of [`RETRYABLE_REASONS`].
    pub fn has_retryable_reason(&self) -> bool {
        self.reason.as_deref().is_some_and(is_retryable_reason)
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Parsed `error` object of a Google API response body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrorBody {
    pub code: Option<u16>,
    pub message: String,
    pub status: Option<String>,
    pub details: Vec<ErrorDetail>,
}

/// Tagged view of a raw upstream failure. Variant order is extraction priority.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorShape<'a> {
    /// `null` / missing value.
    Absent,
    /// Bare string.
    Text(&'a str),
    /// Bare number.
    Number(&'a Number),
    /// `response.data.error` (or a top-level API error body).
    Structured(ApiErrorBody),
    /// HTTP response without a parseable error body.
    HttpResponse {
        status: u16,
        message: Option<&'a str>,
    },
    /// Numeric (or numeric-string) `code` property.
    Coded { code: u16, message: Option<&'a str> },
    /// Numeric `status` property.
    StatusOnly { status: u16, message: Option<&'a str> },
    /// Object carrying only a message.
    MessageOnly(&'a str),
    /// Anything else.
    Opaque,
}

/// Classify a raw failure value.
pub fn classify(input: &Value) -> ErrorShape<'_> {
    let obj = match input {
        Value::Null => return ErrorShape::Absent,
        Value::String(s) => return ErrorShape::Text(s),
        Value::Number(n) => return ErrorShape::Number(n),
        Value::Object(obj) => obj,
        Value::Bool(_) | Value::Array(_) => return ErrorShape::Opaque,
    };

    let message = obj.get("message").and_then(Value::as_str);

    if let Some(response) = obj.get("response").and_then(Value::as_object) {
        if let Some(mut body) = response.get("data").and_then(api_error_body) {
            if body.code.is_none() {
                body.code = response.get("status").and_then(as_status);
            }
            return ErrorShape::Structured(body);
        }
        if let Some(status) = response.get("status").and_then(as_status) {
            let message = message.or_else(|| response.get("statusText").and_then(Value::as_str));
            return ErrorShape::HttpResponse { status, message };
        }
    }

    if let Some(body) = api_error_body(input) {
        return ErrorShape::Structured(body);
    }

    if let Some(code) = obj.get("code").and_then(numeric_code) {
        return ErrorShape::Coded { code, message };
    }

    if let Some(status) = obj.get("status").and_then(as_status) {
        return ErrorShape::StatusOnly { status, message };
    }

    match message {
        Some(m) => ErrorShape::MessageOnly(m),
        None => ErrorShape::Opaque,
    }
}

/// Non-null object with a string `message`.
pub fn is_gaxios_error_like(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("message"))
        .is_some_and(Value::is_string)
}

/// Non-null object whose `error` has a numeric `code` and string `message`.
pub fn is_google_api_error_response(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("error"))
        .and_then(Value::as_object)
        .is_some_and(|err| {
            err.get("code").is_some_and(Value::is_number)
                && err.get("message").is_some_and(Value::is_string)
        })
}

// =============================================================================
// Normalization
// =============================================================================

/// Fold any raw failure into a [`NormalizedError`].
pub fn normalize(input: &Value) -> NormalizedError {
    let mut out = NormalizedError {
        http_status: DEFAULT_HTTP_STATUS,
        message: UNKNOWN_ERROR_MESSAGE.to_string(),
        status: None,
        reason: None,
        domain: None,
        location: None,
        location_type: None,
        details: Vec::new(),
        is_retryable: false,
        status_source: StatusSource::Default,
        original_error: input.clone(),
    };
    // Set when the message came from the input rather than the default.
    let mut derived_message = false;

    match classify(input) {
        ErrorShape::Absent | ErrorShape::Opaque => {}
        ErrorShape::Text(text) => {
            out.message = text.to_string();
            derived_message = true;
        }
        ErrorShape::Number(n) => {
            out.message = n.to_string();
            derived_message = true;
        }
        ErrorShape::Structured(body) => {
            out.http_status = body.code.unwrap_or(DEFAULT_HTTP_STATUS);
            out.status_source = if body.code.is_some() {
                StatusSource::StructuredError
            } else {
                StatusSource::Default
            };
            out.message = body.message;
            out.status = body.status;
            if let Some(first) = body.details.first() {
                out.reason = Some(first.reason.clone());
                out.domain = Some(first.domain.clone());
                out.location = first.location.clone();
                out.location_type = first.location_type.clone();
            }
            out.details = body.details;
            derived_message = true;
        }
        ErrorShape::HttpResponse { status, message } => {
            out.apply_status(status, StatusSource::HttpResponse, message);
        }
        ErrorShape::Coded { code, message } => {
            out.apply_status(code, StatusSource::CodeProperty, message);
        }
        ErrorShape::StatusOnly { status, message } => {
            out.apply_status(status, StatusSource::StatusProperty, message);
        }
        ErrorShape::MessageOnly(message) => {
            out.message = message.to_string();
            derived_message = true;
            if let Some(status) = status_from_message(message) {
                out.http_status = status;
                out.status_source = StatusSource::MessageText;
            }
        }
    }

    let status_retryable = is_retryable_status(out.http_status)
        && !(out.has_default_status() && derived_message);
    out.is_retryable = status_retryable || out.has_retryable_reason();
    out
}

impl NormalizedError {
    fn apply_status(&mut self, status: u16, source: StatusSource, message: Option<&str>) {
        self.http_status = status;
        self.status_source = source;
        if let Some(m) = message {
            self.message = m.to_string();
        }
    }
}

/// 429 or any 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Reason code that marks a transient upstream condition.
pub fn is_retryable_reason(reason: &str) -> bool {
    RETRYABLE_REASONS.contains(&reason)
}

/// Find an HTTP status embedded in free text.
///
/// An integer in `[100, 599]` directly after a status keyword (`status`,
/// `code`, `HTTP`, `error`) wins; otherwise the first integer run in range,
/// scanning left to right. Out-of-range runs are skipped.
pub fn status_from_message(message: &str) -> Option<u16> {
    let runs = integer_runs(message);

    runs.iter()
        .filter(|(start, _)| follows_status_keyword(&message[..*start]))
        .find_map(|(_, run)| in_status_range(run))
        .or_else(|| runs.iter().find_map(|(_, run)| in_status_range(run)))
}

fn integer_runs(text: &str) -> Vec<(usize, &str)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, ch) in text.char_indices() {
        match (ch.is_ascii_digit(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, &text[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, &text[s..]));
    }
    runs
}

fn in_status_range(run: &str) -> Option<u16> {
    run.parse::<u16>()
        .ok()
        .filter(|code| (100..=599).contains(code))
}

fn follows_status_keyword(prefix: &str) -> bool {
    let trimmed = prefix
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '=' | '#' | '('))
        .to_ascii_lowercase();
    STATUS_KEYWORDS.iter().any(|kw| trimmed.ends_with(kw))
}

// =============================================================================
// Field extraction
// =============================================================================

fn api_error_body(data: &Value) -> Option<ApiErrorBody> {
    // Some transports hand back the body as an unparsed JSON string.
    if let Value::String(raw) = data {
        let parsed: Value = serde_json::from_str(raw).ok()?;
        return api_error_body(&parsed);
    }

    if !is_google_api_error_response(data) {
        return None;
    }
    let err = data.get("error")?.as_object()?;

    Some(ApiErrorBody {
        code: err.get("code").and_then(as_status),
        message: err.get("message")?.as_str()?.to_string(),
        status: err.get("status").and_then(Value::as_str).map(str::to_string),
        details: err
            .get("errors")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(detail_from).collect())
            .unwrap_or_default(),
    })
}

fn detail_from(entry: &Value) -> ErrorDetail {
    let Some(obj) = entry.as_object() else {
        return ErrorDetail::default();
    };
    ErrorDetail {
        message: str_field(obj, "message").unwrap_or_default(),
        domain: str_field(obj, "domain").unwrap_or_default(),
        reason: str_field(obj, "reason").unwrap_or_default(),
        location: str_field(obj, "location"),
        location_type: str_field(obj, "locationType"),
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Numeric status that fits a `u16`. Negative, fractional or oversized
/// numbers are not statuses; a structured body carrying one takes the
/// enclosing response status instead, or the default 500.
fn as_status(value: &Value) -> Option<u16> {
    value.as_u64().and_then(|n| u16::try_from(n).ok())
}

fn numeric_code(value: &Value) -> Option<u16> {
    match value {
        Value::Number(_) => as_status(value),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn structured(code: u16, reason: Option<&str>) -> Value {
        let errors = match reason {
            Some(r) => json!([{"message": "m", "domain": "global", "reason": r}]),
            None => json!([]),
        };
        json!({
            "message": "request failed",
            "response": {
                "status": code,
                "data": {"error": {"code": code, "message": "upstream says no", "errors": errors}}
            }
        })
    }

    // =========================================================================
    // Extraction priority
    // =========================================================================

    #[test]
    fn test_structured_error_copies_taxonomy() {
        let raw = json!({
            "message": "Request failed with status code 400",
            "response": {
                "status": 400,
                "data": {
                    "error": {
                        "code": 400,
                        "message": "Invalid range",
                        "status": "INVALID_ARGUMENT",
                        "errors": [
                            {"message": "Invalid range", "domain": "global", "reason": "badRequest",
                             "location": "range", "locationType": "parameter"},
                            {"message": "second", "domain": "sheets", "reason": "invalid"}
                        ]
                    }
                }
            }
        });

        let n = normalize(&raw);
        assert_eq!(n.http_status, 400);
        assert_eq!(n.message, "Invalid range");
        assert_eq!(n.status.as_deref(), Some("INVALID_ARGUMENT"));
        assert_eq!(n.reason.as_deref(), Some("badRequest"));
        assert_eq!(n.domain.as_deref(), Some("global"));
        assert_eq!(n.location.as_deref(), Some("range"));
        assert_eq!(n.location_type.as_deref(), Some("parameter"));
        assert_eq!(n.details.len(), 2);
        assert_eq!(n.details[1].domain, "sheets");
        assert_eq!(n.status_source, StatusSource::StructuredError);
        assert!(!n.is_retryable);
        assert_eq!(n.original_error, raw);
    }

    #[test]
    fn test_structured_error_without_errors_list() {
        let n = normalize(&structured(404, None));
        assert_eq!(n.http_status, 404);
        assert!(n.details.is_empty());
        assert_eq!(n.reason, None);
        assert_eq!(n.domain, None);
        assert_eq!(n.location, None);
    }

    #[test]
    fn test_first_detail_mirrored_verbatim() {
        let raw = json!({"error": {
            "code": 400,
            "message": "bad",
            "errors": [{"message": "m", "domain": "", "reason": ""}]
        }});
        let n = normalize(&raw);
        assert_eq!(n.reason.as_deref(), Some(""));
        assert_eq!(n.domain.as_deref(), Some(""));
        assert_eq!(n.reason.as_deref(), Some(n.details[0].reason.as_str()));
        assert!(!n.is_retryable);
    }

    #[test]
    fn test_unusable_structured_code() {
        let raw = json!({
            "response": {
                "status": 503,
                "data": {"error": {"code": 70000, "message": "backend unavailable"}}
            }
        });
        let n = normalize(&raw);
        assert_eq!(n.http_status, 503);
        assert_eq!(n.message, "backend unavailable");
        assert_eq!(n.status_source, StatusSource::StructuredError);
        assert!(n.is_retryable);

        let n = normalize(&json!({"error": {"code": -1, "message": "odd"}}));
        assert_eq!(n.http_status, 500);
        assert_eq!(n.status_source, StatusSource::Default);
        assert!(!n.is_retryable);
    }

    #[test]
    fn test_structured_body_as_json_string() {
        let raw = json!({
            "response": {
                "status": 403,
                "data": "{\"error\":{\"code\":403,\"message\":\"Rate Limit\",\"errors\":[{\"reason\":\"rateLimitExceeded\",\"domain\":\"usageLimits\",\"message\":\"Rate Limit\"}]}}"
            }
        });
        let n = normalize(&raw);
        assert_eq!(n.http_status, 403);
        assert_eq!(n.reason.as_deref(), Some("rateLimitExceeded"));
        assert!(n.is_retryable);
    }

    #[test]
    fn test_top_level_api_error_body() {
        let raw = json!({"error": {"code": 409, "message": "conflict", "errors": []}});
        let n = normalize(&raw);
        assert_eq!(n.http_status, 409);
        assert_eq!(n.message, "conflict");
        assert!(!n.is_retryable);
    }

    #[test]
    fn test_http_response_without_body_uses_top_level_message() {
        let raw = json!({
            "message": "socket hang up",
            "response": {"status": 502, "statusText": "Bad Gateway", "data": "<html>oops</html>"}
        });
        let n = normalize(&raw);
        assert_eq!(n.http_status, 502);
        assert_eq!(n.message, "socket hang up");
        assert_eq!(n.status_source, StatusSource::HttpResponse);
        assert!(n.is_retryable);
    }

    #[test]
    fn test_http_response_falls_back_to_status_text() {
        let raw = json!({"response": {"status": 404, "statusText": "Not Found"}});
        let n = normalize(&raw);
        assert_eq!(n.http_status, 404);
        assert_eq!(n.message, "Not Found");
    }

    #[test]
    fn test_numeric_and_string_code() {
        let n = normalize(&json!({"code": 503, "message": "unavailable"}));
        assert_eq!(n.http_status, 503);
        assert_eq!(n.status_source, StatusSource::CodeProperty);
        assert!(n.is_retryable);

        let n = normalize(&json!({"code": "429", "message": "slow down"}));
        assert_eq!(n.http_status, 429);
        assert!(n.is_retryable);
    }

    #[test]
    fn test_non_numeric_code_falls_through_to_status() {
        let n = normalize(&json!({"code": "ECONNRESET", "status": 504, "message": "reset"}));
        assert_eq!(n.http_status, 504);
        assert_eq!(n.status_source, StatusSource::StatusProperty);
    }

    #[test]
    fn test_message_parsing_fallback() {
        let n = normalize(&json!({"message": "Request 123 failed with status 404 after 2000ms"}));
        assert_eq!(n.http_status, 404);
        assert_eq!(n.status_source, StatusSource::MessageText);
        assert!(!n.is_retryable);

        let n = normalize(&json!({"message": "took 2000ms then got 503"}));
        assert_eq!(n.http_status, 503);
        assert!(n.is_retryable);
    }

    #[test]
    fn test_status_from_message_scanning() {
        assert_eq!(status_from_message("HTTP 429 Too Many Requests"), Some(429));
        assert_eq!(status_from_message("status code: 500"), Some(500));
        assert_eq!(status_from_message("HTTP/1.1 503 Service Unavailable"), Some(503));
        assert_eq!(status_from_message("retry 7 of 99999 then 204"), Some(204));
        assert_eq!(status_from_message("nothing numeric"), None);
        assert_eq!(status_from_message("42 and 600 and 99"), None);
    }

    // =========================================================================
    // Non-object inputs and defaults
    // =========================================================================

    #[test]
    fn test_null_is_default_and_retryable() {
        let n = normalize(&Value::Null);
        assert_eq!(n.http_status, 500);
        assert_eq!(n.message, UNKNOWN_ERROR_MESSAGE);
        assert!(n.is_retryable);
        assert!(n.details.is_empty());
        assert!(n.has_default_status());
    }

    #[test]
    fn test_bare_string_not_retryable() {
        let n = normalize(&json!("x"));
        assert_eq!(n.http_status, 500);
        assert_eq!(n.message, "x");
        assert!(!n.is_retryable);
    }

    #[test]
    fn test_bare_number_not_retryable() {
        let n = normalize(&json!(42));
        assert_eq!(n.http_status, 500);
        assert_eq!(n.message, "42");
        assert!(!n.is_retryable);
    }

    #[test]
    fn test_message_only_exception_not_retryable() {
        let n = normalize(&json!({"message": "something broke", "name": "Error"}));
        assert_eq!(n.http_status, 500);
        assert_eq!(n.message, "something broke");
        assert!(!n.is_retryable);
    }

    #[test]
    fn test_empty_object_is_default() {
        let n = normalize(&json!({}));
        assert_eq!(n.http_status, 500);
        assert_eq!(n.message, UNKNOWN_ERROR_MESSAGE);
        assert!(n.is_retryable);
    }

    // =========================================================================
    // Type guards
    // =========================================================================

    #[test]
    fn test_type_guards() {
        assert!(is_gaxios_error_like(&json!({"message": "m"})));
        assert!(!is_gaxios_error_like(&json!({"message": 3})));
        assert!(!is_gaxios_error_like(&Value::Null));
        assert!(!is_gaxios_error_like(&json!("m")));

        assert!(is_google_api_error_response(&json!({"error": {"code": 400, "message": "m", "errors": []}})));
        assert!(is_google_api_error_response(&json!({"error": {"code": 400, "message": "m"}})));
        assert!(!is_google_api_error_response(&json!({"error": {"code": "400", "message": "m"}})));
        assert!(!is_google_api_error_response(&json!({"error": null})));
        assert!(!is_google_api_error_response(&Value::Null));
    }

    #[test]
    fn test_classify_order() {
        assert_eq!(classify(&Value::Null), ErrorShape::Absent);
        assert_eq!(classify(&json!(true)), ErrorShape::Opaque);
        assert!(matches!(
            classify(&json!({"code": 500, "status": 404})),
            ErrorShape::Coded { code: 500, .. }
        ));
        assert!(matches!(
            classify(&json!({"response": {"status": 400}, "code": 500})),
            ErrorShape::HttpResponse { status: 400, .. }
        ));
    }

    // =========================================================================
    // Retryability properties
    // =========================================================================

    proptest! {
        #[test]
        fn prop_server_errors_always_retryable(
            status in prop_oneof![Just(429u16), 500u16..=599],
            reason in prop::option::of("[a-zA-Z]{1,12}"),
        ) {
            let n = normalize(&structured(status, reason.as_deref()));
            prop_assert!(n.is_retryable);
        }

        #[test]
        fn prop_client_errors_not_retryable(
            status in prop::sample::select(vec![400u16, 401, 403, 404, 409, 422]),
            reason in prop::sample::select(vec!["badRequest", "notFound", "forbidden", "invalid"]),
        ) {
            let n = normalize(&structured(status, Some(reason)));
            prop_assert!(!n.is_retryable);
        }

        #[test]
        fn prop_retryable_reason_overrides_status(
            reason in prop::sample::select(RETRYABLE_REASONS.to_vec()),
        ) {
            let n = normalize(&structured(400, Some(reason)));
            prop_assert_eq!(n.http_status, 400);
            prop_assert!(n.is_retryable);
        }

        #[test]
        fn prop_normalize_never_panics(s in ".*") {
            let _ = normalize(&json!({"message": s}));
            let _ = normalize(&Value::String(s));
        }
    }
}
