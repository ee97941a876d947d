//! Resilience pipeline: error normalization and retry/backoff.
//!
//! Every upstream failure is folded into a [`NormalizedError`] before any
//! business logic looks at it; [`RetryExecutor`] uses that verdict to decide
//! whether a call is attempted again.

pub mod normalize;
pub mod retry;

pub use normalize::{
    classify, is_gaxios_error_like, is_google_api_error_response, is_retryable_reason,
    is_retryable_status, normalize, status_from_message, ErrorDetail, ErrorShape,
    NormalizedError, StatusSource, RETRYABLE_REASONS, UNKNOWN_ERROR_MESSAGE,
};
pub use retry::{
    FixedJitter, JitterSource, RandomJitter, RetryClass, RetryContext, RetryExecutor,
    RetryVerdict, SkipReason, Sleeper, TokioSleeper, UpstreamFailure,
};
