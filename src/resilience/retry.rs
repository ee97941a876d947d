//! Retry with exponential backoff.
//!
//! `RetryExecutor` runs one logical upstream call up to `max_attempts` times,
//! strictly sequentially. Each failure is normalized, classified against the
//! configured retriable codes and the transient reason codes, and either
//! surfaced or retried after a jittered delay. The sleeper and jitter source
//! are injected so tests run without wall-clock waits.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::normalize::{normalize, NormalizedError};
use crate::types::{Error, RetryConfig};

// =============================================================================
// Failure seam
// =============================================================================

/// A failed upstream attempt, as seen by the retry loop.
pub trait UpstreamFailure {
    /// Loosely-typed shape handed to the normalizer.
    fn raw(&self) -> Value;

    /// Explicit retry verdict reported by the failure itself. Takes priority
    /// over the HTTP status.
    fn retryable_override(&self) -> Option<bool> {
        None
    }

    /// Server-provided delay before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn normalized(&self) -> NormalizedError {
        normalize(&self.raw())
    }

    /// Crate error surfaced once the loop gives up on this failure.
    fn into_error(self, normalized: NormalizedError) -> Error
    where
        Self: Sized,
    {
        Error::from(normalized)
    }
}

impl UpstreamFailure for Value {
    fn raw(&self) -> Value {
        self.clone()
    }
}

impl UpstreamFailure for NormalizedError {
    fn raw(&self) -> Value {
        self.original_error.clone()
    }

    fn normalized(&self) -> NormalizedError {
        self.clone()
    }
}

impl UpstreamFailure for Error {
    fn raw(&self) -> Value {
        match self {
            Error::Service(normalized) => normalized.original_error.clone(),
            other => json!({ "message": other.to_string() }),
        }
    }

    fn retryable_override(&self) -> Option<bool> {
        Error::retryable_override(self)
    }

    fn normalized(&self) -> NormalizedError {
        match self {
            Error::Service(normalized) => (**normalized).clone(),
            other => normalize(&other.raw()),
        }
    }

    fn into_error(self, normalized: NormalizedError) -> Error {
        match self {
            Error::Service(_) => Error::from(normalized),
            other => other,
        }
    }
}

// =============================================================================
// Injected dependencies
// =============================================================================

/// Suspends the retry loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync + fmt::Debug {
    async fn sleep(&self, delay: Duration);
}

/// Real timer backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Source of jitter samples, uniform in `[-1.0, 1.0]`.
pub trait JitterSource: Send + Sync + fmt::Debug {
    fn sample(&self) -> f64;
}

/// Thread-local RNG jitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// Always returns the same sample. `FixedJitter(0.0)` disables jitter.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0.clamp(-1.0, 1.0)
    }
}

// =============================================================================
// Context and classification
// =============================================================================

/// Per-call context: correlation id, label for logs, cancellation.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub call_id: Uuid,
    pub operation: String,
    pub cancel: CancellationToken,
}

impl RetryContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            operation: operation.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Why a failure is being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    RetriableHttpStatus,
    RetriableReasonCode,
    RateLimitHint,
    ExplicitOverride,
}

impl RetryClass {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryClass::RetriableHttpStatus => "retriable_http_status",
            RetryClass::RetriableReasonCode => "retriable_reason_code",
            RetryClass::RateLimitHint => "rate_limit_hint",
            RetryClass::ExplicitOverride => "explicit_override",
        }
    }
}

/// Why a failure is surfaced without retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SelfReportedNonRetryable,
    NonRetriableStatus,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::SelfReportedNonRetryable => "self_reported_non_retryable",
            SkipReason::NonRetriableStatus => "non_retriable_status",
        }
    }
}

/// Outcome of classifying one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    Retry(RetryClass),
    Skip(SkipReason),
}

// =============================================================================
// Executor
// =============================================================================

/// Runs an async unit of work with retry and backoff.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: Arc<RetryConfig>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(RandomJitter),
        }
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Un-jittered delay before attempt `attempt + 1`: `min(max, base * 2^(attempt-1))`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let ms = self
            .config
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Perturb `delay` by up to `±delay * jitter_factor`.
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        let base = delay.as_millis() as f64;
        let offset = base * self.config.jitter_factor * self.jitter.sample();
        Duration::from_millis((base + offset).max(0.0).round() as u64)
    }

    /// Decide whether a normalized failure may be retried.
    pub fn classify(
        &self,
        normalized: &NormalizedError,
        override_verdict: Option<bool>,
        retry_after: Option<Duration>,
    ) -> RetryVerdict {
        match override_verdict {
            Some(true) => return RetryVerdict::Retry(RetryClass::ExplicitOverride),
            Some(false) => return RetryVerdict::Skip(SkipReason::SelfReportedNonRetryable),
            None => {}
        }

        let class = if normalized.has_retryable_reason() {
            RetryClass::RetriableReasonCode
        } else if self.config.is_retriable_code(normalized.http_status)
            && (!normalized.has_default_status() || normalized.is_retryable)
        {
            RetryClass::RetriableHttpStatus
        } else {
            return RetryVerdict::Skip(SkipReason::NonRetriableStatus);
        };

        if retry_after.is_some() {
            RetryVerdict::Retry(RetryClass::RateLimitHint)
        } else {
            RetryVerdict::Retry(class)
        }
    }

    /// Run `operation` until it succeeds, fails terminally, runs out of
    /// attempts, or `ctx.cancel` fires during a backoff wait.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        ctx: &RetryContext,
        operation: F,
    ) -> Result<T, NormalizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: UpstreamFailure,
    {
        self.attempts(ctx, operation)
            .await
            .map_err(|(_, normalized)| normalized)
    }

    /// Same loop as [`execute_with_retry`](Self::execute_with_retry), but the
    /// last failure decides the surfaced error class (auth failures stay
    /// [`Error::Auth`]).
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &RetryContext,
        operation: F,
    ) -> crate::types::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: UpstreamFailure,
    {
        self.attempts(ctx, operation)
            .await
            .map_err(|(failure, normalized)| failure.into_error(normalized))
    }

    async fn attempts<T, E, F, Fut>(
        &self,
        ctx: &RetryContext,
        mut operation: F,
    ) -> Result<T, (E, NormalizedError)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: UpstreamFailure,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            let failure = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            call_id = %ctx.call_id,
                            operation = %ctx.operation,
                            attempt,
                            "retry_succeeded"
                        );
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let override_verdict = failure.retryable_override();
            let retry_after = failure.retry_after();
            let mut normalized = failure.normalized();
            if let Some(verdict) = override_verdict {
                normalized.is_retryable = verdict;
            }

            let class = match self.classify(&normalized, override_verdict, retry_after) {
                RetryVerdict::Retry(class) => class,
                RetryVerdict::Skip(reason) => {
                    tracing::warn!(
                        call_id = %ctx.call_id,
                        operation = %ctx.operation,
                        attempt,
                        http_status = normalized.http_status,
                        skip_reason = reason.as_str(),
                        "retry_skipped: {}",
                        normalized.message
                    );
                    return Err((failure, normalized));
                }
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    call_id = %ctx.call_id,
                    operation = %ctx.operation,
                    attempt,
                    http_status = normalized.http_status,
                    "retry_exhausted: {}",
                    normalized.message
                );
                return Err((failure, normalized));
            }

            let delay = retry_after
                .unwrap_or_else(|| self.apply_jitter(self.backoff_delay(attempt)));

            tracing::info!(
                call_id = %ctx.call_id,
                operation = %ctx.operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                http_status = normalized.http_status,
                reason = class.as_str(),
                "retry_scheduled"
            );

            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    tracing::warn!(
                        call_id = %ctx.call_id,
                        operation = %ctx.operation,
                        attempt,
                        "retry_cancelled"
                    );
                    return Err((failure, normalized));
                }
                _ = self.sleeper.sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
