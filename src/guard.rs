//! Guarded call path.
//!
//! A tool handler hands its upstream call to [`CallGuard::run`], which
//! validates the request, asks the access policy, and only then runs the
//! call under the retry executor.

use std::future::Future;
use std::sync::Arc;

use crate::access::{AccessPolicyEvaluator, AccessRequest, FolderHierarchy};
use crate::google::DriveClient;
use crate::resilience::{RetryContext, RetryExecutor, UpstreamFailure};
use crate::types::{Config, Error, Result};
use crate::validation::validate_request;

/// Access check plus retried execution for one upstream call.
#[derive(Debug, Clone)]
pub struct CallGuard {
    policy: AccessPolicyEvaluator,
    retry: RetryExecutor,
}

impl CallGuard {
    pub fn new(policy: AccessPolicyEvaluator, retry: RetryExecutor) -> Self {
        Self { policy, retry }
    }

    /// Wire a guard from configuration. The folder walk shares the retry
    /// executor so parent lookups are retried like any other call.
    pub fn from_config(config: &Config, drive: Option<Arc<dyn DriveClient>>) -> Self {
        let retry = RetryExecutor::new(config.retry.clone());
        let hierarchy = drive.map(|d| FolderHierarchy::new(d).with_retry(retry.clone()));
        let policy = AccessPolicyEvaluator::new(Arc::new(config.access.clone()), hierarchy);
        Self { policy, retry }
    }

    pub fn policy(&self) -> &AccessPolicyEvaluator {
        &self.policy
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Validate and authorize `request`, then run `operation` with retry.
    ///
    /// Validation and access errors return before `operation` is invoked.
    pub async fn run<T, E, F, Fut>(
        &self,
        request: &AccessRequest,
        ctx: &RetryContext,
        operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: UpstreamFailure,
    {
        validate_request(request)?;
        self.policy.validate_access(request).await?;

        if ctx.cancel.is_cancelled() {
            return Err(Error::cancelled(ctx.operation.clone()));
        }

        tracing::debug!(
            call_id = %ctx.call_id,
            operation = %ctx.operation,
            service = %request.service_name,
            "guarded_call_started"
        );

        self.retry.execute(ctx, operation).await
    }
}
