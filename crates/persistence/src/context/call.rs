//! Cancellable call context passed to every storage operation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::tenant::TenantId;
use crate::error::{QueryError, StorageResult};

/// Per-call context carrying cancellation, an optional deadline, and the
/// identity used for tracing.
///
/// Contexts are cheap to clone; clones share the same cancellation token, so
/// cancelling any clone aborts every statement running under it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mercator_persistence::context::{CallContext, TenantId};
///
/// let ctx = CallContext::new(TenantId::new("acme"))
///     .with_correlation_id("req-42")
///     .with_timeout(Duration::from_secs(5));
///
/// assert!(!ctx.is_cancelled());
/// assert!(ctx.deadline().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct CallContext {
    tenant_id: TenantId,
    correlation_id: Option<String>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Creates a context for the given tenant with no deadline.
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            correlation_id: None,
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Creates a context for the default tenant with no deadline.
    pub fn background() -> Self {
        Self::new(TenantId::default())
    }

    /// Sets the correlation ID recorded on tracing spans.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Uses an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Creates a child context that is cancelled with this one but can also
    /// be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            correlation_id: self.correlation_id.clone(),
            cancellation: self.cancellation.child_token(),
            deadline: self.deadline,
        }
    }

    /// Returns the tenant ID.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the correlation ID, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancels every operation running under this context.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns true once the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails fast if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), QueryError> {
        if self.cancellation.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(QueryError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the context is cancelled, or the
    /// deadline elapses, whichever happens first.
    ///
    /// On cancellation or deadline the future is dropped and the matching
    /// [`QueryError`] is returned.
    pub async fn run<T, F>(&self, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        self.run_with_abort(fut, || {}).await
    }

    /// Like [`run`](Self::run), but invokes `on_abort` before returning a
    /// cancellation or deadline error. Backends use this to interrupt work
    /// that keeps running after the future is dropped.
    pub async fn run_with_abort<T, F, A>(&self, fut: F, on_abort: A) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
        A: FnOnce(),
    {
        self.check()?;

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let aborted = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => QueryError::Cancelled,
            _ = expired => QueryError::DeadlineExceeded,
            result = fut => return result,
        };

        tracing::warn!(
            tenant = %self.tenant_id,
            correlation_id = self.correlation_id.as_deref().unwrap_or(""),
            "aborting statement: {}",
            aborted
        );
        on_abort();
        Err(aborted.into())
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}
