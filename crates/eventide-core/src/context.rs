//! Per-call context: cancellation, deadline, correlation and time.
//!
//! Every store, bus and publisher operation takes a `&Context`. I/O is run
//! through [`Context::run`], which races the operation against cancellation
//! and the deadline so that a cancelled caller never silently completes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::DomainError;

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cancellation and deadline carrier passed to every operation.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    correlation_id: Uuid,
    clock: Arc<dyn Clock>,
}

impl Context {
    /// Creates a root context with a fresh correlation id and the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            correlation_id: Uuid::new_v4(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to timestamp new events.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Sets an absolute deadline. An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Creates a child context that is cancelled together with this one but
    /// can also be cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            correlation_id: self.correlation_id,
            clock: Arc::clone(&self.clock),
        }
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the correlation id used to trace this call.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Returns the current time according to the context clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fails if the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Cancelled` or `DomainError::DeadlineExceeded`.
    pub fn check(&self) -> Result<(), DomainError> {
        if self.token.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DomainError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Runs `operation` until it completes, the context is cancelled, or the
    /// deadline passes, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error, `DomainError::Cancelled` or
    /// `DomainError::DeadlineExceeded`.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(DomainError::Cancelled),
            () = deadline => Err(DomainError::DeadlineExceeded),
            result = operation => result,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[derive(Debug)]
    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[tokio::test]
    async fn test_run_returns_operation_result() {
        let ctx = Context::new();

        let value = ctx.run(async { Ok::<_, DomainError>(7) }).await.unwrap();

        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_surfaces_cancellation() {
        let ctx = Context::new();
        let trigger = ctx.clone();

        let pending = ctx.run(async {
            std::future::pending::<()>().await;
            Ok::<_, DomainError>(())
        });
        trigger.cancel();

        assert!(matches!(pending.await, Err(DomainError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_surfaces_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_millis(10));

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DomainError>(())
            })
            .await;

        assert!(matches!(result, Err(DomainError::DeadlineExceeded)));
    }

    #[test]
    fn test_child_is_cancelled_with_parent() {
        let parent = Context::new();
        let child = parent.child();

        parent.cancel();

        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(DomainError::Cancelled)));
    }

    #[test]
    fn test_cancelling_child_leaves_parent_running() {
        let parent = Context::new();
        let child = parent.child();

        child.cancel();

        assert!(!parent.is_cancelled());
        assert_eq!(child.correlation_id(), parent.correlation_id());
    }

    #[test]
    fn test_with_correlation_id_is_carried_to_children() {
        // Arrange
        let correlation_id = Uuid::parse_str("6f1c2b9e-3d4a-4c1e-9a57-0b8e2f4d7c11").unwrap();

        // Act
        let ctx = Context::new().with_correlation_id(correlation_id);
        let child = ctx.child().with_timeout(Duration::from_secs(1));

        // Assert
        assert_eq!(ctx.correlation_id(), correlation_id);
        assert_eq!(child.correlation_id(), correlation_id);
        assert_ne!(Context::new().correlation_id(), correlation_id);
    }

    #[test]
    fn test_clock_is_replaceable() {
        let fixed = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let ctx = Context::new().with_clock(Arc::new(FixedClock(fixed)));

        assert_eq!(ctx.now(), fixed);
    }
}
