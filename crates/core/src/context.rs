//! Per-request deadline and cancellation.
//!
//! A [`RequestContext`] is handed to every store call. Stores check it before
//! touching the backend so an abandoned request stops issuing writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("request cancelled")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

/// Handle that cancels the context it was taken from (and all of its clones).
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl RequestContext {
    /// A context with no deadline that is never cancelled unless asked to.
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails once the request was cancelled or its deadline passed.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupted::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Fresh context that ignores this one's cancellation and deadline.
    ///
    /// Used for compensation: once a multi-step write has partially happened,
    /// the cleanup must run even if the caller went away.
    pub fn detached(&self) -> Self {
        Self::background()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_passes_checks() {
        assert!(RequestContext::background().check().is_ok());
    }

    #[test]
    fn cancel_handle_reaches_clones() {
        let ctx = RequestContext::background();
        let clone = ctx.clone();
        ctx.cancel_handle().cancel();
        assert_eq!(clone.check(), Err(Interrupted::Cancelled));
    }

    #[test]
    fn past_deadline_fails() {
        let ctx = RequestContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(ctx.check(), Err(Interrupted::DeadlineExceeded));
    }

    #[test]
    fn detached_ignores_parent_cancellation() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(30));
        ctx.cancel();
        let detached = ctx.detached();
        assert!(detached.check().is_ok());
        assert!(detached.deadline().is_none());
    }
}
