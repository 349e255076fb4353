//! Multi-step tenant workflows and their compensation.
//!
//! There are no cross-collection transactions; a workflow records an undo
//! step after each write and unwinds them in reverse when a later step fails.

pub mod provisioning;
pub mod teardown;

use tracing::{debug, error};

use warden_core::{AppError, AppResult, RequestContext};

pub use provisioning::{TenantDefaults, TenantProvisioningSaga};
pub use teardown::{TeardownReport, TenantTeardown};

type Compensation = Box<dyn FnOnce(&RequestContext) -> AppResult<()> + Send>;

/// Undo steps of a workflow in progress, newest last.
#[derive(Default)]
pub struct CompensationStack {
    steps: Vec<(&'static str, Compensation)>,
}

impl core::fmt::Debug for CompensationStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.steps.iter().map(|(name, _)| name)).finish()
    }
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, name: &'static str, step: F)
    where
        F: FnOnce(&RequestContext) -> AppResult<()> + Send + 'static,
    {
        self.steps.push((name, Box::new(step)));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The workflow finished; nothing will be undone.
    pub fn commit(self) {
        debug!(steps = self.steps.len(), "workflow committed");
    }

    /// Run every undo step, newest first, and fold the outcome into one error.
    ///
    /// Steps run on a detached context so a cancelled caller cannot stop the
    /// cleanup half way. Every step runs even if an earlier one failed. When all
    /// succeed the original failure is returned unchanged.
    pub fn unwind(self, ctx: &RequestContext, cause: AppError) -> AppError {
        let ctx = ctx.detached();
        let mut failures = Vec::new();
        for (name, step) in self.steps.into_iter().rev() {
            match step(&ctx) {
                Ok(()) => debug!(step = name, "compensation step completed"),
                Err(e) => {
                    error!(step = name, error = %e, "compensation step failed");
                    failures.push(e);
                }
            }
        }
        if failures.is_empty() {
            cause
        } else {
            failures.insert(0, cause);
            AppError::PartialRollback(failures)
        }
    }
}

/// `Ok` when no failures were collected, one combined error otherwise.
pub fn combine(failures: Vec<AppError>) -> AppResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(AppError::PartialRollback(failures))
    }
}
