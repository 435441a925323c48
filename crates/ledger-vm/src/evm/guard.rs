//! # Execution Guard
//!
//! Step budget, wall-clock deadline and external cancellation for one
//! transaction. The interpreter ticks the guard once per instruction across
//! every frame of the transaction.

use crate::errors::VmError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-transaction execution bounds.
#[derive(Clone, Debug)]
pub struct ExecutionGuard {
    max_steps: u64,
    steps: u64,
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ExecutionGuard {
    /// Guard allowing `max_steps` instructions and no deadline.
    #[must_use]
    pub fn new(max_steps: u64) -> Self {
        Self {
            max_steps,
            steps: 0,
            deadline: None,
            cancel: None,
        }
    }

    /// Guard with no step limit, deadline or cancellation.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    /// Aborts once `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Aborts once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Instructions executed so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Accounts for one instruction.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the flag is set, `Timeout` when the step budget or
    /// the deadline is exhausted.
    pub fn tick(&mut self) -> Result<(), VmError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(VmError::Cancelled);
        }
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(VmError::Timeout { steps: self.steps });
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(VmError::Timeout { steps: self.steps });
        }
        Ok(())
    }
}

impl Default for ExecutionGuard {
    fn default() -> Self {
        Self::unlimited()
    }
}
