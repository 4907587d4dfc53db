//! Per-run accounting of generation-provider calls.

use crate::error::StageError;

/// Counts generation calls against a hard cap.
///
/// Owned by a single run; never shared between runs.
#[derive(Debug, Clone, Copy)]
pub struct ApiBudget {
    used: u32,
    max: u32,
}

impl ApiBudget {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }

    /// Whether `calls` more calls fit in the budget.
    pub fn can_afford(&self, calls: u32) -> bool {
        self.remaining() >= calls
    }

    /// Whether another refinement pass may start.
    ///
    /// A pass needs room for at least one generation call after this one's.
    pub fn allows_refinement(&self) -> bool {
        self.used < self.max.saturating_sub(1)
    }

    /// Reserve one call, or fail without changing the count.
    pub fn try_consume(&mut self) -> Result<(), StageError> {
        if self.used >= self.max {
            return Err(self.exhausted());
        }
        self.used += 1;
        Ok(())
    }

    pub fn exhausted(&self) -> StageError {
        StageError::BudgetExhausted {
            used: self.used,
            max: self.max,
        }
    }
}
