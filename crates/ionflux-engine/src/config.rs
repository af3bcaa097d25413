//! Run configuration for the [`TimeStepper`](crate::TimeStepper).

use ionflux_core::ConfigError;

/// Step counts and checkpoint cadence of one run.
///
/// The defaults reproduce the reference two-species scenario: 400 outer
/// steps of 50 potential sweeps each, with a checkpoint every 40 steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepperConfig {
    /// Outer (transport) steps in the run. Default: 400.
    pub outer_steps: u64,
    /// Potential relaxation sweeps before each transport step. Default: 50.
    pub inner_sweeps: u32,
    /// A checkpoint is written after every step divisible by this.
    /// Default: 40.
    pub checkpoint_every: u64,
    /// Also write a checkpoint of the initial state at step 0, after the
    /// first boundary application. Default: `false`.
    pub checkpoint_initial: bool,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            outer_steps: 400,
            inner_sweeps: 50,
            checkpoint_every: 40,
            checkpoint_initial: false,
        }
    }
}

impl StepperConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outer_steps == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "outer_steps",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.checkpoint_every == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "checkpoint_every",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// `true` if a checkpoint follows outer step `step` (1-based).
    pub fn is_checkpoint(&self, step: u64) -> bool {
        self.checkpoint_every != 0 && step % self.checkpoint_every == 0
    }

    /// Number of checkpoints a complete run writes.
    pub fn expected_checkpoints(&self) -> u64 {
        let periodic = self.outer_steps.checked_div(self.checkpoint_every).unwrap_or(0);
        periodic + u64::from(self.checkpoint_initial)
    }
}
