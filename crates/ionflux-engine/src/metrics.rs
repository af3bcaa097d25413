//! Per-step timing for the [`TimeStepper`](crate::TimeStepper).

/// Timing of one outer step.
///
/// All durations are in microseconds. The stepper fills these in after
/// every step; [`RunSummary`](crate::RunSummary) carries the sum over a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepMetrics {
    /// Wall-clock time for the whole step.
    pub total_us: u64,
    /// Potential sweeps, including the potential's boundary conditions.
    pub relaxation_us: u64,
    /// The Stefan-Maxwell update.
    pub transport_us: u64,
    /// Concentration boundary conditions.
    pub boundary_us: u64,
    /// Writing the checkpoint, if one was due.
    pub checkpoint_us: u64,
    /// Potential sweeps performed.
    pub sweeps: u64,
}

impl StepMetrics {
    /// Add `other` into `self`, field by field.
    pub fn accumulate(&mut self, other: &StepMetrics) {
        self.total_us += other.total_us;
        self.relaxation_us += other.relaxation_us;
        self.transport_us += other.transport_us;
        self.boundary_us += other.boundary_us;
        self.checkpoint_us += other.checkpoint_us;
        self.sweeps += other.sweeps;
    }
}
