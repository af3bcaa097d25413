//! Checkpoint sinks for tests.
//!
//! - [`RecordingSink`]: keeps an owned copy of every checkpoint.
//! - [`FailingSink`]: succeeds a fixed number of times, then fails.

use ionflux_core::SinkError;
use ionflux_engine::{Checkpoint, CheckpointSink, NamedFields};

/// Keeps an owned [`Checkpoint`] per write.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub checkpoints: Vec<Checkpoint>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps written so far.
    pub fn steps(&self) -> Vec<u64> {
        self.checkpoints.iter().map(|cp| cp.step).collect()
    }

    /// Interior sum of `name` at every checkpoint.
    pub fn masses(&self, name: &str) -> Vec<f64> {
        self.checkpoints
            .iter()
            .filter_map(|cp| cp.mass(name))
            .collect()
    }

    pub fn last(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }
}

impl CheckpointSink for RecordingSink {
    fn write(&mut self, step: u64, fields: &NamedFields<'_>) -> Result<(), SinkError> {
        self.checkpoints.push(Checkpoint {
            step,
            fields: fields.to_owned_fields(),
        });
        Ok(())
    }
}

/// Accepts `succeed_count` writes, then fails every one after.
#[derive(Debug)]
pub struct FailingSink {
    succeed_count: usize,
    calls: usize,
}

impl FailingSink {
    pub fn after(succeed_count: usize) -> Self {
        Self {
            succeed_count,
            calls: 0,
        }
    }

    /// Writes attempted so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl CheckpointSink for FailingSink {
    fn write(&mut self, step: u64, _fields: &NamedFields<'_>) -> Result<(), SinkError> {
        self.calls += 1;
        if self.calls > self.succeed_count {
            return Err(SinkError::new(format!(
                "failing sink rejected step {step} after {} writes",
                self.succeed_count
            )));
        }
        Ok(())
    }
}
