//! Run orchestration for ionflux simulations.
//!
//! [`TimeStepper`] drives the nested loop of potential relaxation and
//! Stefan-Maxwell transport over a configured number of outer steps,
//! applying boundary conditions between operators and handing field
//! state to a [`CheckpointSink`] at a fixed cadence.
//!
//! Sinks:
//!
//! - [`NullSink`]: discards everything.
//! - [`ChannelSink`]: sends owned [`Checkpoint`] copies down a crossbeam
//!   channel for a writer thread.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod config;
pub mod diagnostics;
pub mod metrics;
pub mod stepper;

pub use checkpoint::{ChannelSink, Checkpoint, CheckpointSink, NamedFields, NullSink};
pub use config::StepperConfig;
pub use diagnostics::{x_profile, FieldSummary};
pub use metrics::StepMetrics;
pub use stepper::{RunState, RunSummary, TimeStepper, TimeStepperBuilder};
