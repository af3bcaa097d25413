//! Error types for the ionflux solver.
//!
//! Organized by class: configuration (detected at construction or
//! `init`), bounds (out-of-range cell access), lifecycle state, and
//! checkpoint sinks. [`Error`] wraps all of them for callers that drive
//! a whole run.

use std::error::Error as StdError;
use std::fmt;

use crate::face::{Axis, Index3};
use crate::id::FieldId;

/// Invalid or incomplete setup, detected before any stepping occurs.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// A grid extent component is zero or negative.
    InvalidDimension {
        /// The offending axis.
        axis: Axis,
        /// The rejected extent.
        extent: i32,
    },
    /// Grid spacing is zero, negative, or not finite.
    InvalidSpacing {
        /// The rejected spacing.
        spacing: f64,
    },
    /// A field was allocated with zero components per cell.
    InvalidElementWidth {
        /// The rejected width.
        width: usize,
    },
    /// The field id does not name an allocated field.
    UnboundField {
        /// The unknown id.
        field: FieldId,
    },
    /// A field lives on a different grid than the rest of the operation.
    GridMismatch {
        /// The field whose grid differs.
        field: FieldId,
    },
    /// A field's halo is too thin for the stencil reading it.
    InsufficientHalo {
        /// The field with the thin halo.
        field: FieldId,
        /// Halo width the stencil needs.
        required: i32,
        /// Halo width the field was allocated with.
        actual: i32,
    },
    /// An operator needs a scalar field but got a vector-valued one.
    NotScalar {
        /// The vector-valued field.
        field: FieldId,
        /// Its element width.
        width: usize,
    },
    /// An expression references a component the field does not have.
    ComponentOutOfRange {
        /// The referenced field.
        field: FieldId,
        /// The requested component.
        component: usize,
        /// The field's element width.
        width: usize,
    },
    /// A species index is outside the operator's species list.
    InvalidSpecies {
        /// The rejected index.
        index: usize,
        /// Number of configured species.
        count: usize,
    },
    /// Required configuration was never supplied.
    MissingConfiguration {
        /// What is missing.
        what: String,
    },
    /// A numeric parameter is outside its valid range.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimension { axis, extent } => {
                write!(f, "grid extent along {axis} must be >= 1, got {extent}")
            }
            Self::InvalidSpacing { spacing } => {
                write!(f, "grid spacing must be finite and positive, got {spacing}")
            }
            Self::InvalidElementWidth { width } => {
                write!(f, "field element width must be >= 1, got {width}")
            }
            Self::UnboundField { field } => write!(f, "field {field} is not allocated"),
            Self::GridMismatch { field } => {
                write!(f, "field {field} is allocated on a different grid")
            }
            Self::InsufficientHalo {
                field,
                required,
                actual,
            } => write!(
                f,
                "field {field} has halo {actual}, stencil requires {required}"
            ),
            Self::NotScalar { field, width } => {
                write!(f, "field {field} has {width} components, expected a scalar")
            }
            Self::ComponentOutOfRange {
                field,
                component,
                width,
            } => write!(
                f,
                "component {component} out of range for field {field} of width {width}"
            ),
            Self::InvalidSpecies { index, count } => {
                write!(f, "species index {index} out of range for {count} species")
            }
            Self::MissingConfiguration { what } => write!(f, "missing configuration: {what}"),
            Self::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter '{name}': {reason}")
            }
        }
    }
}

impl StdError for ConfigError {}

/// Cell access outside a field's allocated storage.
///
/// Always a programming defect in an operator or boundary unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundsError {
    /// The index lies outside `[lower, upper)` on some axis.
    OutOfBounds {
        /// The offending index.
        index: Index3,
        /// Inclusive lower corner of the allocation (`-halo`).
        lower: Index3,
        /// Exclusive upper corner of the allocation (`extent + halo`).
        upper: Index3,
    },
    /// The component exceeds the field's element width.
    ComponentOutOfRange {
        /// The requested component.
        component: usize,
        /// The field's element width.
        width: usize,
    },
}

impl fmt::Display for BoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds {
                index,
                lower,
                upper,
            } => write!(
                f,
                "index {index:?} outside allocated range {lower:?}..{upper:?}"
            ),
            Self::ComponentOutOfRange { component, width } => {
                write!(f, "component {component} out of range for width {width}")
            }
        }
    }
}

impl StdError for BoundsError {}

/// An operation invoked out of lifecycle order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateError {
    /// Configuration was attempted after `init()`.
    AlreadyInitialized {
        /// Name of the method.
        method: String,
    },
    /// `execute()` (or a dependent `init()`) ran before `init()`.
    NotInitialized {
        /// Name of the method.
        method: String,
    },
    /// The run already completed its configured steps.
    RunFinished,
    /// A previous error aborted the run.
    RunAborted,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized { method } => {
                write!(f, "'{method}' is already initialized; configuration is frozen")
            }
            Self::NotInitialized { method } => write!(f, "'{method}' has not been initialized"),
            Self::RunFinished => write!(f, "run already finished"),
            Self::RunAborted => write!(f, "run was aborted by an earlier error"),
        }
    }
}

impl StdError for StateError {}

/// Failure reported by a checkpoint sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkError {
    /// Human-readable description of the failure.
    pub reason: String,
}

impl SinkError {
    /// Create a sink error from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "checkpoint sink failed: {}", self.reason)
    }
}

impl StdError for SinkError {}

/// Any error surfaced by the solver.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Invalid or incomplete setup.
    Config(ConfigError),
    /// Out-of-range cell access.
    Bounds(BoundsError),
    /// Lifecycle violation.
    State(StateError),
    /// Checkpoint sink failure.
    Sink(SinkError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration: {e}"),
            Self::Bounds(e) => write!(f, "bounds: {e}"),
            Self::State(e) => write!(f, "state: {e}"),
            Self::Sink(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Bounds(e) => Some(e),
            Self::State(e) => Some(e),
            Self::Sink(e) => Some(e),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<BoundsError> for Error {
    fn from(e: BoundsError) -> Self {
        Self::Bounds(e)
    }
}

impl From<StateError> for Error {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn umbrella_preserves_source() {
        let err: Error = StateError::NotInitialized {
            method: "StefanMaxwell".into(),
        }
        .into();
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "state: 'StefanMaxwell' has not been initialized"
        );
    }

    #[test]
    fn config_messages_name_the_offender() {
        let e = ConfigError::InvalidDimension {
            axis: Axis::Y,
            extent: 0,
        };
        assert!(e.to_string().contains("along y"));
        let e = ConfigError::InsufficientHalo {
            field: FieldId(2),
            required: 1,
            actual: 0,
        };
        assert!(e.to_string().contains("field 2"));
    }
}
