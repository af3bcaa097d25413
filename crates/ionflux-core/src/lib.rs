//! Core types and traits for the ionflux mass-transfer solver.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other crate in the workspace: field
//! identifiers, grid axes and boundary faces, the error taxonomy, and
//! the [`NumMethod`] lifecycle trait implemented by numerical operators.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod face;
pub mod id;
pub mod traits;

pub use error::{BoundsError, ConfigError, Error, SinkError, StateError};
pub use face::{Axis, Face, FaceSet, Index3};
pub use id::FieldId;
pub use traits::{execute_all, init_all, Lifecycle, NumMethod};
