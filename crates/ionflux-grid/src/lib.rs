//! Structured grids and field storage for ionflux.
//!
//! This crate defines the coordinate system and data containers every
//! numerical operator works on:
//!
//! - [`Grid`]: immutable rectangular 3D domain with uniform spacing.
//! - [`Field`]: per-cell values plus a halo of ghost cells.
//! - [`FieldStore`]: owner of all fields of a simulation, addressed by
//!   [`FieldId`](ionflux_core::FieldId).
//! - [`Expr`] / [`Plan`]: lazy elementwise field arithmetic, compiled once
//!   and evaluated per cell.
//! - [`StencilTemplate`]: the fixed 7-point neighbour template used by the
//!   finite-difference operators.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod expr;
pub mod field;
pub mod grid;
pub mod stencil;
pub mod store;

pub use expr::{BinaryOp, Expr, Plan};
pub use field::Field;
pub use grid::Grid;
pub use stencil::StencilTemplate;
pub use store::FieldStore;
