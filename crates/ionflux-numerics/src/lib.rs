//! Numerical operators for the ionflux solver.
//!
//! Every unit here implements [`NumMethod`](ionflux_core::NumMethod) over
//! a [`FieldStore`](ionflux_grid::FieldStore):
//!
//! - [`BoundaryCondition`]: fixed-value and fixed-gradient halo filling.
//! - [`StefanMaxwell`]: one explicit step of coupled diffusion and
//!   electromigration for every species.
//! - [`PotentialRelaxation`]: one Jacobi sweep of the electric potential
//!   against the species' charge density.
//!
//! # Order of operations (each outer step)
//!
//! 1. [`PotentialRelaxation`] sweeps, each followed by the potential's
//!    boundary conditions.
//! 2. Concentration boundary conditions.
//! 3. [`StefanMaxwell`], followed by the concentration boundary conditions.
//!
//! Operators never apply boundary conditions themselves.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod flux;
pub mod potential;
pub mod stefan_maxwell;

pub use boundary::{apply_all, BoundaryCondition, BoundaryRule};
pub use flux::{face_fluxes, PerSpecies};
pub use potential::PotentialRelaxation;
pub use stefan_maxwell::{SpeciesObserver, SpeciesSystem, StefanMaxwell};
