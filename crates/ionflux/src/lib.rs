//! ionflux: multi-species Stefan-Maxwell diffusion and electromigration
//! on structured 3D grids, with a self-consistent electric potential.
//!
//! This is the top-level facade crate that re-exports the public API of
//! every ionflux sub-crate.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use ionflux::prelude::*;
//!
//! let grid = Arc::new(Grid::new([6, 2, 2], 1.0).unwrap());
//! let mut store = FieldStore::new();
//! let c = store.allocate(&grid, "c", 1, 1).unwrap();
//! let phi = store.allocate(&grid, "phi", 1, 1).unwrap();
//! store.field_mut(c).unwrap().fill(0.5);
//!
//! let mut transport = StefanMaxwell::new(vec![c], StencilTemplate::d3q7(), 1.0);
//! transport.set_diffusion_coefficient(0, 0.1).unwrap();
//! transport.set_charge(0, 1.0).unwrap();
//! transport.set_electric_field(Expr::field(phi)).unwrap();
//! let potential = PotentialRelaxation::new(transport.observer(), phi);
//!
//! let mut stepper = TimeStepper::builder(store)
//!     .transport(transport)
//!     .potential(potential)
//!     .add_species_boundary(BoundaryCondition::constant_value(c, 1.0, Face::X0))
//!     .add_potential_boundary(BoundaryCondition::constant_value(phi, 0.0, FaceSet::all()))
//!     .config(StepperConfig { outer_steps: 4, inner_sweeps: 2, checkpoint_every: 2, checkpoint_initial: false })
//!     .build()
//!     .unwrap();
//! let summary = stepper.run(&mut NullSink).unwrap();
//! assert_eq!(summary.checkpoints, vec![2, 4]);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `ionflux-core` | IDs, faces, errors, the `NumMethod` lifecycle |
//! | [`grid`] | `ionflux-grid` | Grids, fields, expressions, stencils |
//! | [`numerics`] | `ionflux-numerics` | Boundary conditions and the two operators |
//! | [`engine`] | `ionflux-engine` | Time stepper, checkpoint sinks, diagnostics |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits and IDs (`ionflux-core`).
pub use ionflux_core as types;

/// Grids, haloed fields and lazy expressions (`ionflux-grid`).
pub use ionflux_grid as grid;

/// Numerical operators (`ionflux-numerics`).
///
/// [`numerics::StefanMaxwell`] advances the species,
/// [`numerics::PotentialRelaxation`] relaxes the potential and
/// [`numerics::BoundaryCondition`] fills halos.
pub use ionflux_numerics as numerics;

/// Run orchestration (`ionflux-engine`).
pub use ionflux_engine as engine;

/// Common imports for typical ionflux usage.
pub mod prelude {
    // Core
    pub use ionflux_core::{Axis, Error, Face, FaceSet, FieldId, NumMethod};

    // Grid
    pub use ionflux_grid::{Expr, Field, FieldStore, Grid, StencilTemplate};

    // Numerics
    pub use ionflux_numerics::{BoundaryCondition, PotentialRelaxation, StefanMaxwell};

    // Engine
    pub use ionflux_engine::{
        ChannelSink, CheckpointSink, NullSink, RunSummary, StepperConfig, TimeStepper,
    };
}
