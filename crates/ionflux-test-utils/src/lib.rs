//! Test fixtures for ionflux development.
//!
//! - [`ReferenceCase`]: the two-species electromigration scenario with
//!   every operator and boundary condition configured.
//! - [`scalar_store`]: a store of scalar fields on one grid.
//! - [`sinks`]: recording and failing checkpoint sinks.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod sinks;

pub use sinks::{FailingSink, RecordingSink};

use std::sync::Arc;

use ionflux_core::{Error, Face, FaceSet, FieldId};
use ionflux_engine::{StepperConfig, TimeStepper};
use ionflux_grid::{Expr, FieldStore, Grid, StencilTemplate};
use ionflux_numerics::{BoundaryCondition, PotentialRelaxation, StefanMaxwell};

/// Allocate one scalar field per name on a unit-spacing grid of `extent`.
pub fn scalar_store(extent: [i32; 3], names: &[&str], halo: i32) -> (FieldStore, Vec<FieldId>) {
    let grid = Arc::new(Grid::new(extent, 1.0).expect("valid test grid"));
    let mut store = FieldStore::new();
    let ids = names
        .iter()
        .map(|name| store.allocate(&grid, *name, 1, halo).expect("valid test field"))
        .collect();
    (store, ids)
}

/// Grid of the reference run.
pub const REFERENCE_EXTENT: [i32; 3] = [10, 20, 20];

/// Diffusion coefficients of the two species against the medium.
pub const REFERENCE_DIFFUSION: [f64; 2] = [0.075, 0.15];

/// Species-species coefficient.
pub const REFERENCE_BINARY: f64 = 0.15;

/// Charge numbers of the two species.
pub const REFERENCE_CHARGES: [f64; 2] = [-2.0, 0.0];

/// Permittivity of the potential relaxation.
pub const REFERENCE_PERMITTIVITY: f64 = 100.0;

/// Two species driven in opposite directions along `x`, the first one
/// charged, in a potential held at 0 on the low `x` face and 1 on the
/// high one. Lateral faces carry zero-gradient conditions.
///
/// | field | `X0` | `XE` |
/// |-------|------|------|
/// | `c1`  | 0.1  | 1    |
/// | `c2`  | 1    | 0.1  |
/// | `phi` | 0    | 1    |
///
/// Every field starts at 0.5.
pub struct ReferenceCase {
    pub store: FieldStore,
    pub c1: FieldId,
    pub c2: FieldId,
    pub phi: FieldId,
    pub transport: StefanMaxwell,
    pub potential: PotentialRelaxation,
    pub species_boundary: Vec<BoundaryCondition>,
    pub potential_boundary: Vec<BoundaryCondition>,
}

impl ReferenceCase {
    /// The scenario on a grid of `extent` with unit spacing and time step.
    pub fn new(extent: [i32; 3]) -> Result<Self, Error> {
        let (mut store, ids) = scalar_store(extent, &["c1", "c2", "phi"], 1);
        let (c1, c2, phi) = (ids[0], ids[1], ids[2]);
        for &id in &ids {
            store.field_mut(id)?.fill(0.5);
        }

        let mut transport = StefanMaxwell::new(vec![c1, c2], StencilTemplate::d3q7(), 1.0);
        for (i, (&d, &z)) in REFERENCE_DIFFUSION.iter().zip(&REFERENCE_CHARGES).enumerate() {
            transport.set_diffusion_coefficient(i, d)?;
            transport.set_charge(i, z)?;
        }
        transport.set_binary_coefficient(REFERENCE_BINARY)?;
        transport.set_electric_field(Expr::field(phi))?;

        let mut potential = PotentialRelaxation::new(transport.observer(), phi);
        potential.set_permittivity(REFERENCE_PERMITTIVITY)?;

        let lateral = FaceSet::from([Face::Y0, Face::YE, Face::Z0, Face::ZE]);
        let species_boundary = vec![
            BoundaryCondition::fixed_gradient(c1, 0.0, lateral),
            BoundaryCondition::constant_value(c1, 0.1, Face::X0),
            BoundaryCondition::constant_value(c1, 1.0, Face::XE),
            BoundaryCondition::fixed_gradient(c2, 0.0, lateral),
            BoundaryCondition::constant_value(c2, 0.1, Face::XE),
            BoundaryCondition::constant_value(c2, 1.0, Face::X0),
        ];
        let potential_boundary = vec![
            BoundaryCondition::fixed_gradient(phi, 0.0, lateral),
            BoundaryCondition::constant_value(phi, 1.0, Face::XE),
            BoundaryCondition::constant_value(phi, 0.0, Face::X0),
        ];

        Ok(Self {
            store,
            c1,
            c2,
            phi,
            transport,
            potential,
            species_boundary,
            potential_boundary,
        })
    }

    /// A stepper over the scenario.
    pub fn stepper(self, config: StepperConfig) -> Result<TimeStepper, Error> {
        TimeStepper::builder(self.store)
            .transport(self.transport)
            .potential(self.potential)
            .species_boundary(self.species_boundary)
            .potential_boundary(self.potential_boundary)
            .config(config)
            .build()
    }
}
