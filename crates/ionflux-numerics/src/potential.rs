//! Electric potential relaxation.
//!
//! [`PotentialRelaxation`] relaxes the discrete Poisson problem
//!
//! ```text
//! laplacian(phi) = -rho / eps,    rho = sum_i z_i c_i
//! ```
//!
//! one weighted-Jacobi sweep per `execute`. The charge density comes from
//! the species of a [`StefanMaxwell`](crate::StefanMaxwell) operator,
//! observed read-only through a [`SpeciesObserver`].

use std::sync::Arc;

use rayon::prelude::*;

use ionflux_core::{ConfigError, Error, FieldId, Index3, Lifecycle, NumMethod, StateError};
use ionflux_grid::{FieldStore, Grid, StencilTemplate};

use crate::stefan_maxwell::{SpeciesObserver, SpeciesSystem};

/// One weighted-Jacobi sweep of the potential per `execute`.
///
/// The Laplacian is the observed operator's stencil template, weights
/// `w_d` over offsets `o_d` with `w_0` on the centre:
///
/// ```text
/// phi_new = (1 - w) * phi - w * (sum_{d>0} w_d phi(o_d) + h^2 * rho / eps) / w_0
/// ```
///
/// On the 7-point template this is the familiar
/// `(sum_nb phi_nb + h^2 * rho / eps) / 6`.
///
/// Every cell reads the previous sweep's values, so the result does not
/// depend on cell order. There is no convergence test: the caller picks
/// the number of sweeps and applies the potential's boundary conditions
/// between them.
#[derive(Debug)]
pub struct PotentialRelaxation {
    observer: SpeciesObserver,
    phi: FieldId,
    permittivity: f64,
    weight: f64,
    state: Lifecycle,
    system: Option<Arc<SpeciesSystem>>,
    sweeps: u64,
}

impl PotentialRelaxation {
    /// Relax `phi` against the charge of the observed species.
    pub fn new(observer: SpeciesObserver, phi: FieldId) -> Self {
        Self {
            observer,
            phi,
            permittivity: 1.0,
            weight: 1.0,
            state: Lifecycle::Unconfigured,
            system: None,
            sweeps: 0,
        }
    }

    fn configurable(&self) -> Result<(), StateError> {
        if self.state.is_initialized() {
            return Err(StateError::AlreadyInitialized {
                method: self.name().to_string(),
            });
        }
        Ok(())
    }

    /// Set the permittivity `eps` (default 1). Checked at `init`.
    pub fn set_permittivity(&mut self, eps: f64) -> Result<(), Error> {
        self.configurable()?;
        self.permittivity = eps;
        Ok(())
    }

    /// Set the relaxation weight `w` in `(0, 1]` (default 1). Checked at
    /// `init`.
    pub fn set_relaxation_weight(&mut self, weight: f64) -> Result<(), Error> {
        self.configurable()?;
        self.weight = weight;
        Ok(())
    }

    /// The potential field.
    pub fn field(&self) -> FieldId {
        self.phi
    }

    /// Permittivity.
    pub fn permittivity(&self) -> f64 {
        self.permittivity
    }

    /// Relaxation weight.
    pub fn relaxation_weight(&self) -> f64 {
        self.weight
    }

    /// Completed sweeps.
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    /// `true` if the observed species system is `system`.
    pub fn observes(&self, system: &Arc<SpeciesSystem>) -> bool {
        self.observer
            .get()
            .is_some_and(|observed| Arc::ptr_eq(&observed, system))
    }

    fn system(&self) -> Result<&Arc<SpeciesSystem>, StateError> {
        self.system.as_ref().ok_or_else(|| StateError::NotInitialized {
            method: self.name().to_string(),
        })
    }

    /// `sum_d w_d phi(o_d) / h^2`, the template Laplacian at one cell.
    fn laplacian(
        &self,
        store: &FieldStore,
        template: &StencilTemplate,
        grid: &Grid,
        index: Index3,
    ) -> Result<f64, Error> {
        let (centre, neighbours) = self.stencil(store, template, index)?;
        let h = grid.spacing();
        Ok((neighbours + template.laplacian_weights()[0] * centre) / (h * h))
    }

    /// The centre value and the weighted sum over the other template
    /// points.
    fn stencil(
        &self,
        store: &FieldStore,
        template: &StencilTemplate,
        [x, y, z]: Index3,
    ) -> Result<(f64, f64), Error> {
        let phi = store.field(self.phi)?;
        let mut neighbours = 0.0;
        for (o, &w) in template
            .neighbors()
            .iter()
            .zip(&template.laplacian_weights()[1..])
        {
            neighbours += w * phi.get([x + o[0], y + o[1], z + o[2]], 0)?;
        }
        Ok((phi.get([x, y, z], 0)?, neighbours))
    }

    /// Per-cell residual `laplacian(phi) + rho / eps`, in canonical order.
    pub fn residual(&self, store: &FieldStore) -> Result<Vec<f64>, Error> {
        let system = self.system()?;
        let grid = system.grid();
        let template = system.template();
        let eps = self.permittivity;
        (0..grid.cell_count())
            .into_par_iter()
            .map(|rank| -> Result<f64, Error> {
                let index = grid.index_of(rank);
                let rho = system.charge_density(store, index)?;
                Ok(self.laplacian(store, template, grid, index)? + rho / eps)
            })
            .collect()
    }

    /// L2 norm of [`residual`](Self::residual).
    pub fn residual_norm(&self, store: &FieldStore) -> Result<f64, Error> {
        Ok(self
            .residual(store)?
            .iter()
            .map(|r| r * r)
            .sum::<f64>()
            .sqrt())
    }
}

impl NumMethod<FieldStore> for PotentialRelaxation {
    fn name(&self) -> &str {
        "PotentialRelaxation"
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn init(&mut self, store: &FieldStore) -> Result<(), Error> {
        self.configurable()?;
        let system = self.observer.get().ok_or_else(|| ConfigError::MissingConfiguration {
            what: "initialised StefanMaxwell operator to observe".to_string(),
        })?;
        let phi = store.field(self.phi)?;
        if phi.grid().as_ref() != system.grid().as_ref() {
            return Err(ConfigError::GridMismatch { field: self.phi }.into());
        }
        if phi.width() != 1 {
            return Err(ConfigError::NotScalar {
                field: self.phi,
                width: phi.width(),
            }
            .into());
        }
        let reach = system.template().reach();
        if phi.halo() < reach {
            return Err(ConfigError::InsufficientHalo {
                field: self.phi,
                required: reach,
                actual: phi.halo(),
            }
            .into());
        }
        if !(self.permittivity > 0.0) || !self.permittivity.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "permittivity",
                reason: format!("must be finite and positive, got {}", self.permittivity),
            }
            .into());
        }
        if !(self.weight > 0.0 && self.weight <= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "relaxation weight",
                reason: format!("must lie in (0, 1], got {}", self.weight),
            }
            .into());
        }
        tracing::debug!(
            permittivity = self.permittivity,
            weight = self.weight,
            species = system.len(),
            "PotentialRelaxation initialised"
        );
        self.system = Some(system);
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn execute(&mut self, store: &mut FieldStore) -> Result<(), Error> {
        let system = self.system()?;
        let grid = system.grid();
        let template = system.template();
        let centre_weight = template.laplacian_weights()[0];
        let h2 = grid.spacing() * grid.spacing();
        let (w, eps) = (self.weight, self.permittivity);
        let previous: &FieldStore = store;
        let relaxed: Vec<f64> = (0..grid.cell_count())
            .into_par_iter()
            .map(|rank| -> Result<f64, Error> {
                let index = grid.index_of(rank);
                let (centre, neighbours) = self.stencil(previous, template, index)?;
                let rho = system.charge_density(previous, index)?;
                let jacobi = -(neighbours + h2 * rho / eps) / centre_weight;
                Ok((1.0 - w) * centre + w * jacobi)
            })
            .collect::<Result<_, _>>()?;
        store.field_mut(self.phi)?.replace_interior(0, &relaxed)?;
        self.sweeps += 1;
        self.state = Lifecycle::Executing;
        Ok(())
    }
}
