//! Coupled multi-species diffusion with electromigration.
//!
//! [`StefanMaxwell`] advances every species concentration by one explicit
//! step of a finite-volume scheme on the 7-point template. Each face flux
//! combines Fickian diffusion, electromigration in the potential `psi`,
//! and (optionally) species-species friction solved per face by
//! [`face_fluxes`](crate::flux::face_fluxes).
//!
//! All reads come from the previous step: every cell's new value is
//! computed into a fresh buffer and the buffers of all species are swapped
//! in together, so the result does not depend on evaluation order.

use std::sync::{Arc, OnceLock};

use rayon::prelude::*;
use smallvec::SmallVec;

use ionflux_core::{ConfigError, Error, FieldId, Index3, Lifecycle, NumMethod, StateError};
use ionflux_grid::{Expr, FieldStore, Grid, Plan, StencilTemplate};

use crate::flux::{face_fluxes, PerSpecies};

#[derive(Clone, Debug)]
struct SpeciesSpec {
    field: FieldId,
    diffusion: Option<Expr>,
    charge: f64,
}

/// Frozen configuration of a [`StefanMaxwell`] operator.
///
/// Built once by `init` and shared through an `Arc`; nothing in it changes
/// for the rest of the run. Readers such as
/// [`PotentialRelaxation`](crate::PotentialRelaxation) obtain it through a
/// [`SpeciesObserver`].
#[derive(Debug)]
pub struct SpeciesSystem {
    grid: Arc<Grid>,
    template: &'static StencilTemplate,
    dt: f64,
    fields: SmallVec<[FieldId; 4]>,
    charges: SmallVec<[f64; 4]>,
    diffusion: Vec<Plan>,
    binary: Option<Plan>,
    electric: Plan,
    max_diffusivity: f64,
}

/// Values needed from one cell to build the fluxes across its faces.
struct CellSample {
    conc: PerSpecies,
    diffusivity: PerSpecies,
    binary: Option<f64>,
    potential: f64,
}

impl SpeciesSystem {
    /// Number of species.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` if there are no species.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The grid every species field lives on.
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Time step.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// The neighbour template fluxes are exchanged over.
    pub fn template(&self) -> &'static StencilTemplate {
        self.template
    }

    /// Concentration fields, in species order.
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    /// Charge numbers, in species order.
    pub fn charges(&self) -> &[f64] {
        &self.charges
    }

    /// Largest diffusion coefficient over the interior at `init`.
    pub fn max_diffusivity(&self) -> f64 {
        self.max_diffusivity
    }

    /// `max(D) * dt / spacing^2`.
    pub fn stability_number(&self) -> f64 {
        let h = self.grid.spacing();
        self.max_diffusivity * self.dt / (h * h)
    }

    /// Largest stable [`stability_number`](Self::stability_number) for the
    /// explicit scheme: `1 / (2 * ndim)`.
    pub fn stability_bound(&self) -> f64 {
        1.0 / (2.0 * self.grid.active_dims().max(1) as f64)
    }

    /// Charge density `sum_i z_i c_i` at one cell.
    pub fn charge_density(&self, store: &FieldStore, index: Index3) -> Result<f64, Error> {
        let mut rho = 0.0;
        for (&field, &z) in self.fields.iter().zip(&self.charges) {
            if z != 0.0 {
                rho += z * store.field(field)?.get(index, 0)?;
            }
        }
        Ok(rho)
    }

    fn sample(&self, store: &FieldStore, index: Index3) -> Result<CellSample, Error> {
        let mut conc = PerSpecies::new();
        let mut diffusivity = PerSpecies::new();
        for (&field, plan) in self.fields.iter().zip(&self.diffusion) {
            conc.push(store.field(field)?.get(index, 0)?);
            diffusivity.push(plan.eval(store, index)?);
        }
        let binary = match &self.binary {
            Some(plan) => Some(plan.eval(store, index)?),
            None => None,
        };
        Ok(CellSample {
            conc,
            diffusivity,
            binary,
            potential: self.electric.eval(store, index)?,
        })
    }

    /// Fluxes from cell `a` towards its neighbour `b`, per species.
    fn face_flux(&self, a: &CellSample, b: &CellSample) -> PerSpecies {
        let n = self.len();
        let dpsi = b.potential - a.potential;
        let conc: PerSpecies = (0..n).map(|i| 0.5 * (a.conc[i] + b.conc[i])).collect();
        let diffusivity: PerSpecies = (0..n)
            .map(|i| 0.5 * (a.diffusivity[i] + b.diffusivity[i]))
            .collect();
        let driving: PerSpecies = (0..n)
            .map(|i| -((b.conc[i] - a.conc[i]) + self.charges[i] * conc[i] * dpsi))
            .collect();
        let binary = match (a.binary, b.binary) {
            (Some(x), Some(y)) => Some(0.5 * (x + y)),
            _ => None,
        };
        face_fluxes(&conc, &diffusivity, &driving, binary)
    }

    /// New concentrations of every species at one interior cell.
    fn cell_update(&self, store: &FieldStore, index: Index3) -> Result<PerSpecies, Error> {
        let n = self.len();
        let a = self.sample(store, index)?;
        let mut inflow: PerSpecies = SmallVec::from_elem(0.0, n);
        for o in self.template.neighbors() {
            let b = self.sample(store, [index[0] + o[0], index[1] + o[1], index[2] + o[2]])?;
            for (acc, f) in inflow.iter_mut().zip(&self.face_flux(&a, &b)) {
                *acc -= f;
            }
        }
        let k = self.step_factor();
        Ok((0..n).map(|i| a.conc[i] + k * inflow[i]).collect())
    }

    /// `dt / spacing^2`: the change of a cell per unit net inflow.
    fn step_factor(&self) -> f64 {
        let h = self.grid.spacing();
        self.dt / (h * h)
    }

    /// Change in each species' interior sum that the next step produces
    /// through the domain faces, given the current halo.
    ///
    /// Fluxes between interior cells cancel in pairs, so after
    /// [`execute`](NumMethod::execute) the interior sum of species `i` has
    /// moved by exactly this amount (up to rounding).
    pub fn boundary_inflow(&self, store: &FieldStore) -> Result<PerSpecies, Error> {
        let mut inflow: PerSpecies = SmallVec::from_elem(0.0, self.len());
        let extent = self.grid.extent();
        for face in self.template.boundary_faces() {
            let Some(o) = self.template.neighbor_offset(self.template.face_direction(face)) else {
                continue;
            };
            let normal = face.axis().index();
            let layer = if face.is_low() { 0 } else { extent[normal] - 1 };
            for index in self.grid.interior().filter(|idx| idx[normal] == layer) {
                let a = self.sample(store, index)?;
                let b = self.sample(store, [index[0] + o[0], index[1] + o[1], index[2] + o[2]])?;
                for (acc, f) in inflow.iter_mut().zip(&self.face_flux(&a, &b)) {
                    *acc -= f;
                }
            }
        }
        let k = self.step_factor();
        Ok(inflow.into_iter().map(|v| k * v).collect())
    }

    /// New interior values of every species, one buffer per species.
    fn advance(&self, store: &FieldStore) -> Result<Vec<Vec<f64>>, Error> {
        let cells = self.grid.cell_count();
        let per_cell: Vec<PerSpecies> = (0..cells)
            .into_par_iter()
            .map(|rank| self.cell_update(store, self.grid.index_of(rank)))
            .collect::<Result<_, _>>()?;
        let mut per_species: Vec<Vec<f64>> =
            (0..self.len()).map(|_| Vec::with_capacity(cells)).collect();
        for cell in &per_cell {
            for (buf, &v) in per_species.iter_mut().zip(cell) {
                buf.push(v);
            }
        }
        Ok(per_species)
    }
}

/// Read-only handle on a [`StefanMaxwell`] operator's frozen
/// [`SpeciesSystem`].
///
/// Obtained from [`StefanMaxwell::observer`] before `init`; yields the
/// system once `init` has succeeded.
#[derive(Clone, Debug, Default)]
pub struct SpeciesObserver {
    slot: Arc<OnceLock<Arc<SpeciesSystem>>>,
}

impl SpeciesObserver {
    /// The frozen system, or `None` if the operator is not initialised.
    pub fn get(&self) -> Option<Arc<SpeciesSystem>> {
        self.slot.get().cloned()
    }

    /// `true` once the observed operator has been initialised.
    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Explicit Stefan-Maxwell transport of several charged species.
///
/// Per face between cells `a` and `b`, with face averages `c_i`, `D_i`,
/// `D_bin` and potential `psi`:
///
/// ```text
/// F_i = -[(c_i,b - c_i,a) + z_i * c_i * (psi_b - psi_a)]
/// ```
///
/// The face fluxes solve the Stefan-Maxwell relations with driving forces
/// `F` (or equal `D_i * F_i` without a binary coefficient), and every cell
/// gains `dt / spacing^2` times its net inflow.
///
/// The scheme is explicit: it is stable only while
/// [`stability_number`](Self::stability_number) stays below
/// `1 / (2 * ndim)`. This is reported, not enforced.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ionflux_core::NumMethod;
/// use ionflux_grid::{Expr, FieldStore, Grid, StencilTemplate};
/// use ionflux_numerics::StefanMaxwell;
///
/// let grid = Arc::new(Grid::new([8, 1, 1], 1.0).unwrap());
/// let mut store = FieldStore::new();
/// let c = store.allocate(&grid, "c", 1, 1).unwrap();
///
/// let mut sm = StefanMaxwell::new(vec![c], StencilTemplate::d3q7(), 1.0);
/// sm.set_diffusion_coefficient(0, 0.1).unwrap();
/// sm.set_electric_field(0.0).unwrap();
/// sm.init(&store).unwrap();
/// assert_eq!(sm.stability_number(), Some(0.1));
/// sm.execute(&mut store).unwrap();
/// ```
#[derive(Debug)]
pub struct StefanMaxwell {
    species: Vec<SpeciesSpec>,
    binary: Option<Expr>,
    electric: Option<Expr>,
    template: &'static StencilTemplate,
    dt: f64,
    state: Lifecycle,
    system: Option<Arc<SpeciesSystem>>,
    published: Arc<OnceLock<Arc<SpeciesSystem>>>,
    steps: u64,
}

impl StefanMaxwell {
    /// Create an operator over the given concentration fields.
    ///
    /// Every species starts uncharged and without a diffusion coefficient.
    pub fn new(species: Vec<FieldId>, template: &'static StencilTemplate, dt: f64) -> Self {
        Self {
            species: species
                .into_iter()
                .map(|field| SpeciesSpec {
                    field,
                    diffusion: None,
                    charge: 0.0,
                })
                .collect(),
            binary: None,
            electric: None,
            template,
            dt,
            state: Lifecycle::Unconfigured,
            system: None,
            published: Arc::new(OnceLock::new()),
            steps: 0,
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

    fn species_mut(&mut self, index: usize) -> Result<&mut SpeciesSpec, Error> {
        self.configurable()?;
        let count = self.species.len();
        self.species
            .get_mut(index)
            .ok_or(Error::Config(ConfigError::InvalidSpecies { index, count }))
    }

    /// Set the diffusion coefficient of species `index`.
    pub fn set_diffusion_coefficient(
        &mut self,
        index: usize,
        value: impl Into<Expr>,
    ) -> Result<(), Error> {
        self.species_mut(index)?.diffusion = Some(value.into());
        Ok(())
    }

    /// Set the signed charge number of species `index`.
    pub fn set_charge(&mut self, index: usize, value: f64) -> Result<(), Error> {
        self.species_mut(index)?.charge = value;
        Ok(())
    }

    /// Set the electric potential driving electromigration.
    pub fn set_electric_field(&mut self, value: impl Into<Expr>) -> Result<(), Error> {
        self.configurable()?;
        self.electric = Some(value.into());
        Ok(())
    }

    /// Set the species-species coefficient.
    ///
    /// Without one the species interact only through the electric field.
    pub fn set_binary_coefficient(&mut self, value: impl Into<Expr>) -> Result<(), Error> {
        self.configurable()?;
        self.binary = Some(value.into());
        Ok(())
    }

    /// Number of configured species.
    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    /// Time step.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Completed steps.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The frozen system, once initialised.
    pub fn system(&self) -> Option<&Arc<SpeciesSystem>> {
        self.system.as_ref()
    }

    /// A read-only handle that yields the frozen system after `init`.
    pub fn observer(&self) -> SpeciesObserver {
        SpeciesObserver {
            slot: Arc::clone(&self.published),
        }
    }

    /// `max(D) * dt / spacing^2`, once initialised.
    pub fn stability_number(&self) -> Option<f64> {
        self.system.as_ref().map(|s| s.stability_number())
    }

    /// Largest stable time step, once initialised. `None` if no species
    /// diffuses.
    pub fn max_dt(&self) -> Option<f64> {
        let s = self.system.as_ref()?;
        if s.max_diffusivity > 0.0 {
            let h = s.grid.spacing();
            Some(s.stability_bound() * h * h / s.max_diffusivity)
        } else {
            None
        }
    }

    fn freeze(&self, store: &FieldStore) -> Result<SpeciesSystem, Error> {
        if self.species.is_empty() {
            return Err(missing("at least one species"));
        }
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "dt",
                reason: format!("must be finite and positive, got {}", self.dt),
            }
            .into());
        }
        let electric = self
            .electric
            .as_ref()
            .ok_or_else(|| missing("electric field"))?;

        let reach = self.template.reach();
        let first = self.species[0].field;
        let grid = Arc::clone(store.field(first)?.grid());
        let check_field = |id: FieldId, scalar: bool| -> Result<(), ConfigError> {
            let field = store.field(id)?;
            if field.grid().as_ref() != grid.as_ref() {
                return Err(ConfigError::GridMismatch { field: id });
            }
            if scalar && field.width() != 1 {
                return Err(ConfigError::NotScalar {
                    field: id,
                    width: field.width(),
                });
            }
            if field.halo() < reach {
                return Err(ConfigError::InsufficientHalo {
                    field: id,
                    required: reach,
                    actual: field.halo(),
                });
            }
            Ok(())
        };
        // Expressions are evaluated at neighbour cells too, so whatever
        // they read needs a halo as well.
        let compile = |expr: &Expr| -> Result<Plan, ConfigError> {
            for (id, _) in expr.referenced_fields() {
                check_field(id, false)?;
            }
            expr.compile(store, &grid)
        };

        let mut fields = SmallVec::new();
        let mut charges = SmallVec::new();
        let mut diffusion = Vec::with_capacity(self.species.len());
        for (i, s) in self.species.iter().enumerate() {
            check_field(s.field, true)?;
            if !s.charge.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    name: "charge",
                    reason: format!("species {i}: must be finite, got {}", s.charge),
                }
                .into());
            }
            let expr = s
                .diffusion
                .as_ref()
                .ok_or_else(|| missing(&format!("diffusion coefficient for species {i}")))?;
            fields.push(s.field);
            charges.push(s.charge);
            diffusion.push(compile(expr)?);
        }

        let mut max_diffusivity = 0.0f64;
        for (i, plan) in diffusion.iter().enumerate() {
            for d in plan.eval_interior(store, &grid)? {
                if !(d >= 0.0) || !d.is_finite() {
                    return Err(ConfigError::InvalidParameter {
                        name: "diffusion coefficient",
                        reason: format!("species {i}: must be finite and >= 0, got {d}"),
                    }
                    .into());
                }
                max_diffusivity = max_diffusivity.max(d);
            }
        }

        Ok(SpeciesSystem {
            binary: self.binary.as_ref().map(&compile).transpose()?,
            electric: compile(electric)?,
            grid,
            template: self.template,
            dt: self.dt,
            fields,
            charges,
            diffusion,
            max_diffusivity,
        })
    }
}

fn missing(what: &str) -> Error {
    ConfigError::MissingConfiguration {
        what: what.to_string(),
    }
    .into()
}

impl NumMethod<FieldStore> for StefanMaxwell {
    fn name(&self) -> &str {
        "StefanMaxwell"
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn init(&mut self, store: &FieldStore) -> Result<(), Error> {
        self.configurable()?;
        let system = Arc::new(self.freeze(store)?);
        tracing::debug!(
            species = system.len(),
            coupled = system.binary.is_some(),
            stability = system.stability_number(),
            "StefanMaxwell initialised"
        );
        // Only `init` publishes, and it runs once.
        let _ = self.published.set(Arc::clone(&system));
        self.system = Some(system);
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn execute(&mut self, store: &mut FieldStore) -> Result<(), Error> {
        let system = self
            .system
            .as_ref()
            .ok_or_else(|| StateError::NotInitialized {
                method: "StefanMaxwell".to_string(),
            })?;
        let updated = system.advance(store)?;
        for (&field, values) in system.fields.iter().zip(&updated) {
            store.field_mut(field)?.replace_interior(0, values)?;
        }
        self.steps += 1;
        self.state = Lifecycle::Executing;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{apply_all, BoundaryCondition};
    use ionflux_core::{Axis, Face, FaceSet};
    use proptest::prelude::*;

    fn store_with(extent: [i32; 3], species: usize) -> (FieldStore, Vec<FieldId>, FieldId) {
        let grid = Arc::new(Grid::new(extent, 1.0).unwrap());
        let mut store = FieldStore::new();
        let ids = (0..species)
            .map(|i| store.allocate(&grid, &format!("c{}", i + 1), 1, 1).unwrap())
            .collect();
        let phi = store.allocate(&grid, "phi", 1, 1).unwrap();
        (store, ids, phi)
    }

    fn configured(ids: &[FieldId], phi: FieldId) -> StefanMaxwell {
        let mut sm = StefanMaxwell::new(ids.to_vec(), StencilTemplate::d3q7(), 1.0);
        for i in 0..ids.len() {
            sm.set_diffusion_coefficient(i, 0.1).unwrap();
        }
        sm.set_electric_field(Expr::field(phi)).unwrap();
        sm
    }

    #[test]
    fn execute_before_init_fails() {
        let (mut store, ids, phi) = store_with([4, 4, 4], 1);
        let mut sm = configured(&ids, phi);
        assert_eq!(
            sm.execute(&mut store),
            Err(Error::State(StateError::NotInitialized {
                method: "StefanMaxwell".into()
            }))
        );
    }

    #[test]
    fn setters_frozen_after_init() {
        let (store, ids, phi) = store_with([4, 4, 4], 2);
        let mut sm = configured(&ids, phi);
        sm.init(&store).unwrap();
        assert!(matches!(
            sm.set_charge(0, 1.0),
            Err(Error::State(StateError::AlreadyInitialized { .. }))
        ));
        assert!(matches!(
            sm.set_binary_coefficient(0.1),
            Err(Error::State(StateError::AlreadyInitialized { .. }))
        ));
        assert!(sm.init(&store).is_err());
    }

    #[test]
    fn species_index_checked() {
        let (_, ids, phi) = store_with([4, 4, 4], 2);
        let mut sm = configured(&ids, phi);
        assert_eq!(
            sm.set_charge(2, -1.0),
            Err(Error::Config(ConfigError::InvalidSpecies { index: 2, count: 2 }))
        );
    }

    #[test]
    fn missing_configuration_reported() {
        let (store, ids, _) = store_with([4, 4, 4], 2);
        let mut sm = StefanMaxwell::new(ids.clone(), StencilTemplate::d3q7(), 1.0);
        sm.set_diffusion_coefficient(0, 0.1).unwrap();
        sm.set_electric_field(0.0).unwrap();
        let err = sm.init(&store).unwrap_err();
        assert!(err.to_string().contains("species 1"));

        let mut sm = StefanMaxwell::new(ids, StencilTemplate::d3q7(), 1.0);
        sm.set_diffusion_coefficient(0, 0.1).unwrap();
        sm.set_diffusion_coefficient(1, 0.1).unwrap();
        assert!(matches!(
            sm.init(&store),
            Err(Error::Config(ConfigError::MissingConfiguration { .. }))
        ));
    }

    #[test]
    fn rejects_thin_halo_and_vector_fields() {
        let grid = Arc::new(Grid::new([4, 4, 4], 1.0).unwrap());
        let mut store = FieldStore::new();
        let thin = store.allocate(&grid, "thin", 1, 0).unwrap();
        let vector = store.allocate(&grid, "v", 3, 1).unwrap();

        let mut sm = StefanMaxwell::new(vec![thin], StencilTemplate::d3q7(), 1.0);
        sm.set_diffusion_coefficient(0, 0.1).unwrap();
        sm.set_electric_field(0.0).unwrap();
        assert!(matches!(
            sm.init(&store),
            Err(Error::Config(ConfigError::InsufficientHalo { .. }))
        ));

        let mut sm = StefanMaxwell::new(vec![vector], StencilTemplate::d3q7(), 1.0);
        sm.set_diffusion_coefficient(0, 0.1).unwrap();
        sm.set_electric_field(0.0).unwrap();
        assert!(matches!(
            sm.init(&store),
            Err(Error::Config(ConfigError::NotScalar { .. }))
        ));
    }

    #[test]
    fn negative_diffusivity_rejected() {
        let (store, ids, phi) = store_with([4, 4, 4], 1);
        let mut sm = configured(&ids, phi);
        let d = Expr::position(Axis::X).difference(Expr::constant(1.0));
        sm.set_diffusion_coefficient(0, d).unwrap();
        assert!(matches!(
            sm.init(&store),
            Err(Error::Config(ConfigError::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn stability_number_and_max_dt() {
        let (store, ids, phi) = store_with([10, 20, 20], 2);
        let mut sm = configured(&ids, phi);
        sm.set_diffusion_coefficient(0, 0.15).unwrap();
        sm.set_diffusion_coefficient(1, 0.075).unwrap();
        assert_eq!(sm.stability_number(), None);
        sm.init(&store).unwrap();
        assert_eq!(sm.stability_number(), Some(0.15));
        let max_dt = sm.max_dt().unwrap();
        assert!((max_dt - 1.0 / (6.0 * 0.15)).abs() < 1e-12);
    }

    #[test]
    fn observer_sees_system_after_init() {
        let (store, ids, phi) = store_with([4, 4, 4], 2);
        let mut sm = configured(&ids, phi);
        sm.set_charge(0, -2.0).unwrap();
        let obs = sm.observer();
        assert!(!obs.is_ready());
        sm.init(&store).unwrap();
        let system = obs.get().unwrap();
        assert_eq!(system.fields(), ids.as_slice());
        assert_eq!(system.charges(), &[-2.0, 0.0]);
    }

    #[test]
    fn pure_diffusion_conserves_mass_plus_inflow() {
        let (mut store, ids, phi) = store_with([5, 4, 3], 1);
        let c = ids[0];
        store
            .field_mut(c)
            .unwrap()
            .fill_with(0, |[x, y, z]| 0.2 + 0.1 * x as f64 + 0.05 * (y * z) as f64)
            .unwrap();
        let mut bcs = vec![
            BoundaryCondition::constant_value(c, 1.0, Face::XE),
            BoundaryCondition::constant_value(c, 0.0, Face::X0),
            BoundaryCondition::fixed_gradient(
                c,
                0.0,
                FaceSet::all().difference(&[Face::X0, Face::XE].into()),
            ),
        ];
        let mut sm = configured(&ids, phi);
        sm.init(&store).unwrap();
        for _ in 0..5 {
            apply_all(&mut bcs, &mut store).unwrap();
            let f = store.field(c).unwrap();
            let grid = Arc::clone(f.grid());
            let mut inflow = 0.0;
            for idx in grid.interior() {
                for face in Face::ALL {
                    let mut nb = idx;
                    nb[face.axis().index()] += face.outward_sign();
                    if !grid.contains(nb) {
                        inflow += 0.1 * (f.get(nb, 0).unwrap() - f.get(idx, 0).unwrap());
                    }
                }
            }
            let predicted = sm.system().unwrap().boundary_inflow(&store).unwrap();
            assert!((predicted[0] - inflow).abs() < 1e-12);
            let before = f.interior_sum(0).unwrap();
            sm.execute(&mut store).unwrap();
            let after = store.field(c).unwrap().interior_sum(0).unwrap();
            assert!(
                (after - before - inflow).abs() < 1e-12,
                "mass changed by {} but boundary inflow was {inflow}",
                after - before
            );
        }
        assert_eq!(sm.steps(), 5);
    }

    #[test]
    fn coupled_flux_conserves_mass_in_closed_box() {
        let (mut store, ids, phi) = store_with([4, 4, 4], 2);
        for (k, &id) in ids.iter().enumerate() {
            store
                .field_mut(id)
                .unwrap()
                .fill_with(0, |[x, y, z]| 0.5 + 0.1 * ((x + 2 * y + 3 * z + k as i32) % 5) as f64)
                .unwrap();
        }
        store
            .field_mut(phi)
            .unwrap()
            .fill_with(0, |[x, _, _]| 0.05 * x as f64)
            .unwrap();
        let mut bcs: Vec<BoundaryCondition> = ids
            .iter()
            .chain(std::iter::once(&phi))
            .map(|&id| BoundaryCondition::fixed_gradient(id, 0.0, FaceSet::all()))
            .collect();
        let mut sm = configured(&ids, phi);
        sm.set_charge(0, 1.0).unwrap();
        sm.set_charge(1, -1.0).unwrap();
        sm.set_binary_coefficient(0.05).unwrap();
        sm.init(&store).unwrap();
        let mass = |store: &FieldStore| -> Vec<f64> {
            ids.iter()
                .map(|&id| store.field(id).unwrap().interior_sum(0).unwrap())
                .collect()
        };
        let before = mass(&store);
        for _ in 0..10 {
            apply_all(&mut bcs, &mut store).unwrap();
            sm.execute(&mut store).unwrap();
        }
        for (b, a) in before.iter().zip(mass(&store)) {
            assert!((a - b).abs() < 1e-10, "mass drifted from {b} to {a}");
        }
    }

    #[test]
    fn coupled_mass_change_matches_boundary_inflow() {
        let (mut store, ids, phi) = store_with([6, 3, 2], 2);
        store
            .field_mut(ids[0])
            .unwrap()
            .fill_with(0, |[x, y, _]| 0.4 + 0.05 * x as f64 + 0.01 * y as f64)
            .unwrap();
        store.field_mut(ids[1]).unwrap().fill(0.6);
        store
            .field_mut(phi)
            .unwrap()
            .fill_with(0, |[x, _, _]| 0.02 * x as f64)
            .unwrap();
        let lateral = FaceSet::all().difference(&[Face::X0, Face::XE].into());
        let mut bcs = vec![
            BoundaryCondition::constant_value(ids[0], 0.1, Face::X0),
            BoundaryCondition::constant_value(ids[0], 1.0, Face::XE),
            BoundaryCondition::fixed_gradient(ids[0], 0.0, lateral),
            BoundaryCondition::constant_value(ids[1], 1.0, Face::X0),
            BoundaryCondition::constant_value(ids[1], 0.1, Face::XE),
            BoundaryCondition::fixed_gradient(ids[1], 0.0, lateral),
            BoundaryCondition::fixed_gradient(phi, 0.1, FaceSet::all()),
        ];
        let mut sm = configured(&ids, phi);
        sm.set_diffusion_coefficient(1, 0.05).unwrap();
        sm.set_charge(0, -2.0).unwrap();
        sm.set_binary_coefficient(0.15).unwrap();
        sm.init(&store).unwrap();
        let system = Arc::clone(sm.system().unwrap());
        for _ in 0..5 {
            apply_all(&mut bcs, &mut store).unwrap();
            let inflow = system.boundary_inflow(&store).unwrap();
            let before: Vec<f64> = ids
                .iter()
                .map(|&id| store.field(id).unwrap().interior_sum(0).unwrap())
                .collect();
            sm.execute(&mut store).unwrap();
            for (i, &id) in ids.iter().enumerate() {
                let after = store.field(id).unwrap().interior_sum(0).unwrap();
                assert!(inflow[i] != 0.0);
                assert!(
                    (after - before[i] - inflow[i]).abs() < 1e-12,
                    "species {i}: changed by {} but boundary inflow was {}",
                    after - before[i],
                    inflow[i]
                );
            }
        }
    }

    proptest! {
        #[test]
        fn uniform_state_is_stationary(
            c1 in 0.0f64..2.0,
            c2 in 0.0f64..2.0,
            z1 in -3.0f64..3.0,
            d1 in 0.01f64..0.15,
            d_bin in proptest::option::of(0.01f64..0.5),
            psi in -1.0f64..1.0,
        ) {
            let (mut store, ids, phi) = store_with([3, 4, 2], 2);
            store.field_mut(ids[0]).unwrap().fill(c1);
            store.field_mut(ids[1]).unwrap().fill(c2);
            store.field_mut(phi).unwrap().fill(psi);
            let mut sm = configured(&ids, phi);
            sm.set_diffusion_coefficient(0, d1).unwrap();
            sm.set_charge(0, z1).unwrap();
            if let Some(d) = d_bin {
                sm.set_binary_coefficient(d).unwrap();
            }
            sm.init(&store).unwrap();
            let mut bcs: Vec<BoundaryCondition> = ids
                .iter()
                .map(|&id| BoundaryCondition::fixed_gradient(id, 0.0, FaceSet::all()))
                .collect();
            for _ in 0..3 {
                apply_all(&mut bcs, &mut store).unwrap();
                sm.execute(&mut store).unwrap();
            }
            for (&id, v) in ids.iter().zip([c1, c2]) {
                let values = store.field(id).unwrap().interior_values(0).unwrap();
                prop_assert!(values.iter().all(|&x| x == v));
            }
        }
    }
}
