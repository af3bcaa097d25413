//! The outer time loop.
//!
//! [`TimeStepper`] owns the field store, both operators and both boundary
//! batches for the duration of a run. Each call to
//! [`step()`](TimeStepper::step) performs one outer step:
//!
//! 1. `inner_sweeps` times: potential boundary conditions, one
//!    relaxation sweep. Then the potential boundary conditions once more
//!    so the halo matches the relaxed interior.
//! 2. Concentration boundary conditions.
//! 3. One Stefan-Maxwell update, then the concentration boundary
//!    conditions again.
//! 4. A checkpoint when the step is a multiple of `checkpoint_every`.
//!
//! Any error aborts the run; an aborted or finished stepper refuses
//! further steps.

use std::time::Instant;

use ionflux_core::{ConfigError, Error, FieldId, NumMethod, StateError};
use ionflux_grid::FieldStore;
use ionflux_numerics::{apply_all, BoundaryCondition, PotentialRelaxation, StefanMaxwell};

use crate::checkpoint::{CheckpointSink, NamedFields};
use crate::config::StepperConfig;
use crate::diagnostics::FieldSummary;
use crate::metrics::StepMetrics;

// ── RunState ────────────────────────────────────────────────────

/// Where a [`TimeStepper`] is in its run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Built; boundary conditions not yet applied.
    Idle,
    /// At least the initial boundary pass has run.
    Running,
    /// All configured outer steps completed.
    Finished,
    /// An error stopped the run.
    Aborted,
}

// ── RunSummary ──────────────────────────────────────────────────

/// Outcome of a completed [`TimeStepper::run`].
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Outer steps performed.
    pub steps: u64,
    /// Steps at which a checkpoint was written, in order.
    pub checkpoints: Vec<u64>,
    /// Timings summed over every step.
    pub metrics: StepMetrics,
}

// ── Builder ─────────────────────────────────────────────────────

/// Assembles a [`TimeStepper`].
///
/// Both operators are required. Operators and boundary conditions that
/// have not been initialised yet are initialised by
/// [`build()`](Self::build), transport first.
#[derive(Debug)]
pub struct TimeStepperBuilder {
    store: FieldStore,
    transport: Option<StefanMaxwell>,
    potential: Option<PotentialRelaxation>,
    species_boundary: Vec<BoundaryCondition>,
    potential_boundary: Vec<BoundaryCondition>,
    checkpoint_fields: Option<Vec<FieldId>>,
    config: StepperConfig,
}

impl TimeStepperBuilder {
    /// The Stefan-Maxwell operator advancing the species.
    pub fn transport(mut self, transport: StefanMaxwell) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The relaxation operator for the electric potential.
    pub fn potential(mut self, potential: PotentialRelaxation) -> Self {
        self.potential = Some(potential);
        self
    }

    /// Boundary conditions on the concentration fields, applied in order.
    pub fn species_boundary(mut self, conditions: Vec<BoundaryCondition>) -> Self {
        self.species_boundary = conditions;
        self
    }

    /// Append one concentration boundary condition.
    pub fn add_species_boundary(mut self, condition: BoundaryCondition) -> Self {
        self.species_boundary.push(condition);
        self
    }

    /// Boundary conditions on the potential field, applied in order.
    pub fn potential_boundary(mut self, conditions: Vec<BoundaryCondition>) -> Self {
        self.potential_boundary = conditions;
        self
    }

    /// Append one potential boundary condition.
    pub fn add_potential_boundary(mut self, condition: BoundaryCondition) -> Self {
        self.potential_boundary.push(condition);
        self
    }

    /// Fields handed to the sink, in this order. Default: every field in
    /// allocation order.
    pub fn checkpoint_fields(mut self, fields: Vec<FieldId>) -> Self {
        self.checkpoint_fields = Some(fields);
        self
    }

    /// Step counts and checkpoint cadence.
    pub fn config(mut self, config: StepperConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate, initialise and return a stepper in [`RunState::Idle`].
    pub fn build(self) -> Result<TimeStepper, Error> {
        self.config.validate()?;
        let store = self.store;
        let mut transport = self.transport.ok_or_else(|| missing("transport operator"))?;
        let mut potential = self.potential.ok_or_else(|| missing("potential operator"))?;

        if !transport.lifecycle().is_initialized() {
            transport.init(&store)?;
        }
        if !potential.lifecycle().is_initialized() {
            potential.init(&store)?;
        }
        let system = transport.system().ok_or_else(|| StateError::NotInitialized {
            method: transport.name().to_string(),
        })?;
        if !potential.observes(system) {
            return Err(ConfigError::InvalidParameter {
                name: "potential",
                reason: "observes a different StefanMaxwell operator".to_string(),
            }
            .into());
        }

        let mut species_boundary = self.species_boundary;
        let mut potential_boundary = self.potential_boundary;
        for bc in species_boundary.iter_mut().chain(potential_boundary.iter_mut()) {
            if !bc.lifecycle().is_initialized() {
                bc.init(&store)?;
            }
        }

        let checkpoint_fields = match self.checkpoint_fields {
            Some(ids) => {
                for &id in &ids {
                    store.field(id)?;
                }
                ids
            }
            None => store.iter().map(|(id, _)| id).collect(),
        };

        let stability = system.stability_number();
        let bound = system.stability_bound();
        if stability > bound {
            tracing::warn!(
                stability,
                bound,
                dt = system.dt(),
                "explicit transport step exceeds its stability bound"
            );
        }

        Ok(TimeStepper {
            store,
            transport,
            potential,
            species_boundary,
            potential_boundary,
            checkpoint_fields,
            config: self.config,
            state: RunState::Idle,
            step: 0,
            checkpoints: Vec::new(),
            totals: StepMetrics::default(),
            last_metrics: StepMetrics::default(),
        })
    }
}

fn missing(what: &str) -> Error {
    ConfigError::MissingConfiguration {
        what: what.to_string(),
    }
    .into()
}

fn micros(since: Instant) -> u64 {
    since.elapsed().as_micros() as u64
}

// ── TimeStepper ─────────────────────────────────────────────────

/// Drives the nested potential and transport loops over a run.
///
/// # Example
///
/// ```ignore
/// let mut stepper = TimeStepper::builder(store)
///     .transport(sm)
///     .potential(relax)
///     .species_boundary(species_bcs)
///     .potential_boundary(phi_bcs)
///     .build()?;
/// let summary = stepper.run(&mut NullSink)?;
/// ```
#[derive(Debug)]
pub struct TimeStepper {
    store: FieldStore,
    transport: StefanMaxwell,
    potential: PotentialRelaxation,
    species_boundary: Vec<BoundaryCondition>,
    potential_boundary: Vec<BoundaryCondition>,
    checkpoint_fields: Vec<FieldId>,
    config: StepperConfig,
    state: RunState,
    step: u64,
    checkpoints: Vec<u64>,
    totals: StepMetrics,
    last_metrics: StepMetrics,
}

impl TimeStepper {
    /// Start assembling a stepper around `store`.
    pub fn builder(store: FieldStore) -> TimeStepperBuilder {
        TimeStepperBuilder {
            store,
            transport: None,
            potential: None,
            species_boundary: Vec::new(),
            potential_boundary: Vec::new(),
            checkpoint_fields: None,
            config: StepperConfig::default(),
        }
    }

    /// Run every remaining outer step.
    pub fn run(&mut self, sink: &mut dyn CheckpointSink) -> Result<RunSummary, Error> {
        loop {
            self.step(sink)?;
            if self.state == RunState::Finished {
                break;
            }
        }
        Ok(RunSummary {
            steps: self.step,
            checkpoints: self.checkpoints.clone(),
            metrics: self.totals.clone(),
        })
    }

    /// Perform one outer step, applying the initial boundary pass first
    /// if the run has not started.
    pub fn step(&mut self, sink: &mut dyn CheckpointSink) -> Result<&StepMetrics, Error> {
        match self.state {
            RunState::Finished => return Err(StateError::RunFinished.into()),
            RunState::Aborted => return Err(StateError::RunAborted.into()),
            RunState::Idle | RunState::Running => {}
        }
        if let Err(e) = self.try_step(sink) {
            tracing::warn!(step = self.step, error = %e, "run aborted");
            self.state = RunState::Aborted;
            return Err(e);
        }
        Ok(&self.last_metrics)
    }

    fn try_step(&mut self, sink: &mut dyn CheckpointSink) -> Result<(), Error> {
        if self.state == RunState::Idle {
            self.start(sink)?;
        }
        let step = self.step + 1;
        let started = Instant::now();
        let mut metrics = StepMetrics::default();

        let t = Instant::now();
        for _ in 0..self.config.inner_sweeps {
            apply_all(&mut self.potential_boundary, &mut self.store)?;
            self.potential.execute(&mut self.store)?;
        }
        apply_all(&mut self.potential_boundary, &mut self.store)?;
        metrics.relaxation_us = micros(t);
        metrics.sweeps = u64::from(self.config.inner_sweeps);

        let t = Instant::now();
        apply_all(&mut self.species_boundary, &mut self.store)?;
        metrics.boundary_us = micros(t);

        let t = Instant::now();
        self.transport.execute(&mut self.store)?;
        metrics.transport_us = micros(t);

        let t = Instant::now();
        apply_all(&mut self.species_boundary, &mut self.store)?;
        metrics.boundary_us += micros(t);

        self.step = step;
        if self.config.is_checkpoint(step) {
            let t = Instant::now();
            self.checkpoint(step, sink)?;
            metrics.checkpoint_us = micros(t);
        }
        metrics.total_us = micros(started);

        tracing::trace!(
            step,
            total_us = metrics.total_us,
            relaxation_us = metrics.relaxation_us,
            transport_us = metrics.transport_us,
            "outer step complete"
        );
        self.totals.accumulate(&metrics);
        self.last_metrics = metrics;

        if step >= self.config.outer_steps {
            self.state = RunState::Finished;
            tracing::info!(
                steps = step,
                checkpoints = self.checkpoints.len(),
                total_us = self.totals.total_us,
                "run finished"
            );
        }
        Ok(())
    }

    fn start(&mut self, sink: &mut dyn CheckpointSink) -> Result<(), Error> {
        tracing::info!(
            outer_steps = self.config.outer_steps,
            inner_sweeps = self.config.inner_sweeps,
            species = self.transport.species_count(),
            "run started"
        );
        apply_all(&mut self.species_boundary, &mut self.store)?;
        apply_all(&mut self.potential_boundary, &mut self.store)?;
        self.state = RunState::Running;
        if self.config.checkpoint_initial {
            self.checkpoint(0, sink)?;
        }
        Ok(())
    }

    fn checkpoint(&mut self, step: u64, sink: &mut dyn CheckpointSink) -> Result<(), Error> {
        let named = NamedFields::from_store(&self.store, &self.checkpoint_fields)?;
        for (name, field) in named.iter() {
            let summary = FieldSummary::of(field)?;
            tracing::info!(
                step,
                field = name,
                mass = summary.mass,
                min = summary.min,
                max = summary.max,
                "checkpoint"
            );
        }
        sink.write(step, &named)?;
        self.checkpoints.push(step);
        Ok(())
    }

    /// The field store.
    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Outer steps completed so far.
    pub fn current_step(&self) -> u64 {
        self.step
    }

    /// The run configuration.
    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Timing of the most recent step.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.last_metrics
    }

    /// The Stefan-Maxwell operator.
    pub fn transport(&self) -> &StefanMaxwell {
        &self.transport
    }

    /// The potential relaxation operator.
    pub fn potential(&self) -> &PotentialRelaxation {
        &self.potential
    }

    /// Steps at which checkpoints were written so far.
    pub fn checkpoints(&self) -> &[u64] {
        &self.checkpoints
    }

    /// Consume the stepper and return its field store.
    pub fn into_store(self) -> FieldStore {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::NullSink;
    use ionflux_core::{Face, FaceSet, SinkError};
    use ionflux_grid::{Expr, Grid, StencilTemplate};
    use std::sync::Arc;

    struct Parts {
        store: FieldStore,
        c: FieldId,
        phi: FieldId,
        transport: StefanMaxwell,
        potential: PotentialRelaxation,
    }

    fn parts(extent: [i32; 3]) -> Parts {
        let grid = Arc::new(Grid::new(extent, 1.0).unwrap());
        let mut store = FieldStore::new();
        let c = store.allocate(&grid, "c", 1, 1).unwrap();
        let phi = store.allocate(&grid, "phi", 1, 1).unwrap();
        store.field_mut(c).unwrap().fill(0.5);
        let mut transport = StefanMaxwell::new(vec![c], StencilTemplate::d3q7(), 1.0);
        transport.set_diffusion_coefficient(0, 0.1).unwrap();
        transport.set_charge(0, 1.0).unwrap();
        transport.set_electric_field(Expr::field(phi)).unwrap();
        let mut potential = PotentialRelaxation::new(transport.observer(), phi);
        potential.set_permittivity(100.0).unwrap();
        Parts {
            store,
            c,
            phi,
            transport,
            potential,
        }
    }

    fn short(outer_steps: u64, checkpoint_every: u64) -> StepperConfig {
        StepperConfig {
            outer_steps,
            inner_sweeps: 3,
            checkpoint_every,
            checkpoint_initial: false,
        }
    }

    #[derive(Default)]
    struct Steps(Vec<u64>);

    impl CheckpointSink for Steps {
        fn write(&mut self, step: u64, _fields: &NamedFields<'_>) -> Result<(), SinkError> {
            self.0.push(step);
            Ok(())
        }
    }

    #[test]
    fn missing_operators_rejected() {
        let p = parts([3, 3, 3]);
        let err = TimeStepper::builder(p.store)
            .transport(p.transport)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingConfiguration { .. })
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let p = parts([3, 3, 3]);
        let err = TimeStepper::builder(p.store)
            .transport(p.transport)
            .potential(p.potential)
            .config(short(0, 1))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidParameter { name: "outer_steps", .. })
        ));
    }

    #[test]
    fn potential_of_another_operator_rejected() {
        let p = parts([3, 3, 3]);
        let mut other = StefanMaxwell::new(vec![p.c], StencilTemplate::d3q7(), 1.0);
        other.set_diffusion_coefficient(0, 0.1).unwrap();
        other.set_electric_field(Expr::field(p.phi)).unwrap();
        let potential = PotentialRelaxation::new(other.observer(), p.phi);
        other.init(&p.store).unwrap();
        let err = TimeStepper::builder(p.store)
            .transport(p.transport)
            .potential(potential)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidParameter { name: "potential", .. })
        ));
    }

    #[test]
    fn unknown_checkpoint_field_rejected() {
        let p = parts([3, 3, 3]);
        let err = TimeStepper::builder(p.store)
            .transport(p.transport)
            .potential(p.potential)
            .checkpoint_fields(vec![FieldId(9)])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnboundField { .. })));
    }

    #[test]
    fn run_visits_every_step_and_finishes() {
        let p = parts([4, 3, 3]);
        let mut stepper = TimeStepper::builder(p.store)
            .transport(p.transport)
            .potential(p.potential)
            .add_species_boundary(BoundaryCondition::fixed_gradient(p.c, 0.0, FaceSet::all()))
            .add_potential_boundary(BoundaryCondition::constant_value(p.phi, 0.0, FaceSet::all()))
            .config(short(7, 3))
            .build()
            .unwrap();
        assert_eq!(stepper.state(), RunState::Idle);

        let mut sink = Steps::default();
        let summary = stepper.run(&mut sink).unwrap();
        assert_eq!(summary.steps, 7);
        assert_eq!(summary.checkpoints, vec![3, 6]);
        assert_eq!(sink.0, vec![3, 6]);
        assert_eq!(summary.metrics.sweeps, 21);
        assert_eq!(stepper.state(), RunState::Finished);
        assert_eq!(stepper.transport().steps(), 7);
        assert_eq!(stepper.potential().sweeps(), 21);

        assert_eq!(
            stepper.step(&mut NullSink).unwrap_err(),
            Error::State(StateError::RunFinished)
        );
        assert_eq!(
            stepper.run(&mut NullSink).unwrap_err(),
            Error::State(StateError::RunFinished)
        );
    }

    #[test]
    fn initial_checkpoint_follows_boundary_pass() {
        let p = parts([3, 3, 3]);
        let c = p.c;
        let mut stepper = TimeStepper::builder(p.store)
            .transport(p.transport)
            .potential(p.potential)
            .add_species_boundary(BoundaryCondition::constant_value(c, 2.0, Face::XE))
            .checkpoint_fields(vec![c])
            .config(StepperConfig {
                checkpoint_initial: true,
                ..short(1, 1)
            })
            .build()
            .unwrap();
        let mut seen = Vec::new();
        struct Halo<'a>(&'a mut Vec<f64>);
        impl CheckpointSink for Halo<'_> {
            fn write(&mut self, _step: u64, fields: &NamedFields<'_>) -> Result<(), SinkError> {
                let c = fields.get("c").ok_or_else(|| SinkError::new("no c"))?;
                self.0.push(c.get([3, 1, 1], 0).map_err(|e| SinkError::new(e.to_string()))?);
                Ok(())
            }
        }
        let summary = stepper.run(&mut Halo(&mut seen)).unwrap();
        assert_eq!(summary.checkpoints, vec![0, 1]);
        assert_eq!(seen, vec![2.0, 2.0]);
    }

    #[test]
    fn failing_sink_aborts() {
        struct Broken;
        impl CheckpointSink for Broken {
            fn write(&mut self, _step: u64, _fields: &NamedFields<'_>) -> Result<(), SinkError> {
                Err(SinkError::new("disk full"))
            }
        }
        let p = parts([3, 3, 3]);
        let mut stepper = TimeStepper::builder(p.store)
            .transport(p.transport)
            .potential(p.potential)
            .config(short(4, 2))
            .build()
            .unwrap();
        stepper.step(&mut Broken).unwrap();
        let err = stepper.step(&mut Broken).unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
        assert_eq!(stepper.state(), RunState::Aborted);
        assert_eq!(
            stepper.step(&mut NullSink).unwrap_err(),
            Error::State(StateError::RunAborted)
        );
    }
}
