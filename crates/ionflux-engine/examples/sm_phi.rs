//! Two-species Stefan-Maxwell transport in a self-consistent potential.
//!
//! Demonstrates: allocate fields → configure operators → declare boundary
//! conditions → run the stepper with a channel sink → print `x` profiles
//! from a writer thread.
//!
//! Set `RUST_LOG=ionflux_engine=info` to see per-checkpoint masses.

use std::sync::Arc;
use std::thread;

use ionflux_core::{Face, FaceSet};
use ionflux_engine::{x_profile, ChannelSink, StepperConfig, TimeStepper};
use ionflux_grid::{Expr, FieldStore, Grid, StencilTemplate};
use ionflux_numerics::{BoundaryCondition, PotentialRelaxation, StefanMaxwell};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("=== ionflux: Stefan-Maxwell with potential ===\n");

    let dx = 1.0;
    let dt = 1.0;
    let grid = Arc::new(Grid::new([10, 20, 20], dx)?);
    let mut store = FieldStore::new();
    let c1 = store.allocate(&grid, "c1", 1, 1)?;
    let c2 = store.allocate(&grid, "c2", 1, 1)?;
    let phi = store.allocate(&grid, "phi", 1, 1)?;
    for id in [c1, c2, phi] {
        store.field_mut(id)?.fill(0.5);
    }

    let mut transport = StefanMaxwell::new(vec![c1, c2], StencilTemplate::d3q7(), dt);
    transport.set_diffusion_coefficient(0, 0.075)?;
    transport.set_diffusion_coefficient(1, 0.15)?;
    transport.set_binary_coefficient(0.15)?;
    transport.set_charge(0, -2.0)?;
    transport.set_charge(1, 0.0)?;
    transport.set_electric_field(Expr::field(phi))?;

    let mut potential = PotentialRelaxation::new(transport.observer(), phi);
    potential.set_permittivity(100.0)?;

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

    let config = StepperConfig {
        checkpoint_initial: true,
        ..StepperConfig::default()
    };
    let mut stepper = TimeStepper::builder(store)
        .transport(transport)
        .potential(potential)
        .species_boundary(species_boundary)
        .potential_boundary(potential_boundary)
        .config(config)
        .build()?;
    if let (Some(number), Some(max_dt)) = (
        stepper.transport().stability_number(),
        stepper.transport().max_dt(),
    ) {
        println!("stability number {number:.3} (dt {dt}, largest stable dt {max_dt:.3})");
    }

    let (mut sink, rx) = ChannelSink::bounded(4);
    let writer = thread::spawn(move || {
        for cp in rx {
            println!("step {:>3}", cp.step);
            for (name, field) in &cp.fields {
                match x_profile(field) {
                    Ok(profile) => {
                        let cells: Vec<String> = profile.iter().map(|v| format!("{v:.3}")).collect();
                        println!("  {name:>3}: [{}]", cells.join(", "));
                    }
                    Err(e) => eprintln!("  {name}: {e}"),
                }
            }
        }
    });

    let summary = stepper.run(&mut sink)?;
    drop(sink);
    if writer.join().is_err() {
        eprintln!("writer thread panicked");
    }

    let m = &summary.metrics;
    println!(
        "\n{} steps, {} checkpoints, {:.1} ms total ({:.1} ms relaxation, {:.1} ms transport)",
        summary.steps,
        summary.checkpoints.len(),
        m.total_us as f64 / 1e3,
        m.relaxation_us as f64 / 1e3,
        m.transport_us as f64 / 1e3,
    );
    Ok(())
}
