//! Benchmark profiles for the ionflux solver.
//!
//! - [`reference_profile`]: the two-species scenario on its full
//!   10x20x20 grid (4K cells).
//! - [`stress_profile`]: the same physics on 40x40x40 (64K cells).
//! - [`randomize_species`]: seeded interior perturbation so kernels do
//!   not run on a uniform state.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use ionflux_core::Error;
use ionflux_test_utils::{ReferenceCase, REFERENCE_EXTENT};

/// Grid of [`stress_profile`].
pub const STRESS_EXTENT: [i32; 3] = [40, 40, 40];

/// The reference scenario with interiors perturbed from `seed`.
pub fn reference_profile(seed: u64) -> Result<ReferenceCase, Error> {
    let mut case = ReferenceCase::new(REFERENCE_EXTENT)?;
    randomize_species(&mut case, seed)?;
    Ok(case)
}

/// [`reference_profile`] at 16x the cell count.
pub fn stress_profile(seed: u64) -> Result<ReferenceCase, Error> {
    let mut case = ReferenceCase::new(STRESS_EXTENT)?;
    randomize_species(&mut case, seed)?;
    Ok(case)
}

/// Draw every interior concentration from `[0.2, 0.8)` and the potential
/// from `[0, 1)`, deterministically from `seed`.
pub fn randomize_species(case: &mut ReferenceCase, seed: u64) -> Result<(), Error> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for id in [case.c1, case.c2] {
        case.store
            .field_mut(id)?
            .fill_with(0, |_| rng.random_range(0.2..0.8))?;
    }
    case.store
        .field_mut(case.phi)?
        .fill_with(0, |_| rng.random_range(0.0..1.0))?;
    Ok(())
}
