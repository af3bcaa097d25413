//! Per-face Stefan-Maxwell flux solve.
//!
//! Across one cell face the species fluxes `N` satisfy the dusty-gas form
//! of the Stefan-Maxwell relations:
//!
//! ```text
//! N_i / D_i + sum_{j != i} (c_j N_i - c_i N_j) / (c_t D_bin) = F_i
//! ```
//!
//! where `c` are face-averaged concentrations, `c_t = sum c`, `D_i` the
//! species' diffusion coefficients against the background medium, `D_bin`
//! the species-species coefficient and `F_i` the driving force. The system
//! is a few rows at most and is solved directly by LU decomposition. Up to
//! four species use stack-allocated matrices.

use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, Matrix4, Vector2, Vector3, Vector4};
use smallvec::{smallvec, SmallVec};

/// Per-species values at one face. Four species fit inline.
pub type PerSpecies = SmallVec<[f64; 4]>;

/// Solve for the fluxes across one face.
///
/// Falls back to the uncoupled law `N_i = D_i F_i` when there is no binary
/// coefficient, fewer than two species, a non-positive total concentration
/// or diffusion coefficient, or a singular system.
pub fn face_fluxes(
    conc: &[f64],
    diffusivity: &[f64],
    driving: &[f64],
    binary: Option<f64>,
) -> PerSpecies {
    let n = conc.len();
    debug_assert!(diffusivity.len() == n && driving.len() == n);
    let uncoupled = || -> PerSpecies { (0..n).map(|i| diffusivity[i] * driving[i]).collect() };

    let d_bin = match binary {
        Some(d) if d > 0.0 && d.is_finite() && n > 1 => d,
        _ => return uncoupled(),
    };
    let total: f64 = conc.iter().sum();
    if !(total > 0.0) || diffusivity.iter().any(|&d| !(d > 0.0)) {
        return uncoupled();
    }

    let scale = 1.0 / (total * d_bin);
    let mut m: SmallVec<[f64; 16]> = smallvec![0.0; n * n];
    for i in 0..n {
        let mut diag = 1.0 / diffusivity[i];
        for j in 0..n {
            if j != i {
                diag += conc[j] * scale;
                m[i * n + j] = -conc[i] * scale;
            }
        }
        m[i * n + i] = diag;
    }
    match lu_solve(&m, driving, n) {
        Some(flux) if flux.iter().all(|v| v.is_finite()) => flux,
        _ => uncoupled(),
    }
}

/// Solve the row-major `n x n` system `m x = rhs` by LU decomposition
/// with partial pivoting. Returns `None` if the matrix is singular.
///
/// The Stefan-Maxwell matrix is strictly diagonally dominant by columns
/// for positive `D_i` and `c`, so singularity only arises from degenerate
/// input.
fn lu_solve(m: &[f64], rhs: &[f64], n: usize) -> Option<PerSpecies> {
    let collect = |x: &[f64]| -> PerSpecies { x.iter().copied().collect() };
    match n {
        2 => Matrix2::from_row_slice(m)
            .lu()
            .solve(&Vector2::from_row_slice(rhs))
            .map(|x| collect(x.as_slice())),
        3 => Matrix3::from_row_slice(m)
            .lu()
            .solve(&Vector3::from_row_slice(rhs))
            .map(|x| collect(x.as_slice())),
        4 => Matrix4::from_row_slice(m)
            .lu()
            .solve(&Vector4::from_row_slice(rhs))
            .map(|x| collect(x.as_slice())),
        _ => DMatrix::from_row_slice(n, n, m)
            .lu()
            .solve(&DVector::from_row_slice(rhs))
            .map(|x| collect(x.as_slice())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn residual(conc: &[f64], diff: &[f64], drive: &[f64], d_bin: f64, n_flux: &[f64]) -> f64 {
        let total: f64 = conc.iter().sum();
        let mut worst = 0.0f64;
        for i in 0..conc.len() {
            let mut lhs = n_flux[i] / diff[i];
            for j in 0..conc.len() {
                if j != i {
                    lhs += (conc[j] * n_flux[i] - conc[i] * n_flux[j]) / (total * d_bin);
                }
            }
            worst = worst.max((lhs - drive[i]).abs());
        }
        worst
    }

    #[test]
    fn no_binary_coefficient_is_uncoupled() {
        let n = face_fluxes(&[1.0, 2.0], &[0.5, 0.25], &[-1.0, 4.0], None);
        assert_eq!(n.as_slice(), &[-0.5, 1.0]);
    }

    #[test]
    fn single_species_ignores_binary() {
        let n = face_fluxes(&[1.0], &[0.15], &[2.0], Some(0.15));
        assert_eq!(n.as_slice(), &[0.3]);
    }

    #[test]
    fn empty_medium_is_uncoupled() {
        let n = face_fluxes(&[0.0, 0.0], &[0.1, 0.2], &[1.0, 1.0], Some(0.1));
        assert_eq!(n.as_slice(), &[0.1, 0.2]);
    }

    #[test]
    fn zero_drive_gives_zero_flux() {
        let n = face_fluxes(&[0.3, 0.7, 0.2], &[0.1, 0.2, 0.3], &[0.0; 3], Some(0.05));
        assert!(n.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn coupled_solution_satisfies_relations() {
        let conc = [0.4, 1.1];
        let diff = [0.15, 0.075];
        let drive = [-0.2, 0.05];
        let n = face_fluxes(&conc, &diff, &drive, Some(0.15));
        assert!(residual(&conc, &diff, &drive, 0.15, &n) < 1e-12);
        // Coupling drags the slower species along.
        assert!(n[1] != diff[1] * drive[1]);
    }

    #[test]
    fn singular_matrix_detected() {
        assert!(lu_solve(&[1.0, 2.0, 2.0, 4.0], &[1.0, 1.0], 2).is_none());
        let rank_two = [1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 1.0, 1.0];
        assert!(lu_solve(&rank_two, &[1.0, 0.0, 0.0], 3).is_none());
    }

    #[test]
    fn fixed_and_dynamic_paths_agree() {
        let m = [4.0, -1.0, 0.5, -1.0, 3.0, -0.25, 0.5, -0.25, 2.0];
        let rhs = [1.0, -2.0, 0.5];
        let fixed = lu_solve(&m, &rhs, 3).unwrap();
        let dynamic = DMatrix::from_row_slice(3, 3, &m)
            .lu()
            .solve(&DVector::from_row_slice(&rhs))
            .unwrap();
        for (a, b) in fixed.iter().zip(dynamic.iter()) {
            assert!((a - b).abs() < 1e-14);
        }
    }

    #[test]
    fn many_species_use_dynamic_solve() {
        let conc = [0.2, 0.4, 0.6, 0.8, 1.0, 1.2];
        let diff = [0.1, 0.2, 0.3, 0.15, 0.25, 0.05];
        let drive = [0.5, -0.5, 0.25, -0.25, 0.1, -0.1];
        let n = face_fluxes(&conc, &diff, &drive, Some(0.2));
        assert_eq!(n.len(), 6);
        assert!(residual(&conc, &diff, &drive, 0.2, &n) < 1e-12);
    }

    proptest! {
        #[test]
        fn coupled_fluxes_solve_system(
            conc in proptest::collection::vec(0.01f64..2.0, 2..7),
            seed_d in proptest::collection::vec(0.01f64..1.0, 6),
            seed_f in proptest::collection::vec(-1.0f64..1.0, 6),
            d_bin in 0.01f64..1.0,
        ) {
            let n = conc.len();
            let diff = &seed_d[..n];
            let drive = &seed_f[..n];
            let flux = face_fluxes(&conc, diff, drive, Some(d_bin));
            prop_assert!(residual(&conc, diff, drive, d_bin, &flux) < 1e-9);
        }

        #[test]
        fn mutual_friction_cancels_in_sum(
            conc in proptest::collection::vec(0.01f64..2.0, 3),
            diff in proptest::collection::vec(0.01f64..1.0, 3),
            drive in proptest::collection::vec(-1.0f64..1.0, 3),
            d_bin in 0.01f64..1.0,
        ) {
            let flux = face_fluxes(&conc, &diff, &drive, Some(d_bin));
            let lhs: f64 = (0..3).map(|i| flux[i] / diff[i]).sum();
            let rhs: f64 = drive.iter().sum();
            prop_assert!((lhs - rhs).abs() < 1e-9);
        }

        #[test]
        fn reversed_drive_reverses_flux(
            conc in proptest::collection::vec(0.01f64..2.0, 2),
            diff in proptest::collection::vec(0.01f64..1.0, 2),
            drive in proptest::collection::vec(-1.0f64..1.0, 2),
        ) {
            let fwd = face_fluxes(&conc, &diff, &drive, Some(0.2));
            let neg: Vec<f64> = drive.iter().map(|v| -v).collect();
            let back = face_fluxes(&conc, &diff, &neg, Some(0.2));
            for i in 0..2 {
                prop_assert_eq!(fwd[i], -back[i]);
            }
        }
    }
}
