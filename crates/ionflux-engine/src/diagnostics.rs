//! Field summaries logged at checkpoints.

use ionflux_core::BoundsError;
use ionflux_grid::Field;

/// Interior statistics of one scalar field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSummary {
    /// Field name.
    pub name: String,
    /// Sum over the interior.
    pub mass: f64,
    /// Smallest interior value.
    pub min: f64,
    /// Largest interior value.
    pub max: f64,
}

impl FieldSummary {
    /// Summarise component 0 of `field`.
    pub fn of(field: &Field) -> Result<Self, BoundsError> {
        let values = field.interior_values(0)?;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Ok(Self {
            name: field.name().to_string(),
            mass: values.iter().sum(),
            min,
            max,
        })
    }

    /// `true` if every interior value was finite.
    pub fn is_finite(&self) -> bool {
        self.mass.is_finite() && self.min.is_finite() && self.max.is_finite()
    }
}

/// Mean of component 0 over every interior `x` slab, low `x` first.
///
/// Used to report the profile along the driven axis of a run.
pub fn x_profile(field: &Field) -> Result<Vec<f64>, BoundsError> {
    let grid = field.grid();
    let [nx, ny, nz] = grid.extent();
    let per_slab = f64::from(ny * nz);
    (0..nx)
        .map(|x| {
            let mut sum = 0.0;
            for z in 0..nz {
                for y in 0..ny {
                    sum += field.get([x, y, z], 0)?;
                }
            }
            Ok(sum / per_slab)
        })
        .collect()
}
