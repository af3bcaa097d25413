//! The structured rectangular [`Grid`].

use ionflux_core::{Axis, ConfigError, Index3};

/// A structured rectangular 3D domain with uniform cell spacing.
///
/// Each interior cell has index `[x, y, z]` with `0 <= x < extent[0]` and
/// likewise for the other axes. An axis of extent 1 turns the grid into a
/// 2D (or 1D) problem; the 7-point stencil then reads the halo on that
/// axis, which zero-gradient boundary conditions make inert.
///
/// The grid is immutable after construction. Fields share it through an
/// `Arc<Grid>` and compare grids by value.
///
/// # Examples
///
/// ```
/// use ionflux_grid::Grid;
///
/// let grid = Grid::new([10, 20, 20], 1.0).unwrap();
/// assert_eq!(grid.cell_count(), 4000);
/// assert!(Grid::new([10, 0, 20], 1.0).is_err());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    extent: [i32; 3],
    spacing: f64,
}

impl Grid {
    /// Create a grid with the given cell counts per axis and spacing.
    ///
    /// Returns `Err(ConfigError::InvalidDimension)` if any extent is
    /// `<= 0` and `Err(ConfigError::InvalidSpacing)` if the spacing is not
    /// finite and positive.
    pub fn new(extent: [i32; 3], spacing: f64) -> Result<Self, ConfigError> {
        for axis in Axis::ALL {
            let n = extent[axis.index()];
            if n <= 0 {
                return Err(ConfigError::InvalidDimension { axis, extent: n });
            }
        }
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(ConfigError::InvalidSpacing { spacing });
        }
        Ok(Self { extent, spacing })
    }

    /// Cell counts per axis.
    pub fn extent(&self) -> [i32; 3] {
        self.extent
    }

    /// Cell count along one axis.
    pub fn len(&self, axis: Axis) -> i32 {
        self.extent[axis.index()]
    }

    /// Always `false`: construction rejects empty grids.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Uniform cell spacing.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Total number of interior cells.
    pub fn cell_count(&self) -> usize {
        self.extent.iter().map(|&n| n as usize).product()
    }

    /// Number of axes with more than one cell.
    pub fn active_dims(&self) -> usize {
        self.extent.iter().filter(|&&n| n > 1).count()
    }

    /// `true` if `index` is an interior cell.
    pub fn contains(&self, index: Index3) -> bool {
        (0..3).all(|a| index[a] >= 0 && index[a] < self.extent[a])
    }

    /// Physical coordinate of a cell centre; valid for halo cells too.
    pub fn cell_center(&self, index: Index3) -> [f64; 3] {
        let h = self.spacing;
        [
            (index[0] as f64 + 0.5) * h,
            (index[1] as f64 + 0.5) * h,
            (index[2] as f64 + 0.5) * h,
        ]
    }

    /// The interior cell at position `rank` in canonical (x-fastest)
    /// order, for `rank < cell_count()`.
    pub fn index_of(&self, rank: usize) -> Index3 {
        let nx = self.extent[0] as usize;
        let ny = self.extent[1] as usize;
        let x = rank % nx;
        let y = (rank / nx) % ny;
        let z = rank / (nx * ny);
        [x as i32, y as i32, z as i32]
    }

    /// Interior cells in canonical (x-fastest) order.
    pub fn interior(&self) -> impl Iterator<Item = Index3> + '_ {
        (0..self.cell_count()).map(move |r| self.index_of(r))
    }
}
