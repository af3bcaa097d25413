//! Haloed per-cell storage: [`Field`].

use std::sync::Arc;

use ionflux_core::{BoundsError, ConfigError, Index3};

use crate::grid::Grid;

/// Per-cell values on a [`Grid`] plus a halo of ghost cells.
///
/// Storage covers `[-halo, extent + halo)` on every axis, x-fastest, with
/// the `width` components of a cell stored contiguously. The interior is
/// written by operators; the halo is written by boundary conditions.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ionflux_grid::{Field, Grid};
///
/// let grid = Arc::new(Grid::new([4, 4, 4], 1.0).unwrap());
/// let mut c = Field::allocate(grid, "c", 1, 1).unwrap();
/// c.set([0, 0, 0], 0, 0.5).unwrap();
/// assert_eq!(c.get([0, 0, 0], 0).unwrap(), 0.5);
/// assert!(c.get([-1, 0, 0], 0).is_ok()); // halo
/// assert!(c.get([-2, 0, 0], 0).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct Field {
    name: String,
    grid: Arc<Grid>,
    width: usize,
    halo: i32,
    dims: [usize; 3],
    data: Vec<f64>,
}

impl Field {
    /// Allocate a zero-initialised field.
    ///
    /// Returns `Err(ConfigError::InvalidElementWidth)` for `width == 0`
    /// and `Err(ConfigError::InvalidParameter)` for a negative halo.
    pub fn allocate(
        grid: Arc<Grid>,
        name: impl Into<String>,
        width: usize,
        halo: i32,
    ) -> Result<Self, ConfigError> {
        if width == 0 {
            return Err(ConfigError::InvalidElementWidth { width });
        }
        if halo < 0 {
            return Err(ConfigError::InvalidParameter {
                name: "halo",
                reason: format!("must be >= 0, got {halo}"),
            });
        }
        let e = grid.extent();
        let dims = [
            (e[0] + 2 * halo) as usize,
            (e[1] + 2 * halo) as usize,
            (e[2] + 2 * halo) as usize,
        ];
        let cells = dims[0] * dims[1] * dims[2];
        Ok(Self {
            name: name.into(),
            grid,
            width,
            halo,
            dims,
            data: vec![0.0; cells * width],
        })
    }

    /// Field name, used by checkpoint sinks.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The grid this field is bound to.
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Components per cell.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Ghost layers on each side of every axis.
    pub fn halo(&self) -> i32 {
        self.halo
    }

    /// Inclusive lower corner of the allocation.
    pub fn lower(&self) -> Index3 {
        [-self.halo; 3]
    }

    /// Exclusive upper corner of the allocation.
    pub fn upper(&self) -> Index3 {
        let e = self.grid.extent();
        [e[0] + self.halo, e[1] + self.halo, e[2] + self.halo]
    }

    /// `true` if `index` lies in the allocated range (interior or halo).
    pub fn contains(&self, index: Index3) -> bool {
        let upper = self.upper();
        (0..3).all(|a| index[a] >= -self.halo && index[a] < upper[a])
    }

    /// Allocation cell number of `index`.
    pub fn cell_offset(&self, index: Index3) -> Result<usize, BoundsError> {
        if !self.contains(index) {
            return Err(BoundsError::OutOfBounds {
                index,
                lower: self.lower(),
                upper: self.upper(),
            });
        }
        let h = self.halo;
        let x = (index[0] + h) as usize;
        let y = (index[1] + h) as usize;
        let z = (index[2] + h) as usize;
        Ok((z * self.dims[1] + y) * self.dims[0] + x)
    }

    fn slot(&self, index: Index3, component: usize) -> Result<usize, BoundsError> {
        if component >= self.width {
            return Err(BoundsError::ComponentOutOfRange {
                component,
                width: self.width,
            });
        }
        Ok(self.cell_offset(index)? * self.width + component)
    }

    /// Read one component of one cell.
    pub fn get(&self, index: Index3, component: usize) -> Result<f64, BoundsError> {
        let s = self.slot(index, component)?;
        Ok(self.data[s])
    }

    /// Write one component of one cell.
    pub fn set(&mut self, index: Index3, component: usize, value: f64) -> Result<(), BoundsError> {
        let s = self.slot(index, component)?;
        self.data[s] = value;
        Ok(())
    }

    /// Set every cell, halo included, to `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Set every interior cell of one component from `f(index)`.
    pub fn fill_with(
        &mut self,
        component: usize,
        mut f: impl FnMut(Index3) -> f64,
    ) -> Result<(), BoundsError> {
        let grid = Arc::clone(&self.grid);
        for index in grid.interior() {
            self.set(index, component, f(index))?;
        }
        Ok(())
    }

    /// Interior values of one component in canonical order.
    pub fn interior_values(&self, component: usize) -> Result<Vec<f64>, BoundsError> {
        self.grid
            .interior()
            .map(|index| self.get(index, component))
            .collect()
    }

    /// Sum of one component over the interior.
    pub fn interior_sum(&self, component: usize) -> Result<f64, BoundsError> {
        Ok(self.interior_values(component)?.iter().sum())
    }

    /// Overwrite the interior of one component from canonical-order values.
    ///
    /// The halo is untouched. `values.len()` must equal the grid's cell count.
    pub fn replace_interior(&mut self, component: usize, values: &[f64]) -> Result<(), BoundsError> {
        let grid = Arc::clone(&self.grid);
        if values.len() != grid.cell_count() {
            return Err(BoundsError::OutOfBounds {
                index: grid.index_of(values.len().min(grid.cell_count())),
                lower: [0; 3],
                upper: grid.extent(),
            });
        }
        for (index, &v) in grid.interior().zip(values) {
            self.set(index, component, v)?;
        }
        Ok(())
    }

    /// Raw storage, halo included.
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}
