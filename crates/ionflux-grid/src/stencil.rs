//! Finite-difference neighbour templates.

use ionflux_core::{Face, Index3};

/// A fixed set of neighbour offsets used by finite-difference operators.
///
/// Direction `0` is always the centre cell. The only template the solver
/// needs is [`d3q7`](Self::d3q7): the centre plus the six face neighbours
/// of a 3D structured grid, in the order `+x, -x, +y, -y, +z, -z`.
///
/// An operator built on a template computes derivatives as fixed linear
/// combinations of the template values. That is valid only where every
/// offset resolves to an allocated cell, so fields read through a template
/// need a halo of at least [`reach`](Self::reach) cells, populated by
/// boundary conditions before the operator runs.
#[derive(Debug, PartialEq)]
pub struct StencilTemplate {
    name: &'static str,
    offsets: &'static [Index3],
    laplacian: &'static [f64],
}

static D3Q7: StencilTemplate = StencilTemplate {
    name: "d3q7",
    offsets: &[
        [0, 0, 0],
        [1, 0, 0],
        [-1, 0, 0],
        [0, 1, 0],
        [0, -1, 0],
        [0, 0, 1],
        [0, 0, -1],
    ],
    laplacian: &[-6.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
};

impl StencilTemplate {
    /// The 7-point face-connected 3D template.
    pub fn d3q7() -> &'static StencilTemplate {
        &D3Q7
    }

    /// Template name (`"d3q7"`).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of points, centre included.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Always `false`: every template contains at least its centre.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// All offsets, centre first.
    pub fn offsets(&self) -> &'static [Index3] {
        self.offsets
    }

    /// Neighbour offsets without the centre.
    pub fn neighbors(&self) -> &'static [Index3] {
        &self.offsets[1..]
    }

    /// Displacement for `direction`, or `None` if out of range.
    pub fn neighbor_offset(&self, direction: usize) -> Option<Index3> {
        self.offsets.get(direction).copied()
    }

    /// The direction pointing the opposite way, or `None` if out of range.
    pub fn opposite(&self, direction: usize) -> Option<usize> {
        let [dx, dy, dz] = self.neighbor_offset(direction)?;
        self.offsets.iter().position(|&o| o == [-dx, -dy, -dz])
    }

    /// The six boundary faces in canonical order.
    pub fn boundary_faces(&self) -> [Face; 6] {
        Face::ALL
    }

    /// The direction leaving the domain through `face`.
    pub fn face_direction(&self, face: Face) -> usize {
        match face {
            Face::XE => 1,
            Face::X0 => 2,
            Face::YE => 3,
            Face::Y0 => 4,
            Face::ZE => 5,
            Face::Z0 => 6,
        }
    }

    /// Weights of the discrete Laplacian (before division by spacing²).
    pub fn laplacian_weights(&self) -> &'static [f64] {
        self.laplacian
    }

    /// Largest offset magnitude along any axis: the halo width required.
    pub fn reach(&self) -> i32 {
        self.offsets
            .iter()
            .flat_map(|o| o.iter())
            .map(|c| c.abs())
            .max()
            .unwrap_or(0)
    }
}
