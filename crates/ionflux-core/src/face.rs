//! Grid axes, boundary faces, and the [`FaceSet`] bitset.

use std::fmt;

/// A signed cell index `[x, y, z]` on a structured grid.
///
/// Interior cells have every component in `[0, extent)`; halo cells extend
/// the range by the field's halo width on both sides.
pub type Index3 = [i32; 3];

/// One of the three axes of a structured grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    /// First axis (fastest-varying in memory).
    X,
    /// Second axis.
    Y,
    /// Third axis (slowest-varying in memory).
    Z,
}

impl Axis {
    /// All axes in canonical order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Position of this axis in an [`Index3`].
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// The two axes orthogonal to this one, in canonical order.
    pub fn tangential(self) -> [Axis; 2] {
        match self {
            Self::X => [Axis::Y, Axis::Z],
            Self::Y => [Axis::X, Axis::Z],
            Self::Z => [Axis::X, Axis::Y],
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "x"),
            Self::Y => write!(f, "y"),
            Self::Z => write!(f, "z"),
        }
    }
}

/// A boundary face of a rectangular domain.
///
/// `X0` is the low-x face (`x < 0`), `XE` the high-x face (`x >= extent`),
/// and likewise for the other axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Face {
    /// Low-x face.
    X0,
    /// High-x face.
    XE,
    /// Low-y face.
    Y0,
    /// High-y face.
    YE,
    /// Low-z face.
    Z0,
    /// High-z face.
    ZE,
}

impl Face {
    /// All six faces in canonical order.
    pub const ALL: [Face; 6] = [Face::X0, Face::XE, Face::Y0, Face::YE, Face::Z0, Face::ZE];

    /// The axis normal to this face.
    pub fn axis(self) -> Axis {
        match self {
            Self::X0 | Self::XE => Axis::X,
            Self::Y0 | Self::YE => Axis::Y,
            Self::Z0 | Self::ZE => Axis::Z,
        }
    }

    /// `true` for the low face of its axis.
    pub fn is_low(self) -> bool {
        matches!(self, Self::X0 | Self::Y0 | Self::Z0)
    }

    /// Sign of the outward normal along [`axis`](Self::axis): `-1` or `+1`.
    pub fn outward_sign(self) -> i32 {
        if self.is_low() {
            -1
        } else {
            1
        }
    }

    /// The face on the opposite side of the domain.
    pub fn opposite(self) -> Face {
        match self {
            Self::X0 => Self::XE,
            Self::XE => Self::X0,
            Self::Y0 => Self::YE,
            Self::YE => Self::Y0,
            Self::Z0 => Self::ZE,
            Self::ZE => Self::Z0,
        }
    }

    fn bit(self) -> u8 {
        1u8 << (self as u8)
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::X0 => "X0",
            Self::XE => "XE",
            Self::Y0 => "Y0",
            Self::YE => "YE",
            Self::Z0 => "Z0",
            Self::ZE => "ZE",
        };
        f.write_str(name)
    }
}

/// A set of boundary faces implemented as a 6-bit mask.
///
/// Boundary conditions declare the faces they constrain with a `FaceSet`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FaceSet {
    bits: u8,
}

impl FaceSet {
    const MASK: u8 = 0b11_1111;

    /// Create an empty face set.
    pub fn empty() -> Self {
        Self { bits: 0 }
    }

    /// All six faces.
    pub fn all() -> Self {
        Self { bits: Self::MASK }
    }

    /// Insert a face into the set.
    pub fn insert(&mut self, face: Face) {
        self.bits |= face.bit();
    }

    /// Check whether the set contains a face.
    pub fn contains(&self, face: Face) -> bool {
        self.bits & face.bit() != 0
    }

    /// Return the union of two sets.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Return the intersection of two sets.
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            bits: self.bits & other.bits,
        }
    }

    /// Return the faces in `self` but not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            bits: self.bits & !other.bits,
        }
    }

    /// Returns `true` if the set contains no faces.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Number of faces in the set.
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Iterate over the faces in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = Face> + '_ {
        Face::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl fmt::Debug for FaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Face> for FaceSet {
    fn from_iter<I: IntoIterator<Item = Face>>(iter: I) -> Self {
        let mut set = Self::empty();
        for face in iter {
            set.insert(face);
        }
        set
    }
}

impl<const N: usize> From<[Face; N]> for FaceSet {
    fn from(faces: [Face; N]) -> Self {
        faces.into_iter().collect()
    }
}

impl From<Face> for FaceSet {
    fn from(face: Face) -> Self {
        let mut set = Self::empty();
        set.insert(face);
        set
    }
}
