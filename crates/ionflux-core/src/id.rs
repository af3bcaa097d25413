//! Strongly-typed identifiers.

use std::fmt;

/// Identifies a field within a field store.
///
/// Fields are allocated at setup and assigned sequential IDs.
/// `FieldId(n)` corresponds to the n-th field allocated in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FieldId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl FieldId {
    /// The id as a `usize` index into a store's field list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
