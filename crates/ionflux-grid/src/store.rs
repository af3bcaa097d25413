//! [`FieldStore`]: owner of every field in a simulation.

use std::sync::Arc;

use indexmap::IndexMap;

use ionflux_core::{ConfigError, Error, FieldId};

use crate::expr::Expr;
use crate::field::Field;
use crate::grid::Grid;

/// Owns all fields of a simulation, addressed by [`FieldId`].
///
/// Operators and boundary conditions hold ids rather than buffers; the
/// store is passed by `&` to anything that only reads and by `&mut` to
/// the single unit executing at a time. Names are unique and iteration
/// follows allocation order.
#[derive(Clone, Debug, Default)]
pub struct FieldStore {
    fields: Vec<Field>,
    names: IndexMap<String, FieldId>,
}

impl FieldStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new zero-initialised field and return its id.
    ///
    /// Names must be unique within the store.
    pub fn allocate(
        &mut self,
        grid: &Arc<Grid>,
        name: &str,
        width: usize,
        halo: i32,
    ) -> Result<FieldId, ConfigError> {
        let field = Field::allocate(Arc::clone(grid), name, width, halo)?;
        self.insert(field)
    }

    /// Take ownership of an already allocated field.
    pub fn insert(&mut self, field: Field) -> Result<FieldId, ConfigError> {
        if self.names.contains_key(field.name()) {
            return Err(ConfigError::InvalidParameter {
                name: "name",
                reason: format!("field '{}' already exists", field.name()),
            });
        }
        let id = u32::try_from(self.fields.len())
            .map(FieldId)
            .map_err(|_| ConfigError::InvalidParameter {
                name: "name",
                reason: "field count exceeds u32::MAX".to_string(),
            })?;
        self.names.insert(field.name().to_string(), id);
        self.fields.push(field);
        Ok(id)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` if no field has been allocated.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow a field.
    pub fn field(&self, id: FieldId) -> Result<&Field, ConfigError> {
        self.fields
            .get(id.index())
            .ok_or(ConfigError::UnboundField { field: id })
    }

    /// Mutably borrow a field.
    pub fn field_mut(&mut self, id: FieldId) -> Result<&mut Field, ConfigError> {
        self.fields
            .get_mut(id.index())
            .ok_or(ConfigError::UnboundField { field: id })
    }

    /// Look up a field id by name.
    pub fn id_of(&self, name: &str) -> Option<FieldId> {
        self.names.get(name).copied()
    }

    /// All fields with their ids, in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (FieldId(i as u32), f))
    }

    /// All fields keyed by name, in allocation order.
    pub fn named(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|f| (f.name(), f))
    }

    /// Evaluate `expr` over the interior of `dest` (component 0).
    pub fn assign(&mut self, dest: FieldId, expr: &Expr) -> Result<(), Error> {
        self.assign_component(dest, 0, expr)
    }

    /// Evaluate `expr` over the interior of one component of `dest`.
    ///
    /// Every cell is computed from the current state before any value is
    /// written, so `expr` may reference `dest` itself.
    pub fn assign_component(
        &mut self,
        dest: FieldId,
        component: usize,
        expr: &Expr,
    ) -> Result<(), Error> {
        let field = self.field(dest)?;
        if component >= field.width() {
            return Err(ConfigError::ComponentOutOfRange {
                field: dest,
                component,
                width: field.width(),
            }
            .into());
        }
        let grid = Arc::clone(field.grid());
        let plan = expr.compile(self, &grid)?;
        let values = plan.eval_interior(self, &grid)?;
        self.field_mut(dest)?.replace_interior(component, &values)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Arc<Grid> {
        Arc::new(Grid::new([4, 3, 2], 1.0).unwrap())
    }

    #[test]
    fn ids_are_sequential_and_named() {
        let g = grid();
        let mut store = FieldStore::new();
        let a = store.allocate(&g, "c1", 1, 1).unwrap();
        let b = store.allocate(&g, "c2", 1, 1).unwrap();
        assert_eq!((a, b), (FieldId(0), FieldId(1)));
        assert_eq!(store.id_of("c2"), Some(b));
        let names: Vec<&str> = store.iter().map(|(_, f)| f.name()).collect();
        assert_eq!(names, vec!["c1", "c2"]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let g = grid();
        let mut store = FieldStore::new();
        store.allocate(&g, "c", 1, 1).unwrap();
        assert!(store.allocate(&g, "c", 1, 1).is_err());
    }

    #[test]
    fn unknown_id_is_unbound() {
        let store = FieldStore::new();
        assert_eq!(
            store.field(FieldId(3)).unwrap_err(),
            ConfigError::UnboundField { field: FieldId(3) }
        );
    }

    #[test]
    fn self_referencing_assignment_reads_old_state() {
        let g = grid();
        let mut store = FieldStore::new();
        let c = store.allocate(&g, "c", 1, 1).unwrap();
        store
            .field_mut(c)
            .unwrap()
            .fill_with(0, |[x, _, _]| x as f64)
            .unwrap();
        // c <- c + c: every cell doubles exactly once.
        store
            .assign(c, &Expr::field(c).sum(Expr::field(c)))
            .unwrap();
        let f = store.field(c).unwrap();
        for idx in g.interior() {
            assert_eq!(f.get(idx, 0).unwrap(), 2.0 * idx[0] as f64);
        }
    }

    #[test]
    fn assign_rejects_missing_component() {
        let g = grid();
        let mut store = FieldStore::new();
        let c = store.allocate(&g, "c", 1, 1).unwrap();
        assert!(matches!(
            store.assign_component(c, 1, &Expr::constant(1.0)),
            Err(Error::Config(ConfigError::ComponentOutOfRange { .. }))
        ));
    }
}
