//! Halo-filling boundary conditions.
//!
//! A [`BoundaryCondition`] writes the ghost cells of one field on a set of
//! domain faces. It never touches the interior, so operators that read
//! previous-step values through a stencil see consistent boundary data as
//! long as every condition is applied after each interior update.
//!
//! # Face regions
//!
//! The region of face `F` is the halo slab on `F`'s normal axis, extended
//! over the full allocated range (halo included) of the two tangential
//! axes. Edges and corners therefore belong to two or three regions; when
//! several conditions are applied in sequence the last one to write a
//! cell wins.

use ionflux_core::{
    execute_all, BoundsError, ConfigError, Error, Face, FaceSet, FieldId, Index3, Lifecycle,
    NumMethod, StateError,
};
use ionflux_grid::{Expr, Field, FieldStore, Plan};

/// What a [`BoundaryCondition`] writes into the halo.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundaryRule {
    /// Every ghost cell takes the expression's value at that cell.
    FixedValue(Expr),
    /// Ghost cells mirror the interior so that the outward normal
    /// derivative across the face equals the given value.
    FixedGradient(f64),
}

/// A boundary condition on one field and a set of faces.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ionflux_core::{Face, NumMethod};
/// use ionflux_grid::{FieldStore, Grid};
/// use ionflux_numerics::BoundaryCondition;
///
/// let grid = Arc::new(Grid::new([4, 4, 1], 1.0).unwrap());
/// let mut store = FieldStore::new();
/// let c = store.allocate(&grid, "c", 1, 1).unwrap();
///
/// let mut bc = BoundaryCondition::constant_value(c, 0.1, Face::X0);
/// bc.init(&store).unwrap();
/// bc.apply(&mut store).unwrap();
/// assert_eq!(store.field(c).unwrap().get([-1, 2, 0], 0).unwrap(), 0.1);
/// ```
#[derive(Clone, Debug)]
pub struct BoundaryCondition {
    field: FieldId,
    faces: FaceSet,
    rule: BoundaryRule,
    plan: Option<Plan>,
    state: Lifecycle,
}

impl BoundaryCondition {
    /// Ghost cells on `faces` take the value of `value` evaluated there.
    ///
    /// `value` may read other fields but not `field` itself: evaluated at
    /// a ghost cell it would read the halo being written. `init` rejects
    /// such expressions.
    pub fn fixed_value(field: FieldId, value: Expr, faces: impl Into<FaceSet>) -> Self {
        Self::new(field, BoundaryRule::FixedValue(value), faces.into())
    }

    /// Ghost cells on `faces` take the constant `value`.
    pub fn constant_value(field: FieldId, value: f64, faces: impl Into<FaceSet>) -> Self {
        Self::fixed_value(field, Expr::constant(value), faces)
    }

    /// The outward normal derivative on `faces` is `gradient`.
    ///
    /// A gradient of zero is the reflecting (no-flux) condition.
    pub fn fixed_gradient(field: FieldId, gradient: f64, faces: impl Into<FaceSet>) -> Self {
        Self::new(field, BoundaryRule::FixedGradient(gradient), faces.into())
    }

    fn new(field: FieldId, rule: BoundaryRule, faces: FaceSet) -> Self {
        Self {
            field,
            faces,
            rule,
            plan: None,
            state: Lifecycle::Unconfigured,
        }
    }

    /// The field whose halo is written.
    pub fn field(&self) -> FieldId {
        self.field
    }

    /// The faces covered.
    pub fn faces(&self) -> FaceSet {
        self.faces
    }

    /// The rule applied on every covered face.
    pub fn rule(&self) -> &BoundaryRule {
        &self.rule
    }

    /// Write the halo of every covered face.
    ///
    /// Compiles on first use if [`init`](NumMethod::init) was never
    /// called. Applying twice is the same as applying once.
    pub fn apply(&mut self, store: &mut FieldStore) -> Result<(), Error> {
        if !self.state.is_initialized() {
            self.init(store)?;
        }
        let field = store.field(self.field)?;
        let writes = match &self.rule {
            BoundaryRule::FixedValue(_) => {
                let plan = self.plan.as_ref().ok_or_else(|| StateError::NotInitialized {
                    method: self.name().to_string(),
                })?;
                let mut writes = Vec::new();
                for face in self.faces.iter() {
                    for index in face_region(field, face) {
                        writes.push((index, plan.eval(store, index)?));
                    }
                }
                writes
            }
            BoundaryRule::FixedGradient(g) => gradient_writes(field, self.faces, *g)?,
        };
        let field = store.field_mut(self.field)?;
        for (index, value) in writes {
            field.set(index, 0, value)?;
        }
        self.state = Lifecycle::Executing;
        Ok(())
    }
}

impl NumMethod<FieldStore> for BoundaryCondition {
    fn name(&self) -> &str {
        match self.rule {
            BoundaryRule::FixedValue(_) => "FixedValue",
            BoundaryRule::FixedGradient(_) => "FixedGradient",
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn init(&mut self, store: &FieldStore) -> Result<(), Error> {
        let field = store.field(self.field)?;
        if field.width() != 1 {
            return Err(ConfigError::NotScalar {
                field: self.field,
                width: field.width(),
            }
            .into());
        }
        if field.halo() < 1 && !self.faces.is_empty() {
            return Err(ConfigError::InsufficientHalo {
                field: self.field,
                required: 1,
                actual: field.halo(),
            }
            .into());
        }
        match &self.rule {
            BoundaryRule::FixedValue(expr) => {
                if expr.depends_on(self.field) {
                    return Err(ConfigError::InvalidParameter {
                        name: "fixed value",
                        reason: format!("expression reads its own target field {}", self.field),
                    }
                    .into());
                }
                self.plan = Some(expr.compile(store, field.grid())?);
            }
            BoundaryRule::FixedGradient(g) => {
                if !g.is_finite() {
                    return Err(ConfigError::InvalidParameter {
                        name: "gradient",
                        reason: format!("must be finite, got {g}"),
                    }
                    .into());
                }
            }
        }
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn execute(&mut self, store: &mut FieldStore) -> Result<(), Error> {
        self.apply(store)
    }
}

/// Apply `conditions` in order. At shared edges and corners the later
/// condition wins.
pub fn apply_all(conditions: &mut [BoundaryCondition], store: &mut FieldStore) -> Result<(), Error> {
    execute_all(conditions, store)
}

/// Ghost cells of `face`: the halo slab on the normal axis crossed with the
/// full allocated range of the tangential axes.
fn face_region(field: &Field, face: Face) -> impl Iterator<Item = Index3> {
    let extent = field.grid().extent();
    let halo = field.halo();
    let normal = face.axis().index();
    let mut lower = field.lower();
    let mut upper = field.upper();
    if face.is_low() {
        upper[normal] = 0;
    } else {
        lower[normal] = extent[normal];
    }
    debug_assert!(upper[normal] - lower[normal] == halo);
    (lower[2]..upper[2]).flat_map(move |z| {
        (lower[1]..upper[1]).flat_map(move |y| (lower[0]..upper[0]).map(move |x| [x, y, z]))
    })
}

/// Values for a fixed-gradient condition, read entirely from the interior.
///
/// The ghost at depth `k` mirrors the interior cell at depth `k - 1` on the
/// other side of the face; tangential coordinates are clamped into the
/// interior so the result never depends on halo contents.
fn gradient_writes(
    field: &Field,
    faces: FaceSet,
    gradient: f64,
) -> Result<Vec<(Index3, f64)>, BoundsError> {
    let extent = field.grid().extent();
    let h = field.grid().spacing();
    let mut writes = Vec::new();
    for face in faces.iter() {
        let normal = face.axis().index();
        let n = extent[normal];
        for ghost in face_region(field, face) {
            let depth = if face.is_low() {
                -ghost[normal]
            } else {
                ghost[normal] - n + 1
            };
            let mut mirror = ghost;
            mirror[normal] = if face.is_low() { depth - 1 } else { n - depth };
            for (a, m) in mirror.iter_mut().enumerate() {
                *m = (*m).clamp(0, extent[a] - 1);
            }
            let value = field.get(mirror, 0)? + gradient * f64::from(2 * depth - 1) * h;
            writes.push((ghost, value));
        }
    }
    Ok(writes)
}
