//! Lazy elementwise field arithmetic.
//!
//! An [`Expr`] is an explicit expression graph over fields, constants and
//! cell positions. Nothing is evaluated when an expression is built; it is
//! compiled once into a [`Plan`] (a flat postfix program, constant-folded
//! and validated against the store) and the plan is evaluated per cell as
//! many times as needed. Evaluation never writes: assigning a plan into a
//! field computes every cell into a fresh buffer first, so an expression
//! may read its own destination.

use rayon::prelude::*;
use smallvec::SmallVec;

use ionflux_core::{Axis, ConfigError, Error, FieldId, Index3};

use crate::grid::Grid;
use crate::store::FieldStore;

/// Elementwise binary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    /// `lhs + rhs`
    Add,
    /// `lhs - rhs`
    Sub,
    /// `lhs * rhs`
    Mul,
    /// `lhs / rhs` (IEEE semantics; division by zero is not an error).
    Div,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
        }
    }
}

/// A lazy per-cell expression.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ionflux_grid::{Expr, FieldStore, Grid};
///
/// let grid = Arc::new(Grid::new([4, 1, 1], 1.0).unwrap());
/// let mut store = FieldStore::new();
/// let phi = store.allocate(&grid, "phi", 1, 1).unwrap();
/// store.field_mut(phi).unwrap().fill(2.0);
///
/// // psi = phi * 40 + 1, evaluated once per cell on assignment.
/// let psi = store.allocate(&grid, "psi", 1, 1).unwrap();
/// let e = Expr::field(phi).scaled(40.0).sum(Expr::constant(1.0));
/// store.assign(psi, &e).unwrap();
/// assert_eq!(store.field(psi).unwrap().get([3, 0, 0], 0).unwrap(), 81.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A constant value.
    Const(f64),
    /// One component of a field at the evaluated cell.
    Field {
        /// The field read.
        field: FieldId,
        /// The component read.
        component: usize,
    },
    /// Cell-centre coordinate along an axis.
    Position(Axis),
    /// Negation.
    Neg(Box<Expr>),
    /// Elementwise binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// A constant.
    pub fn constant(value: f64) -> Self {
        Self::Const(value)
    }

    /// Component 0 of a field.
    pub fn field(field: FieldId) -> Self {
        Self::Field {
            field,
            component: 0,
        }
    }

    /// A specific component of a vector-valued field.
    pub fn component(field: FieldId, component: usize) -> Self {
        Self::Field { field, component }
    }

    /// Cell-centre coordinate along `axis`.
    pub fn position(axis: Axis) -> Self {
        Self::Position(axis)
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `self + rhs`
    pub fn sum(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Add, self, rhs)
    }

    /// `self - rhs`
    pub fn difference(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Sub, self, rhs)
    }

    /// `self * rhs`
    pub fn product(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Mul, self, rhs)
    }

    /// `self / rhs`
    pub fn quotient(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Div, self, rhs)
    }

    /// `self * k`
    pub fn scaled(self, k: f64) -> Self {
        self.product(Expr::constant(k))
    }

    /// `-self`
    pub fn negated(self) -> Self {
        Self::Neg(Box::new(self))
    }

    /// Every `(field, component)` leaf, in depth-first order.
    pub fn referenced_fields(&self) -> SmallVec<[(FieldId, usize); 4]> {
        let mut out = SmallVec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut SmallVec<[(FieldId, usize); 4]>) {
        match self {
            Self::Const(_) | Self::Position(_) => {}
            Self::Field { field, component } => out.push((*field, *component)),
            Self::Neg(e) => e.collect_fields(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
        }
    }

    /// `true` if any leaf reads `field`.
    pub fn depends_on(&self, field: FieldId) -> bool {
        self.referenced_fields().iter().any(|&(f, _)| f == field)
    }

    /// Validate against `store` and flatten into a [`Plan`] for `grid`.
    ///
    /// Every referenced field must be allocated in `store`, live on a grid
    /// equal to `grid`, and have the referenced component.
    pub fn compile(&self, store: &FieldStore, grid: &Grid) -> Result<Plan, ConfigError> {
        for (id, component) in self.referenced_fields() {
            let field = store.field(id)?;
            if field.grid().as_ref() != grid {
                return Err(ConfigError::GridMismatch { field: id });
            }
            if component >= field.width() {
                return Err(ConfigError::ComponentOutOfRange {
                    field: id,
                    component,
                    width: field.width(),
                });
            }
        }
        let mut ops = Vec::new();
        let depth = emit(self, &mut ops);
        let mut loads: SmallVec<[FieldId; 4]> = SmallVec::new();
        for op in &ops {
            if let Op::Load { field, .. } = op {
                if !loads.contains(field) {
                    loads.push(*field);
                }
            }
        }
        Ok(Plan {
            ops,
            depth,
            grid: grid.clone(),
            loads,
        })
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Const(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Op {
    Push(f64),
    Load { field: FieldId, component: usize },
    Position(Axis),
    Neg,
    Binary(BinaryOp),
}

/// Emit postfix ops for `expr`, folding constant subtrees. Returns the
/// stack depth the emitted code needs.
fn emit(expr: &Expr, ops: &mut Vec<Op>) -> usize {
    match expr {
        Expr::Const(v) => {
            ops.push(Op::Push(*v));
            1
        }
        Expr::Field { field, component } => {
            ops.push(Op::Load {
                field: *field,
                component: *component,
            });
            1
        }
        Expr::Position(axis) => {
            ops.push(Op::Position(*axis));
            1
        }
        Expr::Neg(e) => {
            let d = emit(e, ops);
            if let Some(Op::Push(v)) = ops.last_mut() {
                *v = -*v;
            } else {
                ops.push(Op::Neg);
            }
            d
        }
        Expr::Binary { op, lhs, rhs } => {
            let dl = emit(lhs, ops);
            let dr = emit(rhs, ops);
            let n = ops.len();
            if let [.., Op::Push(a), Op::Push(b)] = ops.as_slice() {
                let folded = op.apply(*a, *b);
                ops.truncate(n - 2);
                ops.push(Op::Push(folded));
                1
            } else {
                ops.push(Op::Binary(*op));
                dl.max(dr + 1)
            }
        }
    }
}

/// A compiled [`Expr`]: a flat postfix program evaluated per cell.
///
/// Built once by [`Expr::compile`]; operators keep their plans for the
/// whole run so expression construction is never repeated per step.
#[derive(Clone, Debug)]
pub struct Plan {
    ops: Vec<Op>,
    depth: usize,
    grid: Grid,
    loads: SmallVec<[FieldId; 4]>,
}

impl Plan {
    /// The value if the whole program folded to a constant.
    pub fn constant(&self) -> Option<f64> {
        match self.ops.as_slice() {
            [Op::Push(v)] => Some(*v),
            _ => None,
        }
    }

    /// Fields read by the plan, each listed once.
    pub fn reads(&self) -> &[FieldId] {
        &self.loads
    }

    /// Stack depth needed to evaluate the plan.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Evaluate at one cell (interior or halo).
    ///
    /// Fails if `store` no longer holds a referenced field or the cell
    /// lies outside a referenced field's allocation.
    pub fn eval(&self, store: &FieldStore, index: Index3) -> Result<f64, Error> {
        if let Some(v) = self.constant() {
            return Ok(v);
        }
        let mut stack: SmallVec<[f64; 8]> = SmallVec::with_capacity(self.depth);
        for op in &self.ops {
            match op {
                Op::Push(v) => stack.push(*v),
                Op::Load { field, component } => {
                    stack.push(store.field(*field)?.get(index, *component)?);
                }
                Op::Position(axis) => {
                    stack.push(self.grid.cell_center(index)[axis.index()]);
                }
                Op::Neg => {
                    if let Some(top) = stack.last_mut() {
                        *top = -*top;
                    }
                }
                Op::Binary(bin) => {
                    // Compilation guarantees two operands are on the stack.
                    let b = stack.pop().unwrap_or(f64::NAN);
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(bin.apply(a, b));
                }
            }
        }
        Ok(stack.pop().unwrap_or(f64::NAN))
    }

    /// Evaluate at every interior cell of `grid`, in canonical order.
    ///
    /// Cells are evaluated in parallel; the result does not depend on
    /// evaluation order because nothing is written.
    pub fn eval_interior(&self, store: &FieldStore, grid: &Grid) -> Result<Vec<f64>, Error> {
        if let Some(v) = self.constant() {
            return Ok(vec![v; grid.cell_count()]);
        }
        (0..grid.cell_count())
            .into_par_iter()
            .map(|rank| self.eval(store, grid.index_of(rank)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn setup() -> (Arc<Grid>, FieldStore, FieldId, FieldId) {
        let grid = Arc::new(Grid::new([3, 2, 1], 0.5).unwrap());
        let mut store = FieldStore::new();
        let a = store.allocate(&grid, "a", 1, 1).unwrap();
        let v = store.allocate(&grid, "v", 2, 1).unwrap();
        store.field_mut(a).unwrap().fill(3.0);
        store.field_mut(v).unwrap().fill(1.5);
        (grid, store, a, v)
    }

    #[test]
    fn constants_fold() {
        let (grid, store, _, _) = setup();
        let e = Expr::constant(2.0).sum(Expr::constant(3.0)).scaled(4.0).negated();
        let plan = e.compile(&store, &grid).unwrap();
        assert_eq!(plan.constant(), Some(-20.0));
        assert!(plan.reads().is_empty());
    }

    #[test]
    fn evaluates_fields_and_positions() {
        let (grid, store, a, v) = setup();
        let e = Expr::field(a)
            .product(Expr::component(v, 1))
            .difference(Expr::position(Axis::X));
        let plan = e.compile(&store, &grid).unwrap();
        assert_eq!(plan.reads(), &[a, v]);
        // 3 * 1.5 - (2 + 0.5) * 0.5
        assert_eq!(plan.eval(&store, [2, 0, 0]).unwrap(), 3.25);
        // Halo cells evaluate too.
        assert_eq!(plan.eval(&store, [-1, 0, 0]).unwrap(), 4.5 + 0.25);
    }

    #[test]
    fn compile_rejects_bad_references() {
        let (grid, store, _, v) = setup();
        assert_eq!(
            Expr::field(FieldId(9)).compile(&store, &grid).unwrap_err(),
            ConfigError::UnboundField { field: FieldId(9) }
        );
        assert!(matches!(
            Expr::component(v, 2).compile(&store, &grid),
            Err(ConfigError::ComponentOutOfRange { .. })
        ));
        let other = Grid::new([3, 2, 2], 0.5).unwrap();
        assert!(matches!(
            Expr::component(v, 0).compile(&store, &other),
            Err(ConfigError::GridMismatch { .. })
        ));
    }

    #[test]
    fn eval_outside_allocation_is_bounds_error() {
        let (grid, store, a, _) = setup();
        let plan = Expr::field(a).compile(&store, &grid).unwrap();
        assert!(matches!(
            plan.eval(&store, [-2, 0, 0]),
            Err(Error::Bounds(_))
        ));
    }

    #[test]
    fn depth_tracks_right_nesting() {
        let (grid, store, a, _) = setup();
        let left = Expr::field(a).sum(Expr::field(a)).sum(Expr::field(a));
        let right = Expr::field(a).sum(Expr::field(a).sum(Expr::field(a)));
        assert_eq!(left.compile(&store, &grid).unwrap().depth(), 2);
        assert_eq!(right.compile(&store, &grid).unwrap().depth(), 3);
        assert_eq!(right.compile(&store, &grid).unwrap().eval(&store, [0, 0, 0]).unwrap(), 9.0);
    }

    #[test]
    fn depends_on_sees_nested_leaves() {
        let e = Expr::constant(1.0).sum(Expr::field(FieldId(4)).negated());
        assert!(e.depends_on(FieldId(4)));
        assert!(!e.depends_on(FieldId(5)));
    }
}
