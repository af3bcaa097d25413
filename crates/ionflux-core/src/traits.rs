//! The [`NumMethod`] trait and its [`Lifecycle`] states.
//!
//! Every numerical unit of a simulation (boundary conditions, the
//! Stefan-Maxwell update, the potential relaxation) follows the same
//! two-phase protocol: configure, `init()` once to validate and compile,
//! then `execute()` any number of times.

use crate::error::Error;

/// Lifecycle state of a [`NumMethod`].
///
/// Transitions are one-way: `Unconfigured → Initialized → Executing`.
/// Configuration setters are legal only in `Unconfigured`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting configuration; `execute()` is rejected.
    Unconfigured,
    /// Configuration frozen and compiled; no step taken yet.
    Initialized,
    /// At least one `execute()` has completed.
    Executing,
}

impl Lifecycle {
    /// `true` once `init()` has succeeded.
    pub fn is_initialized(self) -> bool {
        !matches!(self, Self::Unconfigured)
    }
}

/// A numerical operation over a field store `S`.
///
/// # Contract
///
/// - `init()` validates configuration against the store and compiles any
///   per-cell evaluation plans. It runs once; configuration is frozen
///   afterwards.
/// - `execute()` is atomic with respect to the rest of the system: it
///   either completes the whole pass or returns an error, and no partial
///   per-cell state is observable in between.
///
/// # Object safety
///
/// This trait is object-safe; batches of boundary conditions are driven
/// through `&mut dyn NumMethod<S>`.
pub trait NumMethod<S: ?Sized> {
    /// Human-readable name for error reporting and logging.
    fn name(&self) -> &str;

    /// Current lifecycle state.
    fn lifecycle(&self) -> Lifecycle;

    /// Validate against `store` and freeze configuration.
    fn init(&mut self, store: &S) -> Result<(), Error>;

    /// Perform one pass of the operation, mutating `store` in place.
    fn execute(&mut self, store: &mut S) -> Result<(), Error>;
}

/// Initialise every method in order, stopping at the first error.
pub fn init_all<S: ?Sized, M: NumMethod<S>>(methods: &mut [M], store: &S) -> Result<(), Error> {
    for m in methods.iter_mut() {
        m.init(store)?;
    }
    Ok(())
}

/// Execute every method in order, stopping at the first error.
///
/// Later methods see the writes of earlier ones, so where two methods
/// write the same cell the last one wins.
pub fn execute_all<S: ?Sized, M: NumMethod<S>>(
    methods: &mut [M],
    store: &mut S,
) -> Result<(), Error> {
    for m in methods.iter_mut() {
        m.execute(store)?;
    }
    Ok(())
}
