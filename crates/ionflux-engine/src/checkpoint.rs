//! Checkpoint sinks: where the stepper hands off field state.
//!
//! A [`CheckpointSink`] is called synchronously between outer steps with
//! a borrowed, fully updated view of the registered fields. Sinks that
//! need to keep data beyond the call copy it; [`ChannelSink`] does so and
//! hands owned copies to another thread.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use indexmap::IndexMap;

use ionflux_core::{ConfigError, FieldId, SinkError};
use ionflux_grid::{Field, FieldStore};

/// Fields selected for checkpointing, keyed by name in registration order.
#[derive(Clone, Debug)]
pub struct NamedFields<'a> {
    fields: IndexMap<&'a str, &'a Field>,
}

impl<'a> NamedFields<'a> {
    /// Borrow the fields `ids` from `store`.
    pub fn from_store(store: &'a FieldStore, ids: &[FieldId]) -> Result<Self, ConfigError> {
        let mut fields = IndexMap::with_capacity(ids.len());
        for &id in ids {
            let field = store.field(id)?;
            fields.insert(field.name(), field);
        }
        Ok(Self { fields })
    }

    /// The field called `name`.
    pub fn get(&self, name: &str) -> Option<&'a Field> {
        self.fields.get(name).copied()
    }

    /// Names and fields in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Field)> + '_ {
        self.fields.iter().map(|(&name, &field)| (name, field))
    }

    /// Field names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.fields.keys().copied()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` if no field is registered.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Owned copies of every field.
    pub fn to_owned_fields(&self) -> IndexMap<String, Field> {
        self.iter()
            .map(|(name, field)| (name.to_string(), field.clone()))
            .collect()
    }
}

/// Receives field state at checkpoint steps.
///
/// An error aborts the run.
pub trait CheckpointSink {
    /// Consume the state after outer step `step` (0 for the initial state).
    fn write(&mut self, step: u64, fields: &NamedFields<'_>) -> Result<(), SinkError>;
}

impl<S: CheckpointSink + ?Sized> CheckpointSink for &mut S {
    fn write(&mut self, step: u64, fields: &NamedFields<'_>) -> Result<(), SinkError> {
        (**self).write(step, fields)
    }
}

impl<S: CheckpointSink + ?Sized> CheckpointSink for Box<S> {
    fn write(&mut self, step: u64, fields: &NamedFields<'_>) -> Result<(), SinkError> {
        (**self).write(step, fields)
    }
}

/// Discards every checkpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl CheckpointSink for NullSink {
    fn write(&mut self, _step: u64, _fields: &NamedFields<'_>) -> Result<(), SinkError> {
        Ok(())
    }
}

/// An owned copy of the checkpointed fields at one step.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    /// Outer step the state belongs to.
    pub step: u64,
    /// Field copies keyed by name, in registration order.
    pub fields: IndexMap<String, Field>,
}

impl Checkpoint {
    /// Interior sum of the field called `name`.
    pub fn mass(&self, name: &str) -> Option<f64> {
        self.fields.get(name)?.interior_sum(0).ok()
    }
}

/// Sends an owned [`Checkpoint`] down a crossbeam channel per write.
///
/// Lets a writer thread do slow work (encoding, disk I/O) without holding
/// up the stepper. With a bounded channel the stepper blocks when the
/// writer falls behind; [`non_blocking`](Self::non_blocking) makes a full
/// channel an error instead.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: Sender<Checkpoint>,
    blocking: bool,
}

impl ChannelSink {
    /// Wrap an existing sender.
    pub fn new(tx: Sender<Checkpoint>) -> Self {
        Self { tx, blocking: true }
    }

    /// A sink and the receiving end of a channel holding `capacity`
    /// checkpoints.
    pub fn bounded(capacity: usize) -> (Self, Receiver<Checkpoint>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    /// A sink and the receiving end of an unbounded channel.
    pub fn unbounded() -> (Self, Receiver<Checkpoint>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    /// Fail instead of blocking when the channel is full.
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }
}

impl CheckpointSink for ChannelSink {
    fn write(&mut self, step: u64, fields: &NamedFields<'_>) -> Result<(), SinkError> {
        let checkpoint = Checkpoint {
            step,
            fields: fields.to_owned_fields(),
        };
        if self.blocking {
            self.tx
                .send(checkpoint)
                .map_err(|_| SinkError::new("checkpoint receiver disconnected"))
        } else {
            self.tx.try_send(checkpoint).map_err(|e| match e {
                TrySendError::Full(_) => SinkError::new(format!("checkpoint channel full at step {step}")),
                TrySendError::Disconnected(_) => SinkError::new("checkpoint receiver disconnected"),
            })
        }
    }
}
