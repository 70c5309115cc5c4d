use std::fmt;
use std::rc::Rc;

use crate::lifecycle::LifeCycleType;
use crate::path::FieldPath;

/// Capability of a live stateful model to produce a plain snapshot of its
/// current state.
pub trait Snapshotable<V> {
    fn snapshot(&self) -> V;
}

/// Adapts a closure into a [`Snapshotable`], used for lazily resolved
/// dispatch payloads.
pub struct SnapshotFn<F>(pub F);

impl<V, F> Snapshotable<V> for SnapshotFn<F>
where
    F: Fn() -> V,
{
    fn snapshot(&self) -> V {
        (self.0)()
    }
}

/// Event payload: either a plain value or a handle to a live model.
///
/// Model payloads are resolved when they are read, never when they are
/// published, so a deferred reader always sees the model's latest state.
pub enum Payload<V> {
    Value(V),
    Model(Rc<dyn Snapshotable<V>>),
}

impl<V: Clone> Payload<V> {
    pub fn resolve(&self) -> V {
        match self {
            Payload::Value(value) => value.clone(),
            Payload::Model(model) => model.snapshot(),
        }
    }
}

impl<V> Payload<V> {
    pub fn is_model(&self) -> bool {
        matches!(self, Payload::Model(_))
    }
}

impl<V: Clone> Clone for Payload<V> {
    fn clone(&self) -> Self {
        match self {
            Payload::Value(value) => Payload::Value(value.clone()),
            Payload::Model(model) => Payload::Model(Rc::clone(model)),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Payload<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Payload::Model(_) => f.write_str("Model(..)"),
        }
    }
}

/// A typed lifecycle event as published on an [`crate::EventBus`].
pub struct FormEvent<V> {
    pub kind: LifeCycleType,
    pub path: Option<FieldPath>,
    pub payload: Payload<V>,
}

impl<V> FormEvent<V> {
    pub fn new(kind: LifeCycleType, value: V) -> Self {
        Self {
            kind,
            path: None,
            payload: Payload::Value(value),
        }
    }

    pub fn from_model(kind: LifeCycleType, model: Rc<dyn Snapshotable<V>>) -> Self {
        Self {
            kind,
            path: None,
            payload: Payload::Model(model),
        }
    }

    pub fn with_path(mut self, path: FieldPath) -> Self {
        self.path = Some(path);
        self
    }
}

impl<V: Clone> FormEvent<V> {
    /// Resolves the payload against the current state of its source.
    pub fn resolve(&self) -> V {
        self.payload.resolve()
    }
}

impl<V: Clone> Clone for FormEvent<V> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            path: self.path.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for FormEvent<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEvent")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("payload", &self.payload)
            .finish()
    }
}
