use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::bus::SubscriptionId;
use crate::effects::{HandlerId, ScopeId};
use crate::lifecycle::LifeCycleType;

/// Where a handler fault happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaultOrigin {
    /// A raw bus listener.
    Listener { subscription: SubscriptionId },
    /// An effect handler registered on a scope.
    Effect { scope: ScopeId, handler: HandlerId },
}

/// A handler panicked while an event was being delivered.
///
/// Faults are reported to a [`FaultSink`] and never propagate to the
/// publisher or to sibling handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerFault {
    pub origin: FaultOrigin,
    pub kind: LifeCycleType,
    pub message: String,
}

impl HandlerFault {
    pub(crate) fn from_panic(
        origin: FaultOrigin,
        kind: LifeCycleType,
        panic: Box<dyn Any + Send>,
    ) -> Self {
        Self {
            origin,
            kind,
            message: panic_message(panic.as_ref()),
        }
    }
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            FaultOrigin::Listener { subscription } => write!(
                f,
                "listener {subscription} failed on {}: {}",
                self.kind, self.message
            ),
            FaultOrigin::Effect { scope, handler } => write!(
                f,
                "effect handler {handler} of scope {scope} failed on {}: {}",
                self.kind, self.message
            ),
        }
    }
}

impl std::error::Error for HandlerFault {}

/// Error channel for handler faults.
pub type FaultSink = Rc<dyn Fn(&HandlerFault)>;

/// Sink that logs every fault at error level.
pub fn default_fault_sink() -> FaultSink {
    Rc::new(|fault: &HandlerFault| log::error!("{fault}"))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_owned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseLifeCycleError {
    Empty,
    UnknownBuiltin(String),
}

impl fmt::Display for ParseLifeCycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseLifeCycleError::Empty => f.write_str("lifecycle name is empty"),
            ParseLifeCycleError::UnknownBuiltin(name) => {
                write!(f, "unknown lifecycle name {name:?}")
            }
        }
    }
}

impl std::error::Error for ParseLifeCycleError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternError {
    EmptySegment { position: usize },
    RestNotLast { position: usize },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::EmptySegment { position } => {
                write!(f, "field pattern has an empty segment at {position}")
            }
            PatternError::RestNotLast { position } => {
                write!(f, "`**` must be the last segment; found at {position}")
            }
        }
    }
}

impl std::error::Error for PatternError {}
