#![doc = r"Event bus and effect dispatch runtime binding form-state engines to a UI layer."]

pub mod binding;
pub mod bus;
pub mod collections;
pub mod effects;
pub mod error;
pub mod event;
pub mod hash;
pub mod lifecycle;
pub mod path;
pub mod platform;
pub mod runtime;

pub use binding::{use_form_effects, EffectScope, ScopeHandle};
pub use bus::{BusOptions, EventBus, EventSource, SubscriptionId};
pub use effects::{
    Dispatch, DispatchMode, EffectOptions, EffectRuntime, EffectSelector, EffectStream, HandlerId,
    MappedStream, ScopeId, TakeNext, Tracked,
};
pub use error::{
    default_fault_sink, FaultOrigin, FaultSink, HandlerFault, ParseLifeCycleError, PatternError,
};
pub use event::{FormEvent, Payload, SnapshotFn, Snapshotable};
pub use lifecycle::LifeCycleType;
pub use path::{FieldPath, FieldPattern};
pub use platform::TickScheduler;
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle};

#[cfg(test)]
pub use runtime::{TestRuntime, TestScheduler};

pub type Key = u64;

#[cfg(test)]
#[path = "tests/effects_tests.rs"]
mod effects_tests;
