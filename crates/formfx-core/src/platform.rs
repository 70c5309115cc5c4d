//! Platform abstraction for tick scheduling.
//!
//! The effect runtime never decides on its own when a tick happens. It asks
//! the host through [`TickScheduler`] and the host later drains the runtime
//! (see [`crate::Runtime::drain_tasks`]).

/// Requests scheduling ticks from the host.
///
/// Implementations must be safe to call from any thread because wakers
/// produced for futures spawned on the runtime forward to this trait.
pub trait TickScheduler: Send + Sync {
    /// Request that the host run another tick soon.
    fn schedule_tick(&self);
}
