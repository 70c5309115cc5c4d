//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides a concrete [`TickScheduler`] for `formfx-core`.
//! Hosts construct a [`StdRuntime`], hand [`StdRuntime::runtime_handle`] to
//! their effect scopes and call [`StdRuntime::run_tick`] whenever
//! [`StdRuntime::take_tick_request`] reports pending work.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use formfx_core::{Runtime, RuntimeHandle, TickScheduler};

type TickWaker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records tick requests in an atomic flag and optionally
/// pokes the host's event loop.
pub struct StdScheduler {
    tick_requested: AtomicBool,
    tick_waker: RwLock<Option<TickWaker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            tick_requested: AtomicBool::new(false),
            tick_waker: RwLock::new(None),
        }
    }

    /// Returns whether a tick has been requested since the last call.
    pub fn take_tick_request(&self) -> bool {
        self.tick_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker that will be invoked whenever a new tick is scheduled.
    pub fn set_tick_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self
            .tick_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    pub fn clear_tick_waker(&self) {
        *self
            .tick_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .tick_waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("tick_requested", &self.tick_requested.load(Ordering::SeqCst))
            .finish()
    }
}

impl TickScheduler for StdScheduler {
    fn schedule_tick(&self) {
        self.tick_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Convenience container bundling the standard scheduler with a runtime.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    runtime: Runtime,
}

impl StdRuntime {
    pub fn new() -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        Self { scheduler, runtime }
    }

    /// Returns the [`formfx_core::Runtime`] driven by the standard scheduler.
    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Returns whether a tick was requested since the last poll.
    pub fn take_tick_request(&self) -> bool {
        self.scheduler.take_tick_request()
    }

    pub fn set_tick_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_tick_waker(waker);
    }

    pub fn clear_tick_waker(&self) {
        self.scheduler.clear_tick_waker();
    }

    /// Runs one tick: queued lazy flushes and one poll of spawned futures.
    /// Returns the number of tasks that ran.
    pub fn run_tick(&self) -> usize {
        let ran = self.runtime.drain_tasks();
        log::trace!("tick {} ran {ran} tasks", self.runtime.ticks());
        ran
    }

    /// Runs ticks while requests keep coming, at most `max_ticks` of them.
    pub fn pump(&self, max_ticks: usize) -> usize {
        let mut ran = 0;
        for _ in 0..max_ticks {
            if !self.take_tick_request() {
                break;
            }
            ran += self.run_tick();
        }
        ran
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("ticks", &self.runtime.ticks())
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use formfx_core::{use_form_effects, EventBus, EventSource, FormEvent, LifeCycleType};

    use super::StdRuntime;

    #[test]
    fn lazy_publish_requests_a_tick_and_flushes_on_run() {
        let runtime = StdRuntime::new();
        let wakes = Arc::new(AtomicUsize::new(0));
        let wakes_in_waker = wakes.clone();
        runtime.set_tick_waker(move || {
            wakes_in_waker.fetch_add(1, Ordering::SeqCst);
        });

        let bus: EventBus<u32> = EventBus::new();
        let source: Rc<dyn EventSource<u32>> = Rc::new(bus.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_handler = seen.clone();
        let _scope = use_form_effects(source, runtime.runtime_handle(), move |effects| {
            effects
                .on(LifeCycleType::FormChange)
                .lazy()
                .subscribe(move |value| seen_in_handler.borrow_mut().push(*value));
        });

        assert!(!runtime.take_tick_request());
        bus.publish(FormEvent::new(LifeCycleType::FormChange, 1));
        bus.publish(FormEvent::new(LifeCycleType::FormChange, 2));

        assert!(runtime.take_tick_request(), "lazy publish should request a tick");
        assert!(!runtime.take_tick_request());
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        assert!(seen.borrow().is_empty());

        assert_eq!(runtime.run_tick(), 1);
        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn pump_stops_once_no_tick_is_requested() {
        let runtime = StdRuntime::new();
        let handle = runtime.runtime_handle();
        let count = Rc::new(RefCell::new(0));
        let count_in_task = count.clone();
        let chained = handle.clone();
        handle.spawn_task(Box::new(move || {
            *count_in_task.borrow_mut() += 1;
            let again = count_in_task.clone();
            chained.spawn_task(Box::new(move || *again.borrow_mut() += 1));
        }));

        assert_eq!(runtime.pump(10), 2);
        assert_eq!(*count.borrow(), 2);
        assert_eq!(runtime.pump(10), 0);

        runtime.clear_tick_waker();
        assert!(!runtime.take_tick_request());
    }
}
