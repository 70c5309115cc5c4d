use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use formfx_core::bus::Listener;
use formfx_core::{
    EventBus, EventSource, FaultSink, FieldPath, FormEvent, HandlerFault, LifeCycleType, Runtime,
    RuntimeHandle, Snapshotable, SubscriptionId, TickScheduler,
};

/// Minimal form engine: owns a bus and a state value and publishes events
/// whose payload is the form itself, so subscribers resolve the state when
/// they read it.
pub struct TestForm<S> {
    bus: EventBus<S>,
    state: RefCell<S>,
    this: Weak<TestForm<S>>,
}

impl<S: Clone + 'static> TestForm<S> {
    pub fn new(initial: S) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            bus: EventBus::new(),
            state: RefCell::new(initial),
            this: this.clone(),
        })
    }

    pub fn bus(&self) -> &EventBus<S> {
        &self.bus
    }

    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    /// Mutates the state without publishing anything.
    pub fn update(&self, f: impl FnOnce(&mut S)) {
        f(&mut self.state.borrow_mut());
    }

    /// Publishes `kind` with the live form as payload.
    pub fn emit(&self, kind: LifeCycleType) {
        if let Some(this) = self.this.upgrade() {
            self.bus.publish(FormEvent::from_model(kind, this));
        }
    }

    pub fn emit_at(&self, kind: LifeCycleType, path: &str) {
        if let Some(this) = self.this.upgrade() {
            self.bus
                .publish(FormEvent::from_model(kind, this).with_path(FieldPath::parse(path)));
        }
    }

    /// Publishes a plain value instead of the live form.
    pub fn emit_value(&self, kind: LifeCycleType, value: S) {
        self.bus.publish(FormEvent::new(kind, value));
    }

    /// Updates the state, then publishes `kind`.
    pub fn change(&self, kind: LifeCycleType, f: impl FnOnce(&mut S)) {
        self.update(f);
        self.emit(kind);
    }

    pub fn as_source(self: &Rc<Self>) -> Rc<dyn EventSource<S>> {
        self.clone()
    }
}

impl<S: Clone + 'static> Snapshotable<S> for TestForm<S> {
    fn snapshot(&self) -> S {
        self.state()
    }
}

impl<S: Clone + 'static> EventSource<S> for TestForm<S> {
    fn subscribe(&self, listener: Listener<S>) -> SubscriptionId {
        EventSource::subscribe(&self.bus, listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }
}

/// Scheduler that only counts tick requests.
#[derive(Default)]
pub struct CountingScheduler {
    requests: AtomicUsize,
}

impl CountingScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl TickScheduler for CountingScheduler {
    fn schedule_tick(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runtime driven by hand from tests.
pub struct TestTicker {
    scheduler: Arc<CountingScheduler>,
    runtime: Runtime,
}

impl TestTicker {
    pub fn new() -> Self {
        let scheduler = Arc::new(CountingScheduler::default());
        Self {
            runtime: Runtime::new(scheduler.clone()),
            scheduler,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn tick(&self) -> usize {
        self.runtime.drain_tasks()
    }

    pub fn tick_requests(&self) -> usize {
        self.scheduler.requests()
    }
}

impl Default for TestTicker {
    fn default() -> Self {
        Self::new()
    }
}

/// Fault sink that keeps every fault for later assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    faults: Rc<RefCell<Vec<HandlerFault>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> FaultSink {
        let faults = Rc::clone(&self.faults);
        Rc::new(move |fault: &HandlerFault| faults.borrow_mut().push(fault.clone()))
    }

    pub fn faults(&self) -> Vec<HandlerFault> {
        self.faults.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.faults.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.borrow().is_empty()
    }
}

/// Shared log of values seen by handlers.
pub struct Recorder<T> {
    seen: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            seen: Rc::clone(&self.seen),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            seen: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T: Clone + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: T) {
        self.seen.borrow_mut().push(value);
    }

    /// Handler that records every value it is called with.
    pub fn handler(&self) -> impl FnMut(&T) + 'static {
        let seen = Rc::clone(&self.seen);
        move |value: &T| seen.borrow_mut().push(value.clone())
    }

    pub fn values(&self) -> Vec<T> {
        self.seen.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }
}

/// Polls `future` once with a no-op waker.
pub fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
    let mut cx = Context::from_waker(futures_task::noop_waker_ref());
    Pin::new(future).poll(&mut cx)
}
