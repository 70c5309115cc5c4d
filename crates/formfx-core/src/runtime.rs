use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Waker};

use futures_task::{ArcWake, LocalFutureObj, LocalSpawn, SpawnError};

use crate::platform::TickScheduler;

/// Waker handed to futures spawned on the runtime; waking asks the host for
/// another tick.
struct TickWaker {
    scheduler: Arc<dyn TickScheduler>,
}

impl ArcWake for TickWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.scheduler.schedule_tick();
    }
}

struct RuntimeInner {
    scheduler: Arc<dyn TickScheduler>,
    waker: Waker,
    needs_tick: Cell<bool>,
    ticks: Cell<u64>,
    pending_tasks: RefCell<VecDeque<Box<dyn FnOnce() + 'static>>>,
    pending_futures: RefCell<Vec<LocalFutureObj<'static, ()>>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn TickScheduler>) -> Self {
        let waker = futures_task::waker(Arc::new(TickWaker {
            scheduler: Arc::clone(&scheduler),
        }));
        Self {
            scheduler,
            waker,
            needs_tick: Cell::new(false),
            ticks: Cell::new(0),
            pending_tasks: RefCell::new(VecDeque::new()),
            pending_futures: RefCell::new(Vec::new()),
        }
    }

    fn schedule(&self) {
        self.needs_tick.set(true);
        self.scheduler.schedule_tick();
    }

    fn enqueue_task(&self, task: Box<dyn FnOnce() + 'static>) {
        self.pending_tasks.borrow_mut().push_back(task);
        self.schedule();
    }

    fn enqueue_future(&self, future: LocalFutureObj<'static, ()>) {
        self.pending_futures.borrow_mut().push(future);
        self.schedule();
    }

    /// Runs one tick: every task queued before the tick started, then one
    /// poll of every spawned future. Work queued during the tick waits for
    /// the next one.
    fn drain_tasks(&self) -> usize {
        self.needs_tick.set(false);
        self.ticks.set(self.ticks.get() + 1);
        let tasks: Vec<Box<dyn FnOnce() + 'static>> = {
            let mut pending = self.pending_tasks.borrow_mut();
            pending.drain(..).collect()
        };
        let ran = tasks.len();
        for task in tasks {
            task();
        }

        let futures: Vec<LocalFutureObj<'static, ()>> =
            std::mem::take(&mut *self.pending_futures.borrow_mut());
        let mut still_pending = Vec::with_capacity(futures.len());
        let mut cx = Context::from_waker(&self.waker);
        for mut future in futures {
            if Pin::new(&mut future).poll(&mut cx).is_pending() {
                still_pending.push(future);
            }
        }
        if !still_pending.is_empty() {
            let mut pending = self.pending_futures.borrow_mut();
            still_pending.append(&mut pending);
            *pending = still_pending;
        }

        if self.has_tasks() {
            self.needs_tick.set(true);
        }
        ran
    }

    fn has_tasks(&self) -> bool {
        !self.pending_tasks.borrow().is_empty()
    }

    fn has_futures(&self) -> bool {
        !self.pending_futures.borrow().is_empty()
    }
}

/// Owner of the tick queue that lazy effect flushes and spawned futures run
/// on. Hosts call [`Runtime::drain_tasks`] whenever the scheduler asks for a
/// tick.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn TickScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn needs_tick(&self) -> bool {
        self.inner.needs_tick.get()
    }

    /// Number of ticks drained so far.
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.get()
    }

    pub fn has_pending_work(&self) -> bool {
        self.inner.has_tasks() || self.inner.has_futures()
    }

    pub fn drain_tasks(&self) -> usize {
        self.inner.drain_tasks()
    }

    /// Drains ticks until no closure task is left, bounded by `max_ticks`.
    /// Futures still waiting on an event do not keep this loop going.
    pub fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut ran = 0;
        for _ in 0..max_ticks {
            ran += self.drain_tasks();
            if !self.inner.has_tasks() {
                break;
            }
        }
        ran
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl TickScheduler for DefaultScheduler {
    fn schedule_tick(&self) {}
}

#[cfg(test)]
#[derive(Default)]
pub struct TestScheduler {
    requests: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl TestScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TickScheduler for TestScheduler {
    fn schedule_tick(&self) {
        self.requests
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
pub struct TestRuntime {
    scheduler: Arc<TestScheduler>,
    runtime: Runtime,
}

#[cfg(test)]
impl TestRuntime {
    pub fn new() -> Self {
        let scheduler = Arc::new(TestScheduler::default());
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

    pub fn tick_requests(&self) -> usize {
        self.scheduler.requests()
    }

    pub fn tick(&self) -> usize {
        self.runtime.drain_tasks()
    }
}

/// Weak handle to a [`Runtime`]; inert once the runtime is dropped.
#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn schedule(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.schedule();
        }
    }

    /// Queues `task` for the next tick. Without a live runtime the task runs
    /// immediately.
    pub fn spawn_task(&self, task: Box<dyn FnOnce() + 'static>) {
        if let Some(inner) = self.0.upgrade() {
            inner.enqueue_task(task);
        } else {
            task();
        }
    }

    pub fn spawn_local(&self, future: impl Future<Output = ()> + 'static) -> Result<(), SpawnError> {
        self.spawn_local_obj(LocalFutureObj::new(Box::new(future)))
    }

    pub fn drain_tasks(&self) -> usize {
        self.0
            .upgrade()
            .map(|inner| inner.drain_tasks())
            .unwrap_or(0)
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_tasks())
            .unwrap_or(false)
    }
}

impl LocalSpawn for RuntimeHandle {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        match self.0.upgrade() {
            Some(inner) => {
                inner.enqueue_future(future);
                Ok(())
            }
            None => Err(SpawnError::shutdown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::task::Poll;

    use super::*;

    #[test]
    fn tasks_run_on_the_next_tick_only() {
        let runtime = TestRuntime::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let handle = runtime.handle();

        let outer_log = log.clone();
        let inner_handle = handle.clone();
        handle.spawn_task(Box::new(move || {
            outer_log.borrow_mut().push("outer");
            let nested_log = outer_log.clone();
            inner_handle.spawn_task(Box::new(move || nested_log.borrow_mut().push("nested")));
        }));
        assert!(runtime.runtime().needs_tick());
        assert_eq!(runtime.tick_requests(), 1);
        assert!(log.borrow().is_empty());

        assert_eq!(runtime.tick(), 1);
        assert_eq!(*log.borrow(), vec!["outer"]);
        assert!(runtime.runtime().needs_tick());

        assert_eq!(runtime.tick(), 1);
        assert_eq!(*log.borrow(), vec!["outer", "nested"]);
        assert!(!runtime.runtime().needs_tick());
    }

    #[test]
    fn dead_runtime_runs_tasks_inline() {
        let handle = TestRuntime::new().handle();
        let ran = Rc::new(Cell::new(false));
        let ran_in_task = ran.clone();
        handle.spawn_task(Box::new(move || ran_in_task.set(true)));
        assert!(ran.get());
        assert!(!handle.is_alive());
        assert!(handle.spawn_local(async {}).is_err());
    }

    #[test]
    fn spawned_futures_are_polled_each_tick_until_ready() {
        let runtime = TestRuntime::new();
        let polls = Rc::new(Cell::new(0));
        let polls_in_future = polls.clone();
        let mut remaining = 2;
        runtime
            .handle()
            .spawn_local(std::future::poll_fn(move |_cx| {
                polls_in_future.set(polls_in_future.get() + 1);
                if remaining == 0 {
                    Poll::Ready(())
                } else {
                    remaining -= 1;
                    Poll::Pending
                }
            }))
            .expect("runtime alive");

        for _ in 0..5 {
            runtime.tick();
        }
        assert_eq!(polls.get(), 3);
        assert!(!runtime.runtime().has_pending_work());
    }

    #[test]
    fn run_until_idle_stops_when_queue_is_empty() {
        let runtime = TestRuntime::new();
        let handle = runtime.handle();
        let count = Rc::new(Cell::new(0));
        let count_in_task = count.clone();
        let chained = handle.clone();
        handle.spawn_task(Box::new(move || {
            count_in_task.set(count_in_task.get() + 1);
            let count_again = count_in_task.clone();
            chained.spawn_task(Box::new(move || count_again.set(count_again.get() + 1)));
        }));
        assert_eq!(runtime.runtime().run_until_idle(10), 2);
        assert_eq!(count.get(), 2);
        assert_eq!(runtime.runtime().ticks(), 2);
    }
}
