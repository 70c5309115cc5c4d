//! Effect runtime: turns bus events into calls of declaratively registered
//! handlers for one scope.
//!
//! Handlers run in one of two modes:
//!
//! - [`DispatchMode::Immediate`] handlers run synchronously for every
//!   matching occurrence.
//! - [`DispatchMode::Lazy`] handlers run at most once per kind per tick,
//!   with the latest occurrence they matched. Occurrences are parked in a
//!   pending table and resolved against the freshest snapshot when the tick
//!   flushes.
//!
//! The registration table is never borrowed while a handler runs, so handlers
//! may dispatch, register or tear the scope down from inside a call.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};

use indexmap::IndexMap;

use crate::collections::map::HashMap;
use crate::error::{default_fault_sink, FaultOrigin, FaultSink, HandlerFault};
use crate::event::{FormEvent, Payload, SnapshotFn};
use crate::lifecycle::LifeCycleType;
use crate::path::{FieldPath, FieldPattern};
use crate::runtime::RuntimeHandle;

pub type ScopeId = usize;
pub type HandlerId = usize;

static NEXT_SCOPE_ID: AtomicUsize = AtomicUsize::new(1);

fn next_scope_id() -> ScopeId {
    NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    Immediate,
    Lazy,
}

#[derive(Clone)]
pub struct EffectOptions {
    /// Coalesce lazy handlers until the next tick. When off, lazy handlers
    /// behave like immediate ones; useful for hosts without a tick loop.
    pub coalesce_lazy: bool,
    pub fault_sink: FaultSink,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            coalesce_lazy: true,
            fault_sink: default_fault_sink(),
        }
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("coalesce_lazy", &self.coalesce_lazy)
            .finish()
    }
}

type Handler<V> = Box<dyn FnMut(&V)>;

struct Registration<V> {
    id: HandlerId,
    kinds: Vec<LifeCycleType>,
    path: Option<FieldPattern>,
    mode: DispatchMode,
    once: bool,
    spent: bool,
    handler: Rc<RefCell<Handler<V>>>,
}

impl<V> Registration<V> {
    fn matches(&self, kind: &LifeCycleType, path: Option<&FieldPath>, mode: DispatchMode) -> bool {
        if self.spent || self.mode != mode || !self.kinds.contains(kind) {
            return false;
        }
        match (&self.path, path) {
            (None, _) => true,
            (Some(pattern), Some(path)) => pattern.matches(path),
            (Some(_), None) => false,
        }
    }
}

/// Latest matching payload per lazy handler for one kind. Handlers that
/// matched the same occurrence share its payload.
type PendingTargets<V> = IndexMap<HandlerId, Rc<Payload<V>>>;

pub(crate) struct EffectRuntimeInner<V> {
    scope: ScopeId,
    active: Cell<bool>,
    next_handler: Cell<HandlerId>,
    registrations: RefCell<Vec<Registration<V>>>,
    interest: RefCell<HashMap<LifeCycleType, usize>>,
    pending: RefCell<IndexMap<LifeCycleType, PendingTargets<V>>>,
    queue: RefCell<VecDeque<FormEvent<V>>>,
    delivering: Cell<bool>,
    flush_scheduled: Cell<bool>,
    runtime: RuntimeHandle,
    options: EffectOptions,
}

/// Clears the delivering flag when the delivery loop exits.
struct DeliveryGuard<'a>(&'a Cell<bool>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<V: Clone + 'static> EffectRuntimeInner<V> {
    fn register(
        &self,
        kinds: Vec<LifeCycleType>,
        path: Option<FieldPattern>,
        mode: DispatchMode,
        once: bool,
        handler: Handler<V>,
    ) -> HandlerId {
        let id = self.next_handler.get();
        self.next_handler.set(id + 1);
        {
            let mut interest = self.interest.borrow_mut();
            for kind in &kinds {
                *interest.entry(kind.clone()).or_insert(0) += 1;
            }
        }
        self.registrations.borrow_mut().push(Registration {
            id,
            kinds,
            path,
            mode,
            once,
            spent: false,
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    }

    fn release_interest(&self, kinds: &[LifeCycleType]) {
        let mut interest = self.interest.borrow_mut();
        for kind in kinds {
            if let Some(count) = interest.get_mut(kind) {
                *count -= 1;
                if *count == 0 {
                    interest.remove(kind);
                }
            }
        }
    }

    fn unregister(&self, id: HandlerId) -> bool {
        let removed = {
            let mut registrations = self.registrations.borrow_mut();
            registrations
                .iter()
                .position(|registration| registration.id == id)
                .map(|index| registrations.remove(index))
        };
        match removed {
            Some(registration) => {
                self.release_interest(&registration.kinds);
                true
            }
            None => false,
        }
    }

    fn is_interested(&self, kind: &LifeCycleType) -> bool {
        self.interest.borrow().contains_key(kind)
    }

    /// Collects matching handlers and marks one-shot ones spent so a
    /// reentrant delivery cannot fire them twice.
    fn take_matching(
        &self,
        kind: &LifeCycleType,
        path: Option<&FieldPath>,
        mode: DispatchMode,
    ) -> Vec<(HandlerId, Rc<RefCell<Handler<V>>>)> {
        let mut registrations = self.registrations.borrow_mut();
        let mut matched = Vec::new();
        for registration in registrations.iter_mut() {
            if registration.matches(kind, path, mode) {
                if registration.once {
                    registration.spent = true;
                }
                matched.push((registration.id, Rc::clone(&registration.handler)));
            }
        }
        matched
    }

    fn purge_spent(&self) {
        let spent: Vec<Registration<V>> = {
            let mut registrations = self.registrations.borrow_mut();
            let (spent, live): (Vec<_>, Vec<_>) = registrations
                .drain(..)
                .partition(|registration| registration.spent);
            *registrations = live;
            spent
        };
        for registration in &spent {
            self.release_interest(&registration.kinds);
        }
    }

    fn invoke(
        &self,
        handlers: Vec<(HandlerId, Rc<RefCell<Handler<V>>>)>,
        kind: &LifeCycleType,
        value: &V,
    ) {
        for (id, handler) in handlers {
            if !self.active.get() {
                return;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match handler.try_borrow_mut() {
                Ok(mut handler) => {
                    (&mut **handler)(value);
                    true
                }
                Err(_) => false,
            }));
            match outcome {
                Ok(true) => {}
                Ok(false) => log::warn!(
                    "scope {}: handler {id} is already running, skipped {kind}",
                    self.scope
                ),
                Err(panic) => {
                    let fault = HandlerFault::from_panic(
                        FaultOrigin::Effect {
                            scope: self.scope,
                            handler: id,
                        },
                        kind.clone(),
                        panic,
                    );
                    (self.options.fault_sink)(&fault);
                }
            }
        }
    }

    fn deliver(self: &Rc<Self>, event: FormEvent<V>) {
        if !self.active.get() {
            return;
        }
        if !self.is_interested(&event.kind) {
            log::trace!("scope {}: no handler for {}", self.scope, event.kind);
            return;
        }
        self.queue.borrow_mut().push_back(event);
        if self.delivering.replace(true) {
            return;
        }
        let _guard = DeliveryGuard(&self.delivering);
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            if !self.active.get() {
                self.queue.borrow_mut().clear();
                break;
            }
            self.deliver_one(event);
        }
    }

    fn deliver_one(self: &Rc<Self>, event: FormEvent<V>) {
        let path = event.path.as_ref();
        let immediate = self.take_matching(&event.kind, path, DispatchMode::Immediate);
        if !immediate.is_empty() {
            let value = event.resolve();
            self.invoke(immediate, &event.kind, &value);
        }

        if !self.options.coalesce_lazy {
            let lazy = self.take_matching(&event.kind, path, DispatchMode::Lazy);
            if !lazy.is_empty() {
                let value = event.resolve();
                self.invoke(lazy, &event.kind, &value);
            }
        } else if self.active.get() {
            let targets = self.lazy_targets(&event.kind, path);
            if !targets.is_empty() {
                let FormEvent { kind, payload, .. } = event;
                let payload = Rc::new(payload);
                {
                    let mut pending = self.pending.borrow_mut();
                    let entry = pending.entry(kind).or_default();
                    for id in targets {
                        entry.insert(id, Rc::clone(&payload));
                    }
                }
                self.schedule_flush();
            }
        }
        self.purge_spent();
    }

    fn lazy_targets(&self, kind: &LifeCycleType, path: Option<&FieldPath>) -> Vec<HandlerId> {
        self.registrations
            .borrow()
            .iter()
            .filter(|registration| registration.matches(kind, path, DispatchMode::Lazy))
            .map(|registration| registration.id)
            .collect()
    }

    /// Handlers with a pending payload, in registration order. One-shot ones
    /// are marked spent.
    fn take_pending(
        &self,
        targets: &PendingTargets<V>,
    ) -> Vec<(HandlerId, Rc<RefCell<Handler<V>>>)> {
        let mut registrations = self.registrations.borrow_mut();
        let mut matched = Vec::new();
        for registration in registrations.iter_mut() {
            if registration.spent || !targets.contains_key(&registration.id) {
                continue;
            }
            if registration.once {
                registration.spent = true;
            }
            matched.push((registration.id, Rc::clone(&registration.handler)));
        }
        matched
    }

    fn schedule_flush(self: &Rc<Self>) {
        if self.flush_scheduled.replace(true) {
            return;
        }
        let weak: Weak<Self> = Rc::downgrade(self);
        self.runtime.spawn_task(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.flush();
            }
        }));
    }

    fn flush(self: &Rc<Self>) {
        self.flush_scheduled.set(false);
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if !self.active.get() {
            return;
        }
        log::trace!("scope {}: flushing {} lazy kinds", self.scope, pending.len());
        for (kind, targets) in pending {
            if !self.active.get() {
                return;
            }
            let mut resolved: Vec<(Rc<Payload<V>>, V)> = Vec::new();
            for (id, handler) in self.take_pending(&targets) {
                let Some(payload) = targets.get(&id) else {
                    continue;
                };
                let cached = resolved
                    .iter()
                    .find(|(seen, _)| Rc::ptr_eq(seen, payload))
                    .map(|(_, value)| value.clone());
                let value = match cached {
                    Some(value) => value,
                    None => {
                        let value = payload.resolve();
                        resolved.push((Rc::clone(payload), value.clone()));
                        value
                    }
                };
                self.invoke(vec![(id, handler)], &kind, &value);
            }
        }
        self.purge_spent();
    }

    fn shutdown(&self) {
        if !self.active.replace(false) {
            return;
        }
        self.pending.borrow_mut().clear();
        self.queue.borrow_mut().clear();
        let registrations = std::mem::take(&mut *self.registrations.borrow_mut());
        self.interest.borrow_mut().clear();
        log::debug!(
            "scope {}: torn down with {} handlers",
            self.scope,
            registrations.len()
        );
        drop(registrations);
    }
}

/// Per-scope effect runtime. Cheap to clone; clones share the same table.
pub struct EffectRuntime<V> {
    inner: Rc<EffectRuntimeInner<V>>,
}

impl<V> Clone for EffectRuntime<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: Clone + 'static> EffectRuntime<V> {
    pub fn new(runtime: RuntimeHandle, options: EffectOptions) -> Self {
        Self {
            inner: Rc::new(EffectRuntimeInner {
                scope: next_scope_id(),
                active: Cell::new(true),
                next_handler: Cell::new(1),
                registrations: RefCell::new(Vec::new()),
                interest: RefCell::new(HashMap::default()),
                pending: RefCell::new(IndexMap::new()),
                queue: RefCell::new(VecDeque::new()),
                delivering: Cell::new(false),
                flush_scheduled: Cell::new(false),
                runtime,
                options,
            }),
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.inner.scope
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Runs an effect description against this runtime's selector.
    pub fn declare(&self, description: impl FnOnce(&mut EffectSelector<'_, V>)) {
        let mut selector = EffectSelector { runtime: self };
        description(&mut selector);
    }

    /// Entry point for events arriving from the bus.
    pub fn deliver(&self, event: FormEvent<V>) {
        self.inner.deliver(event);
    }

    /// Flushes pending lazy dispatches now instead of waiting for the tick.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Number of kinds waiting for the next flush.
    pub fn pending_lazy(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.registrations.borrow().len()
    }

    pub fn unregister(&self, id: HandlerId) -> bool {
        self.inner.unregister(id)
    }

    pub fn dispatch(&self) -> Dispatch<V> {
        Dispatch {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Deactivates the runtime: pending lazy work is dropped, the table is
    /// cleared and no handler runs afterwards. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl<V> fmt::Debug for EffectRuntime<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRuntime")
            .field("scope", &self.inner.scope)
            .field("active", &self.inner.active.get())
            .finish()
    }
}

/// Selector handed to effect descriptions (the `$` of form effect APIs).
pub struct EffectSelector<'a, V> {
    runtime: &'a EffectRuntime<V>,
}

impl<'a, V: Clone + 'static> EffectSelector<'a, V> {
    pub fn on(&mut self, kind: LifeCycleType) -> EffectStream<'a, V> {
        self.on_any([kind])
    }

    pub fn on_any(&mut self, kinds: impl IntoIterator<Item = LifeCycleType>) -> EffectStream<'a, V> {
        EffectStream {
            runtime: self.runtime,
            kinds: kinds.into_iter().collect(),
            path: None,
            mode: DispatchMode::Immediate,
        }
    }

    /// Mirrors the latest value extracted from lazily dispatched `kind`
    /// events, e.g. a form's `loading` flag.
    pub fn track<R: Clone + 'static>(
        &mut self,
        kind: LifeCycleType,
        initial: R,
        extract: impl Fn(&V) -> R + 'static,
    ) -> Tracked<R> {
        let tracked = Tracked {
            value: Rc::new(RefCell::new(initial)),
        };
        let slot = Rc::clone(&tracked.value);
        self.on(kind)
            .lazy()
            .map(extract)
            .subscribe(move |value| *slot.borrow_mut() = value);
        tracked
    }

    pub fn dispatch(&self) -> Dispatch<V> {
        self.runtime.dispatch()
    }
}

/// Builder for one handler registration.
pub struct EffectStream<'a, V> {
    runtime: &'a EffectRuntime<V>,
    kinds: Vec<LifeCycleType>,
    path: Option<FieldPattern>,
    mode: DispatchMode,
}

impl<'a, V: Clone + 'static> EffectStream<'a, V> {
    /// Only match events whose field path matches `pattern`.
    pub fn path(mut self, pattern: FieldPattern) -> Self {
        self.path = Some(pattern);
        self
    }

    pub fn lazy(mut self) -> Self {
        self.mode = DispatchMode::Lazy;
        self
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Projects the payload before it reaches the handler. For lazy streams
    /// the projection runs at flush time against the freshest snapshot.
    pub fn map<R: 'static>(self, project: impl Fn(&V) -> R + 'static) -> MappedStream<'a, V, R> {
        MappedStream {
            stream: self,
            project: Box::new(project),
        }
    }

    pub fn subscribe(self, handler: impl FnMut(&V) + 'static) -> HandlerId {
        self.register(false, Box::new(handler))
    }

    /// Fires on the next matching occurrence only.
    pub fn once(self, handler: impl FnOnce(&V) + 'static) -> HandlerId {
        let mut handler = Some(handler);
        self.register(
            true,
            Box::new(move |value: &V| {
                if let Some(handler) = handler.take() {
                    handler(value);
                }
            }),
        )
    }

    /// Future resolving to the next matching occurrence, or `None` if the
    /// scope is torn down first.
    pub fn take(self) -> TakeNext<V> {
        let state = Rc::new(RefCell::new(TakeState {
            value: None,
            closed: false,
            waker: None,
        }));
        let slot = TakeSlot {
            state: Rc::clone(&state),
        };
        self.register(true, Box::new(move |value: &V| slot.fill(value.clone())));
        TakeNext { state }
    }

    fn register(self, once: bool, handler: Handler<V>) -> HandlerId {
        self.runtime
            .inner
            .register(self.kinds, self.path, self.mode, once, handler)
    }
}

pub struct MappedStream<'a, V, R> {
    stream: EffectStream<'a, V>,
    project: Box<dyn Fn(&V) -> R>,
}

impl<'a, V: Clone + 'static, R: 'static> MappedStream<'a, V, R> {
    pub fn subscribe(self, mut handler: impl FnMut(R) + 'static) -> HandlerId {
        let project = self.project;
        self.stream
            .register(false, Box::new(move |value: &V| handler(project(value))))
    }
}

struct TakeState<V> {
    value: Option<V>,
    closed: bool,
    waker: Option<Waker>,
}

/// Handler-side end of a [`TakeNext`]; closes the future when the handler is
/// dropped without having fired.
struct TakeSlot<V> {
    state: Rc<RefCell<TakeState<V>>>,
}

impl<V> TakeSlot<V> {
    fn fill(&self, value: V) {
        let waker = {
            let mut state = self.state.borrow_mut();
            state.value = Some(value);
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<V> Drop for TakeSlot<V> {
    fn drop(&mut self) {
        let waker = {
            let mut state = self.state.borrow_mut();
            state.closed = true;
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

pub struct TakeNext<V> {
    state: Rc<RefCell<TakeState<V>>>,
}

impl<V> Future for TakeNext<V> {
    type Output = Option<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if let Some(value) = state.value.take() {
            return Poll::Ready(Some(value));
        }
        if state.closed {
            return Poll::Ready(None);
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Latest value observed by [`EffectSelector::track`].
#[derive(Clone)]
pub struct Tracked<R> {
    value: Rc<RefCell<R>>,
}

impl<R: Clone> Tracked<R> {
    pub fn get(&self) -> R {
        self.value.borrow().clone()
    }
}

/// Handle for triggering user-defined actions on a scope. Inert once the
/// scope is torn down.
pub struct Dispatch<V> {
    inner: Weak<EffectRuntimeInner<V>>,
}

impl<V> Clone for Dispatch<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<V: Clone + 'static> Dispatch<V> {
    pub fn dispatch(&self, kind: LifeCycleType, value: V) {
        self.dispatch_event(FormEvent::new(kind, value));
    }

    pub fn dispatch_event(&self, event: FormEvent<V>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.deliver(event);
        }
    }

    /// Dispatches `kind` with a payload computed by `resolve` only when a
    /// handler actually reads it.
    pub fn lazy(&self, kind: LifeCycleType, resolve: impl Fn() -> V + 'static) {
        self.dispatch_event(FormEvent::from_model(kind, Rc::new(SnapshotFn(resolve))));
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.active.get())
            .unwrap_or(false)
    }
}
