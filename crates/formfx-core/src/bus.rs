//! Ordered, synchronous publish/subscribe channel owned by one form.
//!
//! Delivery works on a snapshot of the listener table taken when an event
//! starts delivering, so listeners may subscribe or unsubscribe (themselves or
//! others) while being called. A listener removed mid-delivery is skipped for
//! the rest of that delivery. Events published from inside a listener are
//! queued and delivered after the current event has reached every listener.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{default_fault_sink, FaultOrigin, FaultSink, HandlerFault};
use crate::event::FormEvent;

/// Identifier of one bus subscription. Never reused by the same bus.
pub type SubscriptionId = u64;

pub type Listener<V> = Box<dyn FnMut(&FormEvent<V>)>;

/// Anything a scope can subscribe to: a bus, or a form engine that owns one.
pub trait EventSource<V> {
    fn subscribe(&self, listener: Listener<V>) -> SubscriptionId;

    /// Removes a listener. Returns `false` when the id was already gone.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

#[derive(Clone, Debug)]
pub struct BusOptions {
    /// Name used in log lines.
    pub name: String,
    /// Log every published event at trace level.
    pub trace_events: bool,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            name: "form".to_owned(),
            trace_events: false,
        }
    }
}

struct ListenerEntry<V> {
    id: SubscriptionId,
    listener: Rc<RefCell<Listener<V>>>,
}

struct BusInner<V> {
    listeners: RefCell<Vec<ListenerEntry<V>>>,
    next_id: Cell<SubscriptionId>,
    queue: RefCell<VecDeque<FormEvent<V>>>,
    delivering: Cell<bool>,
    fault_sink: RefCell<FaultSink>,
    options: BusOptions,
}

impl<V> BusInner<V> {
    fn contains(&self, id: SubscriptionId) -> bool {
        self.listeners.borrow().iter().any(|entry| entry.id == id)
    }

    fn deliver(&self, event: &FormEvent<V>) {
        let snapshot: Vec<(SubscriptionId, Rc<RefCell<Listener<V>>>)> = self
            .listeners
            .borrow()
            .iter()
            .map(|entry| (entry.id, Rc::clone(&entry.listener)))
            .collect();
        for (id, listener) in snapshot {
            if !self.contains(id) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut listener = listener.borrow_mut();
                (&mut **listener)(event)
            }));
            if let Err(panic) = outcome {
                let fault = HandlerFault::from_panic(
                    FaultOrigin::Listener { subscription: id },
                    event.kind.clone(),
                    panic,
                );
                let sink = self.fault_sink.borrow().clone();
                sink(&fault);
            }
        }
    }
}

/// Clears the delivering flag even if a fault sink unwinds.
struct DeliveryGuard<'a>(&'a Cell<bool>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct EventBus<V> {
    inner: Rc<BusInner<V>>,
}

impl<V> Clone for EventBus<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> EventBus<V> {
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    pub fn with_options(options: BusOptions) -> Self {
        Self {
            inner: Rc::new(BusInner {
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
                queue: RefCell::new(VecDeque::new()),
                delivering: Cell::new(false),
                fault_sink: RefCell::new(default_fault_sink()),
                options,
            }),
        }
    }

    pub fn options(&self) -> &BusOptions {
        &self.inner.options
    }

    /// Replaces the error channel listener faults are reported to.
    pub fn set_fault_sink(&self, sink: FaultSink) {
        *self.inner.fault_sink.borrow_mut() = sink;
    }

    pub fn subscribe(&self, listener: impl FnMut(&FormEvent<V>) + 'static) -> SubscriptionId {
        self.subscribe_boxed(Box::new(listener))
    }

    fn subscribe_boxed(&self, listener: Listener<V>) -> SubscriptionId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.listeners.borrow_mut().push(ListenerEntry {
            id,
            listener: Rc::new(RefCell::new(listener)),
        });
        log::debug!("{}: subscription {id} added", self.inner.options.name);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        // Dropped after the table borrow ends; a listener's captures may
        // unsubscribe in turn.
        let removed = {
            let mut listeners = self.inner.listeners.borrow_mut();
            listeners
                .iter()
                .position(|entry| entry.id == id)
                .map(|index| listeners.remove(index))
        };
        match removed {
            Some(_entry) => {
                log::debug!("{}: subscription {id} removed", self.inner.options.name);
                true
            }
            None => {
                log::debug!(
                    "{}: subscription {id} already removed",
                    self.inner.options.name
                );
                false
            }
        }
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.listeners.borrow().is_empty()
    }

    /// Delivers `event` to every listener in registration order.
    ///
    /// When called from inside a listener the event is queued behind the one
    /// currently being delivered.
    pub fn publish(&self, event: FormEvent<V>) {
        if self.inner.options.trace_events {
            log::trace!(
                "{}: publish {} path={:?}",
                self.inner.options.name,
                event.kind,
                event.path.as_ref().map(ToString::to_string)
            );
        }
        self.inner.queue.borrow_mut().push_back(event);
        if self.inner.delivering.replace(true) {
            return;
        }
        let _guard = DeliveryGuard(&self.inner.delivering);
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.inner.deliver(&event);
        }
    }
}

impl<V> Default for EventBus<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for EventBus<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.inner.options.name)
            .field("listeners", &self.len())
            .field("next_id", &self.inner.next_id.get())
            .finish()
    }
}

impl<V> EventSource<V> for EventBus<V> {
    fn subscribe(&self, listener: Listener<V>) -> SubscriptionId {
        self.subscribe_boxed(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        EventBus::unsubscribe(self, id)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::lifecycle::LifeCycleType;

    fn recording_bus() -> (EventBus<i32>, Rc<RefCell<Vec<HandlerFault>>>) {
        let bus = EventBus::new();
        let faults = Rc::new(RefCell::new(Vec::new()));
        let sink_faults = faults.clone();
        bus.set_fault_sink(Rc::new(move |fault: &HandlerFault| {
            sink_faults.borrow_mut().push(fault.clone())
        }));
        (bus, faults)
    }

    #[test]
    fn listeners_see_events_in_publish_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = log.clone();
        let second = log.clone();
        bus.subscribe(move |event: &FormEvent<i32>| first.borrow_mut().push(("a", event.resolve())));
        bus.subscribe(move |event: &FormEvent<i32>| second.borrow_mut().push(("b", event.resolve())));

        for value in 1..=3 {
            bus.publish(FormEvent::new(LifeCycleType::FieldChange, value));
        }

        assert_eq!(
            *log.borrow(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2), ("a", 3), ("b", 3)]
        );
    }

    #[test]
    fn ids_are_monotonic_and_not_reused() {
        let bus: EventBus<i32> = EventBus::new();
        let a = bus.subscribe(|_| {});
        assert!(bus.unsubscribe(a));
        let b = bus.subscribe(|_| {});
        assert!(b > a);
    }

    #[test]
    fn double_unsubscribe_is_a_noop() {
        let bus: EventBus<i32> = EventBus::new();
        let keep = bus.subscribe(|_| {});
        let id = bus.subscribe(|_| {});
        assert_eq!(bus.len(), 2);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(!bus.unsubscribe(999));
        assert_eq!(bus.len(), 1);
        assert!(bus.is_subscribed(keep));
    }

    #[test]
    fn panicking_listener_does_not_stop_delivery() {
        let (bus, faults) = recording_bus();
        let reached = Rc::new(Cell::new(0));
        let reached_in_listener = reached.clone();
        let bad = bus.subscribe(|_| panic!("listener exploded"));
        bus.subscribe(move |_| reached_in_listener.set(reached_in_listener.get() + 1));

        bus.publish(FormEvent::new(LifeCycleType::FormSubmit, 0));
        bus.publish(FormEvent::new(LifeCycleType::FormSubmit, 0));

        assert_eq!(reached.get(), 2);
        let faults = faults.borrow();
        assert_eq!(faults.len(), 2);
        assert_eq!(
            faults[0].origin,
            FaultOrigin::Listener { subscription: bad }
        );
        assert_eq!(faults[0].message, "listener exploded");
        assert_eq!(faults[0].kind, LifeCycleType::FormSubmit);
    }

    #[test]
    fn listener_removed_mid_delivery_is_skipped() {
        let bus: EventBus<i32> = EventBus::new();
        let victim_calls = Rc::new(Cell::new(0));
        let victim_id = Rc::new(Cell::new(0));

        let bus_in_listener = bus.clone();
        let victim_id_in_listener = victim_id.clone();
        bus.subscribe(move |_| {
            bus_in_listener.unsubscribe(victim_id_in_listener.get());
        });
        let calls = victim_calls.clone();
        victim_id.set(bus.subscribe(move |_| calls.set(calls.get() + 1)));

        bus.publish(FormEvent::new(LifeCycleType::FormChange, 1));
        assert_eq!(victim_calls.get(), 0);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn self_unsubscribe_during_delivery_is_safe() {
        let bus: EventBus<i32> = EventBus::new();
        let own_id = Rc::new(Cell::new(0));
        let calls = Rc::new(Cell::new(0));
        let bus_in_listener = bus.clone();
        let own_id_in_listener = own_id.clone();
        let calls_in_listener = calls.clone();
        own_id.set(bus.subscribe(move |_| {
            calls_in_listener.set(calls_in_listener.get() + 1);
            bus_in_listener.unsubscribe(own_id_in_listener.get());
        }));

        bus.publish(FormEvent::new(LifeCycleType::FormChange, 1));
        bus.publish(FormEvent::new(LifeCycleType::FormChange, 2));
        assert_eq!(calls.get(), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn nested_publish_is_delivered_after_current_event() {
        let bus: EventBus<i32> = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let bus_in_listener = bus.clone();
        let first = log.clone();
        bus.subscribe(move |event: &FormEvent<i32>| {
            let value = event.resolve();
            first.borrow_mut().push(format!("a{value}"));
            if value == 1 {
                bus_in_listener.publish(FormEvent::new(LifeCycleType::FormChange, 2));
            }
        });
        let second = log.clone();
        bus.subscribe(move |event: &FormEvent<i32>| {
            second.borrow_mut().push(format!("b{}", event.resolve()))
        });

        bus.publish(FormEvent::new(LifeCycleType::FormChange, 1));
        assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn listener_added_mid_delivery_waits_for_next_event() {
        let bus: EventBus<i32> = EventBus::new();
        let late_calls = Rc::new(Cell::new(0));
        let bus_in_listener = bus.clone();
        let late = late_calls.clone();
        let added = Rc::new(Cell::new(false));
        bus.subscribe(move |_| {
            if !added.replace(true) {
                let late = late.clone();
                bus_in_listener.subscribe(move |_| late.set(late.get() + 1));
            }
        });

        bus.publish(FormEvent::new(LifeCycleType::FormInit, 0));
        assert_eq!(late_calls.get(), 0);
        bus.publish(FormEvent::new(LifeCycleType::FormChange, 0));
        assert_eq!(late_calls.get(), 1);
    }
}
