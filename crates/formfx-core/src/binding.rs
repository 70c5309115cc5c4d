//! Ties one bus subscription and one effect runtime to the lifetime of a
//! scope (a mounted component, a task, ...).

use std::cell::Cell;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::bus::{EventSource, SubscriptionId};
use crate::effects::{Dispatch, EffectOptions, EffectRuntime, EffectSelector, ScopeId};
use crate::event::FormEvent;
use crate::hash::hash_key;
use crate::runtime::RuntimeHandle;
use crate::Key;

struct ScopeState<V> {
    effects: EffectRuntime<V>,
    subscription: Cell<Option<SubscriptionId>>,
    source: Rc<dyn EventSource<V>>,
}

impl<V: Clone + 'static> ScopeState<V> {
    /// Runs at most once per activation: the id is taken out of the cell.
    fn teardown(&self) {
        self.effects.shutdown();
        if let Some(id) = self.subscription.take() {
            self.source.unsubscribe(id);
            log::debug!(
                "scope {}: released subscription {id}",
                self.effects.scope()
            );
        }
    }
}

/// Binding between a scope and a form's event source.
///
/// [`EffectScope::enter`] is called every time the scope is (re-)entered
/// with the same effect description. Callers supply a key describing the
/// description; re-entering with an equal key keeps the existing
/// subscription, a different key replaces it.
pub struct EffectScope<V: Clone + 'static> {
    source: Rc<dyn EventSource<V>>,
    runtime: RuntimeHandle,
    options: EffectOptions,
    key: Option<Key>,
    current: Option<Rc<ScopeState<V>>>,
}

impl<V: Clone + 'static> EffectScope<V> {
    pub fn new(source: Rc<dyn EventSource<V>>, runtime: RuntimeHandle) -> Self {
        Self::with_options(source, runtime, EffectOptions::default())
    }

    pub fn with_options(
        source: Rc<dyn EventSource<V>>,
        runtime: RuntimeHandle,
        options: EffectOptions,
    ) -> Self {
        Self {
            source,
            runtime,
            options,
            key: None,
            current: None,
        }
    }

    pub fn enter<K: Hash + ?Sized>(
        &mut self,
        key: &K,
        description: impl FnOnce(&mut EffectSelector<'_, V>),
    ) -> Dispatch<V> {
        let key = hash_key(key);
        if let Some(current) = &self.current {
            if self.key == Some(key) {
                return current.effects.dispatch();
            }
            log::debug!(
                "scope {}: effect description changed, rebinding",
                current.effects.scope()
            );
        }
        self.teardown();
        self.key = Some(key);
        self.activate(description)
    }

    fn activate(&mut self, description: impl FnOnce(&mut EffectSelector<'_, V>)) -> Dispatch<V> {
        let effects = EffectRuntime::new(self.runtime.clone(), self.options.clone());
        effects.declare(description);
        let dispatch = effects.dispatch();

        let listener_dispatch = dispatch.clone();
        let id = self
            .source
            .subscribe(Box::new(move |event: &FormEvent<V>| {
                listener_dispatch.dispatch_event(event.clone());
            }));
        log::debug!("scope {}: bound to subscription {id}", effects.scope());

        self.current = Some(Rc::new(ScopeState {
            effects,
            subscription: Cell::new(Some(id)),
            source: Rc::clone(&self.source),
        }));
        dispatch
    }

    /// Ends the current activation. Safe to call any number of times.
    pub fn teardown(&mut self) {
        self.key = None;
        if let Some(state) = self.current.take() {
            state.teardown();
        }
    }

    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .map(|state| state.effects.is_active())
            .unwrap_or(false)
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.current
            .as_ref()
            .and_then(|state| state.subscription.get())
    }

    pub fn scope_id(&self) -> Option<ScopeId> {
        self.current.as_ref().map(|state| state.effects.scope())
    }

    pub fn effects(&self) -> Option<EffectRuntime<V>> {
        self.current.as_ref().map(|state| state.effects.clone())
    }

    pub fn dispatch(&self) -> Option<Dispatch<V>> {
        self.current.as_ref().map(|state| state.effects.dispatch())
    }

    /// Weak handle that can end this activation from elsewhere, including
    /// from inside one of the scope's own handlers.
    pub fn handle(&self) -> ScopeHandle<V> {
        ScopeHandle {
            state: self
                .current
                .as_ref()
                .map(Rc::downgrade)
                .unwrap_or_default(),
        }
    }
}

impl<V: Clone + 'static> Drop for EffectScope<V> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<V: Clone + 'static> fmt::Debug for EffectScope<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("scope", &self.scope_id())
            .field("subscription", &self.subscription())
            .finish()
    }
}

pub struct ScopeHandle<V> {
    state: Weak<ScopeState<V>>,
}

impl<V> Clone for ScopeHandle<V> {
    fn clone(&self) -> Self {
        Self {
            state: Weak::clone(&self.state),
        }
    }
}

impl<V: Clone + 'static> ScopeHandle<V> {
    pub fn teardown(&self) {
        if let Some(state) = self.state.upgrade() {
            state.teardown();
        }
    }

    pub fn is_active(&self) -> bool {
        self.state
            .upgrade()
            .map(|state| state.effects.is_active())
            .unwrap_or(false)
    }
}

/// Binds `description` to `source` for a scope that declares its effects
/// once. Dropping the returned scope unsubscribes.
pub fn use_form_effects<V: Clone + 'static>(
    source: Rc<dyn EventSource<V>>,
    runtime: RuntimeHandle,
    description: impl FnOnce(&mut EffectSelector<'_, V>),
) -> EffectScope<V> {
    let mut scope = EffectScope::new(source, runtime);
    scope.enter(&(), description);
    scope
}
