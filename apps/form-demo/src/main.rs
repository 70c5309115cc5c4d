use std::cell::RefCell;
use std::rc::{Rc, Weak};

use formfx_core::bus::Listener;
use formfx_core::{
    use_form_effects, EventBus, EventSource, FieldPath, FieldPattern, FormEvent, LifeCycleType,
    Snapshotable, SubscriptionId,
};
use formfx_fields::{
    compute_array_context, compute_help, compute_label, compute_status, ArrayBounds, ArrayFlags,
    ItemProps, Renders, SchemaText, SlotRenderer,
};
use formfx_runtime_std::StdRuntime;

const MAX_TICKS: usize = 16;

#[derive(Clone, Debug, Default)]
struct ContactsState {
    loading: bool,
    contacts: Vec<String>,
    errors: Vec<String>,
}

/// Tiny in-memory form engine standing in for a real one.
struct ContactsForm {
    bus: EventBus<ContactsState>,
    state: RefCell<ContactsState>,
    this: Weak<ContactsForm>,
}

impl ContactsForm {
    fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            bus: EventBus::new(),
            state: RefCell::new(ContactsState::default()),
            this: this.clone(),
        })
    }

    fn publish(&self, kind: LifeCycleType, path: Option<FieldPath>) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let mut event = FormEvent::from_model(kind, this);
        if let Some(path) = path {
            event = event.with_path(path);
        }
        self.bus.publish(event);
    }

    fn set_loading(&self, loading: bool) {
        self.state.borrow_mut().loading = loading;
        self.publish(LifeCycleType::FormChange, None);
    }

    fn add_contact(&self, name: &str) {
        let index = {
            let mut state = self.state.borrow_mut();
            state.contacts.push(name.to_string());
            state.contacts.len() - 1
        };
        let path = FieldPath::parse("contacts").child(index.to_string());
        self.publish(LifeCycleType::FieldAdded, Some(path));
        self.publish(LifeCycleType::FormChange, None);
    }

    fn validate(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.errors = state
                .contacts
                .iter()
                .filter(|name| name.trim().is_empty())
                .map(|_| "contact name is required".to_string())
                .collect();
        }
        self.publish(LifeCycleType::FormValidateEnd, None);
    }
}

impl Snapshotable<ContactsState> for ContactsForm {
    fn snapshot(&self) -> ContactsState {
        self.state.borrow().clone()
    }
}

impl EventSource<ContactsState> for ContactsForm {
    fn subscribe(&self, listener: Listener<ContactsState>) -> SubscriptionId {
        EventSource::subscribe(&self.bus, listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }
}

type Step = (&'static str, Box<dyn Fn(&ContactsForm)>);

fn step(label: &'static str, action: impl Fn(&ContactsForm) + 'static) -> Step {
    (label, Box::new(action))
}

fn print_array(state: &ContactsState) {
    let bounds = ArrayBounds::new(Some(1), Some(3));
    let flags = ArrayFlags {
        disabled: state.loading,
        ..ArrayFlags::default()
    };
    let mut renders: Renders<String> = Renders::default();
    renders.insert(
        "remove".to_string(),
        SlotRenderer::callback(|index, ctx| {
            ctx.allow_remove.then(|| format!("[remove #{index}]"))
        }),
    );

    for index in 0..state.contacts.len().max(1) {
        let ctx = compute_array_context(state.contacts.len(), &bounds, &flags, index);
        let addition = ctx.render_with(&renders, "addition", |_| Some("[add]".to_string()), None);
        let remove = ctx.render_with(&renders, "remove", |node| node, None);
        println!(
            "  item {index}: empty={} add={} remove={} move={} | {:?} {:?}",
            ctx.is_empty, ctx.allow_addition, ctx.allow_remove, ctx.allow_move_up, addition, remove
        );
    }
}

fn print_item(state: &ContactsState) {
    let props = ItemProps {
        loading: state.loading,
        invalid: !state.errors.is_empty(),
        errors: state.errors.clone(),
        schema: Some(SchemaText {
            title: Some("Contacts".to_string()),
            description: Some("People we may reach out to".to_string()),
        }),
        ..ItemProps::default()
    };
    println!(
        "  item: label={:?} status={:?} help={}",
        compute_label(&props),
        compute_status(&props),
        compute_help(&props).map(|help| help.to_string()).unwrap_or_default()
    );
}

fn main() {
    env_logger::init();

    println!("=== formfx demo ===");
    println!("A contacts form with a lazily tracked loading flag.");
    println!();

    let runtime = StdRuntime::new();
    let form = ContactsForm::new();
    let source: Rc<dyn EventSource<ContactsState>> = form.clone();

    let added_pattern = match FieldPattern::parse("contacts.*") {
        Ok(pattern) => pattern,
        Err(err) => {
            log::error!("invalid pattern: {err}");
            return;
        }
    };

    let loading_slot = Rc::new(RefCell::new(None));
    let slot = loading_slot.clone();
    let mut scope = use_form_effects(source, runtime.runtime_handle(), move |effects| {
        *slot.borrow_mut() = Some(effects.track(
            LifeCycleType::FormChange,
            false,
            |state: &ContactsState| state.loading,
        ));
        effects
            .on(LifeCycleType::FieldAdded)
            .path(added_pattern)
            .subscribe(|state: &ContactsState| {
                log::info!("contact added, {} total", state.contacts.len());
            });
        effects
            .on(LifeCycleType::FormValidateEnd)
            .subscribe(|state: &ContactsState| {
                for error in &state.errors {
                    log::warn!("validation: {error}");
                }
            });
    });
    let Some(loading) = loading_slot.borrow_mut().take() else {
        log::error!("loading tracker was not declared");
        return;
    };

    let steps = vec![
        step("start loading", |form| form.set_loading(true)),
        step("add alice", |form| form.add_contact("alice")),
        step("finish loading", |form| form.set_loading(false)),
        step("add bob and a blank", |form| {
            form.add_contact("bob");
            form.add_contact(" ");
        }),
        step("validate", |form| form.validate()),
    ];

    for (label, action) in steps {
        action(form.as_ref());
        let ran = runtime.pump(MAX_TICKS);
        println!("{label}: loading={} (ticks ran {ran} tasks)", loading.get());
        let state = form.snapshot();
        print_array(&state);
        print_item(&state);
    }

    scope.teardown();
    form.set_loading(true);
    println!(
        "after teardown: listeners={} loading={}",
        form.bus.len(),
        loading.get()
    );
}
