use std::cell::RefCell;
use std::rc::Rc;
use std::task::Poll;

use formfx_core::{
    use_form_effects, EffectOptions, EffectScope, FaultOrigin, FieldPattern, LifeCycleType,
    TakeNext, Tracked,
};
use formfx_testing::{poll_once, Recorder, RecordingSink, TestForm, TestTicker};

#[derive(Clone, Debug, Default, PartialEq)]
struct FormState {
    loading: bool,
    submitting: bool,
    values: Vec<String>,
}

#[test]
fn loading_flag_tracks_the_latest_form_change() {
    let form = TestForm::new(FormState::default());
    let ticker = TestTicker::new();
    let tracked: Rc<RefCell<Option<Tracked<bool>>>> = Rc::new(RefCell::new(None));
    let slot = tracked.clone();
    let _scope = use_form_effects(form.as_source(), ticker.handle(), move |effects| {
        *slot.borrow_mut() = Some(effects.track(
            LifeCycleType::FormChange,
            false,
            |state: &FormState| state.loading,
        ));
    });
    let loading = tracked.borrow_mut().take().expect("tracker declared");

    form.change(LifeCycleType::FormChange, |state| state.loading = true);
    form.change(LifeCycleType::FormChange, |state| state.loading = false);
    form.change(LifeCycleType::FormChange, |state| state.loading = true);
    assert!(!loading.get());
    assert_eq!(ticker.tick_requests(), 1);

    ticker.tick();
    assert!(loading.get());

    form.change(LifeCycleType::FormChange, |state| state.loading = true);
    // Mutated after the last publish and before the flush.
    form.update(|state| state.loading = false);
    ticker.tick();
    assert!(!loading.get());
}

#[test]
fn submit_lifecycle_is_observed_in_publish_order() {
    let form = TestForm::new(FormState::default());
    let ticker = TestTicker::new();
    let kinds: Recorder<(LifeCycleType, bool)> = Recorder::new();

    let start = kinds.clone();
    let end = kinds.clone();
    let _scope = use_form_effects(form.as_source(), ticker.handle(), move |effects| {
        effects
            .on(LifeCycleType::FormSubmitStart)
            .map(|state: &FormState| state.submitting)
            .subscribe(move |submitting| start.push((LifeCycleType::FormSubmitStart, submitting)));
        effects
            .on(LifeCycleType::FormSubmitEnd)
            .map(|state: &FormState| state.submitting)
            .subscribe(move |submitting| end.push((LifeCycleType::FormSubmitEnd, submitting)));
    });

    form.change(LifeCycleType::FormSubmitStart, |state| state.submitting = true);
    form.emit(LifeCycleType::FormSubmit);
    form.change(LifeCycleType::FormSubmitEnd, |state| state.submitting = false);

    assert_eq!(
        kinds.values(),
        vec![
            (LifeCycleType::FormSubmitStart, true),
            (LifeCycleType::FormSubmitEnd, false),
        ]
    );
}

#[test]
fn array_field_events_are_filtered_by_path() {
    let form = TestForm::new(FormState::default());
    let ticker = TestTicker::new();
    let added: Recorder<Vec<String>> = Recorder::new();
    let sink = added.clone();
    let pattern = FieldPattern::parse("contacts.*").expect("valid pattern");
    let _scope = use_form_effects(form.as_source(), ticker.handle(), move |effects| {
        effects
            .on(LifeCycleType::FieldValueChange)
            .path(pattern)
            .map(|state: &FormState| state.values.clone())
            .subscribe(move |values| sink.push(values));
    });

    form.update(|state| state.values.push("alice".into()));
    form.emit_at(LifeCycleType::FieldValueChange, "contacts.0");
    form.update(|state| state.values.push("bob".into()));
    form.emit_at(LifeCycleType::FieldValueChange, "title");
    form.emit_at(LifeCycleType::FieldValueChange, "contacts.1");

    assert_eq!(
        added.values(),
        vec![
            vec!["alice".to_string()],
            vec!["alice".to_string(), "bob".to_string()],
        ]
    );
}

#[test]
fn faults_reach_the_sink_and_spare_other_scopes() {
    let form = TestForm::new(FormState::default());
    let ticker = TestTicker::new();
    let faults = RecordingSink::new();
    let options = EffectOptions {
        fault_sink: faults.sink(),
        ..EffectOptions::default()
    };

    let mut failing = EffectScope::with_options(form.as_source(), ticker.handle(), options);
    failing.enter("failing", |effects| {
        effects
            .on(LifeCycleType::FormValidateEnd)
            .subscribe(|_: &FormState| panic!("validator crashed"));
    });
    let seen: Recorder<FormState> = Recorder::new();
    let handler = seen.handler();
    let _healthy = use_form_effects(form.as_source(), ticker.handle(), move |effects| {
        effects
            .on(LifeCycleType::FormValidateEnd)
            .subscribe(handler);
    });

    form.emit(LifeCycleType::FormValidateEnd);
    form.emit(LifeCycleType::FormValidateEnd);

    assert_eq!(seen.len(), 2);
    assert_eq!(faults.len(), 2);
    let fault = &faults.faults()[0];
    assert_eq!(fault.message, "validator crashed");
    assert!(matches!(fault.origin, FaultOrigin::Effect { .. }));
    assert!(failing.is_active());
}

#[test]
fn scopes_on_one_form_tear_down_independently() {
    let form = TestForm::new(FormState::default());
    let ticker = TestTicker::new();
    let first: Recorder<FormState> = Recorder::new();
    let second: Recorder<FormState> = Recorder::new();

    let first_handler = first.handler();
    let mut first_scope = use_form_effects(form.as_source(), ticker.handle(), move |effects| {
        effects.on(LifeCycleType::FormReset).subscribe(first_handler);
    });
    let second_handler = second.handler();
    let _second_scope = use_form_effects(form.as_source(), ticker.handle(), move |effects| {
        effects.on(LifeCycleType::FormReset).subscribe(second_handler);
    });
    assert_eq!(form.bus().len(), 2);

    form.emit(LifeCycleType::FormReset);
    first_scope.teardown();
    form.emit(LifeCycleType::FormReset);

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 2);
    assert_eq!(form.bus().len(), 1);
}

#[test]
fn take_waits_for_the_next_occurrence() {
    let form = TestForm::new(FormState::default());
    let ticker = TestTicker::new();
    let next: Rc<RefCell<Option<TakeNext<FormState>>>> = Rc::new(RefCell::new(None));
    let slot = next.clone();
    let scope = use_form_effects(form.as_source(), ticker.handle(), move |effects| {
        *slot.borrow_mut() = Some(effects.on(LifeCycleType::FormMount).take());
    });
    let mut mounted = next.borrow_mut().take().expect("take declared");

    assert!(poll_once(&mut mounted).is_pending());
    form.change(LifeCycleType::FormMount, |state| state.loading = true);
    match poll_once(&mut mounted) {
        Poll::Ready(Some(state)) => assert!(state.loading),
        other => panic!("unexpected poll result: {other:?}"),
    }
    drop(scope);
}

#[test]
fn lazy_dispatch_from_a_scope_resolves_on_the_next_tick() {
    let form = TestForm::new(FormState::default());
    let ticker = TestTicker::new();
    let reloads: Recorder<FormState> = Recorder::new();
    let handler = reloads.handler();
    let scope = use_form_effects(form.as_source(), ticker.handle(), move |effects| {
        effects
            .on(LifeCycleType::custom("reload"))
            .lazy()
            .subscribe(handler);
    });
    let dispatch = scope.dispatch().expect("active scope");

    let source = form.clone();
    dispatch.lazy(LifeCycleType::custom("reload"), move || source.state());
    form.update(|state| state.values.push("fresh".into()));
    assert!(reloads.is_empty());

    ticker.tick();
    assert_eq!(reloads.values()[0].values, vec!["fresh".to_string()]);
}
