use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::{
    Component, ComponentError, Context, Element, HostNodeId, InitContext,
    LifecycleError, LifecyclePhase, MemoryHost, PropValue, Props, ReconcileError, Reconciler,
    ReconcilerConfig, Renderable, Updater,
};

type Log = Rc<RefCell<Vec<String>>>;
type Slot<C> = Rc<RefCell<Option<Updater<C>>>>;

fn log_of(props: &Props) -> Log {
    props
        .property("log")
        .and_then(|value| value.downcast::<Log>())
        .cloned()
        .unwrap_or_default()
}

fn publish<C: Component>(props: &Props, cx: &InitContext<C>) {
    if let Some(slot) = props.property("slot").and_then(|value| value.downcast::<Slot<C>>()) {
        *slot.borrow_mut() = Some(cx.updater());
    }
}

fn text(value: impl ToString) -> Renderable {
    Element::host("Label", Props::new().with("Text", value.to_string())).into()
}

struct Counter {
    updater: Updater<Counter>,
    log: Log,
}

impl Component for Counter {
    type State = i64;

    fn init(props: &Props, cx: &mut InitContext<Self>) -> Self {
        publish(props, cx);
        Counter {
            updater: cx.updater(),
            log: log_of(props),
        }
    }

    fn initial_state(props: &Props) -> i64 {
        props
            .property("start")
            .and_then(PropValue::as_int)
            .unwrap_or(0)
    }

    fn render(&self, _props: &Props, state: &i64) -> Result<Renderable, ComponentError> {
        self.log.borrow_mut().push(format!("render {state}"));
        let updater = self.updater.clone();
        Ok(Element::host(
            "Label",
            Props::new()
                .with("Text", state.to_string())
                .on("Activated", move |_, _| {
                    updater.update(|count| *count += 1).unwrap();
                }),
        )
        .into())
    }

    fn did_mount(&mut self, _props: &Props, _state: &i64) {
        self.log.borrow_mut().push("did_mount".into());
    }

    fn did_update(&mut self, _prev_props: &Props, prev_state: &i64) {
        self.log
            .borrow_mut()
            .push(format!("did_update from {prev_state}"));
    }

    fn will_unmount(&mut self) {
        let refused = self.updater.update(|count| *count = -1);
        self.log.borrow_mut().push(format!(
            "will_unmount refused={}",
            matches!(
                refused,
                Err(ReconcileError::Lifecycle(LifecycleError::InvalidUpdate {
                    phase: LifecyclePhase::WillUnmount,
                    ..
                }))
            )
        ));
    }
}

struct Setup {
    host: MemoryHost,
    reconciler: Reconciler<MemoryHost>,
}

fn setup(config: ReconcilerConfig) -> Setup {
    let host = MemoryHost::new();
    let reconciler = Reconciler::with_config(host.clone(), config);
    Setup { host, reconciler }
}

fn label_text(host: &MemoryHost, node: HostNodeId) -> Option<String> {
    host.property(node, "Text")
        .and_then(|value| value.as_str().map(str::to_owned))
}

#[test]
fn mount_renders_then_runs_did_mount() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::default());
    let log = Log::default();
    let handle = reconciler
        .mount(
            Element::stateful::<Counter>(
                Props::new()
                    .with("start", 4)
                    .with("log", PropValue::opaque(Rc::clone(&log))),
            ),
            None,
            None,
        )
        .unwrap()
        .unwrap();
    let node = reconciler.resolve_host_node(handle).unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("4"));
    assert_eq!(*log.borrow(), ["render 4", "did_mount"]);
}

#[test]
fn idle_updates_rerender_immediately() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::default());
    let log = Log::default();
    let slot: Slot<Counter> = Slot::default();
    let handle = reconciler
        .mount(
            Element::stateful::<Counter>(
                Props::new()
                    .with("log", PropValue::opaque(Rc::clone(&log)))
                    .with("slot", PropValue::opaque(Rc::clone(&slot))),
            ),
            None,
            None,
        )
        .unwrap()
        .unwrap();
    let updater = slot.borrow().clone().unwrap();
    assert_eq!(updater.phase(), LifecyclePhase::Idle);

    updater.update(|count| *count += 10).unwrap();
    let node = reconciler.resolve_host_node(handle).unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("10"));
    assert_eq!(
        *log.borrow(),
        ["render 0", "did_mount", "render 10", "did_update from 0"]
    );
}

#[test]
fn host_events_drive_state_updates() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::default());
    let handle = reconciler
        .mount(Element::stateful::<Counter>(Props::new()), None, None)
        .unwrap()
        .unwrap();
    let node = reconciler.resolve_host_node(handle).unwrap();

    for _ in 0..3 {
        assert_eq!(host.fire_event(node, "Activated", &[]), 1);
    }
    assert_eq!(label_text(&host, node).as_deref(), Some("3"));
    assert_eq!(host.subscription_count(), 1);
    assert_eq!(reconciler.subscription_count(), 1);
}

#[test]
fn unmount_calls_will_unmount_and_silences_the_updater() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::default());
    let log = Log::default();
    let slot: Slot<Counter> = Slot::default();
    let handle = reconciler
        .mount(
            Element::stateful::<Counter>(
                Props::new()
                    .with("log", PropValue::opaque(Rc::clone(&log)))
                    .with("slot", PropValue::opaque(Rc::clone(&slot))),
            ),
            None,
            None,
        )
        .unwrap()
        .unwrap();
    let updater = slot.borrow().clone().unwrap();

    reconciler.unmount(handle).unwrap();
    assert_eq!(log.borrow().last().map(String::as_str), Some("will_unmount refused=true"));
    assert_eq!(host.node_count(), 0);
    assert_eq!(host.subscription_count(), 0);
    assert_eq!(updater.phase(), LifecyclePhase::Unmounted);
    assert!(updater.update(|count| *count += 1).is_ok());
}

/// Counts itself up to `target` from its own lifecycle hooks.
struct Climber {
    updater: Updater<Climber>,
    rendered: Cell<i64>,
    target: i64,
    log: Log,
}

impl Climber {
    fn climb(&self) {
        if self.rendered.get() < self.target {
            self.updater.update(|count| *count += 1).unwrap();
        }
    }
}

impl Component for Climber {
    type State = i64;

    fn init(props: &Props, cx: &mut InitContext<Self>) -> Self {
        Climber {
            updater: cx.updater(),
            rendered: Cell::new(0),
            target: props.property("target").and_then(PropValue::as_int).unwrap_or(0),
            log: log_of(props),
        }
    }

    fn initial_state(_props: &Props) -> i64 {
        0
    }

    fn render(&self, _props: &Props, state: &i64) -> Result<Renderable, ComponentError> {
        self.rendered.set(*state);
        self.log.borrow_mut().push(format!("render {state}"));
        Ok(text(state))
    }

    fn did_mount(&mut self, _props: &Props, _state: &i64) {
        self.climb();
    }

    fn did_update(&mut self, _prev_props: &Props, _prev_state: &i64) {
        self.climb();
    }
}

#[test]
fn updates_from_lifecycle_hooks_are_deferred_and_cascade() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::default());
    let log = Log::default();
    let handle = reconciler
        .mount(
            Element::stateful::<Climber>(
                Props::new()
                    .with("target", 3)
                    .with("log", PropValue::opaque(Rc::clone(&log))),
            ),
            None,
            None,
        )
        .unwrap()
        .unwrap();
    assert_eq!(
        *log.borrow(),
        ["render 0", "render 1", "render 2", "render 3"]
    );
    let node = reconciler.resolve_host_node(handle).unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("3"));
}

#[test]
fn runaway_cascades_are_cut_off() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::new().with_max_pending_updates(5));
    let err = reconciler
        .mount(
            Element::stateful::<Climber>(Props::new().with("target", 1_000)),
            None,
            None,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Lifecycle(LifecycleError::TooManyUpdates { limit: 5, .. })
    ));
    assert_eq!(reconciler.handle_count(), 0);
    assert_eq!(host.node_count(), 0);
}

/// Tries to update itself while rendering.
struct Impatient {
    updater: Updater<Impatient>,
    refused: Rc<Cell<bool>>,
}

impl Component for Impatient {
    type State = ();

    fn init(props: &Props, cx: &mut InitContext<Self>) -> Self {
        let refused = props
            .property("refused")
            .and_then(|value| value.downcast::<Rc<Cell<bool>>>())
            .cloned()
            .unwrap_or_default();
        Impatient {
            updater: cx.updater(),
            refused,
        }
    }

    fn initial_state(_props: &Props) {}

    fn render(&self, _props: &Props, _state: &()) -> Result<Renderable, ComponentError> {
        let result = self.updater.update(|_| {});
        self.refused.set(matches!(
            result,
            Err(ReconcileError::Lifecycle(LifecycleError::InvalidUpdate {
                phase: LifecyclePhase::Render,
                ..
            }))
        ));
        Ok(Renderable::Empty)
    }
}

#[test]
fn updates_during_render_are_rejected() {
    let Setup { reconciler, .. } = setup(ReconcilerConfig::default());
    let refused = Rc::new(Cell::new(false));
    reconciler
        .mount(
            Element::stateful::<Impatient>(
                Props::new().with("refused", PropValue::opaque(Rc::clone(&refused))),
            ),
            None,
            None,
        )
        .unwrap();
    assert!(refused.get());
}

/// Shows `value` from props through derived state, unless frozen.
struct Mirror;

impl Component for Mirror {
    type State = i64;

    fn init(_props: &Props, _cx: &mut InitContext<Self>) -> Self {
        Mirror
    }

    fn initial_state(_props: &Props) -> i64 {
        -1
    }

    fn render(&self, _props: &Props, state: &i64) -> Result<Renderable, ComponentError> {
        Ok(text(state))
    }

    fn should_update(&self, _props: &Props, _state: &i64, next: &Props, _next_state: &i64) -> bool {
        next.property("frozen").and_then(PropValue::as_bool) != Some(true)
    }

    fn derive_state(props: &Props, _state: &i64) -> Option<i64> {
        props.property("value").and_then(PropValue::as_int)
    }

    fn default_props() -> Props {
        Props::new().with("value", 1)
    }

    fn validate_props(props: &Props) -> Result<(), String> {
        match props.property("value") {
            Some(PropValue::Int(_)) => Ok(()),
            other => Err(format!("value must be an integer, got {other:?}")),
        }
    }
}

#[test]
fn props_flow_through_defaults_derived_state_and_should_update() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::default());
    let handle = reconciler
        .mount(Element::stateful::<Mirror>(Props::new()), None, None)
        .unwrap()
        .unwrap();
    let node = reconciler.resolve_host_node(handle).unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("1"));

    reconciler
        .reconcile(handle, Element::stateful::<Mirror>(Props::new().with("value", 5)))
        .unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("5"));

    reconciler
        .reconcile(
            handle,
            Element::stateful::<Mirror>(Props::new().with("value", 9).with("frozen", true)),
        )
        .unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("5"));
}

#[test]
fn invalid_props_are_rejected_when_validation_is_on() {
    let Setup { reconciler, .. } = setup(ReconcilerConfig::new().with_validate_props(true));
    let err = reconciler
        .mount(
            Element::stateful::<Mirror>(Props::new().with("value", "seven")),
            None,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidProps { .. }));
    assert_eq!(reconciler.handle_count(), 0);

    let Setup { reconciler, .. } = setup(ReconcilerConfig::default());
    assert!(reconciler
        .mount(
            Element::stateful::<Mirror>(Props::new().with("value", "seven")),
            None,
            None,
        )
        .is_ok());
}

#[derive(Debug)]
struct Theme(&'static str);

/// Provides a dark theme to its subtree and renders `child`.
struct Provider;

impl Component for Provider {
    type State = ();

    fn init(_props: &Props, cx: &mut InitContext<Self>) -> Self {
        cx.provide(Theme("dark"));
        Provider
    }

    fn initial_state(_props: &Props) {}

    fn render(&self, props: &Props, _state: &()) -> Result<Renderable, ComponentError> {
        Ok(props
            .property("child")
            .and_then(|value| value.downcast::<Element>())
            .cloned()
            .into())
    }
}

fn theme_label(cx: &InitContext<impl Component>) -> String {
    cx.context()
        .get::<Theme>()
        .map_or_else(|| "none".to_string(), |theme| theme.0.to_string())
}

struct Reader(String);

impl Component for Reader {
    type State = ();

    fn init(_props: &Props, cx: &mut InitContext<Self>) -> Self {
        Reader(theme_label(cx))
    }

    fn initial_state(_props: &Props) {}

    fn render(&self, _props: &Props, _state: &()) -> Result<Renderable, ComponentError> {
        Ok(text(format!("reader {}", self.0)))
    }
}

struct OtherReader(String);

impl Component for OtherReader {
    type State = ();

    fn init(_props: &Props, cx: &mut InitContext<Self>) -> Self {
        OtherReader(theme_label(cx))
    }

    fn initial_state(_props: &Props) {}

    fn render(&self, _props: &Props, _state: &()) -> Result<Renderable, ComponentError> {
        Ok(text(format!("other {}", self.0)))
    }
}

#[test]
fn context_reaches_descendants_and_survives_replacement() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::default());
    let reader = Element::stateful::<Reader>(Props::new());
    let handle = reconciler
        .mount(
            Element::stateful::<Provider>(Props::new().with("child", PropValue::opaque(reader))),
            None,
            None,
        )
        .unwrap()
        .unwrap();
    let node = reconciler.resolve_host_node(handle).unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("reader dark"));

    let child = reconciler.child(handle, None).unwrap();
    let replaced = reconciler
        .reconcile(child, Element::stateful::<OtherReader>(Props::new()))
        .unwrap()
        .unwrap();
    assert_ne!(replaced, child);
    let node = reconciler.resolve_host_node(replaced).unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("other dark"));
}

#[test]
fn root_context_is_visible_without_a_provider() {
    let Setup { host, reconciler } = setup(ReconcilerConfig::default());
    let handle = reconciler
        .mount_with_context(
            Element::stateful::<Reader>(Props::new()),
            None,
            None,
            Context::new().with(Theme("light")),
        )
        .unwrap()
        .unwrap();
    let node = reconciler.resolve_host_node(handle).unwrap();
    assert_eq!(label_text(&host, node).as_deref(), Some("reader light"));
}
