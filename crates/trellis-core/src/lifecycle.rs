//! Stateful components: the user-facing [`Component`] trait and the driver
//! that runs one through its lifecycle.

use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::rc::{Rc, Weak};

use crate::component::{
    ComponentDefinition, ComponentInstance, LifecycleScope, LifecycleStep, UpdateRequester,
};
use crate::context::Context;
use crate::element::Renderable;
use crate::error::{ComponentError, LifecycleError, ReconcileError};
use crate::props::Props;

/// A stateful component.
///
/// `Self` holds whatever the component keeps between renders (typically its
/// [`Updater`]); `State` is the value updates act on. Hooks run in this
/// order on mount: `init`, `render`, children mount, `did_mount`. On update:
/// `derive_state`, `should_update`, `will_update`, `render`, children
/// reconcile, `did_update`.
pub trait Component: Sized + 'static {
    type State: Clone + 'static;

    fn init(props: &Props, cx: &mut InitContext<Self>) -> Self;

    fn initial_state(props: &Props) -> Self::State;

    fn render(&self, props: &Props, state: &Self::State) -> Result<Renderable, ComponentError>;

    fn did_mount(&mut self, _props: &Props, _state: &Self::State) {}

    fn should_update(
        &self,
        _props: &Props,
        _state: &Self::State,
        _next_props: &Props,
        _next_state: &Self::State,
    ) -> bool {
        true
    }

    fn will_update(&mut self, _next_props: &Props, _next_state: &Self::State) {}

    fn did_update(&mut self, _prev_props: &Props, _prev_state: &Self::State) {}

    fn will_unmount(&mut self) {}

    /// State to use instead of `state` given `props`, checked before every
    /// render.
    fn derive_state(_props: &Props, _state: &Self::State) -> Option<Self::State> {
        None
    }

    /// Props the element's own props are layered over.
    fn default_props() -> Props {
        Props::new()
    }

    /// Checked on mount and update when props validation is enabled.
    fn validate_props(_props: &Props) -> Result<(), String> {
        Ok(())
    }

    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    Init,
    Render,
    ReconcileChildren,
    DidMount,
    ShouldUpdate,
    WillUpdate,
    DidUpdate,
    WillUnmount,
    Idle,
    Unmounted,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::Init => "init",
            LifecyclePhase::Render => "render",
            LifecyclePhase::ReconcileChildren => "child reconciliation",
            LifecyclePhase::DidMount => "did_mount",
            LifecyclePhase::ShouldUpdate => "should_update",
            LifecyclePhase::WillUpdate => "will_update",
            LifecyclePhase::DidUpdate => "did_update",
            LifecyclePhase::WillUnmount => "will_unmount",
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Unmounted => "unmounted",
        };
        f.write_str(name)
    }
}

type StateUpdate<S> = Box<dyn FnOnce(&mut S)>;

struct Shared<S> {
    phase: LifecyclePhase,
    queued: Vec<StateUpdate<S>>,
    requester: Option<UpdateRequester>,
}

type SharedRef<S> = Rc<RefCell<Shared<S>>>;

/// Requests state changes on one mounted component.
pub struct Updater<C: Component> {
    shared: Weak<RefCell<Shared<C::State>>>,
}

impl<C: Component> Clone for Updater<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Component> Updater<C> {
    /// Queues `change` against the component's state.
    ///
    /// Deferred while the component is initialising, mounting children or
    /// running `did_mount`/`did_update`; rejected during render,
    /// `should_update`, `will_update` and `will_unmount`; applied with an
    /// immediate re-render when idle; ignored once unmounted.
    pub fn update(&self, change: impl FnOnce(&mut C::State) + 'static) -> Result<(), ReconcileError> {
        let Some(shared) = self.shared.upgrade() else {
            return Ok(());
        };
        let requester = {
            let mut shared = shared.borrow_mut();
            match shared.phase {
                phase @ (LifecyclePhase::Render
                | LifecyclePhase::ShouldUpdate
                | LifecyclePhase::WillUpdate
                | LifecyclePhase::WillUnmount) => {
                    return Err(LifecycleError::InvalidUpdate {
                        component: C::name(),
                        phase,
                    }
                    .into());
                }
                LifecyclePhase::Unmounted => return Ok(()),
                LifecyclePhase::Idle => {
                    shared.queued.push(Box::new(change));
                    shared.requester.clone()
                }
                LifecyclePhase::Init
                | LifecyclePhase::ReconcileChildren
                | LifecyclePhase::DidMount
                | LifecyclePhase::DidUpdate => {
                    shared.queued.push(Box::new(change));
                    None
                }
            }
        };
        match requester {
            Some(requester) => requester.request(),
            None => Ok(()),
        }
    }

    /// Replaces the state outright.
    pub fn set(&self, state: C::State) -> Result<(), ReconcileError> {
        self.update(move |current| *current = state)
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.shared
            .upgrade()
            .map_or(LifecyclePhase::Unmounted, |shared| shared.borrow().phase)
    }
}

impl<C: Component> fmt::Debug for Updater<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("component", &C::name())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Passed to [`Component::init`].
pub struct InitContext<C: Component> {
    context: Context,
    shared: SharedRef<C::State>,
}

impl<C: Component> InitContext<C> {
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Makes `value` visible to this component's subtree.
    pub fn provide<T: 'static>(&mut self, value: T) {
        self.context = self.context.with(value);
    }

    pub fn updater(&self) -> Updater<C> {
        Updater {
            shared: Rc::downgrade(&self.shared),
        }
    }
}

/// Drives a [`Component`] as a [`ComponentInstance`].
struct ComponentHost<C: Component> {
    component: C,
    props: Props,
    state: C::State,
    shared: SharedRef<C::State>,
    /// What the instance was constructed with.
    context: Context,
    /// What its subtree sees.
    child_context: Context,
    previous: Option<(Props, C::State)>,
    cascade: usize,
}

impl<C: Component> ComponentHost<C> {
    fn set_phase(&self, phase: LifecyclePhase) {
        self.shared.borrow_mut().phase = phase;
    }

    fn take_queued(&self) -> Vec<StateUpdate<C::State>> {
        mem::take(&mut self.shared.borrow_mut().queued)
    }

    fn has_queued(&self) -> bool {
        !self.shared.borrow().queued.is_empty()
    }

    fn check_props(&self, scope: &LifecycleScope<'_>, props: &Props) -> Result<(), ReconcileError> {
        if !scope.config().validate_props() {
            return Ok(());
        }
        C::validate_props(props).map_err(|message| ReconcileError::InvalidProps {
            component: Rc::from(C::name()),
            message,
        })
    }

    fn render_child(
        &mut self,
        scope: &mut LifecycleScope<'_>,
        step: LifecycleStep,
    ) -> Result<(), ReconcileError> {
        self.set_phase(LifecyclePhase::Render);
        let rendered = match self.component.render(&self.props, &self.state) {
            Ok(rendered) => rendered,
            Err(source) => {
                self.set_phase(LifecyclePhase::Idle);
                return Err(ReconcileError::Render {
                    component: Rc::from(C::name()),
                    source,
                });
            }
        };
        self.set_phase(LifecyclePhase::ReconcileChildren);
        scope.render_child(rendered, self.child_context.clone());
        scope.notify(step);
        Ok(())
    }

    fn resolve(
        &mut self,
        scope: &mut LifecycleScope<'_>,
        next: Option<&Props>,
    ) -> Result<(), ReconcileError> {
        let next_props = match next {
            Some(props) => {
                let merged = props.merged_over(&C::default_props());
                self.check_props(scope, &merged)?;
                merged
            }
            None => self.props.clone(),
        };
        let mut next_state = self.state.clone();
        for change in self.take_queued() {
            change(&mut next_state);
        }
        if let Some(derived) = C::derive_state(&next_props, &next_state) {
            next_state = derived;
        }

        self.set_phase(LifecyclePhase::ShouldUpdate);
        if !self
            .component
            .should_update(&self.props, &self.state, &next_props, &next_state)
        {
            self.props = next_props;
            self.state = next_state;
            self.set_phase(LifecyclePhase::Idle);
            return Ok(());
        }

        self.set_phase(LifecyclePhase::WillUpdate);
        self.component.will_update(&next_props, &next_state);

        let prev_props = mem::replace(&mut self.props, next_props);
        let prev_state = mem::replace(&mut self.state, next_state);
        self.previous = Some((prev_props, prev_state));
        self.render_child(scope, LifecycleStep::DidUpdate)
    }

    /// Ends a `did_mount`/`did_update` phase, re-rendering if the hook
    /// queued changes.
    fn finish(&mut self, scope: &mut LifecycleScope<'_>) -> Result<(), ReconcileError> {
        if !self.has_queued() {
            self.set_phase(LifecyclePhase::Idle);
            return Ok(());
        }
        self.cascade += 1;
        let limit = scope.config().max_pending_updates();
        if self.cascade > limit {
            self.take_queued();
            self.set_phase(LifecyclePhase::Idle);
            return Err(LifecycleError::TooManyUpdates {
                component: C::name(),
                limit,
            }
            .into());
        }
        self.resolve(scope, None)
    }
}

impl<C: Component> ComponentInstance for ComponentHost<C> {
    fn mount(&mut self, scope: &mut LifecycleScope<'_>) -> Result<(), ReconcileError> {
        self.check_props(scope, &self.props)?;
        self.shared.borrow_mut().requester = Some(scope.requester());
        let queued = self.take_queued();
        if !queued.is_empty() {
            for change in queued {
                change(&mut self.state);
            }
            if let Some(derived) = C::derive_state(&self.props, &self.state) {
                self.state = derived;
            }
        }
        self.render_child(scope, LifecycleStep::DidMount)
    }

    fn update(
        &mut self,
        scope: &mut LifecycleScope<'_>,
        next: Option<&Props>,
    ) -> Result<(), ReconcileError> {
        self.cascade = 0;
        if next.is_none() && !self.has_queued() {
            return Ok(());
        }
        self.resolve(scope, next)
    }

    fn resume(
        &mut self,
        scope: &mut LifecycleScope<'_>,
        step: LifecycleStep,
    ) -> Result<(), ReconcileError> {
        match step {
            LifecycleStep::DidMount => {
                self.set_phase(LifecyclePhase::DidMount);
                self.component.did_mount(&self.props, &self.state);
            }
            LifecycleStep::DidUpdate => {
                self.set_phase(LifecyclePhase::DidUpdate);
                if let Some((prev_props, prev_state)) = self.previous.take() {
                    self.component.did_update(&prev_props, &prev_state);
                }
            }
        }
        self.finish(scope)
    }

    fn will_unmount(&mut self) {
        self.set_phase(LifecyclePhase::WillUnmount);
        self.component.will_unmount();
    }

    fn detach(&mut self) {
        let mut shared = self.shared.borrow_mut();
        shared.phase = LifecyclePhase::Unmounted;
        shared.requester = None;
        shared.queued.clear();
    }

    fn context(&self) -> &Context {
        &self.context
    }
}

/// [`ComponentDefinition`] for a [`Component`] type.
pub struct StatefulDefinition<C>(PhantomData<fn() -> C>);

impl<C: Component> StatefulDefinition<C> {
    pub fn new() -> Self {
        StatefulDefinition(PhantomData)
    }
}

impl<C: Component> Default for StatefulDefinition<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Component> ComponentDefinition for StatefulDefinition<C> {
    fn name(&self) -> &str {
        C::name()
    }

    fn identity(&self) -> Option<TypeId> {
        Some(TypeId::of::<C>())
    }

    fn construct(
        &self,
        props: &Props,
        context: &Context,
    ) -> Result<Box<dyn ComponentInstance>, ReconcileError> {
        let props = props.merged_over(&C::default_props());
        let shared = Rc::new(RefCell::new(Shared {
            phase: LifecyclePhase::Init,
            queued: Vec::new(),
            requester: None,
        }));
        let mut cx = InitContext {
            context: context.clone(),
            shared: Rc::clone(&shared),
        };
        let component = C::init(&props, &mut cx);
        let initial = C::initial_state(&props);
        let state = C::derive_state(&props, &initial).unwrap_or(initial);
        log::trace!("constructed {}", C::name());
        Ok(Box::new(ComponentHost {
            component,
            props,
            state,
            shared,
            context: context.clone(),
            child_context: cx.context,
            previous: None,
            cascade: 0,
        }))
    }
}
