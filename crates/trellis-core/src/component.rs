//! Capability interface between the reconciler and stateful components.
//!
//! The reconciler only ever sees `dyn ComponentDefinition` and
//! `dyn ComponentInstance`. Instances never touch the handle tree directly;
//! they record what they want done on a [`LifecycleScope`] and the
//! reconciler schedules it.

use std::any::TypeId;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::ReconcilerConfig;
use crate::context::Context;
use crate::element::Renderable;
use crate::error::ReconcileError;
use crate::handle::HandleId;
use crate::props::Props;

pub trait ComponentDefinition: 'static {
    fn name(&self) -> &str;

    /// Identity shared by every instance of this definition.
    ///
    /// Two definitions reconcile in place when they are the same allocation
    /// or both report the same `Some` identity. `None`, the default, makes
    /// each definition value distinct, so two values of one Rust type still
    /// remount each other.
    fn identity(&self) -> Option<TypeId> {
        None
    }

    fn construct(
        &self,
        props: &Props,
        context: &Context,
    ) -> Result<Box<dyn ComponentInstance>, ReconcileError>;
}

/// Shared reference to a component definition.
#[derive(Clone)]
pub struct ComponentDef(Rc<dyn ComponentDefinition>);

impl ComponentDef {
    pub fn new(definition: impl ComponentDefinition) -> Self {
        ComponentDef(Rc::new(definition))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn same_definition(&self, other: &ComponentDef) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        matches!(
            (self.0.identity(), other.0.identity()),
            (Some(a), Some(b)) if a == b
        )
    }

    pub fn construct(
        &self,
        props: &Props,
        context: &Context,
    ) -> Result<Box<dyn ComponentInstance>, ReconcileError> {
        self.0.construct(props, context)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentDef({})", self.name())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleStep {
    DidMount,
    DidUpdate,
}

/// A live component, owned by its stateful handle.
pub trait ComponentInstance {
    /// Renders for the first time and reifies the single child.
    fn mount(&mut self, scope: &mut LifecycleScope<'_>) -> Result<(), ReconcileError>;

    /// `next` carries new props from a parent re-render; `None` means the
    /// component asked for the update itself.
    fn update(
        &mut self,
        scope: &mut LifecycleScope<'_>,
        next: Option<&Props>,
    ) -> Result<(), ReconcileError>;

    /// Called once the children scheduled before `notify(step)` are done.
    fn resume(
        &mut self,
        _scope: &mut LifecycleScope<'_>,
        _step: LifecycleStep,
    ) -> Result<(), ReconcileError> {
        Ok(())
    }

    fn will_unmount(&mut self) {}

    fn unmount(&mut self, scope: &mut LifecycleScope<'_>) {
        scope.unmount_child();
    }

    /// Severs the back-reference to the handle. No update may be requested
    /// afterwards.
    fn detach(&mut self) {}

    /// Context the instance was constructed with.
    fn context(&self) -> &Context;
}

pub(crate) trait UpdateSink {
    fn request_update(&self, handle: HandleId) -> Result<(), ReconcileError>;
}

/// Asks the reconciler to update one stateful handle.
#[derive(Clone)]
pub struct UpdateRequester {
    sink: Weak<dyn UpdateSink>,
    handle: HandleId,
}

impl UpdateRequester {
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Runs the update now, or after the walk in progress. A requester that
    /// outlived its reconciler does nothing.
    pub fn request(&self) -> Result<(), ReconcileError> {
        match self.sink.upgrade() {
            Some(sink) => sink.request_update(self.handle),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for UpdateRequester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateRequester")
            .field("handle", &self.handle)
            .finish()
    }
}

pub(crate) enum ScopeOp {
    RenderChild {
        renderable: Renderable,
        context: Context,
    },
    UnmountChild,
    Notify(LifecycleStep),
}

/// Records the operations an instance asks for during one lifecycle call.
pub struct LifecycleScope<'a> {
    handle: HandleId,
    config: &'a ReconcilerConfig,
    sink: Weak<dyn UpdateSink>,
    ops: Vec<ScopeOp>,
}

impl<'a> LifecycleScope<'a> {
    pub(crate) fn new(
        handle: HandleId,
        config: &'a ReconcilerConfig,
        sink: Weak<dyn UpdateSink>,
    ) -> Self {
        Self {
            handle,
            config,
            sink,
            ops: Vec::new(),
        }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn config(&self) -> &ReconcilerConfig {
        self.config
    }

    /// Reconciles the single child toward `renderable`, mounting it under
    /// `context` if there is no child yet.
    pub fn render_child(&mut self, renderable: Renderable, context: Context) {
        self.ops.push(ScopeOp::RenderChild {
            renderable,
            context,
        });
    }

    pub fn unmount_child(&mut self) {
        self.ops.push(ScopeOp::UnmountChild);
    }

    /// Schedules `resume(step)` after everything recorded so far.
    pub fn notify(&mut self, step: LifecycleStep) {
        self.ops.push(ScopeOp::Notify(step));
    }

    pub fn requester(&self) -> UpdateRequester {
        UpdateRequester {
            sink: self.sink.clone(),
            handle: self.handle,
        }
    }

    pub(crate) fn into_ops(self) -> Vec<ScopeOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ElementKind, Renderable};
    use crate::error::ComponentError;
    use crate::lifecycle::{Component, InitContext};

    struct Fixed(&'static str);

    impl ComponentDefinition for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn construct(
            &self,
            _props: &Props,
            _context: &Context,
        ) -> Result<Box<dyn ComponentInstance>, ReconcileError> {
            Err(ReconcileError::InvalidProps {
                component: Rc::from(self.0),
                message: "never constructed here".into(),
            })
        }
    }

    struct Blank;

    impl Component for Blank {
        type State = ();

        fn init(_props: &Props, _cx: &mut InitContext<Self>) -> Self {
            Blank
        }

        fn initial_state(_props: &Props) {}

        fn render(&self, _props: &Props, _state: &()) -> Result<Renderable, ComponentError> {
            Ok(Renderable::Empty)
        }
    }

    fn definition(element: &Element) -> &ComponentDef {
        match element.kind() {
            ElementKind::Stateful(definition) => definition,
            other => panic!("expected a stateful element, got {other}"),
        }
    }

    #[test]
    fn separate_definition_values_are_distinct() {
        let a = ComponentDef::new(Fixed("Panel"));
        let b = ComponentDef::new(Fixed("Panel"));
        assert!(a.same_definition(&a.clone()));
        assert!(!a.same_definition(&b));
    }

    #[test]
    fn stateful_definitions_share_their_type_identity() {
        let a = Element::stateful::<Blank>(Props::new());
        let b = Element::stateful::<Blank>(Props::new());
        assert!(definition(&a).same_definition(definition(&b)));
        assert!(a.kind().same_component(b.kind()));
    }
}
