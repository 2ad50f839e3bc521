//! The reconciler: mounts, reconciles and unmounts element trees against a
//! [`HostPlatform`].
//!
//! Every tree walk is a drain of a [`WorkStack`] of `Work` items. Items
//! never hold a borrow of the handle arena or the host while user code
//! runs, so callbacks, refs and component hooks may freely call back into
//! the reconciler. Update requests, `reconcile` calls and `unmount` calls
//! that arrive while a walk is in flight are queued and run, in request
//! order, once the outermost walk is done.

mod diff;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::component::{ComponentInstance, LifecycleScope, LifecycleStep, ScopeOp, UpdateSink};
use crate::config::ReconcilerConfig;
use crate::context::Context;
use crate::element::{ChildKey, Children, Element, ElementKind, Renderable};
use crate::error::ReconcileError;
use crate::events::{EventManager, EventStatus};
use crate::handle::{HandleArena, HandleId, HandleKind, HandleRecord, HandleSnapshot};
use crate::host::{HostNodeId, HostPlatform};
use crate::props::{PropKey, PropValue, Ref};
use crate::stack::{DrainReport, WorkStack};

use self::diff::PropWrite;

/// Where a new handle goes.
#[derive(Clone, Debug)]
struct Placement {
    host_parent: Option<HostNodeId>,
    key: Option<ChildKey>,
    context: Context,
    owner: Option<HandleId>,
    depth: usize,
}

/// One unit of reconciliation work.
///
/// `tracked` marks the position the public operation was called on; the
/// handle that ends up there is what the operation returns.
#[derive(Debug)]
enum Work {
    Mount {
        renderable: Renderable,
        placement: Placement,
        tracked: bool,
    },
    Reconcile {
        handle: HandleId,
        next: Renderable,
        tracked: bool,
    },
    Unmount {
        handle: HandleId,
    },
    UpdateComponent {
        handle: HandleId,
    },
    /// Reconciles the single child of a function or stateful handle.
    RenderInto {
        owner: HandleId,
        renderable: Renderable,
        context: Context,
    },
    ApplyProps {
        handle: HandleId,
        writes: Vec<PropWrite>,
    },
    AttachRef {
        handle: HandleId,
        reference: Ref,
    },
    DetachRef {
        reference: Ref,
    },
    SetParent {
        handle: HandleId,
        parent: HostNodeId,
    },
    ResumeEvents {
        handle: HandleId,
    },
    Lifecycle {
        handle: HandleId,
        step: LifecycleStep,
    },
    Destroy {
        handle: HandleId,
    },
    Release {
        handle: HandleId,
    },
}

struct WalkGuard<'a> {
    walking: &'a Cell<bool>,
}

impl Drop for WalkGuard<'_> {
    fn drop(&mut self) {
        self.walking.set(false);
    }
}

struct ReconcilerInner<H: HostPlatform + 'static> {
    weak_self: Weak<ReconcilerInner<H>>,
    host: RefCell<H>,
    handles: RefCell<HandleArena>,
    events: EventManager,
    config: ReconcilerConfig,
    walking: Cell<bool>,
    deferred: RefCell<VecDeque<Work>>,
}

/// Owns the handle tree and the event subscriptions for one host.
///
/// Cloning is cheap; clones drive the same tree.
pub struct Reconciler<H: HostPlatform + 'static> {
    inner: Rc<ReconcilerInner<H>>,
}

impl<H: HostPlatform + 'static> Clone for Reconciler<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: HostPlatform + 'static> fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("handles", &self.handle_count())
            .field("subscriptions", &self.subscription_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<H: HostPlatform + 'static> Reconciler<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, ReconcilerConfig::default())
    }

    pub fn with_config(host: H, config: ReconcilerConfig) -> Self {
        let inner = Rc::new_cyclic(|weak_self| ReconcilerInner {
            weak_self: weak_self.clone(),
            host: RefCell::new(host),
            handles: RefCell::new(HandleArena::default()),
            events: EventManager::new(),
            config,
            walking: Cell::new(false),
            deferred: RefCell::new(VecDeque::new()),
        });
        Self { inner }
    }

    /// Mounts `element` under `host_parent`, returning the root handle or
    /// `None` when the element renders nothing.
    ///
    /// On failure the partially mounted tree is unmounted again before the
    /// error is returned.
    pub fn mount(
        &self,
        element: impl Into<Renderable>,
        host_parent: Option<HostNodeId>,
        key: Option<ChildKey>,
    ) -> Result<Option<HandleId>, ReconcileError> {
        self.mount_with_context(element, host_parent, key, Context::new())
    }

    pub fn mount_with_context(
        &self,
        element: impl Into<Renderable>,
        host_parent: Option<HostNodeId>,
        key: Option<ChildKey>,
        context: Context,
    ) -> Result<Option<HandleId>, ReconcileError> {
        let placement = Placement {
            host_parent,
            key,
            context,
            owner: None,
            depth: 0,
        };
        let (root, report) = self.inner.walk(vec![Work::Mount {
            renderable: element.into(),
            placement,
            tracked: true,
        }]);
        match report.into_result() {
            Ok(()) => Ok(root),
            Err(err) => {
                if let Some(root) = root {
                    log::debug!("mount failed, tearing down partial root {root}");
                    let (_, cleanup) = self.inner.walk(vec![Work::Unmount { handle: root }]);
                    for leftover in cleanup.errors {
                        log::warn!("error while tearing down failed mount: {leftover}");
                    }
                }
                Err(err)
            }
        }
    }

    /// Moves `handle` toward `next`, returning the handle now at its
    /// position: the same one, a replacement, or `None` if it was unmounted.
    ///
    /// Called from a ref, callback or hook while a walk is running, the
    /// reconcile is queued behind that walk and `Ok(Some(handle))` is
    /// returned; the caller sees the outcome once the outer call returns.
    pub fn reconcile(
        &self,
        handle: HandleId,
        next: impl Into<Renderable>,
    ) -> Result<Option<HandleId>, ReconcileError> {
        if !self.is_mounted(handle) {
            return Err(ReconcileError::UnknownHandle(handle));
        }
        let next = next.into();
        if self.inner.walking.get() {
            self.inner.defer(Work::Reconcile {
                handle,
                next,
                tracked: false,
            });
            return Ok(Some(handle));
        }
        let (root, report) = self.inner.walk(vec![Work::Reconcile {
            handle,
            next,
            tracked: true,
        }]);
        report.into_result().map(|()| root)
    }

    /// Unmounts `handle` and everything below it. Queued like
    /// [`Reconciler::reconcile`] when a walk is already running.
    pub fn unmount(&self, handle: HandleId) -> Result<(), ReconcileError> {
        if !self.is_mounted(handle) {
            return Err(ReconcileError::UnknownHandle(handle));
        }
        if self.inner.walking.get() {
            self.inner.defer(Work::Unmount { handle });
            return Ok(());
        }
        let (_, report) = self.inner.walk(vec![Work::Unmount { handle }]);
        report.into_result()
    }

    pub fn handle(&self, id: HandleId) -> Option<HandleSnapshot> {
        let handles = self.inner.handles.borrow();
        handles
            .get(id)
            .filter(|record| !record.unmounted)
            .map(|record| record.snapshot(id))
    }

    pub fn is_mounted(&self, id: HandleId) -> bool {
        self.inner
            .handles
            .borrow()
            .get(id)
            .is_some_and(|record| !record.unmounted)
    }

    /// Host node of a host handle.
    pub fn host_node(&self, id: HandleId) -> Option<HostNodeId> {
        self.inner.handles.borrow().get(id)?.host_node()
    }

    /// First host node at or below `id`, following single-child kinds.
    pub fn resolve_host_node(&self, id: HandleId) -> Option<HostNodeId> {
        let handles = self.inner.handles.borrow();
        let mut current = id;
        loop {
            let record = handles.get(current)?;
            match &record.kind {
                HandleKind::Host { node, .. } => return Some(*node),
                HandleKind::Function { child } | HandleKind::Stateful { child, .. } => {
                    current = (*child)?;
                }
                HandleKind::Portal { .. } | HandleKind::Fragment { .. } => return None,
            }
        }
    }

    pub fn children(&self, id: HandleId) -> Vec<HandleId> {
        self.inner
            .handles
            .borrow()
            .get(id)
            .map(HandleRecord::child_ids)
            .unwrap_or_default()
    }

    /// Child of a keyed handle, or the single child of a function or
    /// stateful handle when `key` is `None`.
    pub fn child(&self, id: HandleId, key: Option<&ChildKey>) -> Option<HandleId> {
        let handles = self.inner.handles.borrow();
        match (&handles.get(id)?.kind, key) {
            (
                HandleKind::Host { children, .. }
                | HandleKind::Portal { children, .. }
                | HandleKind::Fragment { children },
                Some(key),
            ) => children.get(key).copied(),
            (HandleKind::Function { child } | HandleKind::Stateful { child, .. }, None) => *child,
            _ => None,
        }
    }

    pub fn handle_count(&self) -> usize {
        self.inner.handles.borrow().len()
    }

    /// Live event and change subscriptions across all nodes.
    pub fn subscription_count(&self) -> usize {
        self.inner.events.subscription_count()
    }

    pub fn event_status(&self, node: HostNodeId) -> EventStatus {
        self.inner.events.status(node)
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.inner.host.borrow())
    }

    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.host.borrow_mut())
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.inner.config
    }
}

impl<H: HostPlatform + 'static> UpdateSink for ReconcilerInner<H> {
    fn request_update(&self, handle: HandleId) -> Result<(), ReconcileError> {
        if self.walking.get() {
            self.defer(Work::UpdateComponent { handle });
            return Ok(());
        }
        let (_, report) = self.walk(vec![Work::UpdateComponent { handle }]);
        report.into_result()
    }
}

impl<H: HostPlatform + 'static> ReconcilerInner<H> {
    /// Queues `work` to run after the outermost walk.
    fn defer(&self, work: Work) {
        log::trace!("deferring {work:?}");
        self.deferred.borrow_mut().push_back(work);
    }

    fn walk(&self, work: Vec<Work>) -> (Option<HandleId>, DrainReport<ReconcileError>) {
        let guard = if self.walking.replace(true) {
            None
        } else {
            Some(WalkGuard {
                walking: &self.walking,
            })
        };

        let mut root = None;
        let mut stack = WorkStack::new();
        stack.extend_in_order(work);
        let mut report = stack.drain(|stack, item| self.execute(stack, item, &mut root));

        if guard.is_some() {
            loop {
                let next = self.deferred.borrow_mut().pop_front();
                let Some(work) = next else {
                    break;
                };
                let mut stack = WorkStack::new();
                stack.push(work);
                report.absorb(stack.drain(|stack, item| self.execute(stack, item, &mut None)));
            }
        }
        drop(guard);
        (root, report)
    }

    fn execute(
        &self,
        stack: &mut WorkStack<Work>,
        item: Work,
        root: &mut Option<HandleId>,
    ) -> Result<(), ReconcileError> {
        log::trace!("{item:?}");
        match item {
            Work::Mount {
                renderable,
                placement,
                tracked,
            } => {
                let mounted = self.mount_item(stack, &renderable, placement)?;
                if tracked {
                    *root = mounted;
                }
                Ok(())
            }
            Work::Reconcile {
                handle,
                next,
                tracked,
            } => self.reconcile_item(stack, handle, next, tracked.then_some(root)),
            Work::Unmount { handle } => {
                self.unmount_item(stack, handle);
                Ok(())
            }
            Work::UpdateComponent { handle } => self.run_instance(stack, handle, |instance, scope| {
                instance.update(scope, None)
            }),
            Work::RenderInto {
                owner,
                renderable,
                context,
            } => {
                self.render_into(stack, owner, renderable, context);
                Ok(())
            }
            Work::ApplyProps { handle, writes } => self.apply_props(handle, writes),
            Work::AttachRef { handle, reference } => {
                if let Some(node) = self.live_host_node(handle) {
                    reference.apply(Some(node));
                }
                Ok(())
            }
            Work::DetachRef { reference } => {
                reference.apply(None);
                Ok(())
            }
            Work::SetParent { handle, parent } => match self.live_host_node(handle) {
                Some(node) => Ok(self.host.borrow_mut().set_parent(node, Some(parent))?),
                None => Ok(()),
            },
            Work::ResumeEvents { handle } => {
                if let Some(node) = self.live_host_node(handle) {
                    self.events.resume(node);
                }
                Ok(())
            }
            Work::Lifecycle { handle, step } => {
                self.run_instance(stack, handle, |instance, scope| instance.resume(scope, step))
            }
            Work::Destroy { handle } => self.destroy(handle),
            Work::Release { handle } => {
                self.release(handle);
                Ok(())
            }
        }
    }

    fn live_host_node(&self, handle: HandleId) -> Option<HostNodeId> {
        self.handles
            .borrow()
            .get(handle)
            .filter(|record| !record.unmounted)
            .and_then(HandleRecord::host_node)
    }

    fn register(&self, element: &Element, placement: Placement, kind: HandleKind) -> HandleId {
        let mut handles = self.handles.borrow_mut();
        let id = handles.insert(HandleRecord {
            element: element.clone(),
            key: placement.key.clone(),
            host_parent: placement.host_parent,
            context: placement.context,
            owner: placement.owner,
            depth: placement.depth,
            unmounted: false,
            kind,
        });
        if let Some(owner) = placement.owner.and_then(|owner| handles.get_mut(owner)) {
            owner.attach_child(placement.key.as_ref(), id);
        }
        id
    }

    fn child_placement(&self, owner: HandleId, key: Option<ChildKey>) -> Option<Placement> {
        let handles = self.handles.borrow();
        let record = handles.get(owner)?;
        Some(Placement {
            host_parent: record.child_host_parent(),
            key,
            context: record.context.clone(),
            owner: Some(owner),
            depth: record.depth + 1,
        })
    }

    /// Mount work for every element among `children`.
    fn mount_children(&self, owner: HandleId, children: Option<&Children>) -> Vec<Work> {
        let Some(children) = children else {
            return Vec::new();
        };
        children
            .iter()
            .filter(|(_, child)| !child.is_nothing())
            .filter_map(|(key, child)| {
                let placement = self.child_placement(owner, Some(key.clone()))?;
                Some(Work::Mount {
                    renderable: child.clone(),
                    placement,
                    tracked: false,
                })
            })
            .collect()
    }

    /// Reconciles existing keyed children toward `next` and mounts new keys.
    fn diff_children(
        &self,
        owner: HandleId,
        existing: &IndexMap<ChildKey, HandleId>,
        next: Option<&Children>,
    ) -> Vec<Work> {
        let mut work: Vec<Work> = existing
            .iter()
            .map(|(key, &handle)| Work::Reconcile {
                handle,
                next: next
                    .and_then(|children| children.get(key))
                    .cloned()
                    .unwrap_or(Renderable::Empty),
                tracked: false,
            })
            .collect();
        if let Some(next) = next {
            for (key, child) in next.iter() {
                if existing.contains_key(key) || child.is_nothing() {
                    continue;
                }
                if let Some(placement) = self.child_placement(owner, Some(key.clone())) {
                    work.push(Work::Mount {
                        renderable: child.clone(),
                        placement,
                        tracked: false,
                    });
                }
            }
        }
        work
    }

    fn mount_item(
        &self,
        stack: &mut WorkStack<Work>,
        renderable: &Renderable,
        placement: Placement,
    ) -> Result<Option<HandleId>, ReconcileError> {
        let Some(element) = renderable.element() else {
            return Ok(None);
        };
        let id = match element.kind() {
            ElementKind::Host(class) => {
                let writes = diff::initial_writes(element.props(), class, element.location())?;
                let node = self.host.borrow_mut().create(class)?;
                let host_parent = placement.host_parent;
                let id = self.register(
                    element,
                    placement,
                    HandleKind::Host {
                        node,
                        children: IndexMap::new(),
                    },
                );
                log::debug!("mounted `{class}` as node {node} (handle {id})");

                let mut work = vec![Work::ApplyProps { handle: id, writes }];
                work.extend(self.mount_children(id, element.props().children()));
                if let Some(parent) = host_parent {
                    work.push(Work::SetParent { handle: id, parent });
                }
                if let Some(reference) = element.props().reference() {
                    work.push(Work::AttachRef {
                        handle: id,
                        reference: reference.clone(),
                    });
                }
                work.push(Work::ResumeEvents { handle: id });
                stack.extend_in_order(work);
                id
            }
            ElementKind::Function(component) => {
                let rendered =
                    component
                        .render(element.props())
                        .map_err(|source| ReconcileError::Render {
                            component: component.name_rc(),
                            source,
                        })?;
                let context = placement.context.clone();
                let id = self.register(element, placement, HandleKind::Function { child: None });
                log::debug!("mounted function `{}` (handle {id})", component.name());
                stack.push(Work::RenderInto {
                    owner: id,
                    renderable: rendered,
                    context,
                });
                id
            }
            ElementKind::Stateful(definition) => {
                let instance = definition.construct(element.props(), &placement.context)?;
                let id = self.register(
                    element,
                    placement,
                    HandleKind::Stateful {
                        instance: Some(instance),
                        child: None,
                    },
                );
                log::debug!("mounted component `{}` (handle {id})", definition.name());
                if let Err(err) = self.run_instance(stack, id, |instance, scope| instance.mount(scope)) {
                    self.discard(id);
                    return Err(err);
                }
                id
            }
            ElementKind::Portal => {
                let target = element
                    .portal_target()
                    .ok_or(ReconcileError::PortalTarget {
                        location: element.location(),
                    })?;
                self.host.borrow().class_of(target)?;
                let id = self.register(
                    element,
                    placement,
                    HandleKind::Portal {
                        target,
                        children: IndexMap::new(),
                    },
                );
                log::debug!("mounted portal into node {target} (handle {id})");
                stack.extend_in_order(self.mount_children(id, element.props().children()));
                id
            }
            ElementKind::Fragment => {
                let id = self.register(
                    element,
                    placement,
                    HandleKind::Fragment {
                        children: IndexMap::new(),
                    },
                );
                stack.extend_in_order(self.mount_children(id, element.props().children()));
                id
            }
        };
        Ok(Some(id))
    }

    fn reconcile_item(
        &self,
        stack: &mut WorkStack<Work>,
        handle: HandleId,
        next: Renderable,
        root: Option<&mut Option<HandleId>>,
    ) -> Result<(), ReconcileError> {
        let current = {
            let handles = self.handles.borrow();
            match handles.get(handle) {
                Some(record) if !record.unmounted => record.element.clone(),
                _ => return Ok(()),
            }
        };
        let Some(element) = next.element() else {
            if let Some(root) = root {
                *root = None;
            }
            stack.push(Work::Unmount { handle });
            return Ok(());
        };
        if current.ptr_eq(element) {
            if let Some(root) = root {
                *root = Some(handle);
            }
            return Ok(());
        }

        let retarget = matches!(current.kind(), ElementKind::Portal)
            && current.portal_target() != element.portal_target();
        if retarget || !current.kind().same_component(element.kind()) {
            self.replace(stack, handle, &current, next.clone(), root.is_some());
            if let Some(root) = root {
                *root = None;
            }
            return Ok(());
        }
        if let Some(root) = root {
            *root = Some(handle);
        }

        match element.kind() {
            ElementKind::Host(class) => self.update_host(stack, handle, &current, element, class),
            ElementKind::Function(component) => {
                let rendered =
                    component
                        .render(element.props())
                        .map_err(|source| ReconcileError::Render {
                            component: component.name_rc(),
                            source,
                        })?;
                let context = self.commit_element(handle, element);
                stack.push(Work::RenderInto {
                    owner: handle,
                    renderable: rendered,
                    context,
                });
                Ok(())
            }
            ElementKind::Stateful(_) => {
                self.commit_element(handle, element);
                let props = element.props().clone();
                self.run_instance(stack, handle, |instance, scope| {
                    instance.update(scope, Some(&props))
                })
            }
            ElementKind::Portal | ElementKind::Fragment => {
                self.commit_element(handle, element);
                let existing = self.keyed_children(handle);
                stack.extend_in_order(self.diff_children(
                    handle,
                    &existing,
                    element.props().children(),
                ));
                Ok(())
            }
        }
    }

    /// Stores `element` on the record, returning the handle's context.
    fn commit_element(&self, handle: HandleId, element: &Element) -> Context {
        let mut handles = self.handles.borrow_mut();
        match handles.get_mut(handle) {
            Some(record) => {
                record.element = element.clone();
                record.context.clone()
            }
            None => Context::new(),
        }
    }

    fn keyed_children(&self, handle: HandleId) -> IndexMap<ChildKey, HandleId> {
        let handles = self.handles.borrow();
        match handles.get(handle).map(|record| &record.kind) {
            Some(
                HandleKind::Host { children, .. }
                | HandleKind::Portal { children, .. }
                | HandleKind::Fragment { children },
            ) => children.clone(),
            _ => IndexMap::new(),
        }
    }

    fn replace(
        &self,
        stack: &mut WorkStack<Work>,
        handle: HandleId,
        current: &Element,
        next: Renderable,
        tracked: bool,
    ) {
        let placement = {
            let handles = self.handles.borrow();
            let Some(record) = handles.get(handle) else {
                return;
            };
            Placement {
                host_parent: record.host_parent,
                key: record.key.clone(),
                context: record.inherited_context(),
                owner: record.owner,
                depth: record.depth,
            }
        };
        log::debug!(
            "replacing {} with {} at handle {handle}",
            current.kind(),
            next.element().map_or_else(|| "nothing".to_string(), |e| e.kind().to_string())
        );
        stack.extend_in_order([
            Work::Unmount { handle },
            Work::Mount {
                renderable: next,
                placement,
                tracked,
            },
        ]);
    }

    fn update_host(
        &self,
        stack: &mut WorkStack<Work>,
        handle: HandleId,
        current: &Element,
        element: &Element,
        class: &Rc<str>,
    ) -> Result<(), ReconcileError> {
        let writes = diff::prop_writes(current.props(), element.props(), class, element.location())?;
        let Some(node) = self.live_host_node(handle) else {
            return Ok(());
        };
        self.events.suspend(node);
        self.commit_element(handle, element);

        let mut work = Vec::new();
        let (old_ref, new_ref) = (current.props().reference(), element.props().reference());
        if !Ref::same(old_ref, new_ref) {
            if let Some(reference) = old_ref {
                work.push(Work::DetachRef {
                    reference: reference.clone(),
                });
            }
            if let Some(reference) = new_ref {
                work.push(Work::AttachRef {
                    handle,
                    reference: reference.clone(),
                });
            }
        }
        work.push(Work::ApplyProps { handle, writes });
        let (old_children, new_children) = (current.props().children(), element.props().children());
        let unchanged = matches!((old_children, new_children), (Some(a), Some(b)) if a.ptr_eq(b));
        if !unchanged {
            let existing = self.keyed_children(handle);
            work.extend(self.diff_children(handle, &existing, new_children));
        }
        work.push(Work::ResumeEvents { handle });
        stack.extend_in_order(work);
        Ok(())
    }

    fn render_into(
        &self,
        stack: &mut WorkStack<Work>,
        owner: HandleId,
        renderable: Renderable,
        context: Context,
    ) {
        let (child, placement) = {
            let handles = self.handles.borrow();
            let Some(record) = handles.get(owner).filter(|record| !record.unmounted) else {
                return;
            };
            let child = match &record.kind {
                HandleKind::Function { child } | HandleKind::Stateful { child, .. } => *child,
                _ => None,
            };
            let placement = Placement {
                host_parent: record.host_parent,
                key: record.key.clone(),
                context,
                owner: Some(owner),
                depth: record.depth + 1,
            };
            (child, placement)
        };
        match child {
            Some(child) => stack.push(Work::Reconcile {
                handle: child,
                next: renderable,
                tracked: false,
            }),
            None if !renderable.is_nothing() => stack.push(Work::Mount {
                renderable,
                placement,
                tracked: false,
            }),
            None => {}
        }
    }

    /// Runs `f` on the handle's instance with the arena unborrowed, then
    /// schedules what it recorded.
    fn run_instance<F>(
        &self,
        stack: &mut WorkStack<Work>,
        handle: HandleId,
        f: F,
    ) -> Result<(), ReconcileError>
    where
        F: FnOnce(&mut dyn ComponentInstance, &mut LifecycleScope<'_>) -> Result<(), ReconcileError>,
    {
        let Some(mut instance) = self.take_instance(handle) else {
            return Ok(());
        };
        let sink: Weak<dyn UpdateSink> = self.weak_self.clone();
        let mut scope = LifecycleScope::new(handle, &self.config, sink);
        let result = f(instance.as_mut(), &mut scope);
        self.restore_instance(handle, instance);
        result?;
        self.schedule(stack, handle, scope.into_ops(), None);
        Ok(())
    }

    fn take_instance(&self, handle: HandleId) -> Option<Box<dyn ComponentInstance>> {
        let mut handles = self.handles.borrow_mut();
        match &mut handles.get_mut(handle)?.kind {
            HandleKind::Stateful { instance, .. } => instance.take(),
            _ => None,
        }
    }

    fn restore_instance(&self, handle: HandleId, mut instance: Box<dyn ComponentInstance>) {
        {
            let mut handles = self.handles.borrow_mut();
            if let Some(HandleKind::Stateful { instance: slot, .. }) =
                handles.get_mut(handle).map(|record| &mut record.kind)
            {
                *slot = Some(instance);
                return;
            }
        }
        // Released while the instance was running.
        instance.detach();
    }

    fn schedule(
        &self,
        stack: &mut WorkStack<Work>,
        handle: HandleId,
        ops: Vec<ScopeOp>,
        then: Option<Work>,
    ) {
        let child = self.child_of(handle);
        let mut work: Vec<Work> = ops
            .into_iter()
            .filter_map(|op| match op {
                ScopeOp::RenderChild {
                    renderable,
                    context,
                } => Some(Work::RenderInto {
                    owner: handle,
                    renderable,
                    context,
                }),
                ScopeOp::UnmountChild => child.map(|child| Work::Unmount { handle: child }),
                ScopeOp::Notify(step) => Some(Work::Lifecycle { handle, step }),
            })
            .collect();
        work.extend(then);
        stack.extend_in_order(work);
    }

    fn child_of(&self, handle: HandleId) -> Option<HandleId> {
        let handles = self.handles.borrow();
        match &handles.get(handle)?.kind {
            HandleKind::Function { child } | HandleKind::Stateful { child, .. } => *child,
            _ => None,
        }
    }

    fn unmount_item(&self, stack: &mut WorkStack<Work>, handle: HandleId) {
        let plan = {
            let mut handles = self.handles.borrow_mut();
            let Some(record) = handles.get_mut(handle).filter(|record| !record.unmounted) else {
                return;
            };
            record.unmounted = true;
            let (owner, key) = (record.owner, record.key.clone());
            let reference = record.element.props().reference().cloned();
            let children = record.child_ids();
            let stateful = matches!(record.kind, HandleKind::Stateful { .. });
            let host = record.host_node().is_some();
            log::debug!("unmounting {} (handle {handle})", record.element.kind());
            if let Some(owner) = owner.and_then(|owner| handles.get_mut(owner)) {
                owner.detach_child(key.as_ref(), handle);
            }
            (reference, children, stateful, host)
        };
        let (reference, children, stateful, host) = plan;

        if stateful {
            if let Some(mut instance) = self.take_instance(handle) {
                instance.will_unmount();
                let sink: Weak<dyn UpdateSink> = self.weak_self.clone();
                let mut scope = LifecycleScope::new(handle, &self.config, sink);
                instance.unmount(&mut scope);
                self.restore_instance(handle, instance);
                let ops = scope
                    .into_ops()
                    .into_iter()
                    .filter(|op| matches!(op, ScopeOp::UnmountChild))
                    .collect();
                self.schedule(stack, handle, ops, Some(Work::Release { handle }));
                return;
            }
        }

        let mut work = Vec::new();
        if host {
            if let Some(reference) = reference {
                work.push(Work::DetachRef { reference });
            }
        }
        work.extend(children.into_iter().map(|child| Work::Unmount { handle: child }));
        work.push(if host {
            Work::Destroy { handle }
        } else {
            Work::Release { handle }
        });
        stack.extend_in_order(work);
    }

    fn destroy(&self, handle: HandleId) -> Result<(), ReconcileError> {
        let Some(record) = self.handles.borrow_mut().remove(handle) else {
            return Ok(());
        };
        let Some(node) = record.host_node() else {
            return Ok(());
        };
        let mut host = self.host.borrow_mut();
        self.events.disconnect_all(&mut *host, node);
        host.destroy(node)?;
        log::trace!("destroyed node {node}");
        Ok(())
    }

    /// Drops a handle whose mount failed before any work was scheduled for it.
    fn discard(&self, handle: HandleId) {
        {
            let mut handles = self.handles.borrow_mut();
            let Some((owner, key)) = handles
                .get(handle)
                .map(|record| (record.owner, record.key.clone()))
            else {
                return;
            };
            if let Some(owner) = owner.and_then(|owner| handles.get_mut(owner)) {
                owner.detach_child(key.as_ref(), handle);
            }
        }
        self.release(handle);
    }

    fn release(&self, handle: HandleId) {
        let record = self.handles.borrow_mut().remove(handle);
        if let Some(HandleRecord {
            kind:
                HandleKind::Stateful {
                    instance: Some(mut instance),
                    ..
                },
            ..
        }) = record
        {
            instance.detach();
        }
    }

    fn apply_props(&self, handle: HandleId, writes: Vec<PropWrite>) -> Result<(), ReconcileError> {
        let target = {
            let handles = self.handles.borrow();
            handles
                .get(handle)
                .filter(|record| !record.unmounted)
                .and_then(|record| Some((record.host_node()?, record.element.host_class()?.clone())))
        };
        let Some((node, class)) = target else {
            return Ok(());
        };

        let mut failed = Vec::new();
        for write in writes {
            if let Err(err) = self.apply_write(node, &class, &write) {
                failed.push((write, err));
            }
        }
        if self.config.retry_failed_writes() && !failed.is_empty() {
            for (write, _) in std::mem::take(&mut failed) {
                if let Err(err) = self.apply_write(node, &class, &write) {
                    failed.push((write, err));
                }
            }
        }
        for (write, err) in &failed {
            log::warn!("failed to set {} on `{class}` node {node}: {err}", write.key);
        }
        match self.config.property_failure_limit() {
            Some(limit) if failed.len() > limit => Err(ReconcileError::PropertyWrites {
                class,
                failures: failed.len(),
            }),
            _ => Ok(()),
        }
    }

    fn apply_write(
        &self,
        node: HostNodeId,
        class: &str,
        write: &PropWrite,
    ) -> Result<(), crate::host::HostError> {
        let mut host = self.host.borrow_mut();
        let callback = || write.value.as_ref().and_then(PropValue::as_callback).cloned();
        match &write.key {
            PropKey::Property(name) => {
                let value = match &write.value {
                    Some(value) => value.clone(),
                    None => host.default_value(class, name).unwrap_or(PropValue::Nil),
                };
                host.set_property(node, name, &value)
            }
            PropKey::Event(marker) => self.events.connect(&mut *host, node, marker.name(), callback()),
            PropKey::Change(marker) => {
                self.events
                    .connect_property(&mut *host, node, marker.name(), callback())
            }
            PropKey::Ref | PropKey::Children | PropKey::Symbol(_) => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
