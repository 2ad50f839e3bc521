//! Per-node event subscriptions owned by one reconciler.
//!
//! Each (node, event) pair holds at most one host subscription. Rebinding a
//! pair swaps the callback behind the existing subscription instead of
//! subscribing again.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::collections::map::HashMap;
use crate::host::{HostError, HostListener, HostNodeId, HostPlatform, SubscriptionId};
use crate::props::{Callback, PropValue};

/// Delivery status of a node's events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum EventStatus {
    /// Events are dropped. A node stays here until its mount completes.
    #[default]
    Disabled,
    /// Events are queued and replayed in arrival order on resume.
    Suspended,
    Enabled,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ListenerKey {
    Event(Rc<str>),
    Change(Rc<str>),
}

struct Binding {
    callback: Callback,
    subscription: SubscriptionId,
}

struct NodeEvents {
    node: HostNodeId,
    status: Cell<EventStatus>,
    bindings: RefCell<HashMap<ListenerKey, Binding>>,
    queue: RefCell<VecDeque<(ListenerKey, Vec<PropValue>)>>,
}

impl NodeEvents {
    fn new(node: HostNodeId) -> Self {
        Self {
            node,
            status: Cell::new(EventStatus::Disabled),
            bindings: RefCell::new(HashMap::default()),
            queue: RefCell::new(VecDeque::new()),
        }
    }

    fn dispatch(&self, key: &ListenerKey, args: &[PropValue]) {
        match self.status.get() {
            EventStatus::Disabled => {}
            EventStatus::Suspended => self.queue.borrow_mut().push_back((key.clone(), args.to_vec())),
            EventStatus::Enabled => self.deliver(key, args),
        }
    }

    fn deliver(&self, key: &ListenerKey, args: &[PropValue]) {
        let callback = self
            .bindings
            .borrow()
            .get(key)
            .map(|binding| binding.callback.clone());
        if let Some(callback) = callback {
            callback.call(self.node, args);
        }
    }

    fn flush(&self) {
        // A callback may suspend the node again; stop replaying if it does.
        while self.status.get() == EventStatus::Enabled {
            let next = self.queue.borrow_mut().pop_front();
            let Some((key, args)) = next else {
                break;
            };
            self.deliver(&key, &args);
        }
    }
}

#[derive(Default)]
pub struct EventManager {
    nodes: RefCell<HashMap<HostNodeId, Rc<NodeEvents>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, node: HostNodeId) -> Rc<NodeEvents> {
        let mut nodes = self.nodes.borrow_mut();
        Rc::clone(
            nodes
                .entry(node)
                .or_insert_with(|| Rc::new(NodeEvents::new(node))),
        )
    }

    /// Binds `callback` to host event `event` on `node`. `None` disconnects.
    pub fn connect<H: HostPlatform + ?Sized>(
        &self,
        host: &mut H,
        node: HostNodeId,
        event: &str,
        callback: Option<Callback>,
    ) -> Result<(), HostError> {
        self.bind(host, node, ListenerKey::Event(Rc::from(event)), callback)
    }

    /// Binds `callback` to change notifications of `property` on `node`.
    /// `None` disconnects.
    pub fn connect_property<H: HostPlatform + ?Sized>(
        &self,
        host: &mut H,
        node: HostNodeId,
        property: &str,
        callback: Option<Callback>,
    ) -> Result<(), HostError> {
        self.bind(host, node, ListenerKey::Change(Rc::from(property)), callback)
    }

    fn bind<H: HostPlatform + ?Sized>(
        &self,
        host: &mut H,
        node: HostNodeId,
        key: ListenerKey,
        callback: Option<Callback>,
    ) -> Result<(), HostError> {
        let entry = self.entry(node);
        let Some(callback) = callback else {
            let removed = entry.bindings.borrow_mut().remove(&key);
            if let Some(binding) = removed {
                host.cancel(binding.subscription);
            }
            return Ok(());
        };

        if let Some(binding) = entry.bindings.borrow_mut().get_mut(&key) {
            binding.callback = callback;
            return Ok(());
        }

        let weak: Weak<NodeEvents> = Rc::downgrade(&entry);
        let listener_key = key.clone();
        let listener: HostListener = Rc::new(move |_: HostNodeId, args: &[PropValue]| {
            if let Some(entry) = weak.upgrade() {
                entry.dispatch(&listener_key, args);
            }
        });
        let subscription = match &key {
            ListenerKey::Event(event) => host.subscribe_event(node, event, listener)?,
            ListenerKey::Change(property) => {
                host.subscribe_property_change(node, property, listener)?
            }
        };
        log::trace!("subscribed {key:?} on node {node}");
        entry.bindings.borrow_mut().insert(
            key,
            Binding {
                callback,
                subscription,
            },
        );
        Ok(())
    }

    /// Queues events for `node` until [`EventManager::resume`].
    pub fn suspend(&self, node: HostNodeId) {
        self.entry(node).status.set(EventStatus::Suspended);
    }

    /// Enables delivery for `node` and replays anything queued meanwhile.
    pub fn resume(&self, node: HostNodeId) {
        let entry = self.entry(node);
        entry.status.set(EventStatus::Enabled);
        entry.flush();
    }

    /// Cancels every subscription `node` owns and forgets the node.
    pub fn disconnect_all<H: HostPlatform + ?Sized>(&self, host: &mut H, node: HostNodeId) {
        let Some(entry) = self.nodes.borrow_mut().remove(&node) else {
            return;
        };
        entry.status.set(EventStatus::Disabled);
        entry.queue.borrow_mut().clear();
        let bindings: Vec<Binding> = entry.bindings.borrow_mut().drain().map(|(_, b)| b).collect();
        for binding in bindings {
            host.cancel(binding.subscription);
        }
    }

    pub fn status(&self, node: HostNodeId) -> EventStatus {
        self.nodes
            .borrow()
            .get(&node)
            .map_or(EventStatus::Disabled, |entry| entry.status.get())
    }

    pub fn subscription_count(&self) -> usize {
        self.nodes
            .borrow()
            .values()
            .map(|entry| entry.bindings.borrow().len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |tag: &str| {
            let sink = Rc::clone(&sink);
            let tag = tag.to_string();
            Callback::new(move |_, args| {
                sink.borrow_mut().push(format!("{tag}{}", args.len()));
            })
        };
        (log, make)
    }

    #[test]
    fn rebinding_keeps_one_host_subscription() {
        let mut host = MemoryHost::new();
        let node = host.create_root("Button").unwrap();
        let events = EventManager::new();
        let (log, make) = recorder();

        events.connect(&mut host, node, "Clicked", Some(make("a"))).unwrap();
        events.connect(&mut host, node, "Clicked", Some(make("b"))).unwrap();
        events.resume(node);
        assert_eq!(host.subscription_count(), 1);
        assert_eq!(events.subscription_count(), 1);

        host.fire_event(node, "Clicked", &[]);
        assert_eq!(*log.borrow(), ["b0"]);

        events.connect(&mut host, node, "Clicked", None).unwrap();
        assert_eq!(host.subscription_count(), 0);
        assert_eq!(host.fire_event(node, "Clicked", &[]), 0);
    }

    #[test]
    fn suspended_events_replay_in_order() {
        let mut host = MemoryHost::new();
        let node = host.create_root("Button").unwrap();
        let events = EventManager::new();
        let (log, make) = recorder();
        events.connect(&mut host, node, "Clicked", Some(make("click"))).unwrap();
        events.connect(&mut host, node, "Hovered", Some(make("hover"))).unwrap();

        host.fire_event(node, "Clicked", &[]);
        assert!(log.borrow().is_empty(), "disabled nodes drop events");

        events.suspend(node);
        host.fire_event(node, "Hovered", &[PropValue::Int(1)]);
        host.fire_event(node, "Clicked", &[]);
        assert!(log.borrow().is_empty());

        events.resume(node);
        assert_eq!(*log.borrow(), ["hover1", "click0"]);
        assert_eq!(events.status(node), EventStatus::Enabled);
    }

    #[test]
    fn disconnect_all_cancels_everything() {
        let mut host = MemoryHost::new();
        let node = host.create_root("TextBox").unwrap();
        let events = EventManager::new();
        let (_log, make) = recorder();
        events.connect(&mut host, node, "Clicked", Some(make("c"))).unwrap();
        events
            .connect_property(&mut host, node, "Text", Some(make("t")))
            .unwrap();
        assert_eq!(host.subscription_count(), 2);

        events.disconnect_all(&mut host, node);
        assert_eq!(host.subscription_count(), 0);
        assert_eq!(events.subscription_count(), 0);
        assert_eq!(events.status(node), EventStatus::Disabled);
    }
}
