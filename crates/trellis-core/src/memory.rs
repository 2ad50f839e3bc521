//! In-memory host used by tests and demos.
//!
//! `MemoryHost` keeps its node table behind a shared `Rc<RefCell<..>>`, so a
//! test can hand one clone to the reconciler and keep another to inspect the
//! tree, fire events and read the operation journal.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::collections::map::HashMap;
use crate::host::{HostError, HostListener, HostNodeId, HostPlatform, SubscriptionId};
use crate::props::{PropValue, ValueKind};

/// Extra validation run on a property write, after the kind check.
///
/// Receives the incoming value and a view of the node's current properties.
pub type PropertyCheck = Rc<dyn Fn(&PropValue, &PropertyView<'_>) -> Result<(), String>>;

#[derive(Clone)]
pub struct PropertySpec {
    default: PropValue,
    kind: Option<ValueKind>,
    check: Option<PropertyCheck>,
}

impl PropertySpec {
    /// A property whose accepted kind is the kind of `default`. A `Nil`
    /// default accepts any kind.
    pub fn new(default: impl Into<PropValue>) -> Self {
        let default = default.into();
        let kind = match default.kind() {
            ValueKind::Nil => None,
            kind => Some(kind),
        };
        Self {
            default,
            kind,
            check: None,
        }
    }

    pub fn any_kind(mut self) -> Self {
        self.kind = None;
        self
    }

    pub fn with_check(
        mut self,
        check: impl Fn(&PropValue, &PropertyView<'_>) -> Result<(), String> + 'static,
    ) -> Self {
        self.check = Some(Rc::new(check));
        self
    }

    pub fn default_value(&self) -> &PropValue {
        &self.default
    }

    fn accepts(&self, value: &PropValue) -> bool {
        match (self.kind, value.kind()) {
            (_, ValueKind::Nil) | (None, _) => true,
            (Some(ValueKind::Number), ValueKind::Int) => true,
            (Some(expected), actual) => expected == actual,
        }
    }
}

/// Properties and events a host class understands.
#[derive(Clone, Default)]
pub struct ClassSchema {
    properties: IndexMap<Rc<str>, PropertySpec>,
    events: Vec<Rc<str>>,
}

impl ClassSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: &str, spec: PropertySpec) -> Self {
        self.properties.insert(Rc::from(name), spec);
        self
    }

    pub fn event(mut self, name: &str) -> Self {
        self.events.push(Rc::from(name));
        self
    }

    fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|event| &**event == name)
    }
}

/// Read access to a node's properties, falling back to class defaults.
pub struct PropertyView<'a> {
    schema: Option<&'a ClassSchema>,
    values: &'a IndexMap<Rc<str>, PropValue>,
}

impl PropertyView<'_> {
    pub fn get(&self, key: &str) -> Option<PropValue> {
        self.values.get(key).cloned().or_else(|| {
            self.schema
                .and_then(|schema| schema.properties.get(key))
                .map(|spec| spec.default.clone())
        })
    }
}

/// One host mutation, recorded in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum HostOp {
    Create {
        node: HostNodeId,
        class: Rc<str>,
    },
    Set {
        node: HostNodeId,
        key: Rc<str>,
        value: PropValue,
    },
    Parent {
        node: HostNodeId,
        parent: Option<HostNodeId>,
    },
    Destroy {
        node: HostNodeId,
    },
    Subscribe {
        node: HostNodeId,
        name: Rc<str>,
        change: bool,
    },
    Cancel {
        subscription: SubscriptionId,
    },
}

struct NodeRecord {
    class: Rc<str>,
    values: IndexMap<Rc<str>, PropValue>,
    parent: Option<HostNodeId>,
    children: Vec<HostNodeId>,
}

#[derive(Clone, PartialEq, Eq)]
enum Topic {
    Event(Rc<str>),
    Change(Rc<str>),
}

struct Subscription {
    node: HostNodeId,
    topic: Topic,
    listener: HostListener,
}

#[derive(Default)]
struct MemoryHostState {
    strict: bool,
    schemas: HashMap<Rc<str>, ClassSchema>,
    nodes: HashMap<HostNodeId, NodeRecord>,
    next_node: HostNodeId,
    subscriptions: IndexMap<SubscriptionId, Subscription>,
    next_subscription: SubscriptionId,
    pending_changes: VecDeque<(HostNodeId, Rc<str>, PropValue)>,
    journal: Vec<HostOp>,
}

impl MemoryHostState {
    fn node(&self, node: HostNodeId) -> Result<&NodeRecord, HostError> {
        self.nodes.get(&node).ok_or(HostError::UnknownNode(node))
    }

    fn create(&mut self, class: &str) -> Result<HostNodeId, HostError> {
        let class: Rc<str> = match self.schemas.get_key_value(class) {
            Some((name, _)) => Rc::clone(name),
            None if self.strict => return Err(HostError::UnknownClass(Rc::from(class))),
            None => Rc::from(class),
        };
        self.next_node += 1;
        let node = self.next_node;
        self.nodes.insert(
            node,
            NodeRecord {
                class: Rc::clone(&class),
                values: IndexMap::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        self.journal.push(HostOp::Create { node, class });
        Ok(node)
    }

    fn set_property(
        &mut self,
        node: HostNodeId,
        key: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        let record = self.node(node)?;
        let schema = self.schemas.get(&record.class);
        let spec = schema.and_then(|schema| schema.properties.get(key));
        let rejected = |reason: String| HostError::PropertyRejected {
            class: Rc::clone(&record.class),
            key: Rc::from(key),
            reason,
        };
        match spec {
            Some(spec) => {
                if let (false, Some(expected)) = (spec.accepts(value), spec.kind) {
                    return Err(rejected(format!("expected {expected}, got {}", value.kind())));
                }
                if let (Some(check), false) = (&spec.check, matches!(value, PropValue::Nil)) {
                    let view = PropertyView {
                        schema,
                        values: &record.values,
                    };
                    check(value, &view).map_err(rejected)?;
                }
            }
            None if self.strict => {
                return Err(HostError::UnknownProperty {
                    class: Rc::clone(&record.class),
                    key: Rc::from(key),
                });
            }
            None => {}
        }

        let key: Rc<str> = Rc::from(key);
        let watched = self.watches(node, &key);
        let Some(record) = self.nodes.get_mut(&node) else {
            return Err(HostError::UnknownNode(node));
        };
        let changed = match value {
            PropValue::Nil => record.values.shift_remove(&key).is_some(),
            value => record.values.insert(Rc::clone(&key), value.clone()).as_ref() != Some(value),
        };
        self.journal.push(HostOp::Set {
            node,
            key: Rc::clone(&key),
            value: value.clone(),
        });
        if changed && watched {
            self.pending_changes.push_back((node, key, value.clone()));
        }
        Ok(())
    }

    fn watches(&self, node: HostNodeId, key: &Rc<str>) -> bool {
        self.subscriptions
            .values()
            .any(|sub| sub.node == node && sub.topic == Topic::Change(Rc::clone(key)))
    }

    fn set_parent(
        &mut self,
        node: HostNodeId,
        parent: Option<HostNodeId>,
    ) -> Result<(), HostError> {
        self.node(node)?;
        if let Some(parent) = parent {
            self.node(parent)?;
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == node {
                    return Err(HostError::InvalidParent { node, parent });
                }
                cursor = self.nodes.get(&current).and_then(|record| record.parent);
            }
        }
        self.detach(node);
        if let Some(parent) = parent {
            if let Some(record) = self.nodes.get_mut(&parent) {
                record.children.push(node);
            }
        }
        if let Some(record) = self.nodes.get_mut(&node) {
            record.parent = parent;
        }
        self.journal.push(HostOp::Parent { node, parent });
        Ok(())
    }

    fn detach(&mut self, node: HostNodeId) {
        let previous = self.nodes.get(&node).and_then(|record| record.parent);
        if let Some(record) = previous.and_then(|parent| self.nodes.get_mut(&parent)) {
            record.children.retain(|&child| child != node);
        }
    }

    fn destroy(&mut self, node: HostNodeId) -> Result<(), HostError> {
        self.node(node)?;
        self.detach(node);
        let mut doomed = vec![node];
        while let Some(current) = doomed.pop() {
            if let Some(record) = self.nodes.remove(&current) {
                doomed.extend(record.children);
            }
            self.subscriptions.retain(|_, sub| sub.node != current);
            self.pending_changes.retain(|(pending, _, _)| *pending != current);
        }
        self.journal.push(HostOp::Destroy { node });
        Ok(())
    }

    fn subscribe(
        &mut self,
        node: HostNodeId,
        topic: Topic,
        listener: HostListener,
    ) -> Result<SubscriptionId, HostError> {
        let record = self.node(node)?;
        let schema = self.schemas.get(&record.class);
        let (name, change) = match &topic {
            Topic::Event(name) => (Rc::clone(name), false),
            Topic::Change(name) => (Rc::clone(name), true),
        };
        if self.strict {
            let known = match (&topic, schema) {
                (Topic::Event(event), Some(schema)) => schema.has_event(event),
                (Topic::Change(property), Some(schema)) => {
                    schema.properties.contains_key(property)
                }
                (_, None) => false,
            };
            if !known && change {
                return Err(HostError::UnknownProperty {
                    class: Rc::clone(&record.class),
                    key: name,
                });
            }
            if !known {
                return Err(HostError::UnknownEvent {
                    class: Rc::clone(&record.class),
                    event: name,
                });
            }
        }
        self.next_subscription += 1;
        let id = self.next_subscription;
        self.subscriptions.insert(
            id,
            Subscription {
                node,
                topic,
                listener,
            },
        );
        self.journal.push(HostOp::Subscribe { node, name, change });
        Ok(id)
    }

    fn listeners(&self, node: HostNodeId, topic: &Topic) -> Vec<HostListener> {
        self.subscriptions
            .values()
            .filter(|sub| sub.node == node && &sub.topic == topic)
            .map(|sub| Rc::clone(&sub.listener))
            .collect()
    }

    fn dump_node(&self, output: &mut String, node: HostNodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(record) = self.nodes.get(&node) else {
            let _ = writeln!(output, "{indent}[{node}] (missing)");
            return;
        };
        let _ = write!(output, "{indent}[{node}] {}", record.class);
        if !record.values.is_empty() {
            let values: Vec<String> = record
                .values
                .iter()
                .map(|(key, value)| format!("{key}: {value:?}"))
                .collect();
            let _ = write!(output, " {{{}}}", values.join(", "));
        }
        output.push('\n');
        for &child in &record.children {
            self.dump_node(output, child, depth + 1);
        }
    }
}

/// Shared in-memory host.
///
/// Permissive by default: classes, properties and events it has no schema
/// for are accepted. [`MemoryHost::strict`] rejects them instead. Kind and
/// check rules of registered properties apply in both modes.
#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Rc<RefCell<MemoryHostState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        let host = Self::default();
        host.state.borrow_mut().strict = true;
        host
    }

    pub fn register_class(&self, name: &str, schema: ClassSchema) {
        self.state
            .borrow_mut()
            .schemas
            .insert(Rc::from(name), schema);
    }

    pub fn with_class(self, name: &str, schema: ClassSchema) -> Self {
        self.register_class(name, schema);
        self
    }

    /// Creates a node outside any reconciler, typically a mount root.
    pub fn create_root(&self, class: &str) -> Result<HostNodeId, HostError> {
        self.state.borrow_mut().create(class)
    }

    /// Fires `event` on `node`, returning how many listeners ran.
    pub fn fire_event(&self, node: HostNodeId, event: &str, args: &[PropValue]) -> usize {
        let listeners = self
            .state
            .borrow()
            .listeners(node, &Topic::Event(Rc::from(event)));
        for listener in &listeners {
            listener(node, args);
        }
        listeners.len()
    }

    /// Changes a property the way user input would, queueing a change
    /// notification for [`MemoryHost::flush_changes`].
    pub fn simulate_change(
        &self,
        node: HostNodeId,
        key: &str,
        value: impl Into<PropValue>,
    ) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        let value = value.into();
        let key: Rc<str> = Rc::from(key);
        let record = state
            .nodes
            .get_mut(&node)
            .ok_or(HostError::UnknownNode(node))?;
        record.values.insert(Rc::clone(&key), value.clone());
        state.pending_changes.push_back((node, key, value));
        Ok(())
    }

    /// Delivers queued change notifications in order, each carrying the
    /// value written at the time, and returns how many listeners ran.
    pub fn flush_changes(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.state.borrow_mut().pending_changes.pop_front();
            let Some((node, key, value)) = next else {
                return delivered;
            };
            let listeners = self.state.borrow().listeners(node, &Topic::Change(key));
            for listener in &listeners {
                listener(node, std::slice::from_ref(&value));
            }
            delivered += listeners.len();
        }
    }

    pub fn pending_changes(&self) -> usize {
        self.state.borrow().pending_changes.len()
    }

    /// Current value of `key`, or the class default when never written.
    pub fn property(&self, node: HostNodeId, key: &str) -> Option<PropValue> {
        let state = self.state.borrow();
        let record = state.nodes.get(&node)?;
        PropertyView {
            schema: state.schemas.get(&record.class),
            values: &record.values,
        }
        .get(key)
    }

    pub fn parent(&self, node: HostNodeId) -> Option<HostNodeId> {
        self.state.borrow().nodes.get(&node)?.parent
    }

    pub fn children(&self, node: HostNodeId) -> Vec<HostNodeId> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|record| record.children.clone())
            .unwrap_or_default()
    }

    pub fn class_name(&self, node: HostNodeId) -> Option<Rc<str>> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|record| Rc::clone(&record.class))
    }

    pub fn exists(&self, node: HostNodeId) -> bool {
        self.state.borrow().nodes.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    pub fn journal(&self) -> Vec<HostOp> {
        self.state.borrow().journal.clone()
    }

    pub fn take_journal(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.state.borrow_mut().journal)
    }

    pub fn dump_tree(&self, root: Option<HostNodeId>) -> String {
        let mut output = String::new();
        match root {
            Some(root) => self.state.borrow().dump_node(&mut output, root, 0),
            None => output.push_str("(no root)\n"),
        }
        output
    }
}

impl HostPlatform for MemoryHost {
    fn create(&mut self, class: &str) -> Result<HostNodeId, HostError> {
        self.state.borrow_mut().create(class)
    }

    fn class_of(&self, node: HostNodeId) -> Result<Rc<str>, HostError> {
        self.class_name(node).ok_or(HostError::UnknownNode(node))
    }

    fn set_property(
        &mut self,
        node: HostNodeId,
        key: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        self.state.borrow_mut().set_property(node, key, value)
    }

    fn default_value(&self, class: &str, key: &str) -> Option<PropValue> {
        let state = self.state.borrow();
        let spec = state.schemas.get(class)?.properties.get(key)?;
        Some(spec.default.clone())
    }

    fn set_parent(
        &mut self,
        node: HostNodeId,
        parent: Option<HostNodeId>,
    ) -> Result<(), HostError> {
        self.state.borrow_mut().set_parent(node, parent)
    }

    fn destroy(&mut self, node: HostNodeId) -> Result<(), HostError> {
        self.state.borrow_mut().destroy(node)
    }

    fn subscribe_event(
        &mut self,
        node: HostNodeId,
        event: &str,
        listener: HostListener,
    ) -> Result<SubscriptionId, HostError> {
        self.state
            .borrow_mut()
            .subscribe(node, Topic::Event(Rc::from(event)), listener)
    }

    fn subscribe_property_change(
        &mut self,
        node: HostNodeId,
        property: &str,
        listener: HostListener,
    ) -> Result<SubscriptionId, HostError> {
        self.state
            .borrow_mut()
            .subscribe(node, Topic::Change(Rc::from(property)), listener)
    }

    fn cancel(&mut self, subscription: SubscriptionId) {
        let mut state = self.state.borrow_mut();
        if state.subscriptions.shift_remove(&subscription).is_some() {
            state.journal.push(HostOp::Cancel { subscription });
        }
    }
}
