use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::Children;
use crate::host::HostNodeId;
use crate::markers::{self, Marker, Symbol};

/// Key of a single entry in [`Props`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// Ordinary host property.
    Property(Rc<str>),
    /// Subscription to a host event.
    Event(Marker),
    /// Subscription to change notifications of a host property.
    Change(Marker),
    /// Reserved key carrying a [`Ref`].
    Ref,
    /// Reserved key carrying [`Children`].
    Children,
    /// User symbol; meaningless to the host.
    Symbol(Symbol),
}

impl PropKey {
    pub fn property(name: &str) -> Self {
        PropKey::Property(Rc::from(name))
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::property(name)
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Property(Rc::from(name))
    }
}

impl From<Symbol> for PropKey {
    fn from(symbol: Symbol) -> Self {
        PropKey::Symbol(symbol)
    }
}

impl fmt::Debug for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Property(name) => write!(f, "{name:?}"),
            PropKey::Event(marker) | PropKey::Change(marker) => write!(f, "{marker:?}"),
            PropKey::Ref => f.write_str("Ref"),
            PropKey::Children => f.write_str("Children"),
            PropKey::Symbol(symbol) => write!(f, "{symbol:?}"),
        }
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Property(name) => f.write_str(name),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Listener attached through an event or change key.
///
/// Invoked with the host node the subscription belongs to and the event's
/// arguments. Change notifications carry the new value as the only argument.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(HostNodeId, &[PropValue])>);

impl Callback {
    pub fn new(f: impl Fn(HostNodeId, &[PropValue]) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, node: HostNodeId, args: &[PropValue]) {
        (self.0)(node, args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Mutable box observing the host node of the element it is attached to.
#[derive(Clone, Default)]
pub struct RefBox(Rc<Cell<Option<HostNodeId>>>);

impl RefBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<HostNodeId> {
        self.0.get()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RefBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefBox").field(&self.0.get()).finish()
    }
}

/// Creates an empty [`RefBox`].
pub fn create_ref() -> RefBox {
    RefBox::new()
}

/// A ref, either a box the reconciler writes into or a callback it invokes.
#[derive(Clone)]
pub enum Ref {
    Box(RefBox),
    Callback(Rc<dyn Fn(Option<HostNodeId>)>),
}

impl Ref {
    pub fn callback(f: impl Fn(Option<HostNodeId>) + 'static) -> Self {
        Ref::Callback(Rc::new(f))
    }

    pub(crate) fn apply(&self, node: Option<HostNodeId>) {
        match self {
            Ref::Box(cell) => cell.0.set(node),
            Ref::Callback(callback) => callback(node),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Ref::Box(a), Ref::Box(b)) => a.ptr_eq(b),
            (Ref::Callback(a), Ref::Callback(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Identity comparison where two absent refs are the same.
    pub(crate) fn same(a: Option<&Ref>, b: Option<&Ref>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<RefBox> for Ref {
    fn from(cell: RefBox) -> Self {
        Ref::Box(cell)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Box(cell) => write!(f, "{cell:?}"),
            Ref::Callback(callback) => {
                write!(f, "Ref::Callback({:p})", Rc::as_ptr(callback) as *const ())
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    Bool,
    Int,
    Number,
    Str,
    Node,
    Callback,
    Ref,
    Children,
    Opaque,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Value stored under a [`PropKey`].
///
/// Scalars compare by value; callbacks, refs, children and opaque values
/// compare by identity.
#[derive(Clone)]
pub enum PropValue {
    Nil,
    Bool(bool),
    Int(i64),
    Number(f64),
    Str(Rc<str>),
    Node(HostNodeId),
    Callback(Callback),
    Ref(Ref),
    Children(Children),
    Opaque(Rc<dyn Any>),
}

impl PropValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PropValue::Nil => ValueKind::Nil,
            PropValue::Bool(_) => ValueKind::Bool,
            PropValue::Int(_) => ValueKind::Int,
            PropValue::Number(_) => ValueKind::Number,
            PropValue::Str(_) => ValueKind::Str,
            PropValue::Node(_) => ValueKind::Node,
            PropValue::Callback(_) => ValueKind::Callback,
            PropValue::Ref(_) => ValueKind::Ref,
            PropValue::Children(_) => ValueKind::Children,
            PropValue::Opaque(_) => ValueKind::Opaque,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropValue::Number(value) => Some(*value),
            PropValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<HostNodeId> {
        match self {
            PropValue::Node(node) => Some(*node),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            PropValue::Callback(callback) => Some(callback),
            _ => None,
        }
    }

    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        match self {
            PropValue::Opaque(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn opaque<T: 'static>(value: T) -> Self {
        PropValue::Opaque(Rc::new(value))
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Nil, PropValue::Nil) => true,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Number(a), PropValue::Number(b)) => a == b,
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Node(a), PropValue::Node(b)) => a == b,
            (PropValue::Callback(a), PropValue::Callback(b)) => a.ptr_eq(b),
            (PropValue::Ref(a), PropValue::Ref(b)) => a.ptr_eq(b),
            (PropValue::Children(a), PropValue::Children(b)) => a.ptr_eq(b),
            (PropValue::Opaque(a), PropValue::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Nil => f.write_str("nil"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Number(value) => write!(f, "{value:?}"),
            PropValue::Str(value) => write!(f, "{value:?}"),
            PropValue::Node(node) => write!(f, "Node({node})"),
            PropValue::Callback(callback) => write!(f, "{callback:?}"),
            PropValue::Ref(reference) => write!(f, "{reference:?}"),
            PropValue::Children(children) => write!(f, "Children({})", children.len()),
            PropValue::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Number(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        PropValue::Str(value)
    }
}

impl From<Callback> for PropValue {
    fn from(callback: Callback) -> Self {
        PropValue::Callback(callback)
    }
}

impl From<Ref> for PropValue {
    fn from(reference: Ref) -> Self {
        PropValue::Ref(reference)
    }
}

impl From<RefBox> for PropValue {
    fn from(cell: RefBox) -> Self {
        PropValue::Ref(Ref::Box(cell))
    }
}

impl From<Children> for PropValue {
    fn from(children: Children) -> Self {
        PropValue::Children(children)
    }
}

/// Insertion-ordered property mapping of an element.
#[derive(Clone, Default)]
pub struct Props {
    entries: IndexMap<PropKey, PropValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Props::insert`].
    pub fn with(mut self, key: impl Into<PropKey>, value: impl Into<PropValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Attaches `callback` to the host event `event`.
    pub fn on(self, event: &str, callback: impl Fn(HostNodeId, &[PropValue]) + 'static) -> Self {
        self.with(markers::event(event), Callback::new(callback))
    }

    /// Attaches `callback` to change notifications of `property`. It is
    /// called with the value the property changed to.
    pub fn on_change(
        self,
        property: &str,
        callback: impl Fn(HostNodeId, &PropValue) + 'static,
    ) -> Self {
        self.with(
            markers::change(property),
            Callback::new(move |node, args| match args.first() {
                Some(value) => callback(node, value),
                None => callback(node, &PropValue::Nil),
            }),
        )
    }

    pub fn with_ref(self, reference: impl Into<Ref>) -> Self {
        self.with(PropKey::Ref, reference.into())
    }

    pub fn with_children(self, children: Children) -> Self {
        self.with(PropKey::Children, children)
    }

    pub fn insert(
        &mut self,
        key: impl Into<PropKey>,
        value: impl Into<PropValue>,
    ) -> Option<PropValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &PropKey) -> Option<PropValue> {
        self.entries.shift_remove(key)
    }

    pub fn get(&self, key: &PropKey) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn property(&self, name: &str) -> Option<&PropValue> {
        self.entries.get(&PropKey::property(name))
    }

    pub fn contains_key(&self, key: &PropKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropKey, &PropValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn children(&self) -> Option<&Children> {
        match self.entries.get(&PropKey::Children) {
            Some(PropValue::Children(children)) => Some(children),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<&Ref> {
        match self.entries.get(&PropKey::Ref) {
            Some(PropValue::Ref(reference)) => Some(reference),
            _ => None,
        }
    }

    /// Returns these props layered over `defaults`.
    pub fn merged_over(&self, defaults: &Props) -> Props {
        if defaults.is_empty() {
            return self.clone();
        }
        let mut merged = defaults.clone();
        for (key, value) in self.entries.iter() {
            merged.entries.insert(key.clone(), value.clone());
        }
        merged
    }

}

impl<K: Into<PropKey>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Props::new();
        for (key, value) in iter {
            props.insert(key, value);
        }
        props
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
