//! Symbolic prop keys.
//!
//! Event and change markers are interned per thread: asking for
//! `event("Activated")` twice yields the same marker, so markers compare and
//! hash by identity. [`Symbol`]s are never interned; every call to
//! [`Symbol::named`] produces a distinct key.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::props::PropKey;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Subscribe to a host event.
    Event,
    /// Subscribe to change notifications of a host property.
    Change,
}

struct MarkerData {
    kind: MarkerKind,
    name: Rc<str>,
}

/// An interned event or change key.
#[derive(Clone)]
pub struct Marker {
    inner: Rc<MarkerData>,
}

impl Marker {
    pub fn kind(&self) -> MarkerKind {
        self.inner.kind
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl PartialEq for Marker {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Marker {}

impl Hash for Marker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            MarkerKind::Event => write!(f, "Event.{}", self.inner.name),
            MarkerKind::Change => write!(f, "Change.{}", self.inner.name),
        }
    }
}

#[derive(Default)]
struct Registry {
    events: HashMap<Rc<str>, Marker>,
    changes: HashMap<Rc<str>, Marker>,
}

impl Registry {
    fn intern(&mut self, kind: MarkerKind, name: &str) -> Marker {
        let table = match kind {
            MarkerKind::Event => &mut self.events,
            MarkerKind::Change => &mut self.changes,
        };
        if let Some(marker) = table.get(name) {
            return marker.clone();
        }
        let name: Rc<str> = Rc::from(name);
        let marker = Marker {
            inner: Rc::new(MarkerData {
                kind,
                name: Rc::clone(&name),
            }),
        };
        table.insert(name, marker.clone());
        marker
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Returns the interned marker for `(kind, name)`.
pub fn marker(kind: MarkerKind, name: &str) -> Marker {
    REGISTRY.with(|registry| registry.borrow_mut().intern(kind, name))
}

/// Prop key subscribing to the host event `name`.
pub fn event(name: &str) -> PropKey {
    PropKey::Event(marker(MarkerKind::Event, name))
}

/// Prop key subscribing to change notifications of the host property `name`.
pub fn change(name: &str) -> PropKey {
    PropKey::Change(marker(MarkerKind::Change, name))
}

/// A unique symbolic key with no meaning to the host.
///
/// Useful as a private prop key between components. Passing one to a host
/// element is an error.
#[derive(Clone)]
pub struct Symbol {
    name: Rc<str>,
}

impl Symbol {
    pub fn named(name: &str) -> Self {
        Self {
            name: Rc::from(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.name, &other.name)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.name) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_interned_per_kind_and_name() {
        let a = marker(MarkerKind::Event, "Activated");
        let b = marker(MarkerKind::Event, "Activated");
        let c = marker(MarkerKind::Change, "Activated");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(event("Activated"), event("Activated"));
        assert_ne!(event("Activated"), change("Activated"));
        assert_eq!(c.kind(), MarkerKind::Change);
        assert_eq!(c.name(), "Activated");
    }

    #[test]
    fn symbols_are_unique() {
        let first = Symbol::named("token");
        let second = Symbol::named("token");
        assert_ne!(first, second);
        assert_eq!(first, first.clone());
    }
}
