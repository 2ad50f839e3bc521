use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::collections::map::HashMap;

/// Values propagated top-down through the handle tree, keyed by type.
///
/// A context is immutable once shared. Stateful components derive a new one
/// with [`Context::with`] to change what their subtree sees; siblings and
/// ancestors keep the context they had.
#[derive(Clone, Default)]
pub struct Context {
    values: Rc<HashMap<TypeId, Rc<dyn Any>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: 'static>(&self) -> Option<Rc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| Rc::clone(value).downcast::<T>().ok())
    }

    /// Returns a copy of this context with `value` stored under its type.
    pub fn with<T: 'static>(&self, value: T) -> Context {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Rc::new(value));
        Context {
            values: Rc::new(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.values, &other.values)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Theme(&'static str);

    #[test]
    fn with_leaves_the_source_context_alone() {
        let root = Context::new();
        let themed = root.with(Theme("dark"));
        assert!(root.get::<Theme>().is_none());
        assert_eq!(themed.get::<Theme>().as_deref(), Some(&Theme("dark")));

        let relit = themed.with(Theme("light"));
        assert_eq!(themed.get::<Theme>().as_deref(), Some(&Theme("dark")));
        assert_eq!(relit.get::<Theme>().as_deref(), Some(&Theme("light")));
        assert_eq!(relit.len(), 1);
    }
}
