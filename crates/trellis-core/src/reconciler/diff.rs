//! Property diffing for host elements.

use std::panic::Location;
use std::rc::Rc;

use crate::error::ReconcileError;
use crate::props::{PropKey, PropValue, Props};

/// One pending write. `None` resets the key: host default for a property,
/// disconnect for an event or change listener.
#[derive(Clone, Debug)]
pub(crate) struct PropWrite {
    pub key: PropKey,
    pub value: Option<PropValue>,
}

/// Rejects keys a host element cannot carry. Runs over the whole batch
/// before any write is made.
fn validate(
    props: &Props,
    class: &Rc<str>,
    location: &'static Location<'static>,
) -> Result<(), ReconcileError> {
    for (key, value) in props.iter() {
        match key {
            PropKey::Property(_) | PropKey::Ref | PropKey::Children => {}
            PropKey::Event(_) | PropKey::Change(_) => {
                if !matches!(value, PropValue::Callback(_) | PropValue::Nil) {
                    return Err(ReconcileError::InvalidListener {
                        key: key.to_string(),
                        class: Rc::clone(class),
                        location,
                    });
                }
            }
            PropKey::Symbol(_) => {
                return Err(ReconcileError::InvalidPropKey {
                    key: key.to_string(),
                    class: Rc::clone(class),
                    location,
                });
            }
        }
    }
    Ok(())
}

fn reaches_host(key: &PropKey) -> bool {
    matches!(
        key,
        PropKey::Property(_) | PropKey::Event(_) | PropKey::Change(_)
    )
}

fn write(key: &PropKey, value: &PropValue) -> PropWrite {
    let value = match (key, value) {
        (PropKey::Event(_) | PropKey::Change(_), PropValue::Nil) => None,
        (_, value) => Some(value.clone()),
    };
    PropWrite {
        key: key.clone(),
        value,
    }
}

/// Writes that bring a fresh node to `props`.
pub(crate) fn initial_writes(
    props: &Props,
    class: &Rc<str>,
    location: &'static Location<'static>,
) -> Result<Vec<PropWrite>, ReconcileError> {
    validate(props, class, location)?;
    Ok(props
        .iter()
        .filter(|(key, _)| reaches_host(key))
        .map(|(key, value)| write(key, value))
        .collect())
}

/// Writes that move a node from `old` to `new`.
///
/// Keys of `old` come first, written only when the value changed and reset
/// when omitted; keys new to `new` follow in their own order.
pub(crate) fn prop_writes(
    old: &Props,
    new: &Props,
    class: &Rc<str>,
    location: &'static Location<'static>,
) -> Result<Vec<PropWrite>, ReconcileError> {
    validate(new, class, location)?;
    let mut writes = Vec::new();
    for (key, previous) in old.iter().filter(|(key, _)| reaches_host(key)) {
        match new.get(key) {
            Some(next) if next == previous => {}
            Some(next) => writes.push(write(key, next)),
            None => writes.push(PropWrite {
                key: key.clone(),
                value: None,
            }),
        }
    }
    for (key, value) in new.iter().filter(|(key, _)| reaches_host(key)) {
        if !old.contains_key(key) {
            writes.push(write(key, value));
        }
    }
    Ok(writes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{self, Symbol};
    use crate::props::create_ref;

    fn class() -> Rc<str> {
        Rc::from("Label")
    }

    fn keys(writes: &[PropWrite]) -> Vec<String> {
        writes.iter().map(|write| write.key.to_string()).collect()
    }

    #[test]
    fn reserved_keys_never_reach_the_host() {
        let props = Props::new()
            .with("Text", "x")
            .with_ref(create_ref())
            .with_children(Default::default());
        let writes = initial_writes(&props, &class(), Location::caller()).unwrap();
        assert_eq!(keys(&writes), ["Text"]);
    }

    #[test]
    fn diff_writes_changes_resets_and_additions() {
        let old = Props::new().with("A", 1).with("B", 2).with("C", 3);
        let new = Props::new().with("D", 4).with("C", 30).with("A", 1);
        let writes = prop_writes(&old, &new, &class(), Location::caller()).unwrap();
        assert_eq!(keys(&writes), ["B", "C", "D"]);
        assert_eq!(writes[0].value, None);
        assert_eq!(writes[1].value, Some(PropValue::Int(30)));
    }

    #[test]
    fn symbol_keys_reject_the_whole_batch() {
        let props = Props::new()
            .with("Text", "x")
            .with(Symbol::named("private"), 1);
        let err = initial_writes(&props, &class(), Location::caller()).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidPropKey { .. }));
    }

    #[test]
    fn listener_keys_need_callbacks() {
        let props = Props::new().with(markers::event("Clicked"), "not a callback");
        let err = initial_writes(&props, &class(), Location::caller()).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidListener { .. }));
    }
}
