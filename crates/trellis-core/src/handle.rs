//! Handle records: the reconciler's view of each live tree position.

use indexmap::IndexMap;

use crate::collections::map::HashMap;
use crate::component::ComponentInstance;
use crate::context::Context;
use crate::element::{ChildKey, Element};
use crate::host::HostNodeId;

pub type HandleId = usize;

pub(crate) enum HandleKind {
    Host {
        node: HostNodeId,
        children: IndexMap<ChildKey, HandleId>,
    },
    Portal {
        target: HostNodeId,
        children: IndexMap<ChildKey, HandleId>,
    },
    Fragment {
        children: IndexMap<ChildKey, HandleId>,
    },
    Function {
        child: Option<HandleId>,
    },
    Stateful {
        /// Taken out while the instance runs so user code never observes a
        /// borrowed arena.
        instance: Option<Box<dyn ComponentInstance>>,
        child: Option<HandleId>,
    },
}

impl HandleKind {
    fn tag(&self) -> HandleKindTag {
        match self {
            HandleKind::Host { .. } => HandleKindTag::Host,
            HandleKind::Portal { .. } => HandleKindTag::Portal,
            HandleKind::Fragment { .. } => HandleKindTag::Fragment,
            HandleKind::Function { .. } => HandleKindTag::Function,
            HandleKind::Stateful { .. } => HandleKindTag::Stateful,
        }
    }
}

pub(crate) struct HandleRecord {
    pub element: Element,
    pub key: Option<ChildKey>,
    pub host_parent: Option<HostNodeId>,
    pub context: Context,
    pub owner: Option<HandleId>,
    pub depth: usize,
    pub unmounted: bool,
    pub kind: HandleKind,
}

impl HandleRecord {
    pub fn host_node(&self) -> Option<HostNodeId> {
        match &self.kind {
            HandleKind::Host { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// Host parent that children of this handle attach to.
    pub fn child_host_parent(&self) -> Option<HostNodeId> {
        match &self.kind {
            HandleKind::Host { node, .. } => Some(*node),
            HandleKind::Portal { target, .. } => Some(*target),
            _ => self.host_parent,
        }
    }

    /// Context a replacement at this position should mount with.
    pub fn inherited_context(&self) -> Context {
        match &self.kind {
            HandleKind::Stateful {
                instance: Some(instance),
                ..
            } => instance.context().clone(),
            _ => self.context.clone(),
        }
    }

    /// Records `child` under `key`, or as the single child when `key` is
    /// `None` on a single-child kind.
    pub fn attach_child(&mut self, key: Option<&ChildKey>, child: HandleId) {
        match (&mut self.kind, key) {
            (
                HandleKind::Host { children, .. }
                | HandleKind::Portal { children, .. }
                | HandleKind::Fragment { children },
                Some(key),
            ) => {
                children.insert(key.clone(), child);
            }
            (HandleKind::Function { child: slot } | HandleKind::Stateful { child: slot, .. }, _) => {
                *slot = Some(child);
            }
            _ => {}
        }
    }

    /// Forgets `child` if it is still recorded at `key`.
    pub fn detach_child(&mut self, key: Option<&ChildKey>, child: HandleId) {
        match (&mut self.kind, key) {
            (
                HandleKind::Host { children, .. }
                | HandleKind::Portal { children, .. }
                | HandleKind::Fragment { children },
                Some(key),
            ) => {
                if children.get(key) == Some(&child) {
                    children.shift_remove(key);
                }
            }
            (HandleKind::Function { child: slot } | HandleKind::Stateful { child: slot, .. }, _) => {
                if *slot == Some(child) {
                    *slot = None;
                }
            }
            _ => {}
        }
    }

    pub fn child_ids(&self) -> Vec<HandleId> {
        match &self.kind {
            HandleKind::Host { children, .. }
            | HandleKind::Portal { children, .. }
            | HandleKind::Fragment { children } => children.values().copied().collect(),
            HandleKind::Function { child } | HandleKind::Stateful { child, .. } => {
                child.iter().copied().collect()
            }
        }
    }

    pub fn snapshot(&self, id: HandleId) -> HandleSnapshot {
        HandleSnapshot {
            id,
            kind: self.kind.tag(),
            element: self.element.clone(),
            key: self.key.clone(),
            host_parent: self.host_parent,
            host_node: self.host_node(),
            owner: self.owner,
            depth: self.depth,
            children: self.child_ids(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandleKindTag {
    Host,
    Portal,
    Fragment,
    Function,
    Stateful,
}

/// Read-only copy of a handle record.
#[derive(Clone, Debug)]
pub struct HandleSnapshot {
    pub id: HandleId,
    pub kind: HandleKindTag,
    pub element: Element,
    pub key: Option<ChildKey>,
    pub host_parent: Option<HostNodeId>,
    pub host_node: Option<HostNodeId>,
    pub owner: Option<HandleId>,
    pub depth: usize,
    pub children: Vec<HandleId>,
}

#[derive(Default)]
pub(crate) struct HandleArena {
    records: HashMap<HandleId, HandleRecord>,
    next_id: HandleId,
}

impl HandleArena {
    pub fn insert(&mut self, record: HandleRecord) -> HandleId {
        self.next_id += 1;
        let id = self.next_id;
        self.records.insert(id, record);
        id
    }

    pub fn get(&self, id: HandleId) -> Option<&HandleRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut HandleRecord> {
        self.records.get_mut(&id)
    }

    pub fn remove(&mut self, id: HandleId) -> Option<HandleRecord> {
        self.records.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
