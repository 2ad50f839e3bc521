#![doc = r"Retained-mode UI reconciler: keeps a tree of host objects in step with declarative element trees."]

mod collections;

pub mod component;
pub mod config;
pub mod context;
pub mod element;
pub mod error;
pub mod events;
pub mod handle;
pub mod host;
pub mod lifecycle;
pub mod markers;
pub mod memory;
pub mod props;
pub mod reconciler;
pub mod stack;

pub use component::{
    ComponentDef, ComponentDefinition, ComponentInstance, LifecycleScope, LifecycleStep,
    UpdateRequester,
};
pub use config::ReconcilerConfig;
pub use context::Context;
pub use element::{ChildKey, Children, Element, ElementKind, FunctionComponent, Renderable, PORTAL_TARGET};
pub use error::{ComponentError, LifecycleError, ReconcileError};
pub use events::{EventManager, EventStatus};
pub use handle::{HandleId, HandleKindTag, HandleSnapshot};
pub use host::{HostError, HostListener, HostNodeId, HostPlatform, SubscriptionId};
pub use lifecycle::{Component, InitContext, LifecyclePhase, StatefulDefinition, Updater};
pub use markers::{Marker, MarkerKind, Symbol};
pub use memory::{ClassSchema, HostOp, MemoryHost, PropertySpec, PropertyView};
pub use props::{create_ref, Callback, PropKey, PropValue, Props, Ref, RefBox, ValueKind};
pub use reconciler::Reconciler;
pub use stack::{DrainReport, WorkStack};
