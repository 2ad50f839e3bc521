//! Interface to the host platform's object model.
//!
//! The reconciler never touches host objects directly; it goes through a
//! [`HostPlatform`] implementation, the way compose's composer goes through
//! an `Applier`.

use std::rc::Rc;

use thiserror::Error;

use crate::props::PropValue;

pub type HostNodeId = usize;
pub type SubscriptionId = u64;

/// Listener the host invokes when a subscribed event or change fires.
pub type HostListener = Rc<dyn Fn(HostNodeId, &[PropValue])>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("unknown host class `{0}`")]
    UnknownClass(Rc<str>),
    #[error("host node {0} does not exist")]
    UnknownNode(HostNodeId),
    #[error("`{class}` has no property `{key}`")]
    UnknownProperty { class: Rc<str>, key: Rc<str> },
    #[error("`{class}` rejected `{key}`: {reason}")]
    PropertyRejected {
        class: Rc<str>,
        key: Rc<str>,
        reason: String,
    },
    #[error("`{class}` has no event `{event}`")]
    UnknownEvent { class: Rc<str>, event: Rc<str> },
    #[error("cannot parent node {node} to {parent}")]
    InvalidParent {
        node: HostNodeId,
        parent: HostNodeId,
    },
}

/// The host object model the reconciler drives.
///
/// Implementations must not invoke listeners from inside these methods.
/// Events are delivered later, on the host's own turn, after the call that
/// caused them has returned.
pub trait HostPlatform {
    fn create(&mut self, class: &str) -> Result<HostNodeId, HostError>;

    fn class_of(&self, node: HostNodeId) -> Result<Rc<str>, HostError>;

    fn set_property(
        &mut self,
        node: HostNodeId,
        key: &str,
        value: &PropValue,
    ) -> Result<(), HostError>;

    /// Default value of `key` on a freshly created `class` node, if known.
    fn default_value(&self, class: &str, key: &str) -> Option<PropValue>;

    fn set_parent(&mut self, node: HostNodeId, parent: Option<HostNodeId>)
        -> Result<(), HostError>;

    fn destroy(&mut self, node: HostNodeId) -> Result<(), HostError>;

    fn subscribe_event(
        &mut self,
        node: HostNodeId,
        event: &str,
        listener: HostListener,
    ) -> Result<SubscriptionId, HostError>;

    /// Listeners receive the property's new value as their only argument.
    fn subscribe_property_change(
        &mut self,
        node: HostNodeId,
        property: &str,
        listener: HostListener,
    ) -> Result<SubscriptionId, HostError>;

    fn cancel(&mut self, subscription: SubscriptionId);
}
