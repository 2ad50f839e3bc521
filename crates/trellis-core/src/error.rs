use std::panic::Location;
use std::rc::Rc;

use thiserror::Error;

use crate::handle::HandleId;
use crate::host::HostError;
use crate::lifecycle::LifecyclePhase;

/// Error raised by user render code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ComponentError {
    message: String,
}

impl ComponentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("`{component}` requested a state update during {phase}")]
    InvalidUpdate {
        component: &'static str,
        phase: LifecyclePhase,
    },
    #[error("`{component}` re-rendered more than {limit} times in one update cascade")]
    TooManyUpdates {
        component: &'static str,
        limit: usize,
    },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("portal created at {location} needs a host node under the `target` prop")]
    PortalTarget {
        location: &'static Location<'static>,
    },
    #[error("invalid prop key {key} on `{class}` element created at {location}")]
    InvalidPropKey {
        key: String,
        class: Rc<str>,
        location: &'static Location<'static>,
    },
    #[error("{key} on `{class}` element created at {location} must hold a callback")]
    InvalidListener {
        key: String,
        class: Rc<str>,
        location: &'static Location<'static>,
    },
    #[error("`{component}` failed to render")]
    Render {
        component: Rc<str>,
        #[source]
        source: ComponentError,
    },
    #[error("props rejected by `{component}`: {message}")]
    InvalidProps { component: Rc<str>, message: String },
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("{failures} property writes failed on `{class}`")]
    PropertyWrites { class: Rc<str>, failures: usize },
    #[error("handle {0} is not mounted")]
    UnknownHandle(HandleId),
}
