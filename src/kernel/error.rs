//! Error types for object graph operations.

use thiserror::Error;

/// Errors raised by [`Workspace`](super::Workspace) operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    /// A named object does not exist.
    #[error("No {kind} named \"{name}\" in {context}")]
    NotFound {
        kind: &'static str,
        name: String,
        context: String,
    },

    /// An id refers to an object that has been removed.
    #[error("Object {0} no longer exists")]
    Stale(String),

    /// A sibling of the same category already has this name.
    #[error("Name collision: {container} already contains a {kind} named \"{name}\"")]
    NameCollision {
        kind: &'static str,
        name: String,
        container: String,
    },

    /// Names may not be empty or contain a period.
    #[error("Invalid name \"{0}\"")]
    InvalidName(String),

    /// The object graph does not allow the requested change.
    #[error("Illegal action on {object}: {message}")]
    IllegalAction { object: String, message: String },

    /// A derived object already holds the name being introduced.
    #[error("Cannot create {name}: a derived object {existing} would collide")]
    DerivedCollision { name: String, existing: String },

    /// The container cannot hold an object of this kind.
    #[error("{container} cannot contain a {kind}")]
    Incompatible {
        container: String,
        kind: &'static str,
    },

    /// No registered type matches the class name.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Lazy population of a library failed.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The object does not carry a value.
    #[error("{0} is not settable")]
    NotSettable(String),

    /// A queued change request failed.
    #[error("Change request \"{description}\" failed: {message}")]
    ChangeFailed {
        description: String,
        message: String,
    },
}

impl KernelError {
    /// Create a not-found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
            context: context.into(),
        }
    }

    /// Create an illegal action error.
    pub fn illegal(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IllegalAction {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a name collision error.
    pub fn collision(kind: &'static str, name: impl Into<String>, container: impl Into<String>) -> Self {
        Self::NameCollision {
            kind,
            name: name.into(),
            container: container.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
