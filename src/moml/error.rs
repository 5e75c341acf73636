//! Error types for MoML parsing and the pluggable error handler.

use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

use crate::base::Position;
use crate::kernel::{KernelError, ObjId};

/// Where in a document an element started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// Document the element came from, if known.
    pub source: Option<String>,
    pub position: Position,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{source}:{}", self.position),
            None => write!(f, "{}", self.position),
        }
    }
}

/// Errors produced while reading or writing MoML.
#[derive(Debug, Error)]
pub enum MomlError {
    /// The document is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(String),

    /// An element could not be applied to the model.
    #[error("{message}\nin {element}\nat {location}")]
    Structural {
        message: String,
        element: String,
        location: SourceLocation,
    },

    /// Classes that could not be resolved. Everything else was loaded.
    #[error("Missing classes: {}", classes.join(", "))]
    MissingClasses {
        classes: Vec<String>,
        toplevel: Option<ObjId>,
    },

    /// The DOCTYPE names some other document type.
    #[error("Not a MoML document: {0}")]
    NotMoml(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A class, source or input reference could not be located.
    #[error("Cannot resolve {0}")]
    Unresolved(String),

    /// Remote content was refused.
    #[error("Remote source not approved: {0}")]
    RemoteNotApproved(String),

    /// The error handler cancelled the parse.
    #[error("Parse cancelled")]
    Cancelled,
}

impl MomlError {
    /// Create an XML error.
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml(message.into())
    }

    /// Create a structural error without location; the handler fills in
    /// the element and location.
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
            element: String::new(),
            location: SourceLocation::default(),
        }
    }

    /// Create a missing attribute error.
    pub fn missing_attribute(element: &str, attribute: &str) -> Self {
        Self::structural(format!("Element \"{element}\" requires attribute \"{attribute}\""))
    }

    /// Whether the error should bypass the error handler.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Xml(_) | Self::NotMoml(_))
    }
}

pub type MomlResult<T> = Result<T, MomlError>;

// ============================================================================
// ERROR HANDLER
// ============================================================================

/// What to do about an error raised by one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponse {
    /// Skip the element and its children, keep parsing.
    Continue,
    /// Abandon the parse. The parse entry point returns `Ok(None)`.
    Cancel,
    /// Fail the parse with this error.
    Throw,
}

/// Decides per element how parse errors are handled.
pub trait ErrorHandler: Send + Sync {
    /// `element` is the offending element's text, `context` the full name
    /// of the object it was applied to.
    fn handle(&self, element: &str, context: Option<&str>, error: &MomlError) -> ErrorResponse;

    /// Called when a new top-level parse starts.
    fn enable_error_skipping(&self, _enable: bool) {}
}

/// Records every error and continues.
#[derive(Debug, Default)]
pub struct CollectingErrorHandler {
    errors: Mutex<Vec<String>>,
}

impl CollectingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}

impl ErrorHandler for CollectingErrorHandler {
    fn handle(&self, _element: &str, _context: Option<&str>, error: &MomlError) -> ErrorResponse {
        self.errors.lock().push(error.to_string());
        ErrorResponse::Continue
    }
}
