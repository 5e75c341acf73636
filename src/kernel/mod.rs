//! The object graph MoML documents describe.
//!
//! This module provides the concrete model the parser builds and mutates:
//! - [`Workspace`] - Arena owning every node, addressed by [`ObjId`]
//! - [`Node`] - Entities, ports, relations and attributes
//! - Links between ports and relations (`link.rs`)
//! - Instantiation of classes and derivation bookkeeping (`instantiate.rs`,
//!   `derivation.rs`)
//! - [`TypeRegistry`] - Type ids such as `ptolemy.kernel.CompositeEntity`
//! - [`ChangeRequest`] - Deferred edits with per-model queues
//! - [`UndoStack`] - Per-model undo/redo entries
//!
//! This module depends only on `base`.

mod change;
mod derivation;
mod error;
mod id;
mod instantiate;
mod link;
mod node;
mod registry;
mod undo;
mod workspace;

use std::sync::Arc;

use parking_lot::RwLock;

pub use change::{ChangeListener, ChangeRequest};
pub use error::{KernelError, KernelResult};
pub use id::ObjId;
pub use node::{
    AttributeBody, AttributeKind, Body, Category, ConfigureText, EntityBody, EntityKind, LibraryState, NOT_DERIVED,
    Node, NodeKind, PortBody, PortFlags, RelationBody,
};
pub use registry::{
    DEFAULT_ATTRIBUTE_CLASS, DEFAULT_ENTITY_CLASS, DEFAULT_PARAMETER_CLASS, DEFAULT_PORT_CLASS,
    DEFAULT_RELATION_CLASS, DOCUMENTATION_CLASS, LIBRARY_CLASS, TypeRegistry, URI_CLASS, VERTEX_CLASS,
};
pub use undo::{UndoEntry, UndoMode, UndoStack};
pub use workspace::{LIBRARY_MARKER, LibraryLoader, URI_ATTRIBUTE, Workspace};

/// A workspace shared between a mutator and concurrent readers.
pub type SharedWorkspace = Arc<RwLock<Workspace>>;

/// Wrap a workspace for shared access.
pub fn shared(ws: Workspace) -> SharedWorkspace {
    Arc::new(RwLock::new(ws))
}
