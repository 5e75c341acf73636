//! # moml-base
//!
//! Parser, writer and undo machinery for MoML, the XML modeling markup of
//! actor-oriented models.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! moml      → MoML parser, writer, undo, libraries, filters
//!   ↓
//! kernel    → Object graph, links, derivation, type registry
//!   ↓
//! base      → Primitives (LineIndex, Position, TextSize)
//! ```

// ============================================================================
// MODULES (dependency order: base → kernel → moml)
// ============================================================================

/// Foundation types: line index and source positions
pub mod base;

/// Object graph the parser builds and edits
pub mod kernel;

/// MoML parsing, export, undo and change requests
pub mod moml;

// Re-export commonly needed items
pub use kernel::{ObjId, SharedWorkspace, Workspace};
pub use moml::{MomlError, MomlParser, MomlResult, ParserConfig, export_moml};

// Re-export foundation types
pub use base::{LineCol, LineIndex, Position, TextSize};
