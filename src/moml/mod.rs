//! MoML reading and writing.
//!
//! ```text
//! parser    → MomlParser entry points, ParseReport
//!   ↓
//! handler   → quick-xml events → element callbacks, undo contexts
//!   ├── elements  → entity/port/property/... handlers
//!   ├── classes   → class resolution, external class documents
//!   └── deferred  → link/unlink/delete run at element end
//!   ↓
//! writer    → export back to MoML
//! undo      → replaying undo/redo entries
//! change    → MoML fragments as change requests
//! library   → lazy entity library population
//! ```

mod change;
mod classes;
mod config;
mod context;
mod deferred;
mod elements;
mod error;
mod expr;
mod filter;
mod handler;
mod library;
mod parser;
mod resolve;
mod undo;
mod writer;

pub use change::MomlChangeRequest;
pub use config::{IconLoader, ParserConfig, ParserConfigBuilder};
pub use error::{CollectingErrorHandler, ErrorHandler, ErrorResponse, MomlError, MomlResult, SourceLocation};
pub use expr::{ExpressionEvaluator, SimpleEvaluator};
pub use filter::{ClassChanges, MomlFilter, RemoveClasses};
pub use library::MomlLibraryLoader;
pub use parser::{MomlParser, ParseReport};
pub use resolve::{AllowRemote, DenyRemote, FileLoader, ImportCache, RemoteApproval, ResourceLoader, Resolved, resolve};
pub use undo::{redo, undo};
pub use writer::{export_document, export_moml, export_shared};
