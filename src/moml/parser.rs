//! Parse entry points.
//!
//! [`MomlParser`] owns a [`ParserConfig`] and the per-session settings
//! (context, toplevel, undoable) and runs one [`DocumentHandler`] per
//! call. A parse either builds a new toplevel or, with a context set,
//! edits the model the context belongs to.
//!
//! ```text
//! parse_str / parse_file ─► DocumentHandler::parse ─► Ok(Some(top))
//!                                                  ├► Ok(None)     cancelled
//!                                                  └► Err(..)      failed
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use super::config::ParserConfig;
use super::error::MomlResult;
use super::handler::DocumentHandler;
use super::library::MomlLibraryLoader;
use super::resolve::resolve;
use crate::kernel::{ObjId, SharedWorkspace, Workspace};

/// What the last parse noticed besides its result.
#[derive(Default, Debug, Clone)]
pub struct ParseReport {
    /// Element names that were not recognized, each listed once.
    pub unrecognized: Vec<String>,
    /// Class references that could not be resolved.
    pub missing_classes: Vec<String>,
    /// Whether a filter rewrote any attribute value.
    pub modified: bool,
}

#[derive(Debug, Default)]
pub struct MomlParser {
    config: ParserConfig,
    context: Option<ObjId>,
    toplevel: Option<ObjId>,
    undoable: bool,
    report: ParseReport,
}

impl MomlParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse subsequent documents inside `context` instead of creating a
    /// new toplevel.
    pub fn set_context(&mut self, ws: &Workspace, context: Option<ObjId>) {
        self.context = context;
        self.toplevel = context.map(|c| ws.toplevel(c));
    }

    pub fn context(&self) -> Option<ObjId> {
        self.context
    }

    /// Reuse `toplevel` when a context-free document's outer entity has
    /// its name.
    pub fn set_toplevel(&mut self, toplevel: Option<ObjId>) {
        self.toplevel = toplevel;
    }

    /// The toplevel of the last parse, or the one set explicitly.
    pub fn toplevel(&self) -> Option<ObjId> {
        self.toplevel
    }

    /// Whether parses in a context record undo entries.
    pub fn set_undoable(&mut self, undoable: bool) {
        self.undoable = undoable;
    }

    pub fn is_undoable(&self) -> bool {
        self.undoable
    }

    /// Forget the context, toplevel and last report.
    pub fn reset(&mut self) {
        self.context = None;
        self.toplevel = None;
        self.report = ParseReport::default();
    }

    /// The report of the last parse.
    pub fn report(&self) -> &ParseReport {
        &self.report
    }

    // ── Entry points ─────────────────────────────────────────────────

    /// Parse a document with no base location.
    pub fn parse_str(&mut self, ws: &mut Workspace, text: &str) -> MomlResult<Option<ObjId>> {
        self.parse_with_base(ws, None, text)
    }

    /// Parse a document whose relative references resolve against `base`.
    /// `Ok(None)` means the error handler cancelled the parse.
    pub fn parse_with_base(&mut self, ws: &mut Workspace, base: Option<&str>, text: &str) -> MomlResult<Option<ObjId>> {
        if !ws.has_library_loader() {
            ws.set_library_loader(Arc::new(MomlLibraryLoader::new(self.config.clone())));
        }
        if let Some(handler) = self.config.error_handler() {
            handler.enable_error_skipping(true);
        }
        debug!(base = base.unwrap_or("<string>"), context = ?self.context, "parsing MoML");

        let mut handler = DocumentHandler::new(ws, &self.config, self.context, base.map(str::to_string), self.undoable);
        if self.context.is_none() {
            handler.toplevel = self.toplevel;
        }
        let result = handler.parse(text);
        let toplevel = handler.toplevel;
        self.report = handler.into_report();
        if let Ok(Some(top)) = &result {
            self.toplevel = Some(*top);
        } else if toplevel.is_some() {
            self.toplevel = toplevel;
        }
        trace!(report = ?self.report, "parse finished");
        result
    }

    /// Parse the file at `path`.
    pub fn parse_file(&mut self, ws: &mut Workspace, path: impl AsRef<Path>) -> MomlResult<Option<ObjId>> {
        let location = path.as_ref().to_string_lossy().into_owned();
        let text = self.config.loader().read(&location)?;
        self.parse_with_base(ws, Some(&location), &text)
    }

    /// Like [`parse_file`](Self::parse_file), but a file parsed before by
    /// this configuration is returned without reading it again.
    pub fn parse_file_cached(&mut self, ws: &mut Workspace, path: impl AsRef<Path>) -> MomlResult<Option<ObjId>> {
        let reference = path.as_ref().to_string_lossy().into_owned();
        let resolved = resolve(&self.config, None, &reference)?;
        if let Some(cached) = self.config.import_cache().get(ws, &resolved.location) {
            debug!(location = %resolved.location, "document found in import cache");
            self.toplevel = Some(cached);
            return Ok(Some(cached));
        }
        let result = self.parse_with_base(ws, Some(&resolved.location), &resolved.text)?;
        if let Some(top) = result {
            self.config.import_cache().insert(ws, &resolved.location, top);
        }
        Ok(result)
    }

    /// Parse under the workspace's write guard.
    pub fn parse_shared(&mut self, ws: &SharedWorkspace, text: &str) -> MomlResult<Option<ObjId>> {
        let mut guard = ws.write();
        self.parse_str(&mut guard, text)
    }
}
