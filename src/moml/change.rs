//! MoML edits delivered as change requests.
//!
//! A [`MomlChangeRequest`] is a fragment of MoML plus the object it is
//! evaluated in. Submitted through [`Workspace::request_change`], it runs
//! at once or waits until the model stops deferring requests.

use tracing::debug;

use super::config::ParserConfig;
use super::error::MomlResult;
use super::handler::DocumentHandler;
use crate::kernel::{ChangeRequest, KernelError, KernelResult, ObjId, Workspace};

#[derive(Debug, Clone)]
pub struct MomlChangeRequest {
    context: ObjId,
    text: String,
    undoable: bool,
    base: Option<String>,
    config: ParserConfig,
}

impl MomlChangeRequest {
    pub fn new(context: ObjId, text: impl Into<String>) -> Self {
        Self {
            context,
            text: text.into(),
            undoable: false,
            base: None,
            config: ParserConfig::default(),
        }
    }

    /// Record an undo entry when the change runs.
    pub fn with_undoable(mut self, undoable: bool) -> Self {
        self.undoable = undoable;
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context(&self) -> ObjId {
        self.context
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parse the fragment in its context now.
    pub fn execute(&self, ws: &mut Workspace) -> MomlResult<Option<ObjId>> {
        debug!(context = %ws.full_name(self.context), undoable = self.undoable, "executing MoML change");
        let mut handler = DocumentHandler::new(ws, &self.config, Some(self.context), self.base.clone(), self.undoable);
        handler.parse(&self.text)
    }

    /// Wrap as a kernel change request.
    pub fn into_request(self) -> ChangeRequest {
        let description = self.text.clone();
        ChangeRequest::new(description.clone(), move |ws| {
            self.execute(ws)
                .map(|_| ())
                .map_err(|e| KernelError::ChangeFailed {
                    description,
                    message: e.to_string(),
                })
        })
    }

    /// Hand the change to the model, which may queue it.
    pub fn submit(self, ws: &mut Workspace) -> KernelResult<()> {
        let context = self.context;
        ws.request_change(context, self.into_request())
    }
}
