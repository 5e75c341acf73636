//! Change requests and per-model deferral.
//!
//! Edits that arrive while a model is busy (for example while a document
//! is being parsed into it) are queued on the model's toplevel and run in
//! one batch later. Listeners registered on the toplevel hear about every
//! executed or failed request.

use std::sync::Arc;

use tracing::{debug, warn};

use super::error::{KernelError, KernelResult};
use super::{ObjId, Workspace};

type ChangeAction = Box<dyn FnOnce(&mut Workspace) -> KernelResult<()> + Send + Sync>;

/// A deferred mutation of the object graph.
pub struct ChangeRequest {
    description: String,
    action: ChangeAction,
}

impl ChangeRequest {
    pub fn new(
        description: impl Into<String>,
        action: impl FnOnce(&mut Workspace) -> KernelResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            action: Box::new(action),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn execute(self, ws: &mut Workspace) -> KernelResult<()> {
        (self.action)(ws)
    }
}

impl std::fmt::Debug for ChangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeRequest")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Observer of executed change requests.
pub trait ChangeListener: Send + Sync {
    fn change_executed(&self, description: &str);
    fn change_failed(&self, description: &str, error: &KernelError);
}

#[derive(Default)]
pub(crate) struct ChangeQueue {
    deferring: bool,
    pending: Vec<ChangeRequest>,
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl Workspace {
    /// Run `request` against the model containing `context`, or queue it
    /// if that model is deferring change requests.
    pub fn request_change(&mut self, context: ObjId, request: ChangeRequest) -> KernelResult<()> {
        let top = self.toplevel(context);
        let queue = self.changes.entry(top).or_default();
        if queue.deferring {
            debug!(request = %request.description, "change request deferred");
            queue.pending.push(request);
            return Ok(());
        }
        self.run_request(top, request)
    }

    fn run_request(&mut self, top: ObjId, request: ChangeRequest) -> KernelResult<()> {
        let description = request.description.clone();
        let listeners = self
            .changes
            .get(&top)
            .map(|q| q.listeners.clone())
            .unwrap_or_default();
        let result = request.execute(self);
        match &result {
            Ok(()) => listeners.iter().for_each(|l| l.change_executed(&description)),
            Err(e) => {
                warn!(request = %description, error = %e, "change request failed");
                listeners.iter().for_each(|l| l.change_failed(&description, e));
            }
        }
        result
    }

    pub fn is_deferring_change_requests(&self, context: ObjId) -> bool {
        let top = self.toplevel(context);
        self.changes.get(&top).is_some_and(|q| q.deferring)
    }

    /// Turn deferral on or off for the model containing `context` and
    /// return the previous setting. Queued requests are not run here; see
    /// [`execute_change_requests`](Self::execute_change_requests).
    pub fn set_deferring_change_requests(&mut self, context: ObjId, defer: bool) -> bool {
        let top = self.toplevel(context);
        let queue = self.changes.entry(top).or_default();
        std::mem::replace(&mut queue.deferring, defer)
    }

    /// Run every queued request of the model containing `context`. All
    /// requests run even if one fails; the first failure is returned.
    pub fn execute_change_requests(&mut self, context: ObjId) -> KernelResult<()> {
        let top = self.toplevel(context);
        let pending = match self.changes.get_mut(&top) {
            Some(queue) => std::mem::take(&mut queue.pending),
            None => return Ok(()),
        };
        let mut first_error = None;
        for request in pending {
            let description = request.description.clone();
            if let Err(e) = self.run_request(top, request) {
                first_error.get_or_insert(KernelError::ChangeFailed {
                    description,
                    message: e.to_string(),
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn pending_change_count(&self, context: ObjId) -> usize {
        let top = self.toplevel(context);
        self.changes.get(&top).map_or(0, |q| q.pending.len())
    }

    pub fn add_change_listener(&mut self, context: ObjId, listener: Arc<dyn ChangeListener>) {
        let top = self.toplevel(context);
        self.changes.entry(top).or_default().listeners.push(listener);
    }
}
