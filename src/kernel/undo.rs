//! Per-model undo and redo stacks.
//!
//! Entries hold MoML text plus the context it must be parsed in. Applying
//! an entry produces its own inverse, which lands on the opposite stack;
//! the stack's [`UndoMode`] says which one.

use super::{ObjId, Workspace};

/// One undoable step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoEntry {
    /// Object the MoML is evaluated relative to.
    pub context: ObjId,
    pub moml: String,
    /// Steps that belong to other models but undo together with this one.
    pub aux: Vec<UndoEntry>,
}

impl UndoEntry {
    pub fn new(context: ObjId, moml: impl Into<String>) -> Self {
        Self {
            context,
            moml: moml.into(),
            aux: Vec::new(),
        }
    }

    pub fn with_aux(mut self, aux: Vec<UndoEntry>) -> Self {
        self.aux = aux;
        self
    }
}

/// Where newly pushed entries go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UndoMode {
    /// Ordinary edit: push onto undo and clear redo.
    #[default]
    Normal,
    /// Applying an undo entry: its inverse goes onto redo.
    Undoing,
    /// Applying a redo entry: its inverse goes onto undo.
    Redoing,
}

#[derive(Clone, Debug, Default)]
pub struct UndoStack {
    undo: Vec<UndoEntry>,
    redo: Vec<UndoEntry>,
    mode: UndoMode,
}

impl UndoStack {
    pub fn push(&mut self, entry: UndoEntry) {
        match self.mode {
            UndoMode::Normal => {
                self.undo.push(entry);
                self.redo.clear();
            }
            UndoMode::Undoing => self.redo.push(entry),
            UndoMode::Redoing => self.undo.push(entry),
        }
    }

    pub fn pop_undo(&mut self) -> Option<UndoEntry> {
        self.undo.pop()
    }

    pub fn pop_redo(&mut self) -> Option<UndoEntry> {
        self.redo.pop()
    }

    pub fn peek_undo(&self) -> Option<&UndoEntry> {
        self.undo.last()
    }

    pub fn peek_redo(&self) -> Option<&UndoEntry> {
        self.redo.last()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn mode(&self) -> UndoMode {
        self.mode
    }

    /// Set the mode and return the previous one.
    pub fn set_mode(&mut self, mode: UndoMode) -> UndoMode {
        std::mem::replace(&mut self.mode, mode)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl Workspace {
    /// The undo stack of the model containing `context`, if one exists.
    pub fn undo_stack(&self, context: ObjId) -> Option<&UndoStack> {
        self.undo_stacks.get(&self.toplevel(context))
    }

    /// The undo stack of the model containing `context`, created on demand.
    pub fn undo_stack_mut(&mut self, context: ObjId) -> &mut UndoStack {
        let top = self.toplevel(context);
        self.undo_stacks.entry(top).or_default()
    }
}
