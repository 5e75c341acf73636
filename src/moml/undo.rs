//! Undo and redo.
//!
//! Every undoable parse leaves one [`UndoEntry`] on its model's stack.
//! Undoing parses that entry with undo recording switched on, so the
//! parse produces the inverse again, and the stack's mode routes that
//! inverse onto the redo list. Redo is the same with the lists swapped.
//!
//! An entry may carry steps for other models (`aux`). They run after the
//! main step; the recorded inverse runs them in reverse.

use tracing::{debug, warn};

use super::config::ParserConfig;
use super::error::MomlResult;
use super::handler::DocumentHandler;
use crate::kernel::{ObjId, UndoEntry, UndoMode, UndoStack, Workspace};

/// Undo the last edit of the model containing `context`. Returns whether
/// there was anything to undo.
pub fn undo(ws: &mut Workspace, config: &ParserConfig, context: ObjId) -> MomlResult<bool> {
    let Some(entry) = ws.undo_stack_mut(context).pop_undo() else {
        return Ok(false);
    };
    debug!(model = %ws.full_name(ws.toplevel(context)), "undo");
    apply(ws, config, context, entry, UndoMode::Undoing)?;
    Ok(true)
}

/// Redo the last undone edit of the model containing `context`.
pub fn redo(ws: &mut Workspace, config: &ParserConfig, context: ObjId) -> MomlResult<bool> {
    let Some(entry) = ws.undo_stack_mut(context).pop_redo() else {
        return Ok(false);
    };
    debug!(model = %ws.full_name(ws.toplevel(context)), "redo");
    apply(ws, config, context, entry, UndoMode::Redoing)?;
    Ok(true)
}

fn apply(ws: &mut Workspace, config: &ParserConfig, home: ObjId, entry: UndoEntry, mode: UndoMode) -> MomlResult<()> {
    let UndoEntry { context, moml, aux } = entry;
    let steps = std::iter::once(UndoEntry::new(context, moml)).chain(aux);

    let mut groups = Vec::new();
    for step in steps {
        if !ws.contains(step.context) {
            warn!(context = ?step.context, "undo step refers to a removed model");
            continue;
        }
        if let Some(inverse) = replay(ws, config, &step, mode)? {
            groups.push(inverse);
        }
    }

    let mut sequence = groups.into_iter().rev().flat_map(|mut inverse| {
        let aux = std::mem::take(&mut inverse.aux);
        std::iter::once(inverse).chain(aux)
    });
    let Some(first) = sequence.next() else {
        return Ok(());
    };
    let inverse = first.with_aux(sequence.collect());

    let stack = ws.undo_stack_mut(home);
    let previous = stack.set_mode(mode);
    stack.push(inverse);
    stack.set_mode(previous);
    Ok(())
}

/// Parse one step and take back the inverse it recorded.
fn replay(ws: &mut Workspace, config: &ParserConfig, step: &UndoEntry, mode: UndoMode) -> MomlResult<Option<UndoEntry>> {
    let stack = ws.undo_stack_mut(step.context);
    let before = recorded(stack, mode);
    let previous = stack.set_mode(mode);

    let mut handler = DocumentHandler::new(ws, config, Some(step.context), None, true);
    let result = handler.parse(&step.moml);

    let stack = ws.undo_stack_mut(step.context);
    stack.set_mode(previous);
    result?;
    if recorded(stack, mode) > before {
        Ok(take_recorded(stack, mode))
    } else {
        Ok(None)
    }
}

fn recorded(stack: &UndoStack, mode: UndoMode) -> usize {
    match mode {
        UndoMode::Undoing => stack.redo_len(),
        _ => stack.undo_len(),
    }
}

fn take_recorded(stack: &mut UndoStack, mode: UndoMode) -> Option<UndoEntry> {
    match mode {
        UndoMode::Undoing => stack.pop_redo(),
        _ => stack.pop_undo(),
    }
}
