//! Per-element parse state.
//!
//! Every open element has a [`Frame`] on the handler's stack:
//!
//! ```text
//! Frame
//! ├── saved_current   object to restore as the cursor on close
//! ├── scope           queued links and deletes (entity, class, group)
//! └── undo            inverse MoML of this element and its children
//! ```
//!
//! Naming scopes opened by `group` live on a separate stack of
//! [`Namespace`]s.

use indexmap::IndexMap;
use quick_xml::escape::escape;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::error::SourceLocation;
use crate::kernel::{ObjId, Workspace};

// ============================================================================
// FRAMES
// ============================================================================

/// What closing an element has to do beyond the generic bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Plain,
    /// Raw body goes to `target` as configuration.
    Configure {
        target: ObjId,
        source: Option<String>,
    },
    /// Raw body becomes the documentation attribute `name` of `target`.
    Doc { target: ObjId, name: String },
    /// Unnamed or named group; links queued inside run on close.
    Group,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub element: SmolStr,
    pub kind: FrameKind,
    pub saved_current: Option<ObjId>,
    /// Object the element created or selected, handed to end filters.
    pub object: Option<ObjId>,
    pub namespace_pushed: bool,
    pub scope: Option<DeferredScope>,
    pub undo: UndoContext,
    /// Start tag as written, for error reports.
    pub text: String,
    pub location: SourceLocation,
}

impl Frame {
    pub fn new(element: &str, saved_current: Option<ObjId>, text: String, location: SourceLocation) -> Self {
        Self {
            element: SmolStr::new(element),
            kind: FrameKind::Plain,
            saved_current,
            object: None,
            namespace_pushed: false,
            scope: None,
            undo: UndoContext::default(),
            text,
            location,
        }
    }
}

// ============================================================================
// DEFERRED REQUESTS
// ============================================================================

/// A `link`, `unlink` or `delete*` element held back until its scope
/// closes, so that everything it names has been created.
#[derive(Debug, Clone)]
pub(crate) struct Deferred {
    pub element: SmolStr,
    /// Attribute values after filtering and name translation.
    pub attrs: IndexMap<String, String>,
    pub context: ObjId,
    pub text: String,
    pub location: SourceLocation,
}

#[derive(Debug, Default)]
pub(crate) struct DeferredScope {
    pub links: Vec<Deferred>,
    pub deletes: Vec<Deferred>,
}

// ============================================================================
// UNDO
// ============================================================================

/// Opening tag wrapped around the undo of an element's children, such as
/// `<entity name="a">` for an entity that already existed.
#[derive(Debug, Clone)]
pub(crate) struct UndoOpen {
    pub tag: &'static str,
    pub object: ObjId,
    /// Object the name is written relative to.
    pub context: Option<ObjId>,
    pub attrs: Vec<(&'static str, String)>,
    /// Written even when no child contributed undo, because the tag
    /// itself restores something (an old property value).
    pub essential: bool,
}

impl UndoOpen {
    pub fn new(tag: &'static str, object: ObjId, context: Option<ObjId>) -> Self {
        Self {
            tag,
            object,
            context,
            attrs: Vec::new(),
            essential: false,
        }
    }

    pub fn with_attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((key, value.into()));
        self.essential = true;
        self
    }

    /// Name the object has now, relative to the undo context.
    fn name(&self, ws: &Workspace) -> String {
        match self.context {
            Some(context) if context != self.object && ws.deep_contains(context, self.object) => {
                ws.relative_name(self.object, context)
            }
            _ => ws.full_name(self.object),
        }
    }
}

/// Inverse MoML collected while an element is open.
#[derive(Debug, Default)]
pub(crate) struct UndoContext {
    pub open: Option<UndoOpen>,
    /// Fragments undoing what the element itself did.
    pub own: Vec<String>,
    /// Rendered undo of child elements, in the order they closed.
    pub children: Vec<String>,
    /// The element created this object; deleting it undoes every child
    /// as well. `tag` is the delete element to write.
    pub created: Option<UndoOpen>,
}

impl UndoContext {
    /// Children are undone last-first, then the element's own change.
    pub fn render(&self, ws: &Workspace) -> String {
        if let Some(created) = &self.created {
            if !ws.contains(created.object) {
                return String::new();
            }
            return empty_element(created.tag, &created.name(ws));
        }
        let mut body = String::new();
        for child in self.children.iter().rev() {
            body.push_str(child);
        }
        for own in &self.own {
            body.push_str(own);
        }
        let Some(open) = self.open.as_ref() else {
            return body;
        };
        if body.is_empty() && !open.essential {
            return body;
        }
        let mut out = format!("<{} name=\"{}\"", open.tag, escape(open.name(ws).as_str()));
        for (key, value) in &open.attrs {
            out.push_str(&format!(" {key}=\"{}\"", escape(value.as_str())));
        }
        out.push('>');
        out.push_str(&body);
        out.push_str(&format!("</{}>", open.tag));
        out
    }
}

/// `<tag name="..."/>` with the name escaped.
pub(crate) fn empty_element(tag: &str, name: &str) -> String {
    format!("<{tag} name=\"{}\"/>", escape(name))
}

// ============================================================================
// NAMESPACES
// ============================================================================

/// Naming scope opened by `group`.
///
/// In an `auto` namespace the first occurrence of a name is mapped to a
/// name unused in the container and later references follow the mapping,
/// so a pasted fragment never collides with what is already there.
#[derive(Debug, Default)]
pub(crate) struct Namespace {
    pub owner: Option<ObjId>,
    pub auto: bool,
    pub table: FxHashMap<String, String>,
}

impl Namespace {
    pub fn new(owner: Option<ObjId>, auto: bool) -> Self {
        Self {
            owner,
            auto,
            table: FxHashMap::default(),
        }
    }

    /// Name to create `name` under in `container`.
    pub fn translate_new(&mut self, ws: &Workspace, container: ObjId, name: &str) -> String {
        if let Some(mapped) = self.table.get(name) {
            return mapped.clone();
        }
        let fresh = if ws.has_child_named(container, name) {
            ws.unique_name(container, name)
        } else {
            name.to_string()
        };
        self.table.insert(name.to_string(), fresh.clone());
        fresh
    }

    /// Map the first segment of a dotted reference.
    pub fn translate_reference(&self, reference: &str) -> String {
        let (head, rest) = match reference.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (reference, None),
        };
        match (self.table.get(head), rest) {
            (Some(mapped), Some(rest)) => format!("{mapped}.{rest}"),
            (Some(mapped), None) => mapped.clone(),
            (None, _) => reference.to_string(),
        }
    }
}
