//! Execution of `link`, `unlink` and `delete*` elements.
//!
//! These run when their enclosing scope closes (or immediately when there
//! is none) with the cursor set to the object they were written in. Each
//! returns the MoML that reverses it, relative to that object.
//!
//! Deleting is the expensive case. Before anything is removed, the undo
//! captures:
//!
//! ```text
//! <entity name="container">  exported object  </entity>   recreate it
//! <link port=... relation=... insertAt=.../>             restore severed links
//! <property name="..." value="..."/>                      restore overrides
//! ```
//!
//! Overrides living in another model go into separate undo entries that
//! ride along with the main one.

use quick_xml::escape::escape;
use rustc_hash::FxHashSet;
use tracing::debug;

use super::elements::required;
use super::error::{MomlError, MomlResult};
use super::handler::{Attrs, DocumentHandler};
use super::writer::export_moml;
use crate::kernel::{Body, Category, NOT_DERIVED, ObjId, UndoEntry, Workspace};

/// A link that a deletion will sever, recorded for its undo.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SeveredLink {
    port: String,
    relation: String,
    inside: bool,
    index: usize,
}

impl DocumentHandler<'_> {
    pub(crate) fn execute_deferrable(&mut self, element: &str, attrs: &Attrs) -> MomlResult<String> {
        match element {
            "link" => self.execute_link(attrs),
            "unlink" => self.execute_unlink(attrs),
            _ => self.execute_delete(element, attrs),
        }
    }

    // ── link ─────────────────────────────────────────────────────────

    fn execute_link(&mut self, attrs: &Attrs) -> MomlResult<String> {
        let context = self.require_current("link")?;

        if let (Some(first), Some(second)) = (attrs.get("relation1"), attrs.get("relation2")) {
            let a = self.find(context, first, Category::Relation)?;
            let b = self.find(context, second, Category::Relation)?;
            if self.ws.is_inherited_link(a, b) {
                return Err(inherited_link_error(self.ws, a, b));
            }
            self.ws.link_relations(a, b)?;
            self.ws.propagate_relation_link(a, b, true)?;
            return Ok(format!(
                "<unlink relation1=\"{}\" relation2=\"{}\"/>",
                escape(first.as_str()),
                escape(second.as_str())
            ));
        }

        let port_name = required(attrs, "link", "port")?;
        let relation_name = required(attrs, "link", "relation")?;
        let port = self.find(context, port_name, Category::Port)?;
        let relation = self.find(context, relation_name, Category::Relation)?;
        if self.ws.is_inherited_link(port, relation) {
            return Err(inherited_link_error(self.ws, port, relation));
        }
        let inside = self.ws.is_inside_link(port, relation)?;
        let index = link_index(attrs, inside)?;

        self.ws.link(port, relation, index)?;
        self.ws.propagate_link(port, relation, index)?;
        if let Some(vertex) = attrs.get("vertex") {
            let vertex = self.find(relation, vertex, Category::Attribute)?;
            self.ws.set_linked_port(vertex, Some(port))?;
        }

        let slot = index.unwrap_or_else(|| self.ws.link_count(port, inside).saturating_sub(1));
        let index_attr = if inside { "insideIndex" } else { "index" };
        Ok(format!("<unlink port=\"{}\" {index_attr}=\"{slot}\"/>", escape(port_name)))
    }

    // ── unlink ───────────────────────────────────────────────────────

    fn execute_unlink(&mut self, attrs: &Attrs) -> MomlResult<String> {
        let context = self.require_current("unlink")?;

        if let (Some(first), Some(second)) = (attrs.get("relation1"), attrs.get("relation2")) {
            let a = self.find(context, first, Category::Relation)?;
            let b = self.find(context, second, Category::Relation)?;
            if self.ws.is_inherited_link(a, b) {
                return Err(inherited_link_error(self.ws, a, b));
            }
            self.ws.unlink_relations(a, b)?;
            self.ws.propagate_relation_link(a, b, false)?;
            return Ok(format!(
                "<link relation1=\"{}\" relation2=\"{}\"/>",
                escape(first.as_str()),
                escape(second.as_str())
            ));
        }

        let port_name = required(attrs, "unlink", "port")?;
        let port = self.find(context, port_name, Category::Port)?;

        if let Some(relation_name) = attrs.get("relation") {
            let relation = self.find(context, relation_name, Category::Relation)?;
            if self.ws.is_inherited_link(port, relation) {
                return Err(inherited_link_error(self.ws, port, relation));
            }
            let inside = self.ws.is_inside_link(port, relation)?;
            let slots: Vec<usize> = self
                .ws
                .link_slots(port, inside)
                .iter()
                .enumerate()
                .filter(|(_, slot)| **slot == Some(relation))
                .map(|(i, _)| i)
                .collect();
            self.ws.unlink(port, relation)?;
            self.ws.propagate_unlink(port, relation)?;
            let insert_attr = if inside { "insideInsertAt" } else { "insertAt" };
            return Ok(slots
                .into_iter()
                .map(|i| {
                    format!(
                        "<link port=\"{}\" relation=\"{}\" {insert_attr}=\"{i}\"/>",
                        escape(port_name),
                        escape(relation_name.as_str())
                    )
                })
                .collect());
        }

        let (index, inside) = match (attrs.get("index"), attrs.get("insideIndex")) {
            (Some(index), _) => (parse_index("index", index)?, false),
            (None, Some(index)) => (parse_index("insideIndex", index)?, true),
            (None, None) => return Err(MomlError::missing_attribute("unlink", "relation")),
        };
        let held = self.ws.link_slots(port, inside).get(index).copied().flatten();
        if let Some(relation) = held
            && self.ws.is_inherited_link(port, relation)
        {
            return Err(inherited_link_error(self.ws, port, relation));
        }
        if inside {
            self.ws.unlink_inside_index(port, index)?;
        } else {
            self.ws.unlink_index(port, index)?;
        }
        self.ws.propagate_unlink_index(port, index, inside)?;

        let Some(relation) = held else {
            return Ok(String::new());
        };
        let insert_attr = if inside { "insideInsertAt" } else { "insertAt" };
        Ok(format!(
            "<link port=\"{}\" relation=\"{}\" {insert_attr}=\"{index}\"/>",
            escape(port_name),
            escape(self.ws.relative_name(relation, context).as_str())
        ))
    }

    // ── delete* ──────────────────────────────────────────────────────

    fn execute_delete(&mut self, element: &str, attrs: &Attrs) -> MomlResult<String> {
        let context = self.require_current(element)?;
        let name = required(attrs, element, "name")?;
        let category = match element {
            "deleteEntity" => Category::Entity,
            "deletePort" => Category::Port,
            "deleteRelation" => Category::Relation,
            _ => Category::Attribute,
        };
        let target = self.find(context, name, category)?;
        if self.ws.derived_level(target) != NOT_DERIVED {
            return Err(MomlError::structural(format!(
                "Cannot delete {}: it is part of a class definition",
                self.ws.full_name(target)
            )));
        }
        if self.ws.is_class_definition(target) && self.ws.has_live_derived(target) {
            return Err(MomlError::structural(format!(
                "Cannot delete class {}: it has subclasses or instances",
                self.ws.full_name(target)
            )));
        }
        let parameter = match category {
            Category::Port => self.ws.port_parameter(target),
            _ => None,
        };

        let undo = if self.undoable {
            self.delete_undo(target, parameter, context)?
        } else {
            String::new()
        };

        if let Some(parameter) = parameter {
            self.ws.propagate_deletion(parameter)?;
            self.ws.remove(parameter)?;
        }
        let copies = self.ws.propagate_deletion(target)?;
        debug!(object = %self.ws.full_name(target), copies, "deleted");
        self.ws.remove(target)?;
        Ok(undo)
    }

    fn delete_undo(&mut self, target: ObjId, parameter: Option<ObjId>, context: ObjId) -> MomlResult<String> {
        let mut body = String::new();
        if let Some(parameter) = parameter {
            body.push_str(&export_moml(self.ws, parameter, 0)?);
        }
        body.push_str(&export_moml(self.ws, target, 0)?);

        let container = self.ws.container(target);
        let mut undo = match container {
            Some(container) if container != context => {
                let tag = container_tag(self.ws, container);
                format!(
                    "<{tag} name=\"{}\">{body}</{tag}>",
                    escape(self.ws.relative_name(container, context).as_str())
                )
            }
            _ => body,
        };

        let handles_links = container
            .and_then(|c| self.ws.get(c))
            .and_then(|n| n.as_entity())
            .is_some_and(|e| e.handles_internal_links);
        if !handles_links {
            for link in severed_links(self.ws, target, context) {
                let insert_attr = if link.inside { "insideInsertAt" } else { "insertAt" };
                undo.push_str(&format!(
                    "<link port=\"{}\" relation=\"{}\" {insert_attr}=\"{}\"/>",
                    escape(link.port.as_str()),
                    escape(link.relation.as_str()),
                    link.index
                ));
            }
        }

        undo.push_str(&self.override_restores(target, context));
        Ok(undo)
    }

    /// Values overridden in derived copies of `target`, which propagating
    /// the deletion throws away.
    fn override_restores(&mut self, target: ObjId, context: ObjId) -> String {
        let home = self.ws.toplevel(context);
        let mut local = String::new();
        for copy in self.ws.derived_list(target) {
            for attr in self.ws.subtree(copy) {
                if !self.ws.is_overridden(attr) {
                    continue;
                }
                let value = self.ws.expression(attr).unwrap_or_default();
                let top = self.ws.toplevel(attr);
                if top == home && self.ws.deep_contains(context, attr) {
                    local.push_str(&property_restore(&self.ws.relative_name(attr, context), value));
                } else {
                    let moml = property_restore(&self.ws.relative_name(attr, top), value);
                    self.aux_undo.push(UndoEntry::new(top, format!("<group>{moml}</group>")));
                }
            }
        }
        local
    }
}

/// Element name used to re-enter `container` in undo MoML.
fn container_tag(ws: &Workspace, container: ObjId) -> &'static str {
    match ws.get(container).map(|n| n.body()) {
        Some(Body::Entity(e)) if e.class_definition => "class",
        Some(Body::Entity(_)) => "entity",
        Some(Body::Port(_)) => "port",
        Some(Body::Relation(_)) => "relation",
        _ => "property",
    }
}

/// Links between the subtree of `target` and the outside, excluding links
/// implied by a class definition, named relative to `context` and sorted
/// so that re-inserting them in order restores every index.
fn severed_links(ws: &Workspace, target: ObjId, context: ObjId) -> Vec<SeveredLink> {
    let subtree = ws.subtree(target);
    let inside_subtree: FxHashSet<ObjId> = subtree.iter().copied().collect();
    let mut out = Vec::new();
    let mut record = |port: ObjId, relation: ObjId, inside: bool, index: usize| {
        out.push(SeveredLink {
            port: ws.relative_name(port, context),
            relation: ws.relative_name(relation, context),
            inside,
            index,
        });
    };

    for &obj in &subtree {
        match ws.get(obj).map(|n| n.body()) {
            Some(Body::Port(_)) => {
                for inside in [false, true] {
                    for (index, slot) in ws.link_slots(obj, inside).iter().enumerate() {
                        if let Some(relation) = *slot
                            && !inside_subtree.contains(&relation)
                            && !ws.is_inherited_link(obj, relation)
                        {
                            record(obj, relation, inside, index);
                        }
                    }
                }
            }
            Some(Body::Relation(_)) => {
                let mut seen = FxHashSet::default();
                for peer in ws.linked_objects(obj) {
                    if inside_subtree.contains(&peer) || !seen.insert(peer) || ws.is_inherited_link(peer, obj) {
                        continue;
                    }
                    let Ok(inside) = ws.is_inside_link(peer, obj) else {
                        continue;
                    };
                    for (index, slot) in ws.link_slots(peer, inside).iter().enumerate() {
                        if *slot == Some(obj) {
                            record(peer, obj, inside, index);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out.sort_by(|a, b| (&a.port, a.inside, a.index).cmp(&(&b.port, b.inside, b.index)));
    out
}

fn property_restore(name: &str, value: &str) -> String {
    format!("<property name=\"{}\" value=\"{}\"/>", escape(name), escape(value))
}

fn inherited_link_error(ws: &Workspace, a: ObjId, b: ObjId) -> MomlError {
    MomlError::structural(format!(
        "Cannot change the link between {} and {}: it is part of a class definition",
        ws.full_name(a),
        ws.full_name(b)
    ))
}

fn parse_index(attribute: &str, value: &str) -> MomlResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| MomlError::structural(format!("Invalid {attribute} \"{value}\": expected a non-negative integer")))
}

/// The insertion index for a new link, preferring the attribute that
/// matches the side the link lands on.
fn link_index(attrs: &Attrs, inside: bool) -> MomlResult<Option<usize>> {
    let (preferred, other) = if inside {
        ("insideInsertAt", "insertAt")
    } else {
        ("insertAt", "insideInsertAt")
    };
    match attrs.get(preferred).map(|v| (preferred, v)).or_else(|| attrs.get(other).map(|v| (other, v))) {
        Some((attribute, value)) => parse_index(attribute, value).map(Some),
        None => Ok(None),
    }
}
