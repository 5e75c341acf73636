//! MoML export.
//!
//! Writes a subtree back as MoML that the parser turns into an equivalent
//! graph. Objects implied by a class definition are left out unless they
//! carry something local (an overridden value, an added child, a link of
//! their own); then they are written as stubs without a class so the
//! parser reuses the inherited object.
//!
//! ```text
//! <entity name="top" class="ptolemy.kernel.CompositeEntity">
//!   <property .../>           attributes
//!   <port .../>               ports
//!   <class .../>              class definitions, before their instances
//!   <entity .../>             entities
//!   <relation .../>           relations
//!   <link .../>               links
//! </entity>
//! ```

use std::io::Write;

use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::error::{MomlError, MomlResult};
use crate::kernel::{
    AttributeBody, AttributeKind, Body, EntityBody, EntityKind, LIBRARY_MARKER, Node, ObjId, SharedWorkspace,
    Workspace,
};

const DOCTYPE: &str =
    r#"entity PUBLIC "-//UC Berkeley//DTD MoML 1//EN" "http://ptolemy.eecs.berkeley.edu/xml/dtd/MoML_1.dtd""#;

/// Export `id` and its contents. `depth` is the nesting level `id` is
/// written at: objects whose derivation is implied within that many
/// levels are treated as inherited.
pub fn export_moml(ws: &Workspace, id: ObjId, depth: usize) -> MomlResult<String> {
    let mut buffer = Vec::new();
    let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);
    MomlWriter { ws }.write_object(&mut writer, id, depth)?;
    String::from_utf8(buffer).map_err(|e| MomlError::xml(format!("Write error: {e}")))
}

/// Export `id` as a complete document with XML declaration and DOCTYPE.
pub fn export_document(ws: &Workspace, id: ObjId) -> MomlResult<String> {
    let mut buffer = Vec::new();
    let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(&mut writer, Event::DocType(BytesText::from_escaped(DOCTYPE)))?;
    MomlWriter { ws }.write_object(&mut writer, id, 0)?;
    String::from_utf8(buffer).map_err(|e| MomlError::xml(format!("Write error: {e}")))
}

/// Export under the workspace's read guard.
pub fn export_shared(ws: &SharedWorkspace, id: ObjId) -> MomlResult<String> {
    let guard = ws.read();
    export_document(&guard, id)
}

/// Raw text as CDATA, or escaped when it contains a CDATA terminator.
pub(crate) fn cdata(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else if text.contains("]]>") {
        escape(text).into_owned()
    } else {
        format!("<![CDATA[{text}]]>")
    }
}

fn emit<'e, W: Write>(writer: &mut Writer<W>, event: impl Into<Event<'e>>) -> MomlResult<()> {
    writer
        .write_event(event)
        .map_err(|e| MomlError::xml(format!("Write error: {e}")))
}

/// Whether `node` is implied by a class when written at `depth`.
fn is_implied(node: &Node, depth: usize) -> bool {
    usize::try_from(node.derived_level()).is_ok_and(|level| level <= depth)
}

/// Attributes that describe where a model came from or mark libraries
/// are rebuilt by the parser, never written.
fn is_persistent(node: &Node) -> bool {
    match node.as_attribute() {
        Some(attr) => attr.kind.is_persistent() && node.name() != LIBRARY_MARKER,
        None => true,
    }
}

struct MomlWriter<'w> {
    ws: &'w Workspace,
}

impl MomlWriter<'_> {
    fn write_object<W: Write>(&self, w: &mut Writer<W>, id: ObjId, depth: usize) -> MomlResult<()> {
        let node = self.ws.node(id)?;
        if !is_persistent(node) {
            return Ok(());
        }
        let implied = is_implied(node, depth);
        if implied && !self.has_local_content(id, depth) {
            return Ok(());
        }
        match node.body() {
            Body::Entity(entity) => self.write_entity(w, id, node, entity, implied, depth),
            Body::Port(_) => self.write_port(w, id, node, implied, depth),
            Body::Relation(_) => self.write_relation(w, id, node, implied, depth),
            Body::Attribute(attr) => self.write_attribute(w, id, node, attr, implied, depth),
        }
    }

    /// Whether an implied object holds anything that is not inherited.
    fn has_local_content(&self, id: ObjId, depth: usize) -> bool {
        let Some(node) = self.ws.get(id) else {
            return false;
        };
        if node.as_attribute().is_some_and(|a| a.overridden) {
            return true;
        }
        let child_local = node.all_children().into_iter().any(|child| {
            self.ws.get(child).is_some_and(|c| {
                is_persistent(c) && (!is_implied(c, depth + 1) || self.has_local_content(child, depth + 1))
            })
        });
        if child_local {
            return true;
        }
        node.as_entity().is_some_and(|entity| {
            entity.relations.values().any(|&relation| {
                self.ws
                    .linked_objects(relation)
                    .into_iter()
                    .any(|peer| !self.ws.is_inherited_link(peer, relation))
            })
        })
    }

    // ── Entities ─────────────────────────────────────────────────────

    fn write_entity<W: Write>(
        &self,
        w: &mut Writer<W>,
        id: ObjId,
        node: &Node,
        entity: &EntityBody,
        implied: bool,
        depth: usize,
    ) -> MomlResult<()> {
        let tag = if entity.class_definition { "class" } else { "entity" };
        let mut start = BytesStart::new(tag);
        start.push_attribute(("name", node.name()));
        if !implied {
            let (class_ref, source) = self.class_reference(id, node);
            let key = if entity.class_definition { "extends" } else { "class" };
            start.push_attribute((key, class_ref.as_str()));
            if let Some(source) = &source {
                start.push_attribute(("source", source.as_str()));
            }
        }
        emit(w, Event::Start(start))?;
        self.write_common(w, node, depth)?;

        if entity.kind == EntityKind::Library {
            self.write_library(w, id, entity, depth)?;
        } else {
            self.write_contents(w, id, entity, depth)?;
        }
        emit(w, Event::End(BytesEnd::new(tag)))
    }

    fn write_contents<W: Write>(&self, w: &mut Writer<W>, id: ObjId, entity: &EntityBody, depth: usize) -> MomlResult<()> {
        for &port in entity.ports.values() {
            self.write_object(w, port, depth + 1)?;
        }
        let (classes, instances): (Vec<ObjId>, Vec<ObjId>) = entity
            .entities
            .values()
            .copied()
            .partition(|e| self.ws.is_class_definition(*e));
        for child in classes.into_iter().chain(instances) {
            self.write_object(w, child, depth + 1)?;
        }
        for &relation in entity.relations.values() {
            self.write_object(w, relation, depth + 1)?;
        }
        self.write_links(w, id, entity)
    }

    /// Library contents go inside `configure` so that they are read only
    /// when the library is first opened.
    fn write_library<W: Write>(&self, w: &mut Writer<W>, id: ObjId, entity: &EntityBody, depth: usize) -> MomlResult<()> {
        if let Some(pending) = self.ws.pending_library_text(id) {
            let mut start = BytesStart::new("configure");
            if let Some(source) = &pending.source {
                start.push_attribute(("source", source.as_str()));
            }
            emit(w, Event::Start(start))?;
            emit(w, Event::Text(BytesText::from_escaped(cdata(&pending.text))))?;
            return emit(w, Event::End(BytesEnd::new("configure")));
        }

        let mut inner = Vec::new();
        self.write_contents(&mut Writer::new(&mut inner), id, entity, depth)?;
        let group = format!(
            "<group>{}</group>",
            String::from_utf8(inner).map_err(|e| MomlError::xml(format!("Write error: {e}")))?
        );
        let body = if group.contains("?>") {
            cdata(&group)
        } else {
            format!("<?moml {group} ?>")
        };
        emit(w, Event::Start(BytesStart::new("configure")))?;
        emit(w, Event::Text(BytesText::from_escaped(body)))?;
        emit(w, Event::End(BytesEnd::new("configure")))
    }

    /// The `class` or `extends` value of an entity, with a `source` when
    /// the class file cannot be found from the class name alone.
    fn class_reference(&self, id: ObjId, node: &Node) -> (String, Option<String>) {
        let Some(parent) = self.ws.parent_class(id) else {
            return (node.class_name().to_string(), None);
        };
        let external = self.ws.get(parent).and_then(|p| p.as_entity()).and_then(|e| e.source.clone());
        if let Some(source) = external {
            let stem = node.class_name().replace('.', "/");
            let conventional = [".xml", ".moml"]
                .iter()
                .any(|suffix| source.ends_with(&format!("{stem}{suffix}")));
            return (node.class_name().to_string(), (!conventional).then_some(source));
        }
        let mut scope = self.ws.container(id);
        while let Some(s) = scope {
            if self.ws.deep_contains(s, parent) {
                return (self.ws.relative_name(parent, s), None);
            }
            scope = self.ws.container(s);
        }
        (self.ws.full_name(parent), None)
    }

    // ── Ports, relations ─────────────────────────────────────────────

    fn write_port<W: Write>(&self, w: &mut Writer<W>, id: ObjId, node: &Node, implied: bool, depth: usize) -> MomlResult<()> {
        let mut start = BytesStart::new("port");
        start.push_attribute(("name", node.name()));
        if !implied {
            start.push_attribute(("class", node.class_name()));
        }
        emit(w, Event::Start(start))?;
        if !implied {
            let flags = self.ws.port_flags(id);
            for (flag, set) in [("input", flags.input), ("output", flags.output), ("multiport", flags.multiport)] {
                if set {
                    let mut property = BytesStart::new("property");
                    property.push_attribute(("name", flag));
                    emit(w, Event::Empty(property))?;
                }
            }
        }
        self.write_common(w, node, depth)?;
        emit(w, Event::End(BytesEnd::new("port")))
    }

    fn write_relation<W: Write>(&self, w: &mut Writer<W>, _id: ObjId, node: &Node, implied: bool, depth: usize) -> MomlResult<()> {
        let mut start = BytesStart::new("relation");
        start.push_attribute(("name", node.name()));
        if !implied {
            start.push_attribute(("class", node.class_name()));
        }
        if !node.attributes.values().any(|a| self.ws.get(*a).is_some_and(is_persistent)) && node.display_name.is_none() {
            return emit(w, Event::Empty(start));
        }
        emit(w, Event::Start(start))?;
        self.write_common(w, node, depth)?;
        emit(w, Event::End(BytesEnd::new("relation")))
    }

    // ── Attributes ───────────────────────────────────────────────────

    fn write_attribute<W: Write>(
        &self,
        w: &mut Writer<W>,
        _id: ObjId,
        node: &Node,
        attr: &AttributeBody,
        implied: bool,
        depth: usize,
    ) -> MomlResult<()> {
        if attr.kind == AttributeKind::Documentation {
            let mut start = BytesStart::new("doc");
            start.push_attribute(("name", node.name()));
            emit(w, Event::Start(start))?;
            let text = attr.expression.as_deref().unwrap_or_default();
            emit(w, Event::Text(BytesText::new(text)))?;
            return emit(w, Event::End(BytesEnd::new("doc")));
        }

        let tag = if attr.kind == AttributeKind::Vertex { "vertex" } else { "property" };
        let mut start = BytesStart::new(tag);
        start.push_attribute(("name", node.name()));
        if !implied && tag == "property" {
            start.push_attribute(("class", node.class_name()));
        }
        if let Some(value) = &attr.expression
            && (!implied || attr.overridden)
        {
            start.push_attribute(("value", value.as_str()));
        }

        let has_children = node.attributes.values().any(|a| self.ws.get(*a).is_some_and(is_persistent));
        let configure = attr.configure.as_ref().filter(|_| !implied || attr.overridden);
        if !has_children && configure.is_none() && node.display_name.is_none() {
            return emit(w, Event::Empty(start));
        }
        emit(w, Event::Start(start))?;
        if let Some(configure) = configure {
            let mut cfg = BytesStart::new("configure");
            if let Some(source) = &configure.source {
                cfg.push_attribute(("source", source.as_str()));
            }
            emit(w, Event::Start(cfg))?;
            emit(w, Event::Text(BytesText::from_escaped(cdata(&configure.text))))?;
            emit(w, Event::End(BytesEnd::new("configure")))?;
        }
        self.write_common(w, node, depth)?;
        emit(w, Event::End(BytesEnd::new(tag)))
    }

    /// Display name and attributes, which any object may carry.
    fn write_common<W: Write>(&self, w: &mut Writer<W>, node: &Node, depth: usize) -> MomlResult<()> {
        if let Some(display) = &node.display_name {
            let mut start = BytesStart::new("display");
            start.push_attribute(("name", display.as_str()));
            emit(w, Event::Empty(start))?;
        }
        for &attr in node.attributes.values() {
            self.write_object(w, attr, depth + 1)?;
        }
        Ok(())
    }

    // ── Links ────────────────────────────────────────────────────────

    /// Links whose relation lives in `composite`: outside links of the
    /// contained entities' ports, inside links of its own ports and
    /// relation groups.
    fn write_links<W: Write>(&self, w: &mut Writer<W>, composite: ObjId, entity: &EntityBody) -> MomlResult<()> {
        for &child in entity.entities.values() {
            let Some(child_node) = self.ws.get(child) else {
                continue;
            };
            let Some(child_entity) = child_node.as_entity() else {
                continue;
            };
            for &port in child_entity.ports.values() {
                let name = format!("{}.{}", child_node.name(), self.ws.name(port));
                self.write_port_links(w, port, composite, false, &name)?;
            }
        }
        for &port in entity.ports.values() {
            self.write_port_links(w, port, composite, true, self.ws.name(port))?;
        }

        let relations: Vec<ObjId> = entity.relations.values().copied().collect();
        for (i, &relation) in relations.iter().enumerate() {
            for peer in self.ws.linked_objects(relation) {
                let Some(j) = relations.iter().position(|r| *r == peer) else {
                    continue;
                };
                if j <= i || self.ws.is_inherited_link(relation, peer) {
                    continue;
                }
                let mut link = BytesStart::new("link");
                link.push_attribute(("relation1", self.ws.name(relation)));
                link.push_attribute(("relation2", self.ws.name(peer)));
                emit(w, Event::Empty(link))?;
            }
        }
        Ok(())
    }

    fn write_port_links<W: Write>(
        &self,
        w: &mut Writer<W>,
        port: ObjId,
        composite: ObjId,
        inside: bool,
        port_name: &str,
    ) -> MomlResult<()> {
        let slots = self.ws.link_slots(port, inside);
        let indexed = slots.iter().any(|slot| match slot {
            None => true,
            Some(relation) => self.ws.is_inherited_link(port, *relation),
        });
        for (index, slot) in slots.iter().enumerate() {
            let Some(relation) = *slot else {
                continue;
            };
            if self.ws.container(relation) != Some(composite) || self.ws.is_inherited_link(port, relation) {
                continue;
            }
            let mut link = BytesStart::new("link");
            link.push_attribute(("port", port_name));
            link.push_attribute(("relation", self.ws.name(relation)));
            if indexed {
                let key = if inside { "insideInsertAt" } else { "insertAt" };
                link.push_attribute((key, index.to_string().as_str()));
            }
            if let Some(vertex) = self.vertex_for(relation, port) {
                link.push_attribute(("vertex", self.ws.name(vertex)));
            }
            emit(w, Event::Empty(link))?;
        }
        Ok(())
    }

    /// The vertex of `relation` bound to `port`, if any.
    fn vertex_for(&self, relation: ObjId, port: ObjId) -> Option<ObjId> {
        let node = self.ws.get(relation)?;
        node.attributes.values().copied().find(|&attr| {
            self.ws
                .get(attr)
                .and_then(|a| a.as_attribute())
                .is_some_and(|a| a.kind == AttributeKind::Vertex && a.linked_port == Some(port))
        })
    }
}
