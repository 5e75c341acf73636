//! Start-of-element behavior for every MoML element.
//!
//! Each `start_*` method validates the element's attributes, applies the
//! change to the workspace, records its inverse in the element's
//! [`Frame`] and moves the cursor when the element opens a new container.
//! Elements that must wait for their scope (links and deletions) are
//! queued here and executed in `deferred.rs`.

use quick_xml::escape::escape;
use tracing::{debug, trace, warn};

use super::context::{Deferred, DeferredScope, Frame, FrameKind, Namespace, UndoOpen, UndoContext};
use super::error::{MomlError, MomlResult};
use super::handler::{Attrs, DocumentHandler, Flow};
use super::resolve::resolve;
use crate::kernel::{
    AttributeKind, Category, ConfigureText, DEFAULT_ATTRIBUTE_CLASS, DEFAULT_ENTITY_CLASS, DEFAULT_PARAMETER_CLASS,
    DEFAULT_PORT_CLASS, DEFAULT_RELATION_CLASS, DOCUMENTATION_CLASS, KernelError, NOT_DERIVED, NodeKind, ObjId,
    PortFlags, URI_ATTRIBUTE, URI_CLASS, VERTEX_CLASS,
};

/// Attributes of `link`, `unlink` and `delete*` that name objects.
const REFERENCE_ATTRIBUTES: [&str; 5] = ["name", "port", "relation", "relation1", "relation2"];

pub(crate) fn required<'v>(attrs: &'v Attrs, element: &str, attribute: &str) -> MomlResult<&'v str> {
    attrs
        .get(attribute)
        .map(String::as_str)
        .ok_or_else(|| MomlError::missing_attribute(element, attribute))
}

impl DocumentHandler<'_> {
    // ── Cursor and names ─────────────────────────────────────────────

    pub(crate) fn require_current(&self, element: &str) -> MomlResult<ObjId> {
        self.current
            .ok_or_else(|| MomlError::structural(format!("Element \"{element}\" found outside of any container")))
    }

    /// The innermost auto namespace, if it applies to children of
    /// `container`.
    fn auto_namespace(&mut self, container: ObjId) -> Option<&mut Namespace> {
        self.namespaces
            .last_mut()
            .filter(|ns| ns.auto && ns.owner == Some(container))
    }

    /// Name to give a child of `container` named `name` in the document.
    pub(crate) fn translate_new(&mut self, container: ObjId, name: &str) -> String {
        let ws = &*self.ws;
        match self
            .namespaces
            .last_mut()
            .filter(|ns| ns.auto && ns.owner == Some(container))
        {
            Some(ns) => {
                let translated = ns.translate_new(ws, container, name);
                if translated != name {
                    trace!(from = name, to = %translated, "auto namespace renamed");
                }
                translated
            }
            None => name.to_string(),
        }
    }

    /// Map a reference through the auto namespace of the cursor.
    pub(crate) fn translate_reference(&mut self, reference: &str) -> String {
        let Some(current) = self.current else {
            return reference.to_string();
        };
        match self.auto_namespace(current) {
            Some(ns) => ns.translate_reference(reference),
            None => reference.to_string(),
        }
    }

    /// Resolve `name` relative to `context` or fail with a not-found error.
    pub(crate) fn find(&mut self, context: ObjId, name: &str, category: Category) -> MomlResult<ObjId> {
        match self.ws.lookup(context, name, category)? {
            Some(found) => Ok(found),
            None => Err(KernelError::not_found(category.as_str(), name, self.ws.full_name(context)).into()),
        }
    }

    /// Set an attribute's value, marking a derived attribute overridden
    /// and pushing the value to copies that inherit it. On failure the
    /// old value is put back.
    pub(crate) fn set_value(&mut self, attr: ObjId, value: Option<String>) -> MomlResult<()> {
        let old = self.ws.expression(attr).map(str::to_string);
        let was_overridden = self.ws.is_overridden(attr);
        self.ws.set_expression(attr, value)?;
        if self.ws.derived_level(attr) != NOT_DERIVED {
            self.ws.set_overridden(attr, true)?;
        }
        if let Err(e) = self.ws.propagate_value(attr) {
            self.ws.set_expression(attr, old)?;
            self.ws.set_overridden(attr, was_overridden)?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Construct a registry type, recording it as missing when unknown.
    fn construct_typed(
        &mut self,
        container: ObjId,
        name: &str,
        class: &str,
        category: Category,
    ) -> MomlResult<Option<ObjId>> {
        let config = self.config;
        if !config.registry().contains(class) {
            self.record_missing(class);
            return Ok(None);
        }
        Ok(Some(config.registry().construct(self.ws, Some(container), name, class, category)?))
    }

    fn enter(&mut self, frame: &mut Frame, object: ObjId) {
        frame.object = Some(object);
        self.current = Some(object);
    }

    // ── entity / model / class ───────────────────────────────────────

    pub(crate) fn start_entity(&mut self, element: &str, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        let raw_name = required(attrs, element, "name")?;
        let as_class = element == "class";
        let class_ref = if as_class { attrs.get("extends") } else { attrs.get("class") };
        let source = attrs.get("source").map(String::as_str);

        let name = match self.current {
            Some(container) => self.translate_new(container, raw_name),
            None => raw_name.to_string(),
        };
        let existing = match self.current {
            Some(container) => self.ws.lookup(container, &name, Category::Entity)?,
            None => self.toplevel.filter(|top| self.ws.name(*top) == name),
        };

        if let Some(entity) = existing {
            let was_class = self.ws.is_class_definition(entity);
            let converted = was_class != as_class;
            if was_class && !as_class {
                if self.ws.has_live_derived(entity) {
                    return Err(MomlError::structural(format!(
                        "Cannot convert {} to an instance: it has subclasses or instances",
                        self.ws.full_name(entity)
                    )));
                }
                debug!(entity = %self.ws.full_name(entity), "class converted to instance");
                self.ws.set_class_definition(entity, false)?;
            } else if as_class && !was_class {
                debug!(entity = %self.ws.full_name(entity), "entity converted to class");
                self.ws.set_class_definition(entity, true)?;
            }
            let tag = if was_class { "class" } else { "entity" };
            let mut open = UndoOpen::new(tag, entity, frame.saved_current);
            // The reopening tag alone converts back.
            open.essential = converted;
            frame.undo.open = Some(open);
            frame.scope = Some(DeferredScope::default());
            self.enter(frame, entity);
            return Ok(Flow::Open);
        }

        let container = self.current;
        if let Some(container) = container {
            self.ws.check_derived_collisions(container, &name, Category::Entity)?;
        }
        let class_ref = match class_ref {
            Some(class_ref) => class_ref.clone(),
            None if element == "entity" => return Err(MomlError::missing_attribute(element, "class")),
            None => DEFAULT_ENTITY_CLASS.to_string(),
        };
        let Some(entity) = self.instantiate_class(&class_ref, source, container, &name, as_class)? else {
            return Ok(Flow::Skip);
        };
        self.ws.set_class_name(entity, &class_ref)?;

        match container {
            Some(_) => {
                self.ws.propagate_existence(entity)?;
            }
            None => {
                self.toplevel = Some(entity);
                self.begin_deferral(entity);
                if let Some(base) = self.base.clone() {
                    let uri = self.ws.create(
                        Some(entity),
                        URI_ATTRIBUTE,
                        NodeKind::Attribute(AttributeKind::Uri),
                        URI_CLASS,
                    )?;
                    self.ws.set_expression(uri, Some(base))?;
                }
            }
        }
        trace!(entity = %self.ws.full_name(entity), class = %class_ref, "entity created");

        frame.undo.created = Some(UndoOpen::new("deleteEntity", entity, frame.saved_current));
        frame.scope = Some(DeferredScope::default());
        self.enter(frame, entity);
        Ok(Flow::Open)
    }

    // ── port ─────────────────────────────────────────────────────────

    pub(crate) fn start_port(&mut self, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        let raw_name = required(attrs, "port", "name")?;
        let container = self.require_current("port")?;
        let name = self.translate_new(container, raw_name);
        let direction = attrs.get("direction").map(String::as_str);

        if let Some(port) = self.ws.lookup(container, &name, Category::Port)? {
            if let Some(direction) = direction {
                let old = self.ws.port_flags(port);
                let flags = apply_direction(old, direction)?;
                if flags != old {
                    self.change_port_flags(port, flags)?;
                    frame.undo.own.push(flag_undo("input", old.input));
                    frame.undo.own.push(flag_undo("output", old.output));
                }
            }
            frame.undo.open = Some(UndoOpen::new("port", port, frame.saved_current));
            self.enter(frame, port);
            return Ok(Flow::Open);
        }

        self.ws.check_derived_collisions(container, &name, Category::Port)?;
        let class = attrs.get("class").map(String::as_str).unwrap_or(DEFAULT_PORT_CLASS);
        let Some(port) = self.construct_typed(container, &name, class, Category::Port)? else {
            return Ok(Flow::Skip);
        };
        if let Some(direction) = direction {
            let flags = apply_direction(PortFlags::default(), direction)?;
            self.ws.set_port_flags(port, flags)?;
        }
        self.ws.propagate_existence(port)?;
        frame.undo.created = Some(UndoOpen::new("deletePort", port, frame.saved_current));
        self.enter(frame, port);
        Ok(Flow::Open)
    }

    fn change_port_flags(&mut self, port: ObjId, flags: PortFlags) -> MomlResult<()> {
        if self.ws.derived_level(port) != NOT_DERIVED {
            return Err(MomlError::structural(format!(
                "Cannot change the direction of {}: the port is defined by a class",
                self.ws.full_name(port)
            )));
        }
        self.ws.set_port_flags(port, flags)?;
        self.ws.propagate_port_flags(port)?;
        Ok(())
    }

    /// `<property name="input|output|multiport">` inside a port sets a
    /// flag of the port instead of creating an attribute.
    fn start_port_flag(&mut self, port: ObjId, flag: &str, value: Option<&str>, frame: &mut Frame) -> MomlResult<Flow> {
        let on = value.map(str::trim) != Some("false");
        let old = self.ws.port_flags(port);
        let mut flags = old;
        let was = match flag {
            "input" => std::mem::replace(&mut flags.input, on),
            "output" => std::mem::replace(&mut flags.output, on),
            _ => std::mem::replace(&mut flags.multiport, on),
        };
        if flags != old {
            self.change_port_flags(port, flags)?;
            frame.undo.own.push(flag_undo(flag, was));
        }
        Ok(Flow::Open)
    }

    // ── property / director / rendition ──────────────────────────────

    pub(crate) fn start_property(&mut self, element: &str, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        let raw_name = match (attrs.get("name"), element) {
            (Some(name), _) => name.as_str(),
            (None, "rendition") => "_icon",
            (None, _) => return Err(MomlError::missing_attribute(element, "name")),
        };
        if element != "property" {
            debug!(element, "deprecated element treated as property");
        }
        let container = self.require_current(element)?;
        let value = attrs.get("value").cloned();

        if self.ws.node(container)?.as_port().is_some() && matches!(raw_name, "input" | "output" | "multiport") {
            return self.start_port_flag(container, raw_name, value.as_deref(), frame);
        }

        let name = self.translate_new(container, raw_name);
        if let Some(attr) = self.ws.lookup(container, &name, Category::Attribute)? {
            let mut open = UndoOpen::new("property", attr, frame.saved_current);
            if let Some(value) = value
                && self.ws.expression(attr).unwrap_or_default() != value
            {
                let old = self.ws.expression(attr).unwrap_or_default().to_string();
                self.set_value(attr, Some(value))?;
                open = open.with_attr("value", old);
            }
            frame.undo.open = Some(open);
            self.enter(frame, attr);
            return Ok(Flow::Open);
        }

        let default_class = if value.is_some() { DEFAULT_PARAMETER_CLASS } else { DEFAULT_ATTRIBUTE_CLASS };
        let class = attrs.get("class").map(String::as_str).unwrap_or(default_class);
        let Some(attr) = self.construct_typed(container, &name, class, Category::Attribute)? else {
            return Ok(Flow::Skip);
        };
        if value.is_some() {
            self.ws.set_expression(attr, value)?;
        }
        self.ws.propagate_existence(attr)?;
        frame.undo.created = Some(UndoOpen::new("deleteProperty", attr, frame.saved_current));
        self.enter(frame, attr);
        Ok(Flow::Open)
    }

    // ── relation / vertex ────────────────────────────────────────────

    pub(crate) fn start_relation(&mut self, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        let raw_name = required(attrs, "relation", "name")?;
        let container = self.require_current("relation")?;
        let name = self.translate_new(container, raw_name);

        if let Some(relation) = self.ws.lookup(container, &name, Category::Relation)? {
            frame.undo.open = Some(UndoOpen::new("relation", relation, frame.saved_current));
            self.enter(frame, relation);
            return Ok(Flow::Open);
        }

        self.ws.check_derived_collisions(container, &name, Category::Relation)?;
        let class = attrs.get("class").map(String::as_str).unwrap_or(DEFAULT_RELATION_CLASS);
        let Some(relation) = self.construct_typed(container, &name, class, Category::Relation)? else {
            return Ok(Flow::Skip);
        };
        self.ws.propagate_existence(relation)?;
        frame.undo.created = Some(UndoOpen::new("deleteRelation", relation, frame.saved_current));
        self.enter(frame, relation);
        Ok(Flow::Open)
    }

    pub(crate) fn start_vertex(&mut self, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        let name = required(attrs, "vertex", "name")?;
        let relation = self.require_current("vertex")?;
        if self.ws.node(relation)?.as_relation().is_none() {
            return Err(MomlError::structural("Element \"vertex\" must be inside a relation"));
        }
        let value = attrs.get("value").cloned();

        if let Some(vertex) = self.ws.lookup(relation, name, Category::Attribute)? {
            let mut open = UndoOpen::new("vertex", vertex, frame.saved_current);
            if let Some(value) = value
                && self.ws.expression(vertex).unwrap_or_default() != value
            {
                let old = self.ws.expression(vertex).unwrap_or_default().to_string();
                self.set_value(vertex, Some(value))?;
                open = open.with_attr("value", old);
            }
            frame.undo.open = Some(open);
            self.enter(frame, vertex);
            return Ok(Flow::Open);
        }

        let vertex = self.ws.create(
            Some(relation),
            name,
            NodeKind::Attribute(AttributeKind::Vertex),
            VERTEX_CLASS,
        )?;
        if value.is_some() {
            self.ws.set_expression(vertex, value)?;
        }
        self.ws.propagate_existence(vertex)?;
        frame.undo.created = Some(UndoOpen::new("deleteProperty", vertex, frame.saved_current));
        self.enter(frame, vertex);
        Ok(Flow::Open)
    }

    // ── link / unlink / delete* ──────────────────────────────────────

    /// Queue the element on the innermost scope, or run it now when
    /// there is none.
    pub(crate) fn start_deferrable(&mut self, element: &str, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        let context = self.require_current(element)?;
        let mut attrs = attrs.clone();
        for key in REFERENCE_ATTRIBUTES {
            if let Some(value) = attrs.get(key).cloned() {
                let translated = self.translate_reference(&value);
                attrs.insert(key.to_string(), translated);
            }
        }

        let is_link = matches!(element, "link" | "unlink");
        if let Some(scope) = self.frames.iter_mut().rev().find_map(|f| f.scope.as_mut()) {
            let request = Deferred {
                element: element.into(),
                attrs,
                context,
                text: frame.text.clone(),
                location: frame.location.clone(),
            };
            if is_link {
                scope.links.push(request);
            } else {
                scope.deletes.push(request);
            }
            return Ok(Flow::Open);
        }

        let fragment = self.execute_deferrable(element, &attrs)?;
        if !fragment.is_empty() {
            frame.undo.own.push(fragment);
        }
        Ok(Flow::Open)
    }

    // ── rename / display ─────────────────────────────────────────────

    pub(crate) fn start_rename(&mut self, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        let new_name = required(attrs, "rename", "name")?;
        let target = self.require_current("rename")?;
        let old_name = self.ws.name(target).to_string();
        if old_name != new_name {
            self.ws.rename_propagating(target, new_name)?;
            debug!(from = %old_name, to = new_name, "renamed");
            frame.undo.own.push(format!("<rename name=\"{}\"/>", escape(old_name.as_str())));
        }
        Ok(Flow::Open)
    }

    pub(crate) fn start_display(&mut self, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        let display = required(attrs, "display", "name")?;
        let target = self.require_current("display")?;
        let old = self.ws.node(target)?.display_name().to_string();
        if old != display {
            self.ws.set_display_name(target, Some(display.to_string()))?;
            frame.undo.own.push(format!("<display name=\"{}\"/>", escape(old.as_str())));
        }
        Ok(Flow::Open)
    }

    // ── doc / configure ──────────────────────────────────────────────

    pub(crate) fn start_doc(&mut self, attrs: &Attrs, frame: &mut Frame, empty: bool) -> MomlResult<Flow> {
        let target = self.require_current("doc")?;
        let name = attrs.get("name").cloned().unwrap_or_else(|| "_doc".to_string());
        frame.kind = FrameKind::Doc { target, name };
        if !empty {
            self.begin_raw();
        }
        Ok(Flow::Open)
    }

    /// An empty body removes the documentation attribute.
    pub(crate) fn finish_doc(&mut self, target: ObjId, name: &str, text: String, undo: &mut UndoContext) -> MomlResult<()> {
        let existing = self.ws.child(target, name, Category::Attribute);
        let old = existing.and_then(|doc| self.ws.expression(doc)).map(str::to_string);

        if text.is_empty() {
            let Some(doc) = existing else {
                return Ok(());
            };
            if self.ws.derived_level(doc) != NOT_DERIVED {
                return Err(MomlError::structural(format!(
                    "Cannot remove {}: it is defined by a class",
                    self.ws.full_name(doc)
                )));
            }
            self.ws.propagate_deletion(doc)?;
            self.ws.remove(doc)?;
        } else {
            let doc = match existing {
                Some(doc) => doc,
                None => {
                    let doc = self.ws.create(
                        Some(target),
                        name,
                        NodeKind::Attribute(AttributeKind::Documentation),
                        DOCUMENTATION_CLASS,
                    )?;
                    self.ws.propagate_existence(doc)?;
                    doc
                }
            };
            self.set_value(doc, Some(text))?;
        }

        undo.own.push(match old {
            Some(old) => format!("<doc name=\"{}\">{}</doc>", escape(name), escape(old.as_str())),
            None => format!("<doc name=\"{}\"/>", escape(name)),
        });
        Ok(())
    }

    pub(crate) fn start_configure(&mut self, attrs: &Attrs, frame: &mut Frame, empty: bool) -> MomlResult<Flow> {
        let target = self.require_current("configure")?;
        frame.kind = FrameKind::Configure {
            target,
            source: attrs.get("source").cloned(),
        };
        if !empty {
            self.begin_raw();
        }
        Ok(Flow::Open)
    }

    pub(crate) fn finish_configure(
        &mut self,
        target: ObjId,
        source: Option<String>,
        text: String,
        undo: &mut UndoContext,
    ) -> MomlResult<()> {
        let old = self.ws.configure_text(target).cloned();
        let configure = ConfigureText {
            base: self.base.clone(),
            source,
            text,
        };
        self.ws.configure(target, configure)?;
        if let Err(e) = self.ws.propagate_configure(target) {
            if let Some(old) = old {
                self.ws.configure(target, old)?;
            }
            return Err(e.into());
        }
        let old_text = old.map(|c| c.text).unwrap_or_default();
        undo.own.push(format!("<configure>{}</configure>", super::writer::cdata(&old_text)));
        Ok(())
    }

    // ── group / if ───────────────────────────────────────────────────

    pub(crate) fn start_group(&mut self, attrs: &Attrs, frame: &mut Frame) -> MomlResult<Flow> {
        frame.kind = FrameKind::Group;
        frame.scope = Some(DeferredScope::default());
        if let Some(name) = attrs.get("name") {
            let auto = name == "auto";
            self.namespaces.push(Namespace::new(self.current, auto));
            frame.namespace_pushed = true;
        }
        Ok(Flow::Open)
    }

    pub(crate) fn start_if(&mut self, attrs: &Attrs) -> MomlResult<Flow> {
        let test = required(attrs, "if", "test")?;
        let truth = self
            .config
            .evaluator()
            .evaluate_bool(&*self.ws, self.current, test)
            .map_err(|e| MomlError::structural(format!("Cannot evaluate test \"{test}\": {e}")))?;
        trace!(test, truth, "if");
        Ok(if truth { Flow::Open } else { Flow::Skip })
    }

    // ── import / input ───────────────────────────────────────────────

    pub(crate) fn start_import(&mut self, attrs: &Attrs) -> MomlResult<Flow> {
        let source = required(attrs, "import", "source")?;
        warn!(source, "the import element is deprecated; use a class with a source attribute");
        let class = self.load_external(source)?;
        if !self.imports.contains(&class) {
            self.imports.push(class);
        }
        Ok(Flow::Open)
    }

    /// Read another document in place of this element.
    pub(crate) fn start_input(&mut self, attrs: &Attrs) -> MomlResult<Flow> {
        let source = required(attrs, "input", "source")?;
        if self.config.skips_input(source) {
            debug!(source, "input skipped");
            return Ok(Flow::Open);
        }
        let resolved = resolve(self.config, self.base.as_deref(), source)?;
        if self.config.skips_input(&resolved.location) {
            debug!(location = %resolved.location, "input skipped");
            return Ok(Flow::Open);
        }
        debug!(location = %resolved.location, "reading input");
        self.splice(resolved.location, &resolved.text)?;
        Ok(Flow::Open)
    }
}

fn apply_direction(mut flags: PortFlags, direction: &str) -> MomlResult<PortFlags> {
    match direction {
        "input" => (flags.input, flags.output) = (true, false),
        "output" => (flags.input, flags.output) = (false, true),
        "both" => (flags.input, flags.output) = (true, true),
        other => {
            return Err(MomlError::structural(format!(
                "Invalid port direction \"{other}\": expected input, output or both"
            )));
        }
    }
    Ok(flags)
}

fn flag_undo(flag: &str, value: bool) -> String {
    format!("<property name=\"{flag}\" value=\"{value}\"/>")
}
