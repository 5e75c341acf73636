//! The object graph arena.
//!
//! A [`Workspace`] owns every node of every model loaded into it. Nodes are
//! addressed by generational [`ObjId`]s; containment is recorded both ways
//! (container pointer on the child, ordered child maps on the parent).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, trace};

use super::change::ChangeQueue;
use super::error::{KernelError, KernelResult};
use super::node::{AttributeKind, Body, Category, ConfigureText, EntityKind, LibraryState, Node, NodeKind, PortFlags};
use super::undo::UndoStack;
use super::ObjId;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Name of the marker attribute every entity library carries.
pub const LIBRARY_MARKER: &str = "_libraryMarker";

/// Name of the provenance attribute recording where a model was loaded from.
pub const URI_ATTRIBUTE: &str = "_uri";

/// Materializes the contents of an entity library on first read access.
pub trait LibraryLoader: Send + Sync {
    /// Populate `library` from its pending configuration.
    fn populate(&self, ws: &mut Workspace, library: ObjId, text: &ConfigureText) -> Result<(), String>;
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of named objects forming one or more containment trees.
pub struct Workspace {
    slots: Vec<Slot>,
    free: Vec<u32>,
    toplevels: Vec<ObjId>,
    uid: u64,
    library_loader: Option<Arc<dyn LibraryLoader>>,
    pub(crate) changes: FxHashMap<ObjId, ChangeQueue>,
    pub(crate) undo_stacks: FxHashMap<ObjId, UndoStack>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("uid", &self.uid)
            .field("live", &self.len())
            .field("toplevels", &self.toplevels)
            .finish()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            toplevels: Vec::new(),
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            library_loader: None,
            changes: FxHashMap::default(),
            undo_stacks: FxHashMap::default(),
        }
    }

    /// Process-unique identifier of this workspace.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn set_library_loader(&mut self, loader: Arc<dyn LibraryLoader>) {
        self.library_loader = Some(loader);
    }

    pub fn has_library_loader(&self) -> bool {
        self.library_loader.is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Arena ────────────────────────────────────────────────────────

    fn alloc(&mut self, node: Node) -> ObjId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            ObjId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            ObjId::new(index, 0)
        }
    }

    fn release(&mut self, id: ObjId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    /// The node named by `id`, or `None` if it has been removed.
    pub fn get(&self, id: ObjId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ObjId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Like [`get`](Self::get), but a stale id is an error.
    pub fn node(&self, id: ObjId) -> KernelResult<&Node> {
        self.get(id).ok_or_else(|| KernelError::Stale(id.to_string()))
    }

    pub(crate) fn node_mut(&mut self, id: ObjId) -> KernelResult<&mut Node> {
        self.get_mut(id).ok_or_else(|| KernelError::Stale(id.to_string()))
    }

    pub fn contains(&self, id: ObjId) -> bool {
        self.get(id).is_some()
    }

    // ── Naming ───────────────────────────────────────────────────────

    pub fn toplevels(&self) -> &[ObjId] {
        &self.toplevels
    }

    pub fn container(&self, id: ObjId) -> Option<ObjId> {
        self.get(id).and_then(|n| n.container)
    }

    /// The root of the tree containing `id`.
    pub fn toplevel(&self, id: ObjId) -> ObjId {
        let mut current = id;
        while let Some(container) = self.container(current) {
            current = container;
        }
        current
    }

    pub fn name(&self, id: ObjId) -> &str {
        self.get(id).map(|n| n.name()).unwrap_or("")
    }

    /// Dotted name from the root, with a leading period: `.top.a.p`.
    pub fn full_name(&self, id: ObjId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            match self.get(c) {
                Some(node) => {
                    parts.push(node.name.clone());
                    current = node.container;
                }
                None => {
                    parts.push(SmolStr::new("<removed>"));
                    break;
                }
            }
        }
        let mut out = String::new();
        for part in parts.iter().rev() {
            out.push('.');
            out.push_str(part);
        }
        out
    }

    /// Dotted name of `id` relative to `context`. Falls back to the full
    /// name when `id` is not inside `context`. Empty when they are equal.
    pub fn relative_name(&self, id: ObjId, context: ObjId) -> String {
        if id == context {
            return String::new();
        }
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            if c == context {
                parts.reverse();
                return parts.join(".");
            }
            parts.push(self.name(c).to_string());
            current = self.container(c);
        }
        self.full_name(id)
    }

    /// Path from `ancestor` down to `id` as (category, name) steps.
    pub(crate) fn path_from(&self, ancestor: ObjId, id: ObjId) -> Option<Vec<(Category, SmolStr)>> {
        let mut steps = Vec::new();
        let mut current = id;
        while current != ancestor {
            let node = self.get(current)?;
            steps.push((node.category(), node.name.clone()));
            current = node.container?;
        }
        steps.reverse();
        Some(steps)
    }

    /// Follow a step path from `start` without populating libraries.
    pub(crate) fn follow_path(&self, start: ObjId, steps: &[(Category, SmolStr)]) -> Option<ObjId> {
        let mut current = start;
        for (category, name) in steps {
            current = self.child(current, name, *category)?;
        }
        Some(current)
    }

    pub(crate) fn validate_name(name: &str) -> KernelResult<()> {
        if name.is_empty() || name.contains('.') {
            return Err(KernelError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    // ── Creation and removal ─────────────────────────────────────────

    /// Create a node. `container == None` creates a new toplevel.
    ///
    /// A library gets its `_libraryMarker`. A port parameter created in an
    /// entity gets a paired input port of the same name.
    pub fn create(
        &mut self,
        container: Option<ObjId>,
        name: &str,
        kind: NodeKind,
        class_name: &str,
    ) -> KernelResult<ObjId> {
        Self::validate_name(name)?;
        let category = kind.category();
        if let Some(container) = container {
            let parent = self.node(container)?;
            let Some(children) = parent.children(category) else {
                return Err(KernelError::Incompatible {
                    container: self.full_name(container),
                    kind: category.as_str(),
                });
            };
            if children.contains_key(name) {
                return Err(KernelError::collision(category.as_str(), name, self.full_name(container)));
            }
        }

        let mut node = Node::new(name, class_name, kind);
        node.container = container;
        let id = self.alloc(node);
        match container {
            Some(container) => self.insert_child(container, id)?,
            None => self.toplevels.push(id),
        }
        trace!(id = %id, name, class_name, "created");

        if kind == NodeKind::Entity(EntityKind::Library) {
            self.create(
                Some(id),
                LIBRARY_MARKER,
                NodeKind::Attribute(AttributeKind::Marker),
                "ptolemy.kernel.util.SingletonAttribute",
            )?;
        }
        if kind == NodeKind::Attribute(AttributeKind::PortParameter)
            && let Some(container) = container
            && self.node(container)?.as_entity().is_some()
        {
            let port = match self.child(container, name, Category::Port) {
                Some(port) => port,
                None => {
                    let port = self.create(
                        Some(container),
                        name,
                        NodeKind::Port,
                        "ptolemy.actor.parameters.ParameterPort",
                    )?;
                    if let Some(body) = self.node_mut(port)?.as_port_mut() {
                        body.flags.input = true;
                    }
                    port
                }
            };
            if let Some(attr) = self.node_mut(id)?.as_attribute_mut() {
                attr.linked_port = Some(port);
            }
        }
        Ok(id)
    }

    /// Register an already allocated node in its container's child map.
    fn insert_child(&mut self, container: ObjId, id: ObjId) -> KernelResult<()> {
        let (name, category) = {
            let node = self.node(id)?;
            (node.name.clone(), node.category())
        };
        let container_name = self.full_name(container);
        let parent = self.node_mut(container)?;
        let Some(children) = parent.children_mut(category) else {
            return Err(KernelError::Incompatible {
                container: container_name,
                kind: category.as_str(),
            });
        };
        if children.contains_key(&name) {
            return Err(KernelError::collision(category.as_str(), name.as_str(), container_name));
        }
        children.insert(name, id);
        Ok(())
    }

    /// Allocate a detached copy of `node` under `container`.
    pub(crate) fn adopt_node(&mut self, container: Option<ObjId>, mut node: Node) -> KernelResult<ObjId> {
        node.container = container;
        let id = self.alloc(node);
        match container {
            Some(container) => {
                if let Err(e) = self.insert_child(container, id) {
                    self.release(id);
                    return Err(e);
                }
            }
            None => self.toplevels.push(id),
        }
        Ok(id)
    }

    /// Every id in the subtree rooted at `id`, parents before children.
    pub fn subtree(&self, id: ObjId) -> Vec<ObjId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            let mut children = node.all_children();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Remove `id` and everything it contains, severing every link that
    /// touches the removed subtree.
    pub fn remove(&mut self, id: ObjId) -> KernelResult<()> {
        let (name, category, container) = {
            let node = self.node(id)?;
            (node.name.clone(), node.category(), node.container)
        };
        let doomed = self.subtree(id);
        for &obj in &doomed {
            self.sever_links(obj);
        }
        match container {
            Some(container) => {
                if let Some(children) = self.get_mut(container).and_then(|c| c.children_mut(category)) {
                    children.shift_remove(&name);
                }
            }
            None => {
                self.toplevels.retain(|t| *t != id);
                self.changes.remove(&id);
                self.undo_stacks.remove(&id);
            }
        }
        for &obj in doomed.iter().rev() {
            self.release(obj);
        }
        debug!(name = %name, removed = doomed.len(), "removed subtree");
        Ok(())
    }

    /// Drop every link entry that references `id` on both ends.
    fn sever_links(&mut self, id: ObjId) {
        let Some(node) = self.get(id) else {
            return;
        };
        let peers: Vec<ObjId> = match &node.body {
            Body::Port(port) => port.links.iter().chain(port.inside_links.iter()).flatten().copied().collect(),
            Body::Relation(rel) => rel.linked.clone(),
            _ => return,
        };
        for peer in peers {
            self.forget_peer(peer, id);
        }
        match self.get_mut(id).map(|n| &mut n.body) {
            Some(Body::Port(port)) => {
                port.links.clear();
                port.inside_links.clear();
            }
            Some(Body::Relation(rel)) => rel.linked.clear(),
            _ => {}
        }
    }

    /// Remove every reference to `gone` from `peer`'s link lists.
    pub(crate) fn forget_peer(&mut self, peer: ObjId, gone: ObjId) {
        match self.get_mut(peer).map(|n| &mut n.body) {
            Some(Body::Port(port)) => {
                port.links.retain(|l| *l != Some(gone));
                port.inside_links.retain(|l| *l != Some(gone));
            }
            Some(Body::Relation(rel)) => rel.linked.retain(|l| *l != gone),
            _ => {}
        }
    }

    /// Rename `id` in place, keeping its position among its siblings.
    /// Renaming a port parameter renames its paired port as well.
    pub fn set_name(&mut self, id: ObjId, new_name: &str) -> KernelResult<()> {
        Self::validate_name(new_name)?;
        let (old_name, category, container, paired) = {
            let node = self.node(id)?;
            let paired = node
                .as_attribute()
                .filter(|a| a.kind == AttributeKind::PortParameter)
                .and_then(|a| a.linked_port);
            (node.name.clone(), node.category(), node.container, paired)
        };
        if old_name == new_name {
            return Ok(());
        }
        if let Some(container) = container {
            let container_name = self.full_name(container);
            let parent = self.node_mut(container)?;
            if let Some(children) = parent.children_mut(category) {
                if children.contains_key(new_name) {
                    return Err(KernelError::collision(category.as_str(), new_name, container_name));
                }
                if let Some(index) = children.get_index_of(&old_name) {
                    children.shift_remove(&old_name);
                    children.shift_insert(index, SmolStr::new(new_name), id);
                }
            }
        }
        self.node_mut(id)?.name = SmolStr::new(new_name);
        if let Some(port) = paired
            && self.contains(port)
            && self.name(port) == old_name
        {
            self.set_name(port, new_name)?;
        }
        Ok(())
    }

    // ── Raw children (never populate) ────────────────────────────────

    /// Direct child of a category, without populating libraries.
    pub fn child(&self, id: ObjId, name: &str, category: Category) -> Option<ObjId> {
        self.get(id)?.children(category)?.get(name).copied()
    }

    /// Direct children of a category, without populating libraries.
    pub fn children(&self, id: ObjId, category: Category) -> Vec<ObjId> {
        self.get(id)
            .and_then(|n| n.children(category))
            .map(|c| c.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn ports(&self, id: ObjId) -> Vec<ObjId> {
        self.children(id, Category::Port)
    }

    pub fn relations(&self, id: ObjId) -> Vec<ObjId> {
        self.children(id, Category::Relation)
    }

    /// Whether any child of any category uses `name`.
    pub fn has_child_named(&self, id: ObjId, name: &str) -> bool {
        [Category::Attribute, Category::Port, Category::Entity, Category::Relation]
            .into_iter()
            .any(|c| self.child(id, name, c).is_some())
    }

    /// Whether `ancestor` contains `id` at any depth. Never populates.
    pub fn deep_contains(&self, ancestor: ObjId, id: ObjId) -> bool {
        let mut current = self.container(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.container(c);
        }
        false
    }

    /// A name not used by any child of `container`, built from `prefix`
    /// with any trailing digits stripped, then suffixed 2, 3, ...
    pub fn unique_name(&self, container: ObjId, prefix: &str) -> String {
        let stem = prefix.trim_end_matches(|c: char| c.is_ascii_digit());
        let stem = if stem.is_empty() { prefix } else { stem };
        if !self.has_child_named(container, stem) {
            return stem.to_string();
        }
        let mut index = 2usize;
        loop {
            let candidate = format!("{stem}{index}");
            if !self.has_child_named(container, &candidate) {
                return candidate;
            }
            index += 1;
        }
    }

    // ── Library-aware accessors ──────────────────────────────────────

    pub fn get_entity(&mut self, id: ObjId, name: &str) -> KernelResult<Option<ObjId>> {
        self.populate(id)?;
        Ok(self.child(id, name, Category::Entity))
    }

    pub fn entity_list(&mut self, id: ObjId) -> KernelResult<Vec<ObjId>> {
        self.populate(id)?;
        Ok(self.children(id, Category::Entity))
    }

    pub fn num_entities(&mut self, id: ObjId) -> KernelResult<usize> {
        Ok(self.entity_list(id)?.len())
    }

    /// Atomic entities at any depth, descending through composites that
    /// are not class definitions.
    pub fn deep_entity_list(&mut self, id: ObjId) -> KernelResult<Vec<ObjId>> {
        let mut out = Vec::new();
        for entity in self.entity_list(id)? {
            let node = self.node(entity)?;
            if node.is_class_definition() {
                continue;
            }
            if node.is_composite() {
                out.extend(self.deep_entity_list(entity)?);
            } else {
                out.push(entity);
            }
        }
        Ok(out)
    }

    pub fn attribute_list(&mut self, id: ObjId) -> KernelResult<Vec<ObjId>> {
        self.populate(id)?;
        Ok(self.children(id, Category::Attribute))
    }

    pub fn get_attribute(&mut self, id: ObjId, name: &str) -> KernelResult<Option<ObjId>> {
        self.populate(id)?;
        Ok(self.child(id, name, Category::Attribute))
    }

    /// Resolve a dotted path relative to `context`. A leading period makes
    /// the path absolute; its first segment must name the toplevel.
    /// Intermediate segments are searched as entities, then ports,
    /// relations and attributes. Libraries along the way are populated.
    pub fn lookup(&mut self, context: ObjId, path: &str, category: Category) -> KernelResult<Option<ObjId>> {
        let (mut current, rest) = match path.strip_prefix('.') {
            Some(absolute) => {
                let top = self.toplevel(context);
                let (head, rest) = match absolute.split_once('.') {
                    Some((head, rest)) => (head, Some(rest)),
                    None => (absolute, None),
                };
                if self.name(top) != head {
                    return Ok(None);
                }
                match rest {
                    None => {
                        let matches = self.node(top)?.category() == category;
                        return Ok(matches.then_some(top));
                    }
                    Some(rest) => (top, rest),
                }
            }
            None => (context, path),
        };
        if rest.is_empty() {
            return Ok(None);
        }
        let mut segments = rest.split('.').peekable();
        while let Some(segment) = segments.next() {
            self.populate(current)?;
            if segments.peek().is_none() {
                return Ok(self.child(current, segment, category));
            }
            let next = [Category::Entity, Category::Port, Category::Relation, Category::Attribute]
                .into_iter()
                .find_map(|c| self.child(current, segment, c));
            match next {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    // ── Libraries ────────────────────────────────────────────────────

    /// Materialize a pending library. A no-op for anything else.
    pub fn populate(&mut self, id: ObjId) -> KernelResult<()> {
        let Some(entity) = self.node_mut(id)?.as_entity_mut() else {
            return Ok(());
        };
        let text = match &entity.library {
            Some(LibraryState::Pending(text)) => text.clone(),
            _ => return Ok(()),
        };
        // Marked populated first so the loader's own reads do not recurse.
        entity.library = Some(LibraryState::Populated);
        let Some(loader) = self.library_loader.clone() else {
            return Err(KernelError::invalid_state(format!(
                "no library loader installed to populate {}",
                self.full_name(id)
            )));
        };
        debug!(library = %self.full_name(id), "populating library");
        loader
            .populate(self, id, &text)
            .map_err(|message| KernelError::invalid_state(format!("failed to populate {}: {message}", self.full_name(id))))
    }

    pub fn is_populated(&self, id: ObjId) -> bool {
        !matches!(
            self.get(id).and_then(|n| n.as_entity()).and_then(|e| e.library.as_ref()),
            Some(LibraryState::Pending(_))
        )
    }

    /// Pending configuration of an unpopulated library.
    pub fn pending_library_text(&self, id: ObjId) -> Option<&ConfigureText> {
        match self.get(id)?.as_entity()?.library.as_ref()? {
            LibraryState::Pending(text) => Some(text),
            LibraryState::Populated => None,
        }
    }

    // ── Values and flags ─────────────────────────────────────────────

    pub fn derived_level(&self, id: ObjId) -> u32 {
        self.get(id).map(|n| n.derived_level).unwrap_or(super::NOT_DERIVED)
    }

    pub fn set_derived_level(&mut self, id: ObjId, level: u32) -> KernelResult<()> {
        self.node_mut(id)?.derived_level = level;
        Ok(())
    }

    pub fn is_class_definition(&self, id: ObjId) -> bool {
        self.get(id).is_some_and(|n| n.is_class_definition())
    }

    pub fn set_class_definition(&mut self, id: ObjId, class: bool) -> KernelResult<()> {
        let name = self.full_name(id);
        let entity = self
            .node_mut(id)?
            .as_entity_mut()
            .ok_or_else(|| KernelError::illegal(name, "only entities can be class definitions"))?;
        entity.class_definition = class;
        Ok(())
    }

    /// Whether `id` or any of its containers is a class definition.
    pub fn is_within_class_definition(&self, id: ObjId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if self.is_class_definition(c) {
                return true;
            }
            current = self.container(c);
        }
        false
    }

    /// Whether `id` is a library or sits inside one.
    pub fn is_within_library(&self, id: ObjId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if self.get(c).is_some_and(|n| n.is_library()) {
                return true;
            }
            current = self.container(c);
        }
        false
    }

    /// The class `id` was instantiated from or extends.
    pub fn parent_class(&self, id: ObjId) -> Option<ObjId> {
        self.get(id)?.as_entity()?.parent.filter(|p| self.contains(*p))
    }

    pub fn set_parent_class(&mut self, id: ObjId, parent: Option<ObjId>) -> KernelResult<()> {
        let old = self.node(id)?.as_entity().and_then(|e| e.parent);
        if let Some(old) = old
            && let Some(entity) = self.get_mut(old).and_then(|n| n.as_entity_mut())
        {
            entity.derived.retain(|d| *d != id);
        }
        if let Some(parent) = parent
            && let Some(entity) = self.node_mut(parent)?.as_entity_mut()
        {
            entity.derived.push(id);
        }
        if let Some(entity) = self.node_mut(id)?.as_entity_mut() {
            entity.parent = parent;
        }
        Ok(())
    }

    /// Live subclasses and instances created directly from `id`.
    pub fn derived_children(&self, id: ObjId) -> Vec<ObjId> {
        self.get(id)
            .and_then(|n| n.as_entity())
            .map(|e| e.derived.iter().copied().filter(|d| self.contains(*d)).collect())
            .unwrap_or_default()
    }

    /// Whether any object derived from `id` is still alive.
    pub fn has_live_derived(&self, id: ObjId) -> bool {
        !self.derived_children(id).is_empty()
    }

    pub fn set_class_name(&mut self, id: ObjId, class_name: &str) -> KernelResult<()> {
        self.node_mut(id)?.class_name = SmolStr::new(class_name);
        Ok(())
    }

    pub fn set_source(&mut self, id: ObjId, source: Option<String>) -> KernelResult<()> {
        if let Some(entity) = self.node_mut(id)?.as_entity_mut() {
            entity.source = source;
        }
        Ok(())
    }

    pub fn set_handles_internal_links(&mut self, id: ObjId, value: bool) -> KernelResult<()> {
        if let Some(entity) = self.node_mut(id)?.as_entity_mut() {
            entity.handles_internal_links = value;
        }
        Ok(())
    }

    pub fn set_display_name(&mut self, id: ObjId, display: Option<String>) -> KernelResult<()> {
        self.node_mut(id)?.display_name = display;
        Ok(())
    }

    pub fn port_flags(&self, id: ObjId) -> PortFlags {
        self.get(id).and_then(|n| n.as_port()).map(|p| p.flags).unwrap_or_default()
    }

    pub fn set_port_flags(&mut self, id: ObjId, flags: PortFlags) -> KernelResult<()> {
        let name = self.full_name(id);
        let port = self
            .node_mut(id)?
            .as_port_mut()
            .ok_or_else(|| KernelError::illegal(name, "not a port"))?;
        port.flags = flags;
        Ok(())
    }

    pub fn expression(&self, id: ObjId) -> Option<&str> {
        self.get(id)?.as_attribute()?.expression.as_deref()
    }

    /// Set the value of a settable attribute. An empty value is stored as
    /// no value.
    pub fn set_expression(&mut self, id: ObjId, value: Option<String>) -> KernelResult<()> {
        let name = self.full_name(id);
        match self.node_mut(id)?.as_attribute_mut() {
            Some(attr) if attr.kind.is_settable() => {
                attr.expression = value.filter(|v| !v.is_empty());
                Ok(())
            }
            _ => Err(KernelError::NotSettable(name)),
        }
    }

    pub fn is_settable(&self, id: ObjId) -> bool {
        self.get(id)
            .and_then(|n| n.as_attribute())
            .is_some_and(|a| a.kind.is_settable())
    }

    pub fn is_overridden(&self, id: ObjId) -> bool {
        self.get(id).and_then(|n| n.as_attribute()).is_some_and(|a| a.overridden)
    }

    pub fn set_overridden(&mut self, id: ObjId, overridden: bool) -> KernelResult<()> {
        if let Some(attr) = self.node_mut(id)?.as_attribute_mut() {
            attr.overridden = overridden;
        }
        Ok(())
    }

    /// Hand configuration text to a library or an attribute.
    pub fn configure(&mut self, id: ObjId, text: ConfigureText) -> KernelResult<()> {
        let name = self.full_name(id);
        let node = self.node_mut(id)?;
        match &mut node.body {
            Body::Entity(entity) if entity.kind == EntityKind::Library => {
                entity.library = Some(LibraryState::Pending(text));
                Ok(())
            }
            Body::Attribute(attr) => {
                attr.configure = Some(text);
                Ok(())
            }
            _ => Err(KernelError::illegal(name, "object is not configurable")),
        }
    }

    /// The configuration of an attribute, or the pending text of a library.
    pub fn configure_text(&self, id: ObjId) -> Option<&ConfigureText> {
        let node = self.get(id)?;
        match &node.body {
            Body::Attribute(attr) => attr.configure.as_ref(),
            Body::Entity(_) => self.pending_library_text(id),
            _ => None,
        }
    }

    pub fn linked_port(&self, vertex: ObjId) -> Option<ObjId> {
        self.get(vertex)?
            .as_attribute()?
            .linked_port
            .filter(|p| self.contains(*p))
    }

    pub fn set_linked_port(&mut self, vertex: ObjId, port: Option<ObjId>) -> KernelResult<()> {
        let name = self.full_name(vertex);
        let attr = self
            .node_mut(vertex)?
            .as_attribute_mut()
            .ok_or_else(|| KernelError::illegal(name, "not a vertex"))?;
        attr.linked_port = port;
        Ok(())
    }

    /// The port parameter paired with `port`, if any.
    pub fn port_parameter(&self, port: ObjId) -> Option<ObjId> {
        let node = self.get(port)?;
        let container = node.container?;
        let attr = self.child(container, &node.name, Category::Attribute)?;
        let body = self.get(attr)?.as_attribute()?;
        (body.kind == AttributeKind::PortParameter && body.linked_port == Some(port)).then_some(attr)
    }
}
