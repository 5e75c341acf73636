//! Deep copies and class instantiation.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use super::error::{KernelError, KernelResult};
use super::node::{Body, Category};
use super::workspace::URI_ATTRIBUTE;
use super::{NOT_DERIVED, ObjId, Workspace};

impl Workspace {
    /// Deep copy `source` into `container` under `name`.
    ///
    /// Links are kept only when both ends are inside the copied subtree.
    /// Unpopulated libraries stay unpopulated in the copy. Copied instances
    /// are registered with their class, inside the copy or not.
    pub fn clone_into(&mut self, source: ObjId, container: Option<ObjId>, name: &str) -> KernelResult<ObjId> {
        Self::validate_name(name)?;
        let originals = self.subtree(source);
        let mut map: FxHashMap<ObjId, ObjId> = FxHashMap::default();
        let mut order = Vec::with_capacity(originals.len());

        for &original in &originals {
            let mut node = self.node(original)?.clone();
            node.attributes.clear();
            if let Body::Entity(entity) = &mut node.body {
                entity.ports.clear();
                entity.entities.clear();
                entity.relations.clear();
                entity.derived.clear();
            }
            let new_container = if original == source {
                node.name = SmolStr::new(name);
                container
            } else {
                node.container.and_then(|c| map.get(&c).copied())
            };
            let copy = match self.adopt_node(new_container, node) {
                Ok(copy) => copy,
                Err(e) => {
                    if let Some(&root) = map.get(&source) {
                        self.remove(root)?;
                    }
                    return Err(e);
                }
            };
            map.insert(original, copy);
            order.push(copy);
        }

        let remap = |id: &ObjId| map.get(id).copied();
        let mut registrations = Vec::new();
        for &copy in &order {
            let Some(node) = self.get_mut(copy) else {
                continue;
            };
            match &mut node.body {
                Body::Port(port) => {
                    for list in [&mut port.links, &mut port.inside_links] {
                        *list = list
                            .iter()
                            .filter_map(|slot| match slot {
                                None => Some(None),
                                Some(r) => remap(r).map(Some),
                            })
                            .collect();
                        while list.last() == Some(&None) {
                            list.pop();
                        }
                    }
                }
                Body::Relation(rel) => {
                    rel.linked = rel.linked.iter().filter_map(remap).collect();
                }
                Body::Attribute(attr) => {
                    attr.linked_port = attr.linked_port.as_ref().and_then(remap);
                }
                Body::Entity(entity) => {
                    if let Some(parent) = entity.parent {
                        let parent = remap(&parent).unwrap_or(parent);
                        entity.parent = Some(parent);
                        registrations.push((parent, copy));
                    }
                }
            }
        }
        for (parent, child) in registrations {
            if let Some(entity) = self.get_mut(parent).and_then(|n| n.as_entity_mut()) {
                entity.derived.push(child);
            }
        }
        map.get(&source)
            .copied()
            .ok_or_else(|| KernelError::Stale(source.to_string()))
    }

    /// Create a subclass (`as_class`) or instance of `class` in `container`.
    ///
    /// The new object is locally defined; everything inside it is marked
    /// derived by depth, override marks are cleared and the copy drops the
    /// class's `_uri`.
    pub fn instantiate(
        &mut self,
        class: ObjId,
        container: Option<ObjId>,
        name: &str,
        as_class: bool,
    ) -> KernelResult<ObjId> {
        if self.node(class)?.as_entity().is_none() {
            return Err(KernelError::illegal(self.full_name(class), "only entities can be instantiated"));
        }
        let copy = self.clone_into(class, container, name)?;
        self.set_derived_level(copy, NOT_DERIVED)?;
        self.set_class_definition(copy, as_class)?;
        if let Some(entity) = self.node_mut(copy)?.as_entity_mut() {
            entity.source = None;
        }
        self.set_parent_class(copy, Some(class))?;
        self.mark_contents_derived(copy, 0)?;
        self.clear_overrides(copy)?;
        self.strip_uri(copy)?;
        debug!(
            class = %self.full_name(class),
            created = %self.full_name(copy),
            as_class,
            "instantiated"
        );
        Ok(copy)
    }

    /// Lower the derivation level of everything inside `id` to at most
    /// `depth + 1` for direct children, `depth + 2` for grandchildren and
    /// so on.
    pub fn mark_contents_derived(&mut self, id: ObjId, depth: u32) -> KernelResult<()> {
        let children = self.node(id)?.all_children();
        let level = depth.saturating_add(1);
        for child in children {
            let node = self.node_mut(child)?;
            node.derived_level = node.derived_level.min(level);
            self.mark_contents_derived(child, level)?;
        }
        Ok(())
    }

    fn clear_overrides(&mut self, id: ObjId) -> KernelResult<()> {
        for obj in self.subtree(id) {
            if let Some(attr) = self.node_mut(obj)?.as_attribute_mut() {
                attr.overridden = false;
            }
        }
        Ok(())
    }

    /// Drop the provenance attribute a copy inherited from its source.
    pub(crate) fn strip_uri(&mut self, id: ObjId) -> KernelResult<()> {
        if let Some(uri) = self.child(id, URI_ATTRIBUTE, Category::Attribute) {
            self.remove(uri)?;
        }
        Ok(())
    }
}
