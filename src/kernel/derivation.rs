//! Propagation of changes from class definitions to derived objects.
//!
//! An object is *derived* when it exists because some container of it was
//! instantiated from a class. Its derivation level says how many levels up
//! that container sits. Derived objects are found by walking up from the
//! changed object, and for every entity on the way looking up the same
//! relative path in each subclass and instance of that entity:
//!
//! ```text
//! class C              instance I (parent = C)
//! └── a                └── a'   level 1   ← derived_list(C.a) = [I.a']
//!     └── p                └── p'  level 2
//! ```
//!
//! Creation-style propagation walks the list front to back (subclasses
//! before instances); deletion walks it back to front.

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::{debug, trace, warn};

use super::error::{KernelError, KernelResult};
use super::node::Category;
use super::{NOT_DERIVED, ObjId, Workspace};

impl Workspace {
    // ── Derived lists ────────────────────────────────────────────────

    /// Every object derived from `id`, transitively.
    pub fn derived_list(&self, id: ObjId) -> Vec<ObjId> {
        let mut visited = FxHashSet::default();
        visited.insert(id);
        let mut out = Vec::new();
        self.collect_derived(id, true, &mut visited, &mut out);
        out
    }

    /// Objects derived from `id` through a single class relationship.
    pub fn immediate_derived(&self, id: ObjId) -> Vec<ObjId> {
        let mut visited = FxHashSet::default();
        visited.insert(id);
        let mut out = Vec::new();
        self.collect_derived(id, false, &mut visited, &mut out);
        out
    }

    fn collect_derived(&self, id: ObjId, transitive: bool, visited: &mut FxHashSet<ObjId>, out: &mut Vec<ObjId>) {
        let mut path: Vec<(Category, SmolStr)> = Vec::new();
        let mut current = id;
        while let Some(node) = self.get(current) {
            if node.as_entity().is_some() {
                let mut derived = self.derived_children(current);
                derived.sort_by_key(|d| !self.is_class_definition(*d));
                for d in derived {
                    let Some(target) = self.follow_path(d, &path) else {
                        continue;
                    };
                    if !path.is_empty() && self.derived_level(target) as usize > path.len() {
                        continue;
                    }
                    if !visited.insert(target) {
                        continue;
                    }
                    out.push(target);
                    if transitive {
                        self.collect_derived(target, true, visited, out);
                    }
                }
            }
            let Some(container) = node.container else {
                break;
            };
            path.insert(0, (node.category(), node.name.clone()));
            current = container;
        }
    }

    /// The container whose instantiation implies `id`, if `id` is derived.
    pub fn implying_ancestor(&self, id: ObjId) -> Option<ObjId> {
        let level = self.derived_level(id);
        if level == NOT_DERIVED {
            return None;
        }
        let mut current = id;
        for _ in 0..level {
            current = self.container(current)?;
        }
        Some(current)
    }

    /// Whether a link between `object` and `relation` is part of a class
    /// definition, that is, both ends are implied by a class relationship
    /// at or below the relation's container.
    pub fn is_inherited_link(&self, object: ObjId, relation: ObjId) -> bool {
        let Some(context) = self.container(relation) else {
            return false;
        };
        let implied_within = |id: ObjId| {
            let mut depth = 0u32;
            let mut current = Some(id);
            while let Some(c) = current {
                if c == context {
                    return self.derived_level(id) <= depth;
                }
                depth += 1;
                current = self.container(c);
            }
            false
        };
        implied_within(object) && implied_within(relation)
    }

    // ── Existence ────────────────────────────────────────────────────

    /// Fail if creating `name` in `container` would clash with a locally
    /// defined object in any derived copy of `container`. Libraries and
    /// their contents are exempt.
    ///
    /// The parser checks entities, ports and relations. Attributes are not
    /// checked: a derived copy that already has a same-named attribute
    /// adopts the new one and keeps its value.
    pub fn check_derived_collisions(&self, container: ObjId, name: &str, category: Category) -> KernelResult<()> {
        if self.is_within_library(container) {
            return Ok(());
        }
        for derived in self.derived_list(container) {
            if self.is_within_library(derived) {
                continue;
            }
            if let Some(existing) = self.child(derived, name, category) {
                return Err(KernelError::DerivedCollision {
                    name: name.to_string(),
                    existing: self.full_name(existing),
                });
            }
        }
        Ok(())
    }

    /// Copy a newly created object into every derived copy of its
    /// container that does not already have a child of that name.
    pub fn propagate_existence(&mut self, id: ObjId) -> KernelResult<Vec<ObjId>> {
        let (name, category, container) = {
            let node = self.node(id)?;
            (node.name.clone(), node.category(), node.container)
        };
        let Some(container) = container else {
            return Ok(Vec::new());
        };
        let mut created = Vec::new();
        for derived in self.derived_list(container) {
            if self.child(derived, &name, category).is_some() {
                trace!(container = %self.full_name(derived), name = %name, "existing child adopted");
                continue;
            }
            let level = match self.derived_level(derived) {
                NOT_DERIVED => 1,
                level => level.saturating_add(1),
            };
            let copy = self.clone_into(id, Some(derived), &name)?;
            self.set_derived_level(copy, level)?;
            self.mark_contents_derived(copy, level)?;
            self.strip_uri(copy)?;
            created.push(copy);
        }
        if !created.is_empty() {
            debug!(object = %self.full_name(id), copies = created.len(), "propagated existence");
        }
        Ok(created)
    }

    /// Remove every derived copy of `id`, instances before their classes.
    /// `id` itself is left in place.
    pub fn propagate_deletion(&mut self, id: ObjId) -> KernelResult<usize> {
        let targets = self.derived_list(id);
        let mut removed = 0;
        for target in targets.into_iter().rev() {
            if self.contains(target) {
                self.remove(target)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ── Values ───────────────────────────────────────────────────────

    /// Derived copies that inherit their value from `id`: immediate
    /// derived objects, recursively, stopping at overrides.
    pub fn value_targets(&self, id: ObjId) -> Vec<ObjId> {
        let mut visited = FxHashSet::default();
        visited.insert(id);
        let mut out = Vec::new();
        let mut queue = vec![id];
        while let Some(current) = queue.pop() {
            for target in self.immediate_derived(current) {
                if !visited.insert(target) || self.is_overridden(target) {
                    continue;
                }
                out.push(target);
                queue.push(target);
            }
        }
        out
    }

    /// Copy the value of `id` to every copy that inherits it.
    pub fn propagate_value(&mut self, id: ObjId) -> KernelResult<Vec<ObjId>> {
        let value = self.expression(id).map(str::to_string);
        let targets = self.value_targets(id);
        if let Some(bad) = targets.iter().find(|t| !self.is_settable(**t)) {
            return Err(KernelError::NotSettable(self.full_name(*bad)));
        }
        for &target in &targets {
            self.set_expression(target, value.clone())?;
        }
        Ok(targets)
    }

    /// Copy the configuration of `id` to every copy that inherits it.
    pub fn propagate_configure(&mut self, id: ObjId) -> KernelResult<Vec<ObjId>> {
        let Some(text) = self.configure_text(id).cloned() else {
            return Ok(Vec::new());
        };
        let targets = self.value_targets(id);
        for &target in &targets {
            self.configure(target, text.clone())?;
        }
        Ok(targets)
    }

    // ── Rename ───────────────────────────────────────────────────────

    /// Rename `id` and every object derived from it.
    ///
    /// All collisions are checked before anything changes. Should a rename
    /// still fail part way, the ones already applied are reverted.
    pub fn rename_propagating(&mut self, id: ObjId, new_name: &str) -> KernelResult<()> {
        Self::validate_name(new_name)?;
        let old_name = SmolStr::new(self.name(id));
        if old_name.as_str() == new_name {
            return Ok(());
        }
        if self.derived_level(id) != NOT_DERIVED {
            return Err(KernelError::illegal(
                self.full_name(id),
                "cannot change the name of an object defined by a class",
            ));
        }
        let mut plan = vec![id];
        plan.extend(self.derived_list(id).into_iter().filter(|t| self.name(*t) == old_name.as_str()));

        for &obj in &plan {
            let category = self.node(obj)?.category();
            if let Some(container) = self.container(obj)
                && self.child(container, new_name, category).is_some()
            {
                return Err(KernelError::collision(category.as_str(), new_name, self.full_name(container)));
            }
        }

        let mut done: Vec<ObjId> = Vec::with_capacity(plan.len());
        for &obj in &plan {
            if let Err(e) = self.set_name(obj, new_name) {
                warn!(object = %self.full_name(obj), error = %e, "rename failed, rolling back");
                for &renamed in done.iter().rev() {
                    if let Err(undo) = self.set_name(renamed, &old_name) {
                        warn!(object = %self.full_name(renamed), error = %undo, "rollback failed");
                    }
                }
                return Err(e);
            }
            done.push(obj);
        }
        Ok(())
    }

    // ── Links ────────────────────────────────────────────────────────

    /// Resolve `ids` (all inside `context`) in each derived copy of
    /// `context`. Copies missing any of them are skipped.
    fn derived_counterparts<const N: usize>(&self, context: ObjId, ids: [ObjId; N]) -> Vec<[ObjId; N]> {
        let mut paths = Vec::with_capacity(N);
        for id in ids {
            match self.path_from(context, id) {
                Some(path) => paths.push(path),
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        for derived in self.derived_list(context) {
            let mut resolved = [derived; N];
            let mut complete = true;
            for (slot, path) in resolved.iter_mut().zip(&paths) {
                match self.follow_path(derived, path) {
                    Some(found) => *slot = found,
                    None => complete = false,
                }
            }
            if complete {
                out.push(resolved);
            } else {
                trace!(derived = %self.full_name(derived), "derived copy lacks link endpoint");
            }
        }
        out
    }

    pub fn propagate_link(&mut self, port: ObjId, relation: ObjId, index: Option<usize>) -> KernelResult<()> {
        let Some(context) = self.container(relation) else {
            return Ok(());
        };
        for [p, r] in self.derived_counterparts(context, [port, relation]) {
            self.link(p, r, index)?;
        }
        Ok(())
    }

    pub fn propagate_unlink(&mut self, port: ObjId, relation: ObjId) -> KernelResult<()> {
        let Some(context) = self.container(relation) else {
            return Ok(());
        };
        for [p, r] in self.derived_counterparts(context, [port, relation]) {
            self.unlink(p, r)?;
        }
        Ok(())
    }

    /// Unlink by index in every derived copy of the port's link context.
    pub fn propagate_unlink_index(&mut self, port: ObjId, index: usize, inside: bool) -> KernelResult<()> {
        let entity = self.container(port);
        let context = if inside { entity } else { entity.and_then(|e| self.container(e)) };
        let Some(context) = context else {
            return Ok(());
        };
        for [p] in self.derived_counterparts(context, [port]) {
            if self.link_count(p, inside) > index {
                if inside {
                    self.unlink_inside_index(p, index)?;
                } else {
                    self.unlink_index(p, index)?;
                }
            }
        }
        Ok(())
    }

    pub fn propagate_relation_link(&mut self, first: ObjId, second: ObjId, link: bool) -> KernelResult<()> {
        let Some(context) = self.container(first) else {
            return Ok(());
        };
        for [a, b] in self.derived_counterparts(context, [first, second]) {
            if link {
                self.link_relations(a, b)?;
            } else {
                self.unlink_relations(a, b)?;
            }
        }
        Ok(())
    }

    /// Copy the direction flags of `port` to all of its derived copies.
    pub fn propagate_port_flags(&mut self, port: ObjId) -> KernelResult<()> {
        let flags = self.port_flags(port);
        for target in self.derived_list(port) {
            self.set_port_flags(target, flags)?;
        }
        Ok(())
    }
}
