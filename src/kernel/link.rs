//! Port/relation links.
//!
//! A link from a port to a relation is either an *outside* link (the
//! relation lives in the container of the port's entity) or an *inside*
//! link (the relation lives inside the port's own composite entity).
//! Each port keeps one ordered list per side; gaps left by sparse
//! insertion are `None`. Relations record one entry per link.

use super::error::{KernelError, KernelResult};
use super::node::Body;
use super::{ObjId, Workspace};

impl Workspace {
    /// Decide which side of `port` a link to `relation` lands on.
    pub fn is_inside_link(&self, port: ObjId, relation: ObjId) -> KernelResult<bool> {
        let port_node = self.node(port)?;
        if port_node.as_port().is_none() {
            return Err(KernelError::illegal(self.full_name(port), "not a port"));
        }
        let rel_node = self.node(relation)?;
        if rel_node.as_relation().is_none() {
            return Err(KernelError::illegal(self.full_name(relation), "not a relation"));
        }
        let entity = port_node.container;
        let rel_container = rel_node.container;
        if rel_container.is_some() && rel_container == entity {
            Ok(true)
        } else if rel_container.is_some() && rel_container == entity.and_then(|e| self.container(e)) {
            Ok(false)
        } else {
            Err(KernelError::illegal(
                self.full_name(port),
                format!("cannot link to {}: not at an adjacent level", self.full_name(relation)),
            ))
        }
    }

    /// Link `port` to `relation`, appending or inserting at `index`.
    /// Inserting past the end pads the list with empty slots.
    pub fn link(&mut self, port: ObjId, relation: ObjId, index: Option<usize>) -> KernelResult<()> {
        let inside = self.is_inside_link(port, relation)?;
        let Some(body) = self.node_mut(port)?.as_port_mut() else {
            return Ok(());
        };
        let list = if inside { &mut body.inside_links } else { &mut body.links };
        match index {
            None => list.push(Some(relation)),
            Some(i) if i <= list.len() => list.insert(i, Some(relation)),
            Some(i) => {
                list.resize(i, None);
                list.push(Some(relation));
            }
        }
        if let Some(rel) = self.node_mut(relation)?.as_relation_mut() {
            rel.linked.push(port);
        }
        Ok(())
    }

    /// Join two relations in the same container into a relation group.
    pub fn link_relations(&mut self, first: ObjId, second: ObjId) -> KernelResult<()> {
        for r in [first, second] {
            if self.node(r)?.as_relation().is_none() {
                return Err(KernelError::illegal(self.full_name(r), "not a relation"));
            }
        }
        if self.container(first) != self.container(second) {
            return Err(KernelError::illegal(
                self.full_name(first),
                format!("cannot link to {}: different containers", self.full_name(second)),
            ));
        }
        if let Some(rel) = self.node_mut(first)?.as_relation_mut() {
            rel.linked.push(second);
        }
        if let Some(rel) = self.node_mut(second)?.as_relation_mut() {
            rel.linked.push(first);
        }
        Ok(())
    }

    /// Remove every link between `port` and `relation`, on either side.
    pub fn unlink(&mut self, port: ObjId, relation: ObjId) -> KernelResult<()> {
        self.node(port)?;
        self.node(relation)?;
        self.forget_peer(port, relation);
        self.forget_peer(relation, port);
        Ok(())
    }

    /// Remove the outside link at `index`. Returns the relation it held.
    pub fn unlink_index(&mut self, port: ObjId, index: usize) -> KernelResult<Option<ObjId>> {
        self.unlink_slot(port, index, false)
    }

    /// Remove the inside link at `index`. Returns the relation it held.
    pub fn unlink_inside_index(&mut self, port: ObjId, index: usize) -> KernelResult<Option<ObjId>> {
        self.unlink_slot(port, index, true)
    }

    fn unlink_slot(&mut self, port: ObjId, index: usize, inside: bool) -> KernelResult<Option<ObjId>> {
        let name = self.full_name(port);
        let body = self
            .node_mut(port)?
            .as_port_mut()
            .ok_or_else(|| KernelError::illegal(name.clone(), "not a port"))?;
        let list = if inside { &mut body.inside_links } else { &mut body.links };
        if index >= list.len() {
            return Err(KernelError::illegal(name, format!("no link at index {index}")));
        }
        let removed = list.remove(index);
        if let Some(relation) = removed
            && let Some(rel) = self.get_mut(relation).and_then(|n| n.as_relation_mut())
            && let Some(pos) = rel.linked.iter().position(|l| *l == port)
        {
            rel.linked.remove(pos);
        }
        Ok(removed)
    }

    /// Remove the relation-group link between two relations.
    pub fn unlink_relations(&mut self, first: ObjId, second: ObjId) -> KernelResult<()> {
        self.node(first)?;
        self.node(second)?;
        self.forget_peer(first, second);
        self.forget_peer(second, first);
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Raw link slots of one side of a port, gaps included.
    pub fn link_slots(&self, port: ObjId, inside: bool) -> &[Option<ObjId>] {
        match self.get(port).map(|n| &n.body) {
            Some(Body::Port(p)) if inside => &p.inside_links,
            Some(Body::Port(p)) => &p.links,
            _ => &[],
        }
    }

    /// Relations linked from the outside, in link order.
    pub fn linked_relations(&self, port: ObjId) -> Vec<ObjId> {
        self.link_slots(port, false).iter().flatten().copied().collect()
    }

    /// Relations linked from the inside, in link order.
    pub fn inside_relations(&self, port: ObjId) -> Vec<ObjId> {
        self.link_slots(port, true).iter().flatten().copied().collect()
    }

    /// Ports and relations linked to `relation`, one entry per link.
    pub fn linked_objects(&self, relation: ObjId) -> Vec<ObjId> {
        self.get(relation)
            .and_then(|n| n.as_relation())
            .map(|r| r.linked.clone())
            .unwrap_or_default()
    }

    /// Whether `port` and `relation` share at least one link.
    pub fn is_linked(&self, port: ObjId, relation: ObjId) -> bool {
        self.linked_objects(relation).contains(&port)
    }

    /// Width of a link list, counting gaps.
    pub fn link_count(&self, port: ObjId, inside: bool) -> usize {
        self.link_slots(port, inside).len()
    }
}
