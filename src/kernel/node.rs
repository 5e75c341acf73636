//! Node types stored in the workspace arena.
//!
//! ```text
//! Node
//! ├── name, class_name, container, derived_level
//! ├── attributes: IndexMap<name, ObjId>   (every node may carry attributes)
//! └── body
//!     ├── Entity    { ports, entities, relations, class flag, parent, derived }
//!     ├── Port      { input/output/multiport, links, inside_links }
//!     ├── Relation  { linked }
//!     └── Attribute { kind, expression, configure, overridden, linked_port }
//! ```

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::ObjId;

/// Derivation level of an object that was defined locally rather than
/// implied by a class definition.
pub const NOT_DERIVED: u32 = u32::MAX;

// ============================================================================
// KINDS
// ============================================================================

/// The sibling namespace a child lives in. Names are unique per category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Entity,
    Port,
    Relation,
    Attribute,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Entity => "entity",
            Category::Port => "port",
            Category::Relation => "relation",
            Category::Attribute => "attribute",
        }
    }
}

/// Flavor of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Atomic,
    Composite,
    /// A composite whose contents are materialized on first read access.
    Library,
}

/// Flavor of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Carries no value.
    Plain,
    /// Expression-valued parameter.
    Parameter,
    StringAttribute,
    Documentation,
    Location,
    /// Bend point of a relation.
    Vertex,
    /// Provenance of a loaded document. Never persisted.
    Uri,
    /// Parameter shadowed by a port of the same name.
    PortParameter,
    /// Accepts `configure` text.
    Configurable,
    /// Singleton flag attribute such as `_libraryMarker`.
    Marker,
}

impl AttributeKind {
    pub fn is_settable(&self) -> bool {
        !matches!(self, AttributeKind::Plain | AttributeKind::Marker)
    }

    pub fn is_persistent(&self) -> bool {
        !matches!(self, AttributeKind::Uri)
    }
}

/// What a registry entry or a creation request builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Entity(EntityKind),
    Port,
    Relation,
    Attribute(AttributeKind),
}

impl NodeKind {
    pub fn category(&self) -> Category {
        match self {
            NodeKind::Entity(_) => Category::Entity,
            NodeKind::Port => Category::Port,
            NodeKind::Relation => Category::Relation,
            NodeKind::Attribute(_) => Category::Attribute,
        }
    }
}

// ============================================================================
// BODIES
// ============================================================================

/// Text handed to a configurable object by a `configure` element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigureText {
    pub base: Option<String>,
    pub source: Option<String>,
    pub text: String,
}

/// Population state of an entity library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LibraryState {
    Populated,
    Pending(ConfigureText),
}

#[derive(Clone, Debug)]
pub struct EntityBody {
    pub kind: EntityKind,
    pub class_definition: bool,
    /// The class this entity was instantiated from or extends.
    pub parent: Option<ObjId>,
    /// Weak list of subclasses and instances created from this entity.
    pub derived: Vec<ObjId>,
    pub ports: IndexMap<SmolStr, ObjId>,
    pub entities: IndexMap<SmolStr, ObjId>,
    pub relations: IndexMap<SmolStr, ObjId>,
    /// `Some` only for libraries.
    pub library: Option<LibraryState>,
    /// Where the class definition was loaded from, if it came from a file.
    pub source: Option<String>,
    /// Set when the entity exports its own internal links, so deletions
    /// inside it need no link undo.
    pub handles_internal_links: bool,
}

impl EntityBody {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            class_definition: false,
            parent: None,
            derived: Vec::new(),
            ports: IndexMap::new(),
            entities: IndexMap::new(),
            relations: IndexMap::new(),
            library: (kind == EntityKind::Library).then_some(LibraryState::Populated),
            source: None,
            handles_internal_links: false,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, EntityKind::Composite | EntityKind::Library)
    }
}

/// Direction and width flags of a port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PortFlags {
    pub input: bool,
    pub output: bool,
    pub multiport: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PortBody {
    pub flags: PortFlags,
    /// Links to relations in the container of the port's entity.
    /// `None` entries are gaps created by sparse insertion.
    pub links: Vec<Option<ObjId>>,
    /// Links to relations inside the port's own (composite) entity.
    pub inside_links: Vec<Option<ObjId>>,
}

#[derive(Clone, Debug, Default)]
pub struct RelationBody {
    /// Ports and relations linked to this relation, one entry per link.
    pub linked: Vec<ObjId>,
}

#[derive(Clone, Debug)]
pub struct AttributeBody {
    pub kind: AttributeKind,
    pub expression: Option<String>,
    pub configure: Option<ConfigureText>,
    /// Set when a derived attribute's value was changed locally.
    pub overridden: bool,
    /// Port bound to a vertex.
    pub linked_port: Option<ObjId>,
}

impl AttributeBody {
    pub fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            expression: None,
            configure: None,
            overridden: false,
            linked_port: None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Body {
    Entity(EntityBody),
    Port(PortBody),
    Relation(RelationBody),
    Attribute(AttributeBody),
}

// ============================================================================
// NODE
// ============================================================================

/// A named object in the graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) name: SmolStr,
    /// Fully qualified type id, or the MoML class reference used to create it.
    pub(crate) class_name: SmolStr,
    pub(crate) container: Option<ObjId>,
    pub(crate) derived_level: u32,
    pub(crate) display_name: Option<String>,
    pub(crate) attributes: IndexMap<SmolStr, ObjId>,
    pub(crate) body: Body,
}

impl Node {
    pub(crate) fn new(name: &str, class_name: &str, kind: NodeKind) -> Self {
        let body = match kind {
            NodeKind::Entity(kind) => Body::Entity(EntityBody::new(kind)),
            NodeKind::Port => Body::Port(PortBody::default()),
            NodeKind::Relation => Body::Relation(RelationBody::default()),
            NodeKind::Attribute(kind) => Body::Attribute(AttributeBody::new(kind)),
        };
        Self {
            name: SmolStr::new(name),
            class_name: SmolStr::new(class_name),
            container: None,
            derived_level: NOT_DERIVED,
            display_name: None,
            attributes: IndexMap::new(),
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn container(&self) -> Option<ObjId> {
        self.container
    }

    pub fn derived_level(&self) -> u32 {
        self.derived_level
    }

    /// Whether this object is implied by a class definition.
    pub fn is_derived(&self) -> bool {
        self.derived_level != NOT_DERIVED
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn category(&self) -> Category {
        match &self.body {
            Body::Entity(_) => Category::Entity,
            Body::Port(_) => Category::Port,
            Body::Relation(_) => Category::Relation,
            Body::Attribute(_) => Category::Attribute,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match &self.body {
            Body::Entity(e) => NodeKind::Entity(e.kind),
            Body::Port(_) => NodeKind::Port,
            Body::Relation(_) => NodeKind::Relation,
            Body::Attribute(a) => NodeKind::Attribute(a.kind),
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn as_entity(&self) -> Option<&EntityBody> {
        match &self.body {
            Body::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn as_entity_mut(&mut self) -> Option<&mut EntityBody> {
        match &mut self.body {
            Body::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<&PortBody> {
        match &self.body {
            Body::Port(p) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn as_port_mut(&mut self) -> Option<&mut PortBody> {
        match &mut self.body {
            Body::Port(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RelationBody> {
        match &self.body {
            Body::Relation(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn as_relation_mut(&mut self) -> Option<&mut RelationBody> {
        match &mut self.body {
            Body::Relation(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeBody> {
        match &self.body {
            Body::Attribute(a) => Some(a),
            _ => None,
        }
    }

    pub(crate) fn as_attribute_mut(&mut self) -> Option<&mut AttributeBody> {
        match &mut self.body {
            Body::Attribute(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.as_entity().is_some_and(|e| e.is_composite())
    }

    pub fn is_class_definition(&self) -> bool {
        self.as_entity().is_some_and(|e| e.class_definition)
    }

    pub fn is_library(&self) -> bool {
        self.as_entity().is_some_and(|e| e.kind == EntityKind::Library)
    }

    /// The child map for a category, if this node can hold that category.
    pub(crate) fn children(&self, category: Category) -> Option<&IndexMap<SmolStr, ObjId>> {
        match (category, &self.body) {
            (Category::Attribute, _) => Some(&self.attributes),
            (Category::Port, Body::Entity(e)) => Some(&e.ports),
            (Category::Entity, Body::Entity(e)) if e.is_composite() => Some(&e.entities),
            (Category::Relation, Body::Entity(e)) if e.is_composite() => Some(&e.relations),
            _ => None,
        }
    }

    pub(crate) fn children_mut(
        &mut self,
        category: Category,
    ) -> Option<&mut IndexMap<SmolStr, ObjId>> {
        if category == Category::Attribute {
            return Some(&mut self.attributes);
        }
        let Body::Entity(e) = &mut self.body else {
            return None;
        };
        let composite = e.is_composite();
        match category {
            Category::Port => Some(&mut e.ports),
            Category::Entity if composite => Some(&mut e.entities),
            Category::Relation if composite => Some(&mut e.relations),
            _ => None,
        }
    }

    /// All direct children, in category order: attributes, ports,
    /// entities, relations.
    pub(crate) fn all_children(&self) -> Vec<ObjId> {
        let mut out: Vec<ObjId> = self.attributes.values().copied().collect();
        if let Body::Entity(e) = &self.body {
            out.extend(e.ports.values().copied());
            out.extend(e.entities.values().copied());
            out.extend(e.relations.values().copied());
        }
        out
    }
}
