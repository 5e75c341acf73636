//! Type registry: fully qualified type ids to node templates.
//!
//! MoML names concrete types by dotted identifiers such as
//! `ptolemy.kernel.CompositeEntity`. The registry maps each identifier to
//! the [`NodeKind`] to construct. Unknown identifiers are not an error
//! here; the parser falls back to looking for a MoML file defining them.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::error::{KernelError, KernelResult};
use super::node::{AttributeKind, Category, EntityKind, NodeKind};
use super::{ObjId, Workspace};

/// Default class of an `entity` element without a class.
pub const DEFAULT_ENTITY_CLASS: &str = "ptolemy.kernel.CompositeEntity";
pub const DEFAULT_PORT_CLASS: &str = "ptolemy.kernel.ComponentPort";
pub const DEFAULT_RELATION_CLASS: &str = "ptolemy.kernel.ComponentRelation";
pub const DEFAULT_ATTRIBUTE_CLASS: &str = "ptolemy.kernel.util.Attribute";
pub const DEFAULT_PARAMETER_CLASS: &str = "ptolemy.data.expr.Parameter";
pub const DOCUMENTATION_CLASS: &str = "ptolemy.kernel.util.Documentation";
pub const VERTEX_CLASS: &str = "ptolemy.moml.Vertex";
pub const URI_CLASS: &str = "ptolemy.kernel.attributes.URIAttribute";
pub const LIBRARY_CLASS: &str = "ptolemy.moml.EntityLibrary";

#[derive(Clone, Debug)]
pub struct TypeRegistry {
    types: FxHashMap<SmolStr, NodeKind>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        use AttributeKind as A;
        use EntityKind as E;
        for (id, kind) in [
            ("ptolemy.kernel.Entity", NodeKind::Entity(E::Atomic)),
            ("ptolemy.kernel.ComponentEntity", NodeKind::Entity(E::Atomic)),
            ("ptolemy.kernel.CompositeEntity", NodeKind::Entity(E::Composite)),
            ("ptolemy.actor.AtomicActor", NodeKind::Entity(E::Atomic)),
            ("ptolemy.actor.TypedAtomicActor", NodeKind::Entity(E::Atomic)),
            ("ptolemy.actor.CompositeActor", NodeKind::Entity(E::Composite)),
            ("ptolemy.actor.TypedCompositeActor", NodeKind::Entity(E::Composite)),
            (LIBRARY_CLASS, NodeKind::Entity(E::Library)),
            ("ptolemy.kernel.Port", NodeKind::Port),
            ("ptolemy.kernel.ComponentPort", NodeKind::Port),
            ("ptolemy.actor.IOPort", NodeKind::Port),
            ("ptolemy.actor.TypedIOPort", NodeKind::Port),
            ("ptolemy.actor.parameters.ParameterPort", NodeKind::Port),
            ("ptolemy.kernel.Relation", NodeKind::Relation),
            ("ptolemy.kernel.ComponentRelation", NodeKind::Relation),
            ("ptolemy.actor.IORelation", NodeKind::Relation),
            ("ptolemy.actor.TypedIORelation", NodeKind::Relation),
            (DEFAULT_ATTRIBUTE_CLASS, NodeKind::Attribute(A::Plain)),
            ("ptolemy.kernel.util.SingletonAttribute", NodeKind::Attribute(A::Marker)),
            ("ptolemy.kernel.util.StringAttribute", NodeKind::Attribute(A::StringAttribute)),
            ("ptolemy.kernel.util.Location", NodeKind::Attribute(A::Location)),
            ("ptolemy.kernel.util.ConfigurableAttribute", NodeKind::Attribute(A::Configurable)),
            (DOCUMENTATION_CLASS, NodeKind::Attribute(A::Documentation)),
            (DEFAULT_PARAMETER_CLASS, NodeKind::Attribute(A::Parameter)),
            ("ptolemy.data.expr.StringParameter", NodeKind::Attribute(A::Parameter)),
            ("ptolemy.data.expr.FileParameter", NodeKind::Attribute(A::Parameter)),
            ("ptolemy.actor.parameters.PortParameter", NodeKind::Attribute(A::PortParameter)),
            ("ptolemy.actor.Director", NodeKind::Attribute(A::Plain)),
            (URI_CLASS, NodeKind::Attribute(A::Uri)),
            (VERTEX_CLASS, NodeKind::Attribute(A::Vertex)),
            ("ptolemy.vergil.icon.EditorIcon", NodeKind::Attribute(A::Configurable)),
            ("ptolemy.vergil.kernel.attributes.TextAttribute", NodeKind::Attribute(A::Configurable)),
        ] {
            registry.register(id, kind);
        }
        registry
    }
}

impl TypeRegistry {
    /// A registry with no types.
    pub fn empty() -> Self {
        Self {
            types: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, id: &str, kind: NodeKind) {
        self.types.insert(SmolStr::new(id), kind);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_type(mut self, id: &str, kind: NodeKind) -> Self {
        self.register(id, kind);
        self
    }

    pub fn resolve(&self, id: &str) -> Option<NodeKind> {
        self.types.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.types.contains_key(id)
    }

    /// Construct a node of type `id`, checking that it belongs to the
    /// expected category.
    pub fn construct(
        &self,
        ws: &mut Workspace,
        container: Option<ObjId>,
        name: &str,
        id: &str,
        expected: Category,
    ) -> KernelResult<ObjId> {
        let kind = self
            .resolve(id)
            .ok_or_else(|| KernelError::UnknownType(id.to_string()))?;
        if kind.category() != expected {
            return Err(KernelError::illegal(
                name,
                format!("{id} is a {}, expected a {}", kind.category().as_str(), expected.as_str()),
            ));
        }
        ws.create(container, name, kind, id)
    }
}
