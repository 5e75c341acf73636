//! Class instantiation and propagation to derived objects.

use moml::kernel::{AttributeKind, Category, EntityKind, KernelError, NOT_DERIVED, NodeKind, ObjId, Workspace};

struct Model {
    ws: Workspace,
    top: ObjId,
    base: ObjId,
    inst: ObjId,
}

/// Class `Base` holding parameter `gain`, entity `a` with port `p`,
/// relation `r` and the link `a.p`-`r`; instance `inst` of it.
fn model() -> Model {
    let mut ws = Workspace::new();
    let top = ws
        .create(None, "top", NodeKind::Entity(EntityKind::Composite), "ptolemy.kernel.CompositeEntity")
        .unwrap();
    let base = ws
        .create(Some(top), "Base", NodeKind::Entity(EntityKind::Composite), "ptolemy.kernel.CompositeEntity")
        .unwrap();
    ws.set_class_definition(base, true).unwrap();
    let gain = ws
        .create(
            Some(base),
            "gain",
            NodeKind::Attribute(AttributeKind::Parameter),
            "ptolemy.data.expr.Parameter",
        )
        .unwrap();
    ws.set_expression(gain, Some("1".into())).unwrap();
    let a = ws
        .create(Some(base), "a", NodeKind::Entity(EntityKind::Atomic), "ptolemy.kernel.ComponentEntity")
        .unwrap();
    let p = ws.create(Some(a), "p", NodeKind::Port, "ptolemy.kernel.ComponentPort").unwrap();
    let r = ws.create(Some(base), "r", NodeKind::Relation, "ptolemy.kernel.ComponentRelation").unwrap();
    ws.link(p, r, None).unwrap();
    let inst = ws.instantiate(base, Some(top), "inst", false).unwrap();
    Model { ws, top, base, inst }
}

fn path(ws: &mut Workspace, context: ObjId, path: &str, category: Category) -> ObjId {
    ws.lookup(context, path, category).unwrap().unwrap()
}

#[test]
fn test_instance_copies_links_as_inherited() {
    let mut m = model();
    let p = path(&mut m.ws, m.inst, "a.p", Category::Port);
    let r = path(&mut m.ws, m.inst, "r", Category::Relation);
    assert_eq!(m.ws.linked_relations(p), vec![r]);
    assert!(m.ws.is_inherited_link(p, r));

    let local = m
        .ws
        .create(Some(m.inst), "local", NodeKind::Relation, "ptolemy.kernel.ComponentRelation")
        .unwrap();
    m.ws.link(p, local, None).unwrap();
    assert!(!m.ws.is_inherited_link(p, local));
}

#[test]
fn test_implying_ancestor() {
    let mut m = model();
    let p = path(&mut m.ws, m.inst, "a.p", Category::Port);
    assert_eq!(m.ws.derived_level(p), 2);
    assert_eq!(m.ws.implying_ancestor(p), Some(m.inst));
    assert_eq!(m.ws.implying_ancestor(m.inst), None);
    assert_eq!(m.ws.derived_level(m.inst), NOT_DERIVED);
}

#[test]
fn test_value_propagation_stops_at_override() {
    let mut m = model();
    let gain = path(&mut m.ws, m.base, "gain", Category::Attribute);
    let copy = path(&mut m.ws, m.inst, "gain", Category::Attribute);
    assert_eq!(m.ws.expression(copy), Some("1"));

    m.ws.set_expression(gain, Some("2".into())).unwrap();
    assert_eq!(m.ws.propagate_value(gain).unwrap(), vec![copy]);
    assert_eq!(m.ws.expression(copy), Some("2"));

    m.ws.set_expression(copy, Some("9".into())).unwrap();
    m.ws.set_overridden(copy, true).unwrap();
    m.ws.set_expression(gain, Some("3".into())).unwrap();
    assert!(m.ws.propagate_value(gain).unwrap().is_empty());
    assert_eq!(m.ws.expression(copy), Some("9"));
}

#[test]
fn test_value_reaches_instances_of_subclass() {
    let mut m = model();
    let sub = m.ws.instantiate(m.base, Some(m.top), "Sub", true).unwrap();
    let deep = m.ws.instantiate(sub, Some(m.top), "deep", false).unwrap();
    let gain = path(&mut m.ws, m.base, "gain", Category::Attribute);
    m.ws.set_expression(gain, Some("7".into())).unwrap();
    let targets = m.ws.propagate_value(gain).unwrap();
    assert_eq!(targets.len(), 3);
    let deep_gain = path(&mut m.ws, deep, "gain", Category::Attribute);
    assert_eq!(m.ws.expression(deep_gain), Some("7"));
}

#[test]
fn test_rename_propagates_to_copies() {
    let mut m = model();
    let a = path(&mut m.ws, m.base, "a", Category::Entity);
    m.ws.rename_propagating(a, "b").unwrap();
    assert!(m.ws.child(m.inst, "b", Category::Entity).is_some());
    assert!(m.ws.child(m.inst, "a", Category::Entity).is_none());
}

#[test]
fn test_rename_of_derived_object_rejected() {
    let mut m = model();
    let copy = path(&mut m.ws, m.inst, "a", Category::Entity);
    let err = m.ws.rename_propagating(copy, "b").unwrap_err();
    assert!(matches!(err, KernelError::IllegalAction { .. }));
}

#[test]
fn test_rename_collision_in_copy_changes_nothing() {
    let mut m = model();
    m.ws.create(Some(m.inst), "b", NodeKind::Entity(EntityKind::Atomic), "ptolemy.kernel.ComponentEntity")
        .unwrap();
    let a = path(&mut m.ws, m.base, "a", Category::Entity);
    assert!(m.ws.rename_propagating(a, "b").is_err());
    assert_eq!(m.ws.name(a), "a");
    assert!(m.ws.child(m.inst, "a", Category::Entity).is_some());
}

#[test]
fn test_link_and_unlink_propagate() {
    let mut m = model();
    let r2 = m
        .ws
        .create(Some(m.base), "r2", NodeKind::Relation, "ptolemy.kernel.ComponentRelation")
        .unwrap();
    m.ws.propagate_existence(r2).unwrap();
    let p = path(&mut m.ws, m.base, "a.p", Category::Port);
    m.ws.link(p, r2, None).unwrap();
    m.ws.propagate_link(p, r2, None).unwrap();

    let copy_p = path(&mut m.ws, m.inst, "a.p", Category::Port);
    let copy_r2 = path(&mut m.ws, m.inst, "r2", Category::Relation);
    assert!(m.ws.is_linked(copy_p, copy_r2));

    m.ws.unlink(p, r2).unwrap();
    m.ws.propagate_unlink(p, r2).unwrap();
    assert!(!m.ws.is_linked(copy_p, copy_r2));
}

#[test]
fn test_deletion_removes_copies() {
    let mut m = model();
    let a = path(&mut m.ws, m.base, "a", Category::Entity);
    assert_eq!(m.ws.propagate_deletion(a).unwrap(), 1);
    assert!(m.ws.child(m.inst, "a", Category::Entity).is_none());
    // the original is left to the caller
    assert!(m.ws.contains(a));
}

#[test]
fn test_collision_check_finds_local_copy_child() {
    let mut m = model();
    m.ws.create(Some(m.inst), "extra", NodeKind::Port, "ptolemy.kernel.ComponentPort")
        .unwrap();
    let err = m.ws.check_derived_collisions(m.base, "extra", Category::Port).unwrap_err();
    assert!(matches!(err, KernelError::DerivedCollision { .. }));
    assert!(m.ws.check_derived_collisions(m.base, "fresh", Category::Port).is_ok());
}
