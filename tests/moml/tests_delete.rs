//! `deleteEntity`, `deletePort`, `deleteProperty` and `deleteRelation`.

use moml::kernel::{Category, Workspace};
use moml::moml::{ParserConfig, undo};

use crate::helpers::graph_assertions::{assert_absent, get, link_names};
use crate::helpers::model_fixtures::{CLASS_AND_INSTANCES, LINKED_MODEL, parse_in, parse_model};

#[test]
fn test_delete_property_and_relation() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);

    parse_in(&mut ws, top, r#"<deleteProperty name="k"/>"#, false).unwrap();
    assert_absent(&mut ws, top, "k", Category::Attribute);

    parse_in(&mut ws, top, r#"<deleteRelation name="r"/>"#, false).unwrap();
    assert_absent(&mut ws, top, "r", Category::Relation);
    let p = get(&mut ws, top, "a.p", Category::Port);
    assert!(ws.linked_relations(p).is_empty());
}

#[test]
fn test_delete_missing_object_fails() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    let err = parse_in(&mut ws, top, r#"<deleteEntity name="nope"/>"#, false).unwrap_err();
    assert!(err.to_string().contains("nope"), "{err}");
}

#[test]
fn test_deletes_run_after_links_of_same_scope() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    // the link names a relation the same group deletes first in document order
    parse_in(
        &mut ws,
        top,
        r#"<group>
            <deleteRelation name="r"/>
            <relation name="r2" class="ptolemy.kernel.ComponentRelation"/>
            <link relation1="r" relation2="r2"/>
        </group>"#,
        false,
    )
    .unwrap();
    assert_absent(&mut ws, top, "r", Category::Relation);
    let r2 = get(&mut ws, top, "r2", Category::Relation);
    assert!(ws.linked_objects(r2).is_empty());
    let p = get(&mut ws, top, "a.p", Category::Port);
    assert!(link_names(&ws, p, false).is_empty());
}

#[test]
fn test_undo_delete_restores_links() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    parse_in(&mut ws, top, r#"<deleteEntity name="a"/>"#, true).unwrap();
    assert_absent(&mut ws, top, "a", Category::Entity);
    let r = get(&mut ws, top, "r", Category::Relation);
    assert!(ws.linked_objects(r).is_empty());

    assert!(undo(&mut ws, &ParserConfig::default(), top).unwrap());
    let p = get(&mut ws, top, "a.p", Category::Port);
    assert_eq!(link_names(&ws, p, false), vec!["r"]);
}

#[test]
fn test_class_with_instances_cannot_be_deleted() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);
    let err = parse_in(&mut ws, top, r#"<deleteEntity name="Base"/>"#, false).unwrap_err();
    assert!(err.to_string().contains("subclasses or instances"), "{err}");
    get(&mut ws, top, "Base", Category::Entity);

    parse_in(&mut ws, top, r#"<group><deleteEntity name="inst"/><deleteEntity name="plain"/></group>"#, false).unwrap();
    parse_in(&mut ws, top, r#"<deleteEntity name="Base"/>"#, false).unwrap();
    assert_absent(&mut ws, top, "Base", Category::Entity);
}

#[test]
fn test_undo_class_member_delete_restores_overrides() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);
    parse_in(&mut ws, top, r#"<deleteProperty name="Base.gain"/>"#, true).unwrap();
    assert_absent(&mut ws, top, "inst.gain", Category::Attribute);
    assert_absent(&mut ws, top, "plain.gain", Category::Attribute);

    assert!(undo(&mut ws, &ParserConfig::default(), top).unwrap());
    let base_gain = get(&mut ws, top, "Base.gain", Category::Attribute);
    assert_eq!(ws.expression(base_gain), Some("1"));
    let inst_gain = get(&mut ws, top, "inst.gain", Category::Attribute);
    assert_eq!(ws.expression(inst_gain), Some("5"));
    assert!(ws.is_overridden(inst_gain));
    let plain_gain = get(&mut ws, top, "plain.gain", Category::Attribute);
    assert_eq!(ws.expression(plain_gain), Some("1"));
}

#[test]
fn test_deleting_port_removes_its_parameter() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <entity name="c" class="ptolemy.kernel.CompositeEntity">
                <property name="rate" class="ptolemy.actor.parameters.PortParameter" value="2"/>
            </entity>
        </entity>"#,
    );
    get(&mut ws, top, "c.rate", Category::Port);
    parse_in(&mut ws, top, r#"<deletePort name="c.rate"/>"#, false).unwrap();
    assert_absent(&mut ws, top, "c.rate", Category::Port);
    assert_absent(&mut ws, top, "c.rate", Category::Attribute);
}
