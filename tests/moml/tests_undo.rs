//! Undo and redo of incremental edits.
//!
//! Each case applies one fragment to the same model and checks that undo
//! returns the model to its earlier state and that redo reapplies it.

use moml::kernel::{Category, Workspace};
use moml::moml::{MomlChangeRequest, ParserConfig, redo, undo};
use rstest::rstest;

use crate::helpers::graph_assertions::{get, snapshot};
use crate::helpers::model_fixtures::{LINKED_MODEL, parse_in, parse_model};

#[rstest]
#[case::create_entity(r#"<entity name="b" class="ptolemy.kernel.ComponentEntity"/>"#)]
#[case::rename(r#"<entity name="a"><rename name="z"/></entity>"#)]
#[case::property_value(r#"<property name="k" value="5"/>"#)]
#[case::relation_and_link(
    r#"<group>
        <relation name="r2" class="ptolemy.kernel.ComponentRelation"/>
        <link port="a.p" relation="r2"/>
    </group>"#
)]
#[case::delete_linked_entity(r#"<deleteEntity name="a"/>"#)]
#[case::unlink(r#"<unlink port="a.p" relation="r"/>"#)]
#[case::doc(r#"<entity name="a"><doc>Produces a ramp</doc></entity>"#)]
#[case::port_flag(r#"<entity name="a"><port name="p"><property name="output"/></port></entity>"#)]
#[case::display(r#"<entity name="a"><display name="Alpha"/></entity>"#)]
#[case::entity_to_class(r#"<class name="a"/>"#)]
fn test_undo_then_redo(#[case] edit: &str) {
    let config = ParserConfig::default();
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    let before = snapshot(&ws, top);

    parse_in(&mut ws, top, edit, true).unwrap();
    let after = snapshot(&ws, top);
    assert_ne!(before, after, "edit changed nothing");

    assert!(undo(&mut ws, &config, top).unwrap());
    assert_eq!(snapshot(&ws, top), before);

    assert!(redo(&mut ws, &config, top).unwrap());
    assert_eq!(snapshot(&ws, top), after);
}

#[test]
fn test_undo_class_to_instance_conversion() {
    let config = ParserConfig::default();
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <class name="C" extends="ptolemy.kernel.CompositeEntity"/>
        </entity>"#,
    );
    let c = get(&mut ws, top, "C", Category::Entity);

    parse_in(&mut ws, top, r#"<entity name="C"/>"#, true).unwrap();
    assert!(!ws.is_class_definition(c));

    assert!(undo(&mut ws, &config, top).unwrap());
    assert!(ws.is_class_definition(c));

    assert!(redo(&mut ws, &config, top).unwrap());
    assert!(!ws.is_class_definition(c));
}

#[test]
fn test_undo_value_on_unset_parameter() {
    let config = ParserConfig::default();
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <property name="k" class="ptolemy.data.expr.Parameter"/>
        </entity>"#,
    );
    let before = snapshot(&ws, top);
    let k = get(&mut ws, top, "k", Category::Attribute);

    parse_in(&mut ws, top, r#"<property name="k" value="3"/>"#, true).unwrap();
    assert_eq!(ws.expression(k), Some("3"));

    assert!(undo(&mut ws, &config, top).unwrap());
    assert_eq!(ws.expression(k), None);
    assert_eq!(snapshot(&ws, top), before);

    assert!(redo(&mut ws, &config, top).unwrap());
    assert_eq!(ws.expression(k), Some("3"));
}

#[test]
fn test_undo_steps_back_one_edit_at_a_time() {
    let config = ParserConfig::default();
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    parse_in(&mut ws, top, r#"<property name="k" value="2"/>"#, true).unwrap();
    parse_in(&mut ws, top, r#"<property name="k" value="3"/>"#, true).unwrap();
    let k = get(&mut ws, top, "k", Category::Attribute);

    assert!(undo(&mut ws, &config, top).unwrap());
    assert_eq!(ws.expression(k), Some("2"));
    assert!(undo(&mut ws, &config, top).unwrap());
    assert_eq!(ws.expression(k), Some("1"));
    assert!(!undo(&mut ws, &config, top).unwrap());

    assert!(redo(&mut ws, &config, top).unwrap());
    assert_eq!(ws.expression(k), Some("2"));
}

#[test]
fn test_new_edit_clears_redo() {
    let config = ParserConfig::default();
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    parse_in(&mut ws, top, r#"<property name="k" value="2"/>"#, true).unwrap();
    assert!(undo(&mut ws, &config, top).unwrap());
    parse_in(&mut ws, top, r#"<property name="k" value="9"/>"#, true).unwrap();
    assert!(!redo(&mut ws, &config, top).unwrap());
}

#[test]
fn test_edits_without_undo_leave_stack_empty() {
    let config = ParserConfig::default();
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    parse_in(&mut ws, top, r#"<property name="k" value="2"/>"#, false).unwrap();
    assert!(!undo(&mut ws, &config, top).unwrap());
    assert!(!redo(&mut ws, &config, top).unwrap());
}

#[test]
fn test_undo_change_request() {
    let config = ParserConfig::default();
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    let before = snapshot(&ws, top);

    MomlChangeRequest::new(top, r#"<entity name="b" class="ptolemy.kernel.ComponentEntity"/>"#)
        .with_undoable(true)
        .submit(&mut ws)
        .unwrap();
    get(&mut ws, top, "b", Category::Entity);

    assert!(undo(&mut ws, &config, top).unwrap());
    assert_eq!(snapshot(&ws, top), before);
}

#[test]
fn test_queued_change_request_runs_on_flush() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, LINKED_MODEL);
    ws.set_deferring_change_requests(top, true);
    MomlChangeRequest::new(top, r#"<deleteEntity name="a"/>"#)
        .submit(&mut ws)
        .unwrap();
    assert_eq!(ws.pending_change_count(top), 1);
    get(&mut ws, top, "a", Category::Entity);

    ws.set_deferring_change_requests(top, false);
    ws.execute_change_requests(top).unwrap();
    assert_eq!(ws.pending_change_count(top), 0);
    assert!(ws.child(top, "a", Category::Entity).is_none());
}
