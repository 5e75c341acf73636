//! Class definitions, instances and change propagation.

use std::fs;

use moml::kernel::{Category, Workspace};
use moml::moml::{MomlError, MomlParser, ParserConfig, export_moml};
use rstest::rstest;

use crate::helpers::graph_assertions::{child_names, get};
use crate::helpers::model_fixtures::{CLASS_AND_INSTANCES, parse_in, parse_in_with, parse_model};

#[test]
fn test_instances_copy_class_contents() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);

    let base = get(&mut ws, top, "Base", Category::Entity);
    assert!(ws.is_class_definition(base));
    for name in ["inst", "plain"] {
        let instance = get(&mut ws, top, name, Category::Entity);
        assert!(!ws.is_class_definition(instance));
        assert_eq!(ws.parent_class(instance), Some(base));
        assert_eq!(ws.get(instance).unwrap().class_name(), "Base");
        let out = get(&mut ws, instance, "out", Category::Port);
        assert!(ws.port_flags(out).output);
        assert!(ws.get(out).unwrap().is_derived());
    }
    let inst_gain = get(&mut ws, top, "inst.gain", Category::Attribute);
    assert_eq!(ws.expression(inst_gain), Some("5"));
    assert!(ws.is_overridden(inst_gain));
    let plain_gain = get(&mut ws, top, "plain.gain", Category::Attribute);
    assert_eq!(ws.expression(plain_gain), Some("1"));
    assert!(!ws.is_overridden(plain_gain));
}

#[test]
fn test_port_added_to_class_reaches_every_instance() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);
    parse_in(
        &mut ws,
        top,
        r#"<group>
            <class name="Sub" extends="Base"/>
            <entity name="s" class="Sub"/>
        </group>"#,
        false,
    )
    .unwrap();

    parse_in(
        &mut ws,
        top,
        r#"<class name="Base">
            <port name="in" class="ptolemy.kernel.ComponentPort">
                <property name="input"/>
            </port>
        </class>"#,
        false,
    )
    .unwrap();

    for path in ["Base.in", "inst.in", "plain.in", "Sub.in", "s.in"] {
        let port = get(&mut ws, top, path, Category::Port);
        assert!(ws.port_flags(port).input, "Expected {path} to be an input");
    }
}

#[test]
fn test_value_change_respects_overrides() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);
    parse_in(&mut ws, top, r#"<class name="Base"><property name="gain" value="7"/></class>"#, false).unwrap();

    let inst_gain = get(&mut ws, top, "inst.gain", Category::Attribute);
    let plain_gain = get(&mut ws, top, "plain.gain", Category::Attribute);
    assert_eq!(ws.expression(inst_gain), Some("5"));
    assert_eq!(ws.expression(plain_gain), Some("7"));
}

#[test]
fn test_derived_object_cannot_be_deleted_but_definition_can() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);

    let err = parse_in(&mut ws, top, r#"<deletePort name="inst.out"/>"#, false).unwrap_err();
    assert!(err.to_string().contains("part of a class definition"), "{err}");
    let inst = get(&mut ws, top, "inst", Category::Entity);
    assert_eq!(ws.ports(inst).len(), 1);

    parse_in(&mut ws, top, r#"<deletePort name="Base.out"/>"#, false).unwrap();
    assert!(ws.ports(inst).is_empty());
    let plain = get(&mut ws, top, "plain", Category::Entity);
    assert!(ws.ports(plain).is_empty());
}

#[test]
fn test_new_class_member_colliding_with_local_object_rejected() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);
    parse_in(
        &mut ws,
        top,
        r#"<entity name="inst"><entity name="x" class="ptolemy.kernel.ComponentEntity"/></entity>"#,
        false,
    )
    .unwrap();

    let err = parse_in(
        &mut ws,
        top,
        r#"<class name="Base"><entity name="x" class="ptolemy.kernel.ComponentEntity"/></class>"#,
        false,
    )
    .unwrap_err();
    assert!(err.to_string().contains("would collide"), "{err}");
    let base = get(&mut ws, top, "Base", Category::Entity);
    assert!(ws.child(base, "x", Category::Entity).is_none());
    let plain = get(&mut ws, top, "plain", Category::Entity);
    assert!(ws.child(plain, "x", Category::Entity).is_none());
}

#[rstest]
#[case::port(
    r#"<port name="x" class="ptolemy.kernel.ComponentPort"/>"#,
    Category::Port
)]
#[case::relation(
    r#"<relation name="x" class="ptolemy.kernel.ComponentRelation"/>"#,
    Category::Relation
)]
fn test_new_class_port_or_relation_colliding_with_local_object_rejected(
    #[case] member: &str,
    #[case] category: Category,
) {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);
    parse_in(&mut ws, top, &format!(r#"<entity name="inst">{member}</entity>"#), false).unwrap();

    let err = parse_in(&mut ws, top, &format!(r#"<class name="Base">{member}</class>"#), false).unwrap_err();
    assert!(err.to_string().contains("would collide"), "{err}");
    let base = get(&mut ws, top, "Base", Category::Entity);
    assert!(ws.child(base, "x", category).is_none());
    let plain = get(&mut ws, top, "plain", Category::Entity);
    assert!(ws.child(plain, "x", category).is_none());
}

#[test]
fn test_class_with_instances_cannot_become_instance() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);
    let err = parse_in(&mut ws, top, r#"<entity name="Base"/>"#, false).unwrap_err();
    assert!(err.to_string().contains("subclasses or instances"), "{err}");
    let base = get(&mut ws, top, "Base", Category::Entity);
    assert!(ws.is_class_definition(base));
}

#[rstest]
#[case::direction(r#"<entity name="inst"><port name="out" direction="input"/></entity>"#)]
#[case::flag_property(r#"<entity name="inst"><port name="out"><property name="output" value="false"/></port></entity>"#)]
fn test_derived_port_direction_cannot_change(#[case] edit: &str) {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, CLASS_AND_INSTANCES);
    let out = get(&mut ws, top, "inst.out", Category::Port);
    let before = ws.port_flags(out);

    let err = parse_in(&mut ws, top, edit, false).unwrap_err();
    assert!(err.to_string().contains("defined by a class"), "{err}");
    assert_eq!(ws.port_flags(out), before);
    assert!(ws.port_flags(out).output);
}

#[test]
fn test_external_class_loaded_once_from_search_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("lib")).unwrap();
    fs::write(
        dir.path().join("lib").join("Gain.xml"),
        r#"<class name="Gain" extends="ptolemy.kernel.CompositeEntity">
            <property name="factor" value="2"/>
            <port name="in" class="ptolemy.kernel.ComponentPort" direction="input"/>
        </class>"#,
    )
    .unwrap();
    let config = ParserConfig::builder().with_search_path(dir.path()).build();

    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, r#"<entity name="top" class="ptolemy.kernel.CompositeEntity"/>"#);
    parse_in_with(&mut ws, config.clone(), top, r#"<entity name="g1" class="lib.Gain"/>"#, false).unwrap();
    parse_in_with(&mut ws, config, top, r#"<entity name="g2" class="lib.Gain"/>"#, false).unwrap();

    assert_eq!(ws.toplevels().len(), 2);
    let g1 = get(&mut ws, top, "g1", Category::Entity);
    let g2 = get(&mut ws, top, "g2", Category::Entity);
    assert_eq!(ws.parent_class(g1), ws.parent_class(g2));
    let class = ws.parent_class(g1).unwrap();
    assert!(ws.is_class_definition(class));
    assert_eq!(ws.get(g1).unwrap().class_name(), "lib.Gain");

    let factor = get(&mut ws, top, "g1.factor", Category::Attribute);
    assert_eq!(ws.expression(factor), Some("2"));
    let port = get(&mut ws, top, "g2.in", Category::Port);
    assert!(ws.port_flags(port).input);

    // the file name follows from the class name, so no source is written
    let exported = export_moml(&ws, g1, 0).unwrap();
    assert!(exported.contains(r#"class="lib.Gain""#), "{exported}");
    assert!(!exported.contains("source="), "{exported}");
}

#[test]
fn test_missing_classes_reported_together() {
    let mut ws = Workspace::new();
    let mut parser = MomlParser::new();
    let err = parser
        .parse_str(
            &mut ws,
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <entity name="x" class="no.such.One">
                    <port name="p" class="ptolemy.kernel.ComponentPort"/>
                </entity>
                <entity name="ok" class="ptolemy.kernel.ComponentEntity"/>
                <entity name="y" class="no.such.Two"/>
                <entity name="z" class="no.such.One"/>
            </entity>"#,
        )
        .unwrap_err();

    let MomlError::MissingClasses { classes, toplevel } = err else {
        panic!("Expected MissingClasses, got {err}");
    };
    assert_eq!(classes, vec!["no.such.One", "no.such.Two"]);
    let top = toplevel.expect("Expected the toplevel to be reported");
    assert_eq!(child_names(&ws, top, Category::Entity), vec!["ok"]);
    assert_eq!(parser.report().missing_classes, classes);
}

#[test]
fn test_link_to_object_of_missing_class_reports_missing_class() {
    let mut ws = Workspace::new();
    let err = MomlParser::new()
        .parse_str(
            &mut ws,
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <entity name="m" class="no.such.Thing">
                    <port name="p" class="ptolemy.kernel.ComponentPort"/>
                </entity>
                <relation name="r" class="ptolemy.kernel.ComponentRelation"/>
                <link port="m.p" relation="r"/>
            </entity>"#,
        )
        .unwrap_err();

    let MomlError::MissingClasses { classes, toplevel } = err else {
        panic!("Expected MissingClasses, got {err}");
    };
    assert_eq!(classes, vec!["no.such.Thing"]);
    let top = toplevel.expect("Expected the toplevel to be reported");
    let r = get(&mut ws, top, "r", Category::Relation);
    assert!(ws.linked_objects(r).is_empty());
}
