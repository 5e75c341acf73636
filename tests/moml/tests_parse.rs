//! Building models from complete documents.

use moml::kernel::{AttributeKind, Category, Workspace};
use moml::moml::MomlParser;
use rstest::rstest;

use crate::helpers::graph_assertions::{child_names, get, link_names};
use crate::helpers::model_fixtures::{SIMPLE_COMPOSITE, parse_in, parse_model};

#[test]
fn test_simple_composite() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, SIMPLE_COMPOSITE);

    assert_eq!(ws.name(top), "top");
    assert_eq!(ws.container(top), None);
    assert_eq!(ws.num_entities(top).unwrap(), 1);
    assert_eq!(child_names(&ws, top, Category::Entity), vec!["a"]);
    assert_eq!(child_names(&ws, top, Category::Relation), vec!["r"]);
    let a = get(&mut ws, top, "a", Category::Entity);
    assert_eq!(ws.get(a).unwrap().class_name(), "ptolemy.kernel.ComponentEntity");
}

#[test]
fn test_model_element_defaults_to_composite() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, r#"<model name="m"><entity name="a" class="ptolemy.kernel.ComponentEntity"/></model>"#);
    assert!(ws.get(top).unwrap().is_composite());
    assert_eq!(ws.get(top).unwrap().class_name(), "ptolemy.kernel.CompositeEntity");
    assert_eq!(ws.num_entities(top).unwrap(), 1);
}

#[test]
fn test_children_keep_document_order() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <entity name="c" class="ptolemy.kernel.ComponentEntity"/>
            <entity name="a" class="ptolemy.kernel.ComponentEntity"/>
            <entity name="b" class="ptolemy.kernel.ComponentEntity"/>
        </entity>"#,
    );
    assert_eq!(child_names(&ws, top, Category::Entity), vec!["c", "a", "b"]);
}

#[rstest]
#[case("input", true, false)]
#[case("output", false, true)]
#[case("both", true, true)]
fn test_port_direction(#[case] direction: &str, #[case] input: bool, #[case] output: bool) {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        &format!(
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <port name="p" class="ptolemy.kernel.ComponentPort" direction="{direction}"/>
            </entity>"#
        ),
    );
    let p = get(&mut ws, top, "p", Category::Port);
    let flags = ws.port_flags(p);
    assert_eq!((flags.input, flags.output, flags.multiport), (input, output, false));
}

#[test]
fn test_port_flag_properties() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <port name="p" class="ptolemy.kernel.ComponentPort">
                <property name="output"/>
                <property name="multiport"/>
            </port>
            <port name="q" class="ptolemy.kernel.ComponentPort">
                <property name="input" value="false"/>
            </port>
        </entity>"#,
    );
    let p = get(&mut ws, top, "p", Category::Port);
    let flags = ws.port_flags(p);
    assert!(flags.output && flags.multiport && !flags.input);
    // flags never become attributes
    assert!(ws.children(p, Category::Attribute).is_empty());
    let q = get(&mut ws, top, "q", Category::Port);
    assert!(!ws.port_flags(q).input);
}

#[test]
fn test_invalid_direction_rejected() {
    let mut ws = Workspace::new();
    let err = MomlParser::new()
        .parse_str(
            &mut ws,
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <port name="p" direction="sideways"/>
            </entity>"#,
        )
        .unwrap_err();
    assert!(err.to_string().contains("Invalid port direction"));
}

#[test]
fn test_property_default_class_depends_on_value() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <property name="flag"/>
            <property name="rate" value="2.5"/>
            <property name="label" class="ptolemy.kernel.util.StringAttribute" value="hello"/>
        </entity>"#,
    );
    let flag = get(&mut ws, top, "flag", Category::Attribute);
    assert_eq!(ws.get(flag).unwrap().class_name(), "ptolemy.kernel.util.Attribute");
    assert_eq!(ws.expression(flag), None);

    let rate = get(&mut ws, top, "rate", Category::Attribute);
    assert_eq!(ws.get(rate).unwrap().class_name(), "ptolemy.data.expr.Parameter");
    assert_eq!(ws.expression(rate), Some("2.5"));

    let label = get(&mut ws, top, "label", Category::Attribute);
    let body = ws.get(label).unwrap().as_attribute().unwrap();
    assert_eq!(body.kind, AttributeKind::StringAttribute);
    assert_eq!(body.expression.as_deref(), Some("hello"));
}

#[test]
fn test_existing_property_value_updated() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <property name="rate" value="1"/>
            <property name="rate" value="4"/>
        </entity>"#,
    );
    assert_eq!(ws.children(top, Category::Attribute).len(), 1);
    let rate = get(&mut ws, top, "rate", Category::Attribute);
    assert_eq!(ws.expression(rate), Some("4"));
}

#[test]
fn test_port_parameter_pairs_with_port() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <property name="rate" class="ptolemy.actor.parameters.PortParameter" value="2"/>
        </entity>"#,
    );
    let port = get(&mut ws, top, "rate", Category::Port);
    assert!(ws.port_flags(port).input);
    assert!(ws.port_parameter(port).is_some());
}

#[test]
fn test_doc_keeps_markup_and_unescapes_text() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <doc>Adds <b>two</b> numbers &amp; more</doc>
            <doc name="usage">plain</doc>
        </entity>"#,
    );
    let doc = get(&mut ws, top, "_doc", Category::Attribute);
    assert_eq!(ws.get(doc).unwrap().as_attribute().unwrap().kind, AttributeKind::Documentation);
    assert_eq!(ws.expression(doc), Some("Adds <b>two</b> numbers & more"));
    let usage = get(&mut ws, top, "usage", Category::Attribute);
    assert_eq!(ws.expression(usage), Some("plain"));
}

#[rstest]
#[case(r#"<configure><svg><rect width="2"/></svg></configure>"#, r#"<svg><rect width="2"/></svg>"#)]
#[case("<configure><![CDATA[<svg><rect/></svg>]]></configure>", "<svg><rect/></svg>")]
#[case("<configure>a &lt; b</configure>", "a < b")]
fn test_configure_text(#[case] configure: &str, #[case] expected: &str) {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        &format!(
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <property name="_icon" class="ptolemy.vergil.icon.EditorIcon">{configure}</property>
            </entity>"#
        ),
    );
    let icon = get(&mut ws, top, "_icon", Category::Attribute);
    assert_eq!(ws.configure_text(icon).map(|c| c.text.as_str()), Some(expected));
}

#[test]
fn test_links_wait_for_their_scope() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <link port="a.p" relation="r"/>
            <entity name="a" class="ptolemy.kernel.ComponentEntity">
                <port name="p" class="ptolemy.kernel.ComponentPort"/>
            </entity>
            <relation name="r" class="ptolemy.kernel.ComponentRelation"/>
        </entity>"#,
    );
    let p = get(&mut ws, top, "a.p", Category::Port);
    assert_eq!(link_names(&ws, p, false), vec!["r"]);
}

#[test]
fn test_link_insert_at_and_inside_links() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <port name="in" class="ptolemy.kernel.ComponentPort"/>
            <entity name="a" class="ptolemy.kernel.ComponentEntity">
                <port name="p" class="ptolemy.kernel.ComponentPort"/>
            </entity>
            <relation name="r1" class="ptolemy.kernel.ComponentRelation"/>
            <relation name="r2" class="ptolemy.kernel.ComponentRelation"/>
            <link port="a.p" relation="r1" insertAt="2"/>
            <link port="a.p" relation="r2" insertAt="0"/>
            <link port="in" relation="r1"/>
        </entity>"#,
    );
    let p = get(&mut ws, top, "a.p", Category::Port);
    assert_eq!(link_names(&ws, p, false), vec!["r2", "-", "-", "r1"]);
    let inp = get(&mut ws, top, "in", Category::Port);
    assert_eq!(link_names(&ws, inp, true), vec!["r1"]);
    assert!(ws.link_slots(inp, false).is_empty());
}

#[test]
fn test_relation_group_link() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <relation name="r1" class="ptolemy.kernel.ComponentRelation"/>
            <relation name="r2" class="ptolemy.kernel.ComponentRelation"/>
            <link relation1="r1" relation2="r2"/>
        </entity>"#,
    );
    let r1 = get(&mut ws, top, "r1", Category::Relation);
    let r2 = get(&mut ws, top, "r2", Category::Relation);
    assert_eq!(ws.linked_objects(r1), vec![r2]);
    assert_eq!(ws.linked_objects(r2), vec![r1]);
}

#[test]
fn test_vertex_binds_linked_port() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <entity name="a" class="ptolemy.kernel.ComponentEntity">
                <port name="p" class="ptolemy.kernel.ComponentPort"/>
            </entity>
            <relation name="r" class="ptolemy.kernel.ComponentRelation">
                <vertex name="v" value="[100.0, 20.0]"/>
            </relation>
            <link port="a.p" relation="r" vertex="v"/>
        </entity>"#,
    );
    let v = get(&mut ws, top, "r.v", Category::Attribute);
    let p = get(&mut ws, top, "a.p", Category::Port);
    assert_eq!(ws.expression(v), Some("[100.0, 20.0]"));
    assert_eq!(ws.linked_port(v), Some(p));
}

#[rstest]
#[case("false", false)]
#[case("true", true)]
#[case("!enabled", false)]
#[case("enabled", true)]
fn test_if_element(#[case] test: &str, #[case] created: bool) {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        &format!(
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <property name="enabled" value="true"/>
                <if test="{test}">
                    <entity name="neverCreated" class="ptolemy.kernel.ComponentEntity">
                        <port name="p" class="ptolemy.kernel.ComponentPort"/>
                    </entity>
                </if>
                <entity name="after" class="ptolemy.kernel.ComponentEntity"/>
            </entity>"#
        ),
    );
    assert_eq!(ws.child(top, "neverCreated", Category::Entity).is_some(), created);
    assert!(ws.child(top, "after", Category::Entity).is_some());
}

#[test]
fn test_rename_and_display() {
    let mut ws = Workspace::new();
    let top = parse_model(
        &mut ws,
        r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
            <entity name="a" class="ptolemy.kernel.ComponentEntity">
                <rename name="b"/>
                <display name="Scale factor"/>
            </entity>
        </entity>"#,
    );
    assert!(ws.child(top, "a", Category::Entity).is_none());
    let b = get(&mut ws, top, "b", Category::Entity);
    assert_eq!(ws.get(b).unwrap().display_name(), "Scale factor");
    assert_eq!(ws.name(b), "b");
}

#[test]
fn test_second_parse_reopens_toplevel() {
    let mut ws = Workspace::new();
    let mut parser = MomlParser::new();
    let top = parser.parse_str(&mut ws, SIMPLE_COMPOSITE).unwrap().unwrap();
    let again = parser
        .parse_str(
            &mut ws,
            r#"<entity name="top"><entity name="b" class="ptolemy.kernel.ComponentEntity"/></entity>"#,
        )
        .unwrap();
    assert_eq!(again, Some(top));
    assert_eq!(ws.toplevels().len(), 1);
    assert_eq!(child_names(&ws, top, Category::Entity), vec!["a", "b"]);
}

#[test]
fn test_fragment_in_context() {
    let mut ws = Workspace::new();
    let top = parse_model(&mut ws, SIMPLE_COMPOSITE);
    let a = get(&mut ws, top, "a", Category::Entity);
    parse_in(&mut ws, a, r#"<port name="p" class="ptolemy.kernel.ComponentPort"/>"#, false).unwrap();
    assert!(ws.child(a, "p", Category::Port).is_some());
    assert!(ws.child(top, "p", Category::Port).is_none());
}

#[test]
fn test_unrecognized_elements_are_transparent() {
    let mut ws = Workspace::new();
    let mut parser = MomlParser::new();
    let top = parser
        .parse_str(
            &mut ws,
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <annotation>
                    <entity name="a" class="ptolemy.kernel.ComponentEntity"/>
                </annotation>
            </entity>"#,
        )
        .unwrap()
        .unwrap();
    assert_eq!(parser.report().unrecognized, vec!["annotation"]);
    assert!(ws.child(top, "a", Category::Entity).is_some());
}
