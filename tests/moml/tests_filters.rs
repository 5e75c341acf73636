//! Attribute and end-element filters, and the icon loader hook.

use std::sync::Arc;

use moml::kernel::{Category, KernelResult, ObjId, Workspace};
use moml::moml::{ClassChanges, IconLoader, MomlFilter, MomlParser, ParserConfig, RemoveClasses};
use parking_lot::Mutex;

use crate::helpers::graph_assertions::{assert_absent, get};

const LEGACY: &str = r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
    <entity name="a" class="old.Actor"/>
    <property name="_icon" class="ptolemy.vergil.icon.EditorIcon">
        <configure><svg/></configure>
    </property>
    <property name="k" value="1"/>
</entity>"#;

#[test]
fn test_class_changes_rewrite_and_mark_modified() {
    let filter = ClassChanges::new().with_change("old.Actor", "ptolemy.kernel.ComponentEntity");
    let mut parser = MomlParser::with_config(ParserConfig::builder().with_filter(filter).build());
    let mut ws = Workspace::new();
    let top = parser.parse_str(&mut ws, LEGACY).unwrap().unwrap();

    assert!(parser.report().modified);
    let a = get(&mut ws, top, "a", Category::Entity);
    assert_eq!(ws.get(a).unwrap().class_name(), "ptolemy.kernel.ComponentEntity");
}

#[test]
fn test_unfiltered_parse_not_modified() {
    let mut parser = MomlParser::new();
    let mut ws = Workspace::new();
    parser
        .parse_str(&mut ws, r#"<entity name="top" class="ptolemy.kernel.CompositeEntity"/>"#)
        .unwrap();
    assert!(!parser.report().modified);
}

#[test]
fn test_remove_classes_drops_element_and_contents() {
    let config = ParserConfig::builder()
        .with_filter(ClassChanges::new().with_change("old.Actor", "ptolemy.kernel.ComponentEntity"))
        .with_filter(RemoveClasses::new(["ptolemy.vergil.icon.EditorIcon"]))
        .build();
    let mut ws = Workspace::new();
    let top = MomlParser::with_config(config).parse_str(&mut ws, LEGACY).unwrap().unwrap();

    assert_absent(&mut ws, top, "_icon", Category::Attribute);
    get(&mut ws, top, "k", Category::Attribute);
    get(&mut ws, top, "a", Category::Entity);
}

/// Gives every new relation a display name.
struct LabelRelations;

impl MomlFilter for LabelRelations {
    fn filter_attribute_value(
        &self,
        _ws: &Workspace,
        _container: Option<ObjId>,
        _element: &str,
        _attribute: &str,
        value: &str,
        _source: Option<&str>,
    ) -> Option<String> {
        Some(value.to_string())
    }

    fn filter_end_element(
        &self,
        ws: &mut Workspace,
        object: Option<ObjId>,
        element: &str,
        _source: Option<&str>,
    ) -> KernelResult<bool> {
        let Some(relation) = object.filter(|_| element == "relation") else {
            return Ok(false);
        };
        let label = format!("wire {}", ws.name(relation));
        ws.set_display_name(relation, Some(label))?;
        Ok(true)
    }
}

#[test]
fn test_end_element_filter_edits_result() {
    let mut parser = MomlParser::with_config(ParserConfig::builder().with_filter(LabelRelations).build());
    let mut ws = Workspace::new();
    let top = parser
        .parse_str(
            &mut ws,
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <relation name="r" class="ptolemy.kernel.ComponentRelation"/>
            </entity>"#,
        )
        .unwrap()
        .unwrap();
    assert!(parser.report().modified);
    let r = get(&mut ws, top, "r", Category::Relation);
    assert_eq!(ws.get(r).unwrap().display_name(), "wire r");
}

/// Records which entities asked for an icon; fails for one class.
#[derive(Default)]
struct RecordingIcons(Mutex<Vec<(String, String)>>);

impl IconLoader for RecordingIcons {
    fn load_icon(&self, ws: &mut Workspace, class_name: &str, entity: ObjId) -> Result<bool, String> {
        self.0.lock().push((class_name.to_string(), ws.name(entity).to_string()));
        if class_name == "ptolemy.actor.TypedAtomicActor" {
            return Err("no icon for atomic actors".to_string());
        }
        Ok(true)
    }
}

#[test]
fn test_icon_loader_called_for_registry_entities() {
    let icons = Arc::new(RecordingIcons::default());
    let config = ParserConfig::builder().with_icon_loader(icons.clone()).build();
    let mut ws = Workspace::new();
    let top = MomlParser::with_config(config)
        .parse_str(
            &mut ws,
            r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
                <entity name="a" class="ptolemy.kernel.ComponentEntity"/>
                <entity name="b" class="ptolemy.actor.TypedAtomicActor"/>
            </entity>"#,
        )
        .unwrap()
        .unwrap();

    // A failing icon load is only a warning.
    get(&mut ws, top, "b", Category::Entity);
    let calls = icons.0.lock();
    assert!(calls.contains(&("ptolemy.kernel.ComponentEntity".to_string(), "a".to_string())));
    assert!(calls.contains(&("ptolemy.actor.TypedAtomicActor".to_string(), "b".to_string())));
}
