//! File entry points, `input` splicing and remote locations.

use std::fs;
use std::io;
use std::sync::Arc;

use moml::kernel::{Category, URI_ATTRIBUTE, Workspace};
use moml::moml::{AllowRemote, MomlParser, ParserConfig, ResourceLoader};
use rustc_hash::FxHashMap;

use crate::helpers::graph_assertions::{child_names, get};

const MAIN: &str = r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
    <input source="inner.xml"/>
    <entity name="after" class="ptolemy.kernel.ComponentEntity"/>
</entity>"#;

const INNER: &str = r#"<group>
    <entity name="spliced" class="ptolemy.kernel.ComponentEntity"/>
</group>"#;

fn write_pair(dir: &std::path::Path) -> std::path::PathBuf {
    fs::write(dir.join("inner.xml"), INNER).unwrap();
    let main = dir.join("main.xml");
    fs::write(&main, MAIN).unwrap();
    main
}

/// Serves fixed documents, including remote ones.
struct MapLoader(FxHashMap<String, String>);

impl ResourceLoader for MapLoader {
    fn read(&self, location: &str) -> io::Result<String> {
        self.0
            .get(location)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, location.to_string()))
    }
}

fn remote_loader() -> Arc<MapLoader> {
    let mut docs = FxHashMap::default();
    docs.insert(
        "http://models.example/parts.xml".to_string(),
        r#"<group><entity name="remote" class="ptolemy.kernel.ComponentEntity"/></group>"#.to_string(),
    );
    Arc::new(MapLoader(docs))
}

#[test]
fn test_input_resolves_relative_to_document() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_pair(dir.path());

    let mut ws = Workspace::new();
    let top = MomlParser::new().parse_file(&mut ws, &main).unwrap().unwrap();
    assert_eq!(child_names(&ws, top, Category::Entity), vec!["spliced", "after"]);

    let uri = get(&mut ws, top, URI_ATTRIBUTE, Category::Attribute);
    assert_eq!(ws.expression(uri), Some(main.to_string_lossy().as_ref()));
}

#[test]
fn test_input_skip() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_pair(dir.path());

    let config = ParserConfig::builder().with_input_skip("inner.xml").build();
    let mut ws = Workspace::new();
    let top = MomlParser::with_config(config).parse_file(&mut ws, &main).unwrap().unwrap();
    assert_eq!(child_names(&ws, top, Category::Entity), vec!["after"]);
}

#[test]
fn test_parse_file_cached_reuses_model() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_pair(dir.path());

    let mut ws = Workspace::new();
    let mut parser = MomlParser::new();
    let first = parser.parse_file_cached(&mut ws, &main).unwrap();
    let second = parser.parse_file_cached(&mut ws, &main).unwrap();
    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(ws.toplevels().len(), 1);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new();
    let err = MomlParser::new()
        .parse_file(&mut ws, dir.path().join("absent.xml"))
        .unwrap_err();
    assert!(matches!(err, moml::MomlError::Io(_)), "{err}");
}

#[test]
fn test_remote_input_needs_approval() {
    let text = r#"<entity name="top" class="ptolemy.kernel.CompositeEntity">
        <input source="http://models.example/parts.xml"/>
    </entity>"#;

    let denied = ParserConfig::builder().with_resource_loader(remote_loader()).build();
    let mut ws = Workspace::new();
    let err = MomlParser::with_config(denied).parse_str(&mut ws, text).unwrap_err();
    assert!(err.to_string().contains("not approved"), "{err}");

    let allowed = ParserConfig::builder()
        .with_resource_loader(remote_loader())
        .with_remote_approval(Arc::new(AllowRemote))
        .build();
    let mut ws = Workspace::new();
    let top = MomlParser::with_config(allowed).parse_str(&mut ws, text).unwrap().unwrap();
    assert_eq!(child_names(&ws, top, Category::Entity), vec!["remote"]);
}
