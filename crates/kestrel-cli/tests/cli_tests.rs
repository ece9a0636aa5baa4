//! Integration tests for the `kestrel-check` commands.

use std::io::Write;

use kestrel_cli::commands::{self, classes};
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_accepts_valid_file() {
    let file = config_file("[runtime]\nroot_class = \"base\"\nmax_emit_depth = 8\n");
    let options = commands::config::check(file.path()).unwrap();
    assert_eq!(options.root_class, "base");
    assert_eq!(options.max_emit_depth, 8);
}

#[test]
fn test_config_rejects_invalid_file() {
    let file = config_file("[runtime]\nmax_emit_depth = 0\n");
    assert!(commands::config::check(file.path()).is_err());

    let file = config_file("[runtime]\nunknown = true\n");
    assert!(commands::config::check(file.path()).is_err());
}

#[test]
fn test_hierarchy_of_default_runtime() {
    let rt = commands::build_runtime(Default::default()).unwrap();
    let root = classes::hierarchy(&rt);

    assert_eq!(root.name, "object");
    assert!(root.properties.contains(&"valid".to_string()));
    assert!(root.methods.contains(&"emit_signal".to_string()));

    let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["window", "tag"]);
    assert_eq!(root.children[0].children[0].name, "client");
}

#[test]
fn test_hierarchy_uses_configured_root() {
    let file = config_file("[runtime]\nroot_class = \"base\"\n");
    let options = commands::load_options(Some(file.path())).unwrap();
    let rt = commands::build_runtime(options).unwrap();

    let text = classes::render(&classes::hierarchy(&rt));
    assert!(text.starts_with("base\n"));
    assert!(text.contains("\n  window\n"));
    assert!(text.contains("\n    client\n"));
    assert!(text.contains("methods: focus, unmanage"));
}

#[test]
fn test_hierarchy_serializes_to_json() {
    let rt = commands::build_runtime(Default::default()).unwrap();
    let json = serde_json::to_value(classes::hierarchy(&rt)).unwrap();

    assert_eq!(json["name"], "object");
    assert_eq!(json["children"][1]["name"], "tag");
    assert!(json["children"][1].get("children").is_none());
}
