//! Configuration layer tests that need no external evaluator.

use pretty_assertions::assert_eq;
use rebs_config::{is_universe_root, GlobalConfig};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_universe_detection() {
    let temp = TempDir::new().unwrap();
    assert!(!is_universe_root(temp.path()));

    fs::write(temp.path().join(".universe.rebs.jsonnet"), "{}").unwrap();
    assert!(is_universe_root(temp.path()));
}

#[test]
fn test_global_config_extraction_from_evaluated_tree() {
    // The shape the evaluator produces for a typical root config.
    let evaluated = json!({
        "build_commands": { "cc": "clang++ -c -o ${out} ${in}" },
        "linker_command": "clang++ -o ${out} ${in}",
        "package_type": "application",
        "package_directories": ["/home/user/sources/applications"],
        "parallel_tasks": 8,
        "global_run_command": "run-in-vm ${out}"
    });

    let config = GlobalConfig::from_value(&evaluated);
    assert_eq!(config.parallel_tasks, 8);
    assert_eq!(
        config.package_directories,
        vec![PathBuf::from("/home/user/sources/applications")]
    );
    assert_eq!(config.global_run_command.as_deref(), Some("run-in-vm ${out}"));
}

#[test]
fn test_package_level_tree_is_still_a_valid_global_tree() {
    let evaluated = json!({
        "package_type": "library",
        "public_include_directories": ["include"]
    });

    let config = GlobalConfig::from_value(&evaluated);
    assert!(config.parallel_tasks > 0);
    assert!(config.package_directories.is_empty());
    assert!(config.global_run_command.is_none());
}
