//! Metadata consolidation tests: include ordering, define reconciliation,
//! dependency-closure walking, and the error paths.

mod common;

use common::Workspace;
use pretty_assertions::assert_eq;
use rebs_build::metadata::metadata_for_package;
use rebs_build::BuildError;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_includes_order_by_priority_then_insertion() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    let p = workspace.add_package(
        "p",
        json!({
            "include_directories": ["a"],
            "include_priority": 10,
            "dependencies": ["q"]
        }),
    );
    let q = workspace.add_package(
        "q",
        json!({
            "package_type": "library",
            "public_include_directories": ["b"],
            "include_priority": 20
        }),
    );
    fs::create_dir(p.join("a")).unwrap();
    fs::create_dir(q.join("b")).unwrap();

    let mut ctx = workspace.context(&["p"]);
    let metadata = metadata_for_package(&mut ctx, "p").unwrap();
    assert_eq!(metadata.consolidated_includes, vec![p.join("a"), q.join("b")]);
}

#[test]
fn test_lower_priority_dependency_includes_come_first() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    let p = workspace.add_package(
        "p",
        json!({
            "include_directories": ["a"],
            "include_priority": 1000,
            "dependencies": ["q"]
        }),
    );
    let q = workspace.add_package(
        "q",
        json!({
            "package_type": "library",
            "public_include_directories": ["b"],
            "include_priority": 5
        }),
    );
    fs::create_dir(p.join("a")).unwrap();
    fs::create_dir(q.join("b")).unwrap();

    let mut ctx = workspace.context(&["p"]);
    let metadata = metadata_for_package(&mut ctx, "p").unwrap();
    assert_eq!(metadata.consolidated_includes, vec![q.join("b"), p.join("a")]);
}

#[test]
fn test_missing_include_directories_are_dropped() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    let p = workspace.add_package(
        "p",
        json!({ "include_directories": ["real", "imaginary"] }),
    );
    fs::create_dir(p.join("real")).unwrap();

    let mut ctx = workspace.context(&["p"]);
    let metadata = metadata_for_package(&mut ctx, "p").unwrap();
    assert_eq!(metadata.consolidated_includes, vec![p.join("real")]);
}

#[test]
fn test_public_undefine_removes_a_define() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    workspace.add_package(
        "p",
        json!({
            "public_defines": ["X", "KEEP=1"],
            "dependencies": ["q"]
        }),
    );
    workspace.add_package(
        "q",
        json!({
            "package_type": "library",
            "public_defines": ["-X", "FROM_Q"]
        }),
    );

    let mut ctx = workspace.context(&["p"]);
    let metadata = metadata_for_package(&mut ctx, "p").unwrap();
    assert_eq!(metadata.consolidated_defines, vec!["KEEP=1", "FROM_Q"]);
}

#[test]
fn test_defines_keep_first_seen_order_across_the_closure() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    workspace.add_package(
        "app",
        json!({
            "defines": ["OWN_PRIVATE"],
            "public_defines": ["OWN_PUBLIC"],
            "dependencies": ["first", "second"]
        }),
    );
    workspace.add_package(
        "first",
        json!({ "package_type": "library", "public_defines": ["FIRST", "SHARED"] }),
    );
    workspace.add_package(
        "second",
        json!({ "package_type": "library", "public_defines": ["SHARED", "SECOND"] }),
    );

    let mut ctx = workspace.context(&["app"]);
    let metadata = metadata_for_package(&mut ctx, "app").unwrap();
    assert_eq!(
        metadata.consolidated_defines,
        vec!["OWN_PRIVATE", "OWN_PUBLIC", "FIRST", "SHARED", "SECOND"]
    );
}

#[test]
fn test_diamond_closure_visits_each_dependency_once() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    workspace.add_package("top", json!({ "dependencies": ["left", "right"] }));
    workspace.add_package(
        "left",
        json!({ "package_type": "library", "dependencies": ["bottom"] }),
    );
    workspace.add_package(
        "right",
        json!({ "package_type": "library", "dependencies": ["bottom"] }),
    );
    workspace.add_package("bottom", json!({ "package_type": "library" }));

    let mut ctx = workspace.context(&["top"]);
    let metadata = metadata_for_package(&mut ctx, "top").unwrap();
    assert_eq!(metadata.consolidated_dependencies, vec!["left", "right", "bottom"]);
    assert_eq!(metadata.consolidated_library_objects.len(), 3);
}

#[test]
fn test_consolidation_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    let p = workspace.add_package(
        "p",
        json!({
            "public_defines": ["A", "-B"],
            "include_directories": ["inc"],
            "dependencies": ["q"]
        }),
    );
    workspace.add_package(
        "q",
        json!({ "package_type": "library", "public_defines": ["B"] }),
    );
    fs::create_dir(p.join("inc")).unwrap();

    let mut ctx = workspace.context(&["p"]);
    let first = metadata_for_package(&mut ctx, "p").unwrap().clone();
    let second = metadata_for_package(&mut ctx, "p").unwrap().clone();

    assert_eq!(first.consolidated_defines, second.consolidated_defines);
    assert_eq!(first.consolidated_includes, second.consolidated_includes);
    assert_eq!(
        first.consolidated_dependencies,
        second.consolidated_dependencies
    );
    assert_eq!(
        first.consolidated_library_objects,
        second.consolidated_library_objects
    );
    assert_eq!(first.metadata_timestamp, second.metadata_timestamp);
}

#[test]
fn test_timestamp_raises_to_the_newest_in_the_closure() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    workspace.add_package_at("app", json!({ "dependencies": ["lib"] }), 100);
    workspace.add_package_at(
        "lib",
        json!({ "package_type": "library", "dependencies": ["deep"] }),
        50,
    );
    workspace.add_package_at("deep", json!({ "package_type": "library" }), 900);

    let mut ctx = workspace.context(&["app"]);
    let metadata = metadata_for_package(&mut ctx, "app").unwrap();
    assert_eq!(metadata.metadata_timestamp, 900);
}

#[test]
fn test_application_dependency_is_fatal() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    workspace.add_package("p", json!({ "dependencies": ["q"] }));
    workspace.add_package("q", json!({ "package_type": "application" }));

    let mut ctx = workspace.context(&["p"]);
    let error = metadata_for_package(&mut ctx, "p").expect_err("non-library dependency");
    assert!(matches!(error, BuildError::DependencyNotLibrary { .. }));
}

#[test]
fn test_missing_dependency_is_fatal() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    workspace.add_package("p", json!({ "dependencies": ["ghost"] }));

    let mut ctx = workspace.context(&["p"]);
    let error = metadata_for_package(&mut ctx, "p").expect_err("missing dependency");
    assert!(matches!(error, BuildError::MissingDependency { .. }));
}

#[test]
fn test_unknown_package_type_is_fatal() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());
    workspace.add_package("p", json!({ "package_type": "plugin" }));

    let mut ctx = workspace.context(&["p"]);
    let error = metadata_for_package(&mut ctx, "p").expect_err("unknown type");
    assert!(matches!(error, BuildError::UnknownPackageType { .. }));
}

#[test]
fn test_header_only_library_contributes_metadata_but_no_object() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());

    workspace.add_package("app", json!({ "dependencies": ["headers"] }));
    let headers = workspace.add_package(
        "headers",
        json!({
            "package_type": "library",
            "no_output_file": 1,
            "public_include_directories": ["include"],
            "public_defines": ["HEADER_ONLY"]
        }),
    );
    fs::create_dir(headers.join("include")).unwrap();

    let mut ctx = workspace.context(&["app"]);
    let metadata = metadata_for_package(&mut ctx, "app").unwrap();
    assert!(metadata.consolidated_library_objects.is_empty());
    assert_eq!(metadata.consolidated_defines, vec!["HEADER_ONLY"]);
    assert_eq!(
        metadata.consolidated_includes,
        vec![headers.join("include")]
    );
}

#[test]
fn test_output_object_lands_in_scratch_with_extension() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());
    workspace.add_package(
        "mylib",
        json!({ "package_type": "library", "output_extension": "lib" }),
    );

    let mut ctx = workspace.context(&["mylib"]);
    let metadata = metadata_for_package(&mut ctx, "mylib").unwrap();
    assert!(metadata.output_object.ends_with("mylib.lib"));
    assert!(metadata
        .output_object
        .starts_with(temp.path().join(".build")));
}

#[test]
fn test_destination_directory_expands_placeholders() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());
    workspace.add_package(
        "tool",
        json!({ "destination_directory": "${temp directory}/dist/${package name}" }),
    );

    let mut ctx = workspace.context(&["tool"]);
    let metadata = metadata_for_package(&mut ctx, "tool").unwrap();
    let expected = temp
        .path()
        .join(".build")
        .join("fast")
        .join("dist")
        .join("tool");
    assert_eq!(metadata.destination_directory.as_deref(), Some(&*expected));
    assert_eq!(metadata.output_object, expected.join("tool"));
}

#[test]
fn test_files_to_ignore_join_the_package_root() {
    let temp = TempDir::new().unwrap();
    let mut workspace = Workspace::new(temp.path());
    let p = workspace.add_package("p", json!({ "files_to_ignore": ["gen/skip.cc"] }));

    let mut ctx = workspace.context(&["p"]);
    let metadata = metadata_for_package(&mut ctx, "p").unwrap();
    assert!(metadata.files_to_ignore.contains(&p.join("gen/skip.cc")));
}
