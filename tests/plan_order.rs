// tests/plan_order.rs

//! Ordering properties of generated action plans.

mod common;

use caravel::plan::{create_install_plan, AnyAction};
use common::TestRoot;
use std::collections::HashMap;

fn plan_positions(plan: &[AnyAction]) -> HashMap<String, usize> {
    plan.iter()
        .enumerate()
        .filter_map(|(idx, action)| match action {
            AnyAction::Install(i) => Some((i.spec.name().to_string(), idx)),
            AnyAction::Remove(_) => None,
        })
        .collect()
}

#[test]
fn test_diamond_dependency_order() {
    let root = TestRoot::new();
    root.add_port("d", "Source: d\nVersion: 1\n");
    root.add_port("b", "Source: b\nVersion: 1\nBuild-Depends: d\n");
    root.add_port("c", "Source: c\nVersion: 1\nBuild-Depends: d\n");
    root.add_port("a", "Source: a\nVersion: 1\nBuild-Depends: b, c\n");
    let db = root.open_db();

    let plan = create_install_plan(
        root.paths.get_filesystem(),
        &root.paths,
        &[root.request("a")],
        &db,
    )
    .unwrap();

    let pos = plan_positions(&plan);
    assert!(pos["d"] < pos["b"]);
    assert!(pos["d"] < pos["c"]);
    assert!(pos["b"] < pos["a"]);
    assert!(pos["c"] < pos["a"]);
    // The shared dependency appears exactly once.
    assert_eq!(plan.len(), 4);
}

#[test]
fn test_plan_is_deterministic() {
    let root = TestRoot::new();
    root.add_port("zlib", "Source: zlib\nVersion: 1\n");
    root.add_port("bzip2", "Source: bzip2\nVersion: 1\n");
    root.add_port("tool", "Source: tool\nVersion: 1\nBuild-Depends: zlib, bzip2\n");
    let db = root.open_db();
    let fs = root.paths.get_filesystem();

    let first = create_install_plan(fs, &root.paths, &[root.request("tool")], &db).unwrap();
    let second = create_install_plan(fs, &root.paths, &[root.request("tool")], &db).unwrap();

    let names = |plan: &[AnyAction]| -> Vec<String> {
        plan.iter().map(|a| a.spec().to_string()).collect()
    };
    assert_eq!(names(&first), names(&second));
    // Dependencies first; siblings with no constraint fall back to name order.
    assert_eq!(names(&first), vec!["bzip2:x64-linux", "zlib:x64-linux", "tool:x64-linux"]);
}
