// tests/install_scenarios.rs

//! End-to-end install flows against a stub toolchain in a throwaway root.

mod common;

use caravel::build::{BuildPackageConfig, BuildPackageOptions, BuildResult};
use caravel::control::{load_port, InstallState, StatusParagraph, Want};
use caravel::install::{perform_plan, KeepGoing, PrintSummary};
use caravel::plan::{create_install_plan, AnyAction, InstallPlanType};
use caravel::spec::Triplet;
use caravel::Error;
use common::{TestRoot, TEST_TRIPLET};

const OPTIONS: BuildPackageOptions =
    BuildPackageOptions { use_head_version: false, allow_downloads: true };

#[cfg(unix)]
#[test]
fn test_fresh_install_records_status_and_listfile() {
    let root = TestRoot::new();
    root.add_port("zlib", "Source: zlib\nVersion: 1.2.11\nDescription: compression library\n");
    let mut db = root.open_db();

    let plan = create_install_plan(
        root.paths.get_filesystem(),
        &root.paths,
        &[root.request("zlib")],
        &db,
    )
    .unwrap();
    assert_eq!(plan.len(), 1);
    match &plan[0] {
        AnyAction::Install(action) => {
            assert_eq!(action.plan_type, InstallPlanType::BuildAndInstall)
        }
        _ => panic!("expected an install action"),
    }

    let summary =
        perform_plan(&plan, OPTIONS, KeepGoing::No, PrintSummary::No, &root.paths, &mut db)
            .unwrap();
    assert!(!summary.failed());
    assert_eq!(summary.results[0].result, BuildResult::Succeeded);

    let installed = db.find_installed("zlib", TEST_TRIPLET).unwrap();
    assert_eq!(installed.package.version, "1.2.11");

    let listfile = root.paths.vcpkg_dir_info.join(format!("zlib_{}.list", TEST_TRIPLET));
    let lines: Vec<String> = std::fs::read_to_string(&listfile)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted, "listfile must be sorted");
    assert!(lines.contains(&format!("{}/include/zlib.h", TEST_TRIPLET)));
    assert!(root
        .paths
        .installed
        .join(TEST_TRIPLET)
        .join("include/zlib.h")
        .exists());
}

#[cfg(unix)]
#[test]
fn test_second_install_is_a_no_op() {
    let root = TestRoot::new();
    root.add_port("zlib", "Source: zlib\nVersion: 1.2.11\n");
    let mut db = root.open_db();
    let fs = root.paths.get_filesystem();

    let plan = create_install_plan(fs, &root.paths, &[root.request("zlib")], &db).unwrap();
    perform_plan(&plan, OPTIONS, KeepGoing::No, PrintSummary::No, &root.paths, &mut db).unwrap();

    let header = root.paths.installed.join(TEST_TRIPLET).join("include/zlib.h");
    let mtime_before = std::fs::metadata(&header).unwrap().modified().unwrap();

    let plan = create_install_plan(fs, &root.paths, &[root.request("zlib")], &db).unwrap();
    assert_eq!(plan.len(), 1);
    match &plan[0] {
        AnyAction::Install(action) => {
            assert_eq!(action.plan_type, InstallPlanType::AlreadyInstalled)
        }
        _ => panic!("expected an install action"),
    }

    let summary =
        perform_plan(&plan, OPTIONS, KeepGoing::No, PrintSummary::No, &root.paths, &mut db)
            .unwrap();
    assert_eq!(summary.results[0].result, BuildResult::Succeeded);
    assert_eq!(
        std::fs::metadata(&header).unwrap().modified().unwrap(),
        mtime_before,
        "installed tree must not be touched"
    );
}

#[test]
fn test_build_cascades_on_missing_dependencies() {
    let root = TestRoot::new();
    root.add_port("zlib", "Source: zlib\nVersion: 1.2.11\n");
    root.add_port("curl", "Source: curl\nVersion: 7.55.1\nBuild-Depends: zlib\n");
    let db = root.open_db();

    let scf = load_port(root.paths.get_filesystem(), &root.paths.port_dir("curl")).unwrap();
    let config = BuildPackageConfig {
        scf: &scf,
        triplet: Triplet::from_canonical_name(TEST_TRIPLET),
        port_dir: root.paths.port_dir("curl"),
        options: OPTIONS,
        feature_list: &[],
    };

    let result = caravel::build::build_package(&root.paths, &config, &db).unwrap();
    assert_eq!(result.code, BuildResult::CascadedDueToMissingDependencies);
    let missing: Vec<String> =
        result.unmet_dependencies.iter().map(|s| s.to_string()).collect();
    assert_eq!(missing, vec![format!("zlib:{}", TEST_TRIPLET)]);
    // No side effects: nothing staged, nothing journalled.
    assert!(!root.paths.packages.join(format!("curl_{}", TEST_TRIPLET)).exists());
}

#[cfg(unix)]
#[test]
fn test_keep_going_continues_and_summarises() {
    let root = TestRoot::new();
    root.add_port("brokenport", "Source: brokenport\nVersion: 0.1\n");
    root.add_port("zlib", "Source: zlib\nVersion: 1.2.11\n");
    let fs = root.paths.get_filesystem();

    // With keep-going, the failure is recorded and the next package builds.
    let mut db = root.open_db();
    let plan = create_install_plan(
        fs,
        &root.paths,
        &[root.request("brokenport"), root.request("zlib")],
        &db,
    )
    .unwrap();
    let summary =
        perform_plan(&plan, OPTIONS, KeepGoing::Yes, PrintSummary::Yes, &root.paths, &mut db)
            .unwrap();
    assert!(!summary.aborted);
    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.results[0].result, BuildResult::BuildFailed);
    assert_eq!(summary.results[1].result, BuildResult::Succeeded);
    assert!(db.find_installed("zlib", TEST_TRIPLET).is_some());
}

#[cfg(unix)]
#[test]
fn test_without_keep_going_aborts_at_first_failure() {
    let root = TestRoot::new();
    root.add_port("brokenport", "Source: brokenport\nVersion: 0.1\n");
    root.add_port("zlib", "Source: zlib\nVersion: 1.2.11\n");
    let fs = root.paths.get_filesystem();

    let mut db = root.open_db();
    let plan = create_install_plan(
        fs,
        &root.paths,
        &[root.request("brokenport"), root.request("zlib")],
        &db,
    )
    .unwrap();
    let summary =
        perform_plan(&plan, OPTIONS, KeepGoing::No, PrintSummary::No, &root.paths, &mut db)
            .unwrap();
    assert!(summary.aborted);
    assert!(summary.failed());
    assert_eq!(summary.results.len(), 1);
    assert!(db.find_installed("zlib", TEST_TRIPLET).is_none());
}

#[test]
fn test_install_refuses_over_half_installed() {
    let root = TestRoot::new();
    root.add_port("zlib", "Source: zlib\nVersion: 1.2.11\n");
    let fs = root.paths.get_filesystem();
    let mut db = root.open_db();

    // Simulate a crash between the HALF_INSTALLED and INSTALLED journal
    // entries of a previous run.
    let scf = load_port(fs, &root.paths.port_dir("zlib")).unwrap();
    let bpgh = caravel::control::BinaryParagraph::from_source(
        &scf.core_paragraph,
        &Triplet::from_canonical_name(TEST_TRIPLET),
    )
    .unwrap();
    db.insert(fs, StatusParagraph::new(bpgh, Want::Install, InstallState::HalfInstalled))
        .unwrap();

    // The half state survives a reload, and the driver refuses the plan.
    let mut db = root.open_db();
    let spec = root.request("zlib").package_spec;
    assert!(db.find_half_complete(&spec).is_some());

    let plan = create_install_plan(fs, &root.paths, &[root.request("zlib")], &db).unwrap();
    let err = perform_plan(&plan, OPTIONS, KeepGoing::No, PrintSummary::No, &root.paths, &mut db)
        .unwrap_err();
    assert!(matches!(err, Error::HalfCompleteState(_)), "got {}", err);
}

#[cfg(unix)]
#[test]
fn test_prebuilt_package_is_directly_installed() {
    let root = TestRoot::new();
    root.add_port("zlib", "Source: zlib\nVersion: 1.2.11\n");
    let fs = root.paths.get_filesystem();

    // Build once, then wipe the installed state but keep the staging tree.
    let mut db = root.open_db();
    let plan = create_install_plan(fs, &root.paths, &[root.request("zlib")], &db).unwrap();
    perform_plan(&plan, OPTIONS, KeepGoing::No, PrintSummary::No, &root.paths, &mut db).unwrap();
    caravel::remove::remove_package(
        &root.paths,
        &root.request("zlib").package_spec,
        caravel::remove::Purge::Yes,
        &mut db,
    )
    .unwrap();

    let plan = create_install_plan(fs, &root.paths, &[root.request("zlib")], &db).unwrap();
    match &plan[0] {
        AnyAction::Install(action) => assert_eq!(action.plan_type, InstallPlanType::Install),
        _ => panic!("expected an install action"),
    }

    let summary =
        perform_plan(&plan, OPTIONS, KeepGoing::No, PrintSummary::No, &root.paths, &mut db)
            .unwrap();
    assert_eq!(summary.results[0].result, BuildResult::Succeeded);
    assert!(db.find_installed("zlib", TEST_TRIPLET).is_some());
}
