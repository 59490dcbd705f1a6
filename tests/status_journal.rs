// tests/status_journal.rs

//! Journal and compaction behaviour of the status database.

mod common;

use caravel::control::{BinaryParagraph, InstallState, StatusParagraph, Want};
use caravel::spec::{PackageSpec, Triplet};
use common::{TestRoot, TEST_TRIPLET};

fn paragraph(name: &str, version: &str, state: InstallState) -> StatusParagraph {
    let spec =
        PackageSpec::from_name_and_triplet(name, Triplet::from_canonical_name(TEST_TRIPLET))
            .unwrap();
    StatusParagraph::new(
        BinaryParagraph {
            spec,
            version: version.to_string(),
            description: format!("{} library", name),
            maintainer: String::new(),
            feature: String::new(),
            default_features: vec![],
            depends: vec![],
        },
        Want::Install,
        state,
    )
}

#[test]
fn test_reload_reproduces_in_memory_view() {
    let root = TestRoot::new();
    let fs = root.paths.get_filesystem();
    let mut db = root.open_db();

    db.insert(fs, paragraph("zlib", "1.2.11", InstallState::HalfInstalled)).unwrap();
    db.insert(fs, paragraph("zlib", "1.2.11", InstallState::Installed)).unwrap();
    db.insert(fs, paragraph("curl", "7.55.1", InstallState::HalfInstalled)).unwrap();
    db.insert(fs, paragraph("curl", "7.55.1", InstallState::Installed)).unwrap();
    db.insert(fs, paragraph("openssl", "1.0.2", InstallState::HalfInstalled)).unwrap();

    assert!(db.verify_reload(fs).unwrap());

    let reloaded = root.open_db();
    assert!(reloaded.find_installed("zlib", TEST_TRIPLET).is_some());
    assert!(reloaded.find_installed("curl", TEST_TRIPLET).is_some());
    // The interrupted insert is visible as a half state, not as installed.
    assert!(reloaded.find_installed("openssl", TEST_TRIPLET).is_none());
    assert_eq!(
        reloaded.find("openssl", TEST_TRIPLET, "").unwrap().state,
        InstallState::HalfInstalled
    );
}

#[test]
fn test_compaction_preserves_the_view_and_drops_the_journal() {
    let root = TestRoot::new();
    let fs = root.paths.get_filesystem();
    let mut db = root.open_db();

    db.insert(fs, paragraph("zlib", "1.2.11", InstallState::Installed)).unwrap();
    db.insert(fs, paragraph("curl", "7.55.1", InstallState::Installed)).unwrap();

    let installed_before: Vec<String> =
        db.iter_installed().map(|s| s.package.spec.to_string()).collect();

    db.compact(fs).unwrap();

    assert!(std::fs::read_dir(&root.paths.vcpkg_dir_updates).unwrap().next().is_none());
    let reloaded = root.open_db();
    let installed_after: Vec<String> =
        reloaded.iter_installed().map(|s| s.package.spec.to_string()).collect();
    assert_eq!(installed_before, installed_after);
    assert!(reloaded.verify_reload(fs).unwrap());
}

#[test]
fn test_journal_entries_are_numbered_sequentially() {
    let root = TestRoot::new();
    let fs = root.paths.get_filesystem();
    let mut db = root.open_db();

    db.insert(fs, paragraph("zlib", "1.2.11", InstallState::HalfInstalled)).unwrap();
    db.insert(fs, paragraph("zlib", "1.2.11", InstallState::Installed)).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(&root.paths.vcpkg_dir_updates)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["0001", "0002"]);

    // A fresh process continues the numbering instead of clobbering.
    let mut db = root.open_db();
    db.insert(fs, paragraph("curl", "7.55.1", InstallState::HalfInstalled)).unwrap();
    assert!(root.paths.vcpkg_dir_updates.join("0003").exists());
}

#[test]
fn test_latest_paragraph_wins_after_updates() {
    let root = TestRoot::new();
    let fs = root.paths.get_filesystem();
    let mut db = root.open_db();

    db.insert(fs, paragraph("zlib", "1.2.11", InstallState::Installed)).unwrap();
    db.compact(fs).unwrap();

    // An upgrade writes a newer paragraph through the journal.
    db.insert(fs, paragraph("zlib", "1.2.12", InstallState::Installed)).unwrap();

    let reloaded = root.open_db();
    assert_eq!(reloaded.find_installed("zlib", TEST_TRIPLET).unwrap().package.version, "1.2.12");
}
