// src/remove.rs

//! The remove executor
//!
//! Removal mirrors installation through the status lifecycle: the
//! paragraphs are journalled as HALF_UNINSTALLED before any file is
//! deleted, files named by the listfile go first, emptied directories
//! after, and only then is NOT_INSTALLED journalled. A crash mid-removal
//! is therefore recoverable by re-running the removal.

use crate::control::{InstallState, StatusParagraph, Want};
use crate::error::Result;
use crate::paths::CaravelPaths;
use crate::plan::{RemovePlanAction, RemovePlanType, RequestType};
use crate::spec::PackageSpec;
use crate::status_db::StatusDatabase;
use std::collections::BTreeSet;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purge {
    Yes,
    No,
}

/// Plan removals for the requested specs.
pub fn create_remove_plan(
    specs: &[PackageSpec],
    status_db: &StatusDatabase,
) -> Vec<RemovePlanAction> {
    specs
        .iter()
        .map(|spec| {
            let plan_type = if status_db
                .find_installed(spec.name(), spec.triplet().canonical_name())
                .is_some()
            {
                RemovePlanType::Remove
            } else {
                RemovePlanType::NotInstalled
            };
            RemovePlanAction {
                spec: spec.clone(),
                plan_type,
                request_type: RequestType::UserRequested,
            }
        })
        .collect()
}

/// Installed packages of the same triplet that declare a dependency on
/// `spec`'s package.
pub fn find_dependents(status_db: &StatusDatabase, spec: &PackageSpec) -> Vec<PackageSpec> {
    let mut dependents: BTreeSet<PackageSpec> = BTreeSet::new();
    for spgh in status_db.iter_installed() {
        if spgh.package.spec.triplet() != spec.triplet() || spgh.package.spec == *spec {
            continue;
        }
        if spgh.package.depends.iter().any(|d| d == spec.name()) {
            dependents.insert(spgh.package.spec.clone());
        }
    }
    dependents.into_iter().collect()
}

fn delete_package_files(paths: &CaravelPaths, core: &StatusParagraph) -> Result<()> {
    let fs = paths.get_filesystem();
    let listfile = paths.listfile_path(&core.package);
    if !fs.exists(&listfile) {
        warn!(
            "no listfile for {}; removing the status entry only",
            core.package.spec
        );
        return Ok(());
    }

    let mut directories = Vec::new();
    for line in fs.read_lines(&listfile)? {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(dir) = line.strip_suffix('/') {
            directories.push(dir.to_string());
            continue;
        }
        let target = paths.installed.join(line);
        if fs.exists(&target) {
            fs.remove_file(&target)?;
        } else {
            warn!("file not found during removal: {}", target.display());
        }
    }

    // Deepest directories first so emptied parents can go too.
    directories.sort_by(|a, b| b.cmp(a));
    for dir in directories {
        let target = paths.installed.join(&dir);
        if fs.is_directory(&target) && !fs.remove_dir_if_empty(&target)? {
            warn!("directory not empty after removal: {}", target.display());
        }
    }

    fs.remove_file(&listfile)?;
    Ok(())
}

/// Remove one installed package, journal-first.
pub fn remove_package(
    paths: &CaravelPaths,
    spec: &PackageSpec,
    purge: Purge,
    status_db: &mut StatusDatabase,
) -> Result<()> {
    let fs = paths.get_filesystem();
    let want = match purge {
        Purge::Yes => Want::Purge,
        Purge::No => Want::Deinstall,
    };

    let Some(core) = status_db
        .find_installed(spec.name(), spec.triplet().canonical_name())
        .cloned()
    else {
        warn!("{} is not installed", spec);
        return Ok(());
    };

    let mut paragraphs = vec![core.clone()];
    for feature in status_db.installed_features(spec.name(), spec.triplet().canonical_name()) {
        if let Some(fpgh) = status_db.find(spec.name(), spec.triplet().canonical_name(), &feature)
        {
            paragraphs.push(fpgh.clone());
        }
    }

    for paragraph in &mut paragraphs {
        paragraph.want = want;
        paragraph.state = InstallState::HalfUninstalled;
        status_db.insert(fs, paragraph.clone())?;
    }

    delete_package_files(paths, &core)?;

    for paragraph in &mut paragraphs {
        paragraph.state = InstallState::NotInstalled;
        status_db.insert(fs, paragraph.clone())?;
    }
    Ok(())
}

/// Execute one remove action from a plan.
pub fn perform_remove_plan_action(
    paths: &CaravelPaths,
    action: &RemovePlanAction,
    purge: Purge,
    status_db: &mut StatusDatabase,
) -> Result<()> {
    match action.plan_type {
        RemovePlanType::NotInstalled => {
            println!("Package {} is not installed", action.spec);
            Ok(())
        }
        RemovePlanType::Remove => {
            println!("Removing package {}... ", action.spec);
            remove_package(paths, &action.spec, purge, status_db)?;
            println!("Removing package {}... done", action.spec);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{BinaryControlFile, BinaryParagraph};
    use crate::filesystem::{Filesystem, RealFilesystem};
    use crate::install::install_package;
    use crate::spec::Triplet;
    use crate::status_db::database_load_check;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        paths: CaravelPaths,
        db: StatusDatabase,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let fs = RealFilesystem;
        let paths = CaravelPaths::create(temp.path()).unwrap();
        let db = database_load_check(&fs, &paths.vcpkg_dir).unwrap();
        Fixture { _temp: temp, paths, db }
    }

    fn spec(name: &str) -> PackageSpec {
        PackageSpec::from_name_and_triplet(name, Triplet::from_canonical_name("x64-windows"))
            .unwrap()
    }

    fn install_fixture_package(f: &mut Fixture, name: &str, depends: &[&str]) {
        let fs = RealFilesystem;
        let bcf = BinaryControlFile {
            core_paragraph: BinaryParagraph {
                spec: spec(name),
                version: "1.0".to_string(),
                description: String::new(),
                maintainer: String::new(),
                feature: String::new(),
                default_features: vec![],
                depends: depends.iter().map(|s| s.to_string()).collect(),
            },
            features: vec![],
        };
        let dir = f.paths.package_dir(&bcf.core_paragraph.spec);
        fs.write_contents(&dir.join(format!("include/{}.h", name)), "").unwrap();
        install_package(&f.paths, &bcf, &mut f.db).unwrap();
    }

    #[test]
    fn test_remove_deletes_files_and_listfile() {
        let mut f = fixture();
        let fs = RealFilesystem;
        install_fixture_package(&mut f, "zlib", &[]);

        let header = f.paths.installed.join("x64-windows/include/zlib.h");
        let listfile = f.paths.vcpkg_dir_info.join("zlib_x64-windows.list");
        assert!(header.exists());
        assert!(listfile.exists());

        remove_package(&f.paths, &spec("zlib"), Purge::Yes, &mut f.db).unwrap();

        assert!(!header.exists());
        assert!(!listfile.exists());
        assert!(f.db.find_installed("zlib", "x64-windows").is_none());
        let status = f.db.find("zlib", "x64-windows", "").unwrap();
        assert_eq!(status.want, Want::Purge);
        assert_eq!(status.state, InstallState::NotInstalled);
        assert!(fs.exists(&f.paths.vcpkg_dir_updates));
    }

    #[test]
    fn test_remove_plan_classification() {
        let mut f = fixture();
        install_fixture_package(&mut f, "zlib", &[]);

        let plan = create_remove_plan(&[spec("zlib"), spec("curl")], &f.db);
        assert_eq!(plan[0].plan_type, RemovePlanType::Remove);
        assert_eq!(plan[1].plan_type, RemovePlanType::NotInstalled);
    }

    #[test]
    fn test_find_dependents() {
        let mut f = fixture();
        install_fixture_package(&mut f, "zlib", &[]);
        install_fixture_package(&mut f, "curl", &["zlib"]);

        let dependents = find_dependents(&f.db, &spec("zlib"));
        assert_eq!(dependents, vec![spec("curl")]);
        assert!(find_dependents(&f.db, &spec("curl")).is_empty());
    }

    #[test]
    fn test_remove_leaves_other_packages_alone() {
        let mut f = fixture();
        install_fixture_package(&mut f, "zlib", &[]);
        install_fixture_package(&mut f, "curl", &[]);

        remove_package(&f.paths, &spec("zlib"), Purge::Yes, &mut f.db).unwrap();

        assert!(f.db.find_installed("curl", "x64-windows").is_some());
        assert!(f.paths.installed.join("x64-windows/include/curl.h").exists());
    }
}
