// src/install/mod.rs

//! The install executor
//!
//! Commits a staged binary package into the installed tree. Conflicts with
//! files owned by other packages of the same triplet are detected *before*
//! anything is journalled or copied, so `FILE_CONFLICTS` leaves no trace.
//! Once the engine decides to proceed, every status transition is written
//! to the journal before the corresponding filesystem work completes:
//! a crash leaves either a recoverable HALF_INSTALLED paragraph or a fully
//! consistent INSTALLED one.

mod driver;

pub use driver::{
    perform_install_plan_action, perform_plan, InstallSummary, KeepGoing, PrintSummary,
    SpecSummary,
};

use crate::control::{BinaryControlFile, InstallState, StatusParagraph, Want};
use crate::error::Result;
use crate::filesystem::{FileKind, Filesystem};
use crate::internal_error;
use crate::paths::CaravelPaths;
use crate::spec::Triplet;
use crate::status_db::StatusDatabase;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallResult {
    Success,
    FileConflicts,
}

/// Where a package's files go and where its listfile lives.
pub struct InstallDir {
    destination: PathBuf,
    destination_subdirectory: String,
    listfile: PathBuf,
}

impl InstallDir {
    pub fn from_destination_root(
        destination_root: &Path,
        destination_subdirectory: &str,
        listfile: PathBuf,
    ) -> Self {
        Self {
            destination: destination_root.join(destination_subdirectory),
            destination_subdirectory: destination_subdirectory.to_string(),
            listfile,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn listfile(&self) -> &Path {
        &self.listfile
    }
}

fn relative_unix_path(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_control_file_name(name: &str) -> bool {
    name.eq_ignore_ascii_case("CONTROL") || name.eq_ignore_ascii_case("BUILD_INFO")
}

/// Copy the staging tree into the installed tree and record every committed
/// path in the (sorted) listfile.
pub fn install_files_and_write_listfile(
    fs: &dyn Filesystem,
    source_dir: &Path,
    dirs: &InstallDir,
) -> Result<()> {
    if !fs.exists(source_dir) {
        return Err(internal_error!(
            "source directory {} does not exist",
            source_dir.display()
        ));
    }
    fs.create_dir_all(&dirs.destination)?;
    if let Some(listfile_parent) = dirs.listfile.parent() {
        fs.create_dir_all(listfile_parent)?;
    }

    let mut output = vec![format!("{}/", dirs.destination_subdirectory)];

    for file in fs.get_files_recursive(source_dir)? {
        let kind = match fs.kind(&file) {
            Ok(kind) => kind,
            Err(e) => {
                println!("failed: {}: {}", file.display(), e);
                continue;
            }
        };

        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if kind == FileKind::Regular && is_control_file_name(&filename) {
            // The control files describe the package; they are not part of it.
            continue;
        }

        let suffix = relative_unix_path(source_dir, &file);
        let target = dirs.destination.join(&suffix);

        match kind {
            FileKind::Directory => {
                if let Err(e) = fs.create_directory(&target) {
                    println!("failed: {}: {}", target.display(), e);
                }
                output.push(format!("{}/{}/", dirs.destination_subdirectory, suffix));
            }
            FileKind::Regular => {
                if fs.exists(&target) {
                    warn!(
                        "File {} was already present and will be overwritten",
                        target.display()
                    );
                }
                if let Err(e) = fs.copy_file(&file, &target) {
                    println!("failed: {}: {}", target.display(), e);
                }
                output.push(format!("{}/{}", dirs.destination_subdirectory, suffix));
            }
            FileKind::Other => {
                println!("failed: {}: cannot handle file type", file.display());
            }
        }
    }

    output.sort();
    fs.write_lines(&dirs.listfile, &output)
}

/// Files (no directories) currently owned by installed packages of this
/// triplet, relative to the triplet directory, sorted.
pub fn build_list_of_installed_files(
    fs: &dyn Filesystem,
    paths: &CaravelPaths,
    status_db: &StatusDatabase,
    triplet: &Triplet,
) -> Result<Vec<String>> {
    let prefix = format!("{}/", triplet.canonical_name());
    let mut installed_files = Vec::new();

    for spgh in status_db.iter_installed() {
        if spgh.package.is_feature() || spgh.package.spec.triplet() != triplet {
            continue;
        }
        let listfile = paths.listfile_path(&spgh.package);
        if !fs.exists(&listfile) {
            warn!(
                "installed package {} has no listfile at {}",
                spgh.package.spec,
                listfile.display()
            );
            continue;
        }
        for line in fs.read_lines(&listfile)? {
            let line = line.trim_end();
            if line.is_empty() || line.ends_with('/') {
                continue;
            }
            if let Some(stripped) = line.strip_prefix(&prefix) {
                installed_files.push(stripped.to_string());
            }
        }
    }

    installed_files.sort();
    Ok(installed_files)
}

fn build_list_of_package_files(fs: &dyn Filesystem, package_dir: &Path) -> Result<Vec<String>> {
    let mut package_files = Vec::new();
    for file in fs.get_files_recursive(package_dir)? {
        if fs.is_directory(&file) {
            continue;
        }
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_control_file_name(&filename) {
            continue;
        }
        package_files.push(relative_unix_path(package_dir, &file));
    }
    package_files.sort();
    Ok(package_files)
}

/// Commit one staged package. See the module docs for the crash-safety
/// argument.
pub fn install_package(
    paths: &CaravelPaths,
    bcf: &BinaryControlFile,
    status_db: &mut StatusDatabase,
) -> Result<InstallResult> {
    let fs = paths.get_filesystem();
    let spec = &bcf.core_paragraph.spec;
    let package_dir = paths.package_dir(spec);
    let triplet = spec.triplet().clone();

    let package_files = build_list_of_package_files(fs, &package_dir)?;
    let installed_files = build_list_of_installed_files(fs, paths, status_db, &triplet)?;

    let intersection: Vec<&String> = package_files
        .iter()
        .filter(|f| installed_files.binary_search(*f).is_ok())
        .collect();

    if !intersection.is_empty() {
        let triplet_install_path = paths.installed.join(triplet.canonical_name());
        println!(
            "The following files are already installed in {} and are in conflict with {}",
            triplet_install_path.display(),
            spec
        );
        for file in intersection {
            println!("    {}", file);
        }
        println!();
        return Ok(InstallResult::FileConflicts);
    }

    let mut source_paragraph =
        StatusParagraph::new(bcf.core_paragraph.clone(), Want::Install, InstallState::HalfInstalled);
    status_db.insert(fs, source_paragraph.clone())?;

    let mut feature_paragraphs: Vec<StatusParagraph> = Vec::new();
    for feature in &bcf.features {
        let feature_paragraph =
            StatusParagraph::new(feature.clone(), Want::Install, InstallState::HalfInstalled);
        status_db.insert(fs, feature_paragraph.clone())?;
        feature_paragraphs.push(feature_paragraph);
    }

    let install_dir = InstallDir::from_destination_root(
        &paths.installed,
        triplet.canonical_name(),
        paths.listfile_path(&bcf.core_paragraph),
    );
    install_files_and_write_listfile(fs, &package_dir, &install_dir)?;

    source_paragraph.state = InstallState::Installed;
    status_db.insert(fs, source_paragraph)?;
    for mut feature_paragraph in feature_paragraphs {
        feature_paragraph.state = InstallState::Installed;
        status_db.insert(fs, feature_paragraph)?;
    }

    Ok(InstallResult::Success)
}
