// src/build/lint.rs

//! Post-build checks
//!
//! Inspects the staging tree a port build produced and counts problems.
//! Problems are reported, not fatal here: a nonzero count turns into
//! `POST_BUILD_CHECKS_FAILED` at the build executor. Portfiles can opt out
//! of individual checks through build policies.

use crate::build::{BuildInfo, BuildPolicy, PreBuildInfo};
use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::paths::CaravelPaths;
use crate::spec::PackageSpec;

fn has_any_file(fs: &dyn Filesystem, dir: &std::path::Path) -> Result<bool> {
    if !fs.exists(dir) {
        return Ok(false);
    }
    Ok(fs
        .get_files_recursive(dir)?
        .iter()
        .any(|p| !fs.is_directory(p)))
}

fn check_for_files_in_include_directory(
    fs: &dyn Filesystem,
    build_info: &BuildInfo,
    package_dir: &std::path::Path,
) -> Result<usize> {
    if build_info.policies.is_enabled(BuildPolicy::EmptyIncludeFolder) {
        return Ok(0);
    }
    if !has_any_file(fs, &package_dir.join("include"))? {
        println!(
            "The folder /include is empty or not present. This indicates the library was not correctly installed."
        );
        return Ok(1);
    }
    Ok(0)
}

fn check_for_files_in_debug_include_directory(
    fs: &dyn Filesystem,
    package_dir: &std::path::Path,
) -> Result<usize> {
    if has_any_file(fs, &package_dir.join("debug").join("include"))? {
        println!(
            "Include files should not be duplicated into the /debug/include directory."
        );
        return Ok(1);
    }
    Ok(0)
}

fn check_for_copyright_file(
    fs: &dyn Filesystem,
    spec: &PackageSpec,
    package_dir: &std::path::Path,
) -> Result<usize> {
    let copyright = package_dir.join("share").join(spec.name()).join("copyright");
    if !fs.exists(&copyright) {
        println!(
            "The software license must be available at ${{CURRENT_PACKAGES_DIR}}/share/{}/copyright",
            spec.name()
        );
        return Ok(1);
    }
    Ok(0)
}

fn check_for_no_files_at_all(
    fs: &dyn Filesystem,
    package_dir: &std::path::Path,
) -> Result<usize> {
    let mut any = false;
    for entry in fs.get_files_recursive(package_dir)? {
        if fs.is_directory(&entry) {
            continue;
        }
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_uppercase())
            .unwrap_or_default();
        if name != "CONTROL" && name != "BUILD_INFO" {
            any = true;
            break;
        }
    }
    if !any {
        println!("The build produced an empty package.");
        return Ok(1);
    }
    Ok(0)
}

/// Run every applicable check; the count of problems is the verdict.
pub fn perform_all_checks(
    spec: &PackageSpec,
    paths: &CaravelPaths,
    _pre_build_info: &PreBuildInfo,
    build_info: &BuildInfo,
    fs: &dyn Filesystem,
) -> Result<usize> {
    if build_info.policies.is_enabled(BuildPolicy::EmptyPackage) {
        return Ok(0);
    }

    let package_dir = paths.package_dir(spec);
    let mut error_count = 0;
    error_count += check_for_no_files_at_all(fs, &package_dir)?;
    error_count += check_for_files_in_include_directory(fs, build_info, &package_dir)?;
    error_count += check_for_files_in_debug_include_directory(fs, &package_dir)?;
    error_count += check_for_copyright_file(fs, spec, &package_dir)?;

    if error_count != 0 {
        println!(
            "Found {} post-build check problem(s). To submit these ports to curated catalogs, please first correct the portfile.",
            error_count
        );
    }
    Ok(error_count)
}
