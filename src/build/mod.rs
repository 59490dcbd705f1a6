// src/build/mod.rs

//! The build executor
//!
//! Drives one port build end to end: verify dependencies are installed,
//! snapshot the triplet environment, compose the environment-setup and
//! CMake invocations, run them as a single child process, parse the
//! `BUILD_INFO` the portfile emitted, lint the staging tree, and write the
//! binary control file. Build failures are results, not errors; the driver
//! decides what they mean for the rest of the plan.

pub mod lint;

use crate::control::{BinaryControlFile, BinaryParagraph, SourceControlFile};
use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::paragraph::{self, Paragraph, ParagraphParser};
use crate::paths::CaravelPaths;
use crate::spec::{PackageSpec, Triplet};
use crate::status_db::StatusDatabase;
use crate::system::{self, cmd_execute_clean, to_cpu_architecture};
use crate::toolchain::Toolset;
use crate::{internal_error, metrics};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Sentinel printed by the triplet-inspection script before its variables.
const PRE_BUILD_INFO_SENTINEL: &str = "c35112b6-d1ba-415b-aa5d-81de856ef8eb";

/// Terminal result of one plan action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildResult {
    NullValue,
    Succeeded,
    BuildFailed,
    PostBuildChecksFailed,
    FileConflicts,
    CascadedDueToMissingDependencies,
}

/// Every reportable result, in summary order.
pub const BUILD_RESULT_VALUES: [BuildResult; 5] = [
    BuildResult::Succeeded,
    BuildResult::BuildFailed,
    BuildResult::PostBuildChecksFailed,
    BuildResult::FileConflicts,
    BuildResult::CascadedDueToMissingDependencies,
];

impl std::fmt::Display for BuildResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildResult::NullValue => "NULLVALUE",
            BuildResult::Succeeded => "SUCCEEDED",
            BuildResult::BuildFailed => "BUILD_FAILED",
            BuildResult::PostBuildChecksFailed => "POST_BUILD_CHECKS_FAILED",
            BuildResult::FileConflicts => "FILE_CONFLICTS",
            BuildResult::CascadedDueToMissingDependencies => {
                "CASCADED_DUE_TO_MISSING_DEPENDENCIES"
            }
        };
        write!(f, "{}", s)
    }
}

/// A [`BuildResult`] plus the missing specs when the build cascaded.
#[derive(Debug)]
pub struct ExtendedBuildResult {
    pub code: BuildResult,
    pub unmet_dependencies: Vec<PackageSpec>,
}

impl ExtendedBuildResult {
    fn just(code: BuildResult) -> Self {
        Self { code, unmet_dependencies: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BuildPackageOptions {
    pub use_head_version: bool,
    pub allow_downloads: bool,
}

pub struct BuildPackageConfig<'a> {
    pub scf: &'a SourceControlFile,
    pub triplet: Triplet,
    pub port_dir: PathBuf,
    pub options: BuildPackageOptions,
    pub feature_list: &'a [String],
}

/// CRT or library linkage declared by the port build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageType {
    Dynamic,
    Static,
}

pub fn to_linkage_type(s: &str) -> Option<LinkageType> {
    match s {
        "dynamic" => Some(LinkageType::Dynamic),
        "static" => Some(LinkageType::Static),
        _ => None,
    }
}

/// Policies a portfile may toggle to relax post-build checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildPolicy {
    EmptyPackage,
    DllsWithoutLibs,
    OnlyReleaseCrt,
    EmptyIncludeFolder,
    AllowObsoleteMsvcrt,
}

pub const ALL_POLICIES: [BuildPolicy; 5] = [
    BuildPolicy::EmptyPackage,
    BuildPolicy::DllsWithoutLibs,
    BuildPolicy::OnlyReleaseCrt,
    BuildPolicy::EmptyIncludeFolder,
    BuildPolicy::AllowObsoleteMsvcrt,
];

impl BuildPolicy {
    /// Field name in `BUILD_INFO`.
    pub fn name(self) -> &'static str {
        match self {
            BuildPolicy::EmptyPackage => "PolicyEmptyPackage",
            BuildPolicy::DllsWithoutLibs => "PolicyDLLsWithoutLIBs",
            BuildPolicy::OnlyReleaseCrt => "PolicyOnlyReleaseCRT",
            BuildPolicy::EmptyIncludeFolder => "PolicyEmptyIncludeFolder",
            BuildPolicy::AllowObsoleteMsvcrt => "PolicyAllowObsoleteMsvcrt",
        }
    }

    /// Variable name a portfile sets to toggle the policy.
    pub fn to_cmake_variable(self) -> &'static str {
        match self {
            BuildPolicy::EmptyPackage => "VCPKG_POLICY_EMPTY_PACKAGE",
            BuildPolicy::DllsWithoutLibs => "VCPKG_POLICY_DLLS_WITHOUT_LIBS",
            BuildPolicy::OnlyReleaseCrt => "VCPKG_POLICY_ONLY_RELEASE_CRT",
            BuildPolicy::EmptyIncludeFolder => "VCPKG_POLICY_EMPTY_INCLUDE_FOLDER",
            BuildPolicy::AllowObsoleteMsvcrt => "VCPKG_POLICY_ALLOW_OBSOLETE_MSVCRT",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildPolicies(BTreeMap<BuildPolicy, bool>);

impl BuildPolicies {
    pub fn is_enabled(&self, policy: BuildPolicy) -> bool {
        self.0.get(&policy).copied().unwrap_or(false)
    }
}

/// The `BUILD_INFO` paragraph a port build emits into its staging tree.
#[derive(Debug)]
pub struct BuildInfo {
    pub crt_linkage: LinkageType,
    pub library_linkage: LinkageType,
    pub version: Option<String>,
    pub policies: BuildPolicies,
}

pub(crate) fn create_build_info(pgh: Paragraph, origin: &str) -> Result<BuildInfo> {
    let mut parser = ParagraphParser::new(pgh);

    let crt_as_string = parser.required_field("CRTLinkage");
    let lib_as_string = parser.required_field("LibraryLinkage");
    let version = parser.optional_field("Version");

    let mut policies = BTreeMap::new();
    for policy in ALL_POLICIES {
        let Some(setting) = parser.optional_field(policy.name()) else {
            continue;
        };
        match setting.as_str() {
            "enabled" => policies.insert(policy, true),
            "disabled" => policies.insert(policy, false),
            other => {
                return Err(Error::ParagraphParse {
                    path: origin.into(),
                    reason: format!("unknown setting for policy '{}': {}", policy.name(), other),
                })
            }
        };
    }
    parser.finish(origin)?;

    let crt_linkage = to_linkage_type(&crt_as_string).ok_or_else(|| Error::ParagraphParse {
        path: origin.into(),
        reason: format!("invalid crt linkage type: [{}]", crt_as_string),
    })?;
    let library_linkage = to_linkage_type(&lib_as_string).ok_or_else(|| Error::ParagraphParse {
        path: origin.into(),
        reason: format!("invalid library linkage type: [{}]", lib_as_string),
    })?;

    Ok(BuildInfo {
        crt_linkage,
        library_linkage,
        version,
        policies: BuildPolicies(policies),
    })
}

/// Read the `BUILD_INFO` file from a package staging directory.
pub fn read_build_info(fs: &dyn Filesystem, filepath: &Path) -> Result<BuildInfo> {
    let pgh = paragraph::get_single_paragraph(fs, filepath)?;
    create_build_info(pgh, &filepath.display().to_string())
}

/// Environment snapshot produced by evaluating a triplet file.
#[derive(Debug, Clone, Default)]
pub struct PreBuildInfo {
    pub target_architecture: String,
    pub cmake_system_name: String,
    pub cmake_system_version: String,
    pub platform_toolset: Option<String>,
    pub visual_studio_path: Option<PathBuf>,
}

impl PreBuildInfo {
    /// Evaluate the triplet file through the inspection script and parse the
    /// `KEY=VALUE` lines following the sentinel.
    pub fn from_triplet_file(paths: &CaravelPaths, triplet: &Triplet) -> Result<Self> {
        let cmake_exe = paths.get_cmake_exe()?;
        let triplet_file_path = paths.triplet_file_path(triplet);

        let mut cmd = system::make_cmake_cmd(
            cmake_exe,
            &paths.triplet_environment_cmake,
            &[("CMAKE_TRIPLET_FILE", triplet_file_path.display().to_string())],
        );
        let rc = system::cmd_execute_and_capture_output(&mut cmd)?;
        if rc.exit_code != 0 {
            return Err(internal_error!(
                "triplet environment probe for {} exited with code {}",
                triplet,
                rc.exit_code
            ));
        }

        Self::parse_output(rc.output.lines())
    }

    fn parse_output<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Self> {
        let mut pre_build_info = PreBuildInfo::default();
        let mut seen_sentinel = false;

        for line in lines {
            let line = line.trim_end_matches('\r');
            if !seen_sentinel {
                seen_sentinel = line == PRE_BUILD_INFO_SENTINEL;
                continue;
            }
            if line.is_empty() {
                continue;
            }

            let (name, value) = match line.split_once('=') {
                Some((n, v)) => (n, v),
                None => (line, ""),
            };

            match name {
                "VCPKG_TARGET_ARCHITECTURE" => {
                    pre_build_info.target_architecture = value.to_string()
                }
                "VCPKG_CMAKE_SYSTEM_NAME" => pre_build_info.cmake_system_name = value.to_string(),
                "VCPKG_CMAKE_SYSTEM_VERSION" => {
                    pre_build_info.cmake_system_version = value.to_string()
                }
                "VCPKG_PLATFORM_TOOLSET" => {
                    pre_build_info.platform_toolset =
                        (!value.is_empty()).then(|| value.to_string())
                }
                "VCPKG_VISUAL_STUDIO_PATH" => {
                    pre_build_info.visual_studio_path =
                        (!value.is_empty()).then(|| PathBuf::from(value))
                }
                _ => return Err(internal_error!("unknown variable name {}", line)),
            }
        }

        Ok(pre_build_info)
    }
}

/// The environment-setup argument for a target system, or `None` when the
/// target needs no compiler-environment script at all.
fn to_vcvarsall_target(cmake_system_name: &str) -> Result<Option<&'static str>> {
    match cmake_system_name {
        "" | "Windows" => Ok(Some("")),
        "WindowsStore" => Ok(Some("store")),
        "Linux" | "Darwin" | "FreeBSD" => Ok(None),
        other => Err(Error::UnsupportedTarget(other.to_string())),
    }
}

/// The toolchain argument for a target architecture: the first supported
/// `(host, target)` pairing wins, hosts in preference order.
fn to_vcvarsall_toolchain(target_architecture: &str, toolset: &Toolset) -> Result<String> {
    let target_arch = to_cpu_architecture(target_architecture)
        .ok_or_else(|| Error::UnsupportedTarget(target_architecture.to_string()))?;

    for host in system::get_supported_host_architectures() {
        if let Some(option) = toolset
            .supported_architectures
            .iter()
            .find(|opt| opt.host_arch == host && opt.target_arch == target_arch)
        {
            return Ok(option.name.clone());
        }
    }
    Err(Error::UnsupportedTarget(format!(
        "no toolchain for target architecture {}",
        target_architecture
    )))
}

/// The shell fragment that loads the compiler environment.
fn make_build_env_cmd(arch: &str, target: &str, toolset: &Toolset) -> String {
    format!(
        "\"{}\" {} {} {}",
        toolset.vcvarsall.display(),
        toolset.vcvarsall_options.join(" "),
        arch,
        target
    )
}

fn execute_build(
    env_cmd: Option<String>,
    cmake_exe: &Path,
    script: &Path,
    defines: &[(&str, String)],
) -> Result<i32> {
    match env_cmd {
        None => cmd_execute_clean(&mut system::make_cmake_cmd(cmake_exe, script, defines)),
        Some(env) => {
            let mut composed = format!("{} && \"{}\"", env, cmake_exe.display());
            for (name, value) in defines {
                composed.push_str(&format!(" \"-D{}={}\"", name, value));
            }
            composed.push_str(&format!(" -P \"{}\"", script.display()));
            let mut cmd = std::process::Command::new("cmd");
            cmd.arg("/d").arg("/c").arg(composed);
            cmd_execute_clean(&mut cmd)
        }
    }
}

/// Build one port. Dependency gaps are reported before any side effect.
pub fn build_package(
    paths: &CaravelPaths,
    config: &BuildPackageConfig<'_>,
    status_db: &StatusDatabase,
) -> Result<ExtendedBuildResult> {
    let fs = paths.get_filesystem();
    let triplet = &config.triplet;
    let spec = PackageSpec::from_name_and_triplet(&config.scf.core_paragraph.name, triplet.clone())?;

    let mut required = crate::control::filter_dependencies(&config.scf.core_paragraph.depends, triplet);
    for feature in config.feature_list {
        if let Some(fpgh) = config.scf.find_feature(feature) {
            required.extend(crate::control::filter_dependencies(&fpgh.depends, triplet));
        }
    }
    let mut missing_specs = Vec::new();
    for dep in required {
        if status_db.find_installed(&dep, triplet.canonical_name()).is_none() {
            missing_specs.push(PackageSpec::from_name_and_triplet(dep, triplet.clone())?);
        }
    }
    if !missing_specs.is_empty() {
        missing_specs.sort();
        missing_specs.dedup();
        return Ok(ExtendedBuildResult {
            code: BuildResult::CascadedDueToMissingDependencies,
            unmet_dependencies: missing_specs,
        });
    }

    let cmake_exe = paths.get_cmake_exe()?.to_path_buf();
    let git_exe = paths.get_git_exe()?.to_path_buf();
    let pre_build_info = PreBuildInfo::from_triplet_file(paths, triplet)?;

    let (toolset_version, env_cmd) = match to_vcvarsall_target(&pre_build_info.cmake_system_name)? {
        None => (String::new(), None),
        Some(target) => {
            let toolset = paths.get_toolset(
                pre_build_info.platform_toolset.as_deref(),
                pre_build_info.visual_studio_path.as_deref(),
            )?;
            let arch = to_vcvarsall_toolchain(&pre_build_info.target_architecture, toolset)?;
            (
                toolset.version.clone(),
                Some(make_build_env_cmd(&arch, target, toolset)),
            )
        }
    };

    let features = config.feature_list.join(";");
    let defines = [
        ("CMD", "BUILD".to_string()),
        ("PORT", config.scf.core_paragraph.name.clone()),
        ("CURRENT_PORT_DIR", config.port_dir.display().to_string()),
        ("TARGET_TRIPLET", triplet.canonical_name().to_string()),
        ("VCPKG_PLATFORM_TOOLSET", toolset_version),
        (
            "VCPKG_USE_HEAD_VERSION",
            if config.options.use_head_version { "1" } else { "0" }.to_string(),
        ),
        (
            "_VCPKG_NO_DOWNLOADS",
            if config.options.allow_downloads { "0" } else { "1" }.to_string(),
        ),
        ("GIT", git_exe.display().to_string()),
        ("FEATURES", features),
    ];

    let timer = Instant::now();
    let return_code = execute_build(env_cmd, &cmake_exe, &paths.ports_cmake, &defines)?;
    let buildtime_us = timer.elapsed().as_micros() as f64;
    let spec_string = spec.to_string();
    debug!("build of {} finished in {}us with code {}", spec_string, buildtime_us, return_code);

    metrics::track_metric(&format!("buildtimeus-{}", spec_string), buildtime_us);
    if return_code != 0 {
        metrics::track_property("error", "build failed");
        metrics::track_property("build_error", spec_string);
        return Ok(ExtendedBuildResult::just(BuildResult::BuildFailed));
    }

    let build_info = read_build_info(fs, &paths.build_info_file_path(&spec))?;
    let error_count = lint::perform_all_checks(&spec, paths, &pre_build_info, &build_info, fs)?;

    let mut core_paragraph = BinaryParagraph::from_source(&config.scf.core_paragraph, triplet)?;
    if let Some(version) = &build_info.version {
        core_paragraph.version = version.clone();
    }
    let mut bcf = BinaryControlFile { core_paragraph, features: Vec::new() };

    if error_count != 0 {
        return Ok(ExtendedBuildResult::just(BuildResult::PostBuildChecksFailed));
    }

    for feature in config.feature_list {
        if let Some(fpgh) = config.scf.find_feature(feature) {
            bcf.features
                .push(BinaryParagraph::from_feature(&config.scf.core_paragraph, fpgh, triplet)?);
        }
    }

    let binary_control_file = paths.package_dir(&spec).join("CONTROL");
    fs.write_contents(&binary_control_file, &bcf.serialize())?;

    Ok(ExtendedBuildResult::just(BuildResult::Succeeded))
}

pub fn create_error_message(build_result: BuildResult, spec: &PackageSpec) -> String {
    format!("Error: Building package {} failed with: {}", spec, build_result)
}

/// What to tell the user when their requested package did not succeed.
pub fn create_user_troubleshooting_message(spec: &PackageSpec) -> String {
    format!(
        "Please ensure you're using the latest portfiles, then submit an issue at\n\
         https://github.com/caravel-pm/caravel/issues including:\n\
         \x20 Package: {}\n\
         \x20 Caravel version: {}\n\
         \n\
         Additionally, attach any relevant sections from the log files above.",
        spec,
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paragraph::parse_paragraphs;
    use crate::toolchain::ToolsetArchOption;
    use crate::system::CpuArchitecture;

    fn build_info_from(text: &str) -> Result<BuildInfo> {
        let pgh = parse_paragraphs(text).unwrap().remove(0);
        create_build_info(pgh, "test")
    }

    #[test]
    fn test_build_info_required_fields() {
        let info = build_info_from("CRTLinkage: dynamic\nLibraryLinkage: static\n").unwrap();
        assert_eq!(info.crt_linkage, LinkageType::Dynamic);
        assert_eq!(info.library_linkage, LinkageType::Static);
        assert!(info.version.is_none());

        assert!(build_info_from("CRTLinkage: dynamic\n").is_err());
        assert!(build_info_from("CRTLinkage: shared\nLibraryLinkage: static\n").is_err());
    }

    #[test]
    fn test_build_info_policies_and_version() {
        let info = build_info_from(
            "CRTLinkage: dynamic\nLibraryLinkage: dynamic\nVersion: 2.0-custom\nPolicyEmptyPackage: enabled\nPolicyOnlyReleaseCRT: disabled\n",
        )
        .unwrap();
        assert_eq!(info.version.as_deref(), Some("2.0-custom"));
        assert!(info.policies.is_enabled(BuildPolicy::EmptyPackage));
        assert!(!info.policies.is_enabled(BuildPolicy::OnlyReleaseCrt));
        assert!(!info.policies.is_enabled(BuildPolicy::DllsWithoutLibs));
    }

    #[test]
    fn test_build_info_rejects_unknown_fields() {
        assert!(build_info_from(
            "CRTLinkage: dynamic\nLibraryLinkage: dynamic\nPolicyEmptyPackage: sometimes\n"
        )
        .is_err());
        assert!(build_info_from(
            "CRTLinkage: dynamic\nLibraryLinkage: dynamic\nUnknownKey: 1\n"
        )
        .is_err());
    }

    #[test]
    fn test_pre_build_info_parses_after_sentinel() {
        let output = format!(
            "noise before\n{}\nVCPKG_TARGET_ARCHITECTURE=x64\nVCPKG_CMAKE_SYSTEM_NAME=Linux\nVCPKG_CMAKE_SYSTEM_VERSION=\nVCPKG_PLATFORM_TOOLSET=\nVCPKG_VISUAL_STUDIO_PATH=\n",
            PRE_BUILD_INFO_SENTINEL
        );
        let info = PreBuildInfo::parse_output(output.lines()).unwrap();
        assert_eq!(info.target_architecture, "x64");
        assert_eq!(info.cmake_system_name, "Linux");
        assert!(info.platform_toolset.is_none());
        assert!(info.visual_studio_path.is_none());
    }

    #[test]
    fn test_pre_build_info_unknown_key_fails() {
        let output = format!("{}\nVCPKG_SURPRISE=1\n", PRE_BUILD_INFO_SENTINEL);
        assert!(PreBuildInfo::parse_output(output.lines()).is_err());
    }

    #[test]
    fn test_pre_build_info_ignores_lines_before_sentinel() {
        let output = format!("VCPKG_SURPRISE=1\n{}\n", PRE_BUILD_INFO_SENTINEL);
        let info = PreBuildInfo::parse_output(output.lines()).unwrap();
        assert!(info.target_architecture.is_empty());
    }

    #[test]
    fn test_vcvarsall_target_mapping() {
        assert_eq!(to_vcvarsall_target("").unwrap(), Some(""));
        assert_eq!(to_vcvarsall_target("Windows").unwrap(), Some(""));
        assert_eq!(to_vcvarsall_target("WindowsStore").unwrap(), Some("store"));
        assert_eq!(to_vcvarsall_target("Linux").unwrap(), None);
        assert!(to_vcvarsall_target("Amiga").is_err());
    }

    #[test]
    fn test_vcvarsall_toolchain_picks_supported_pair() {
        let toolset = Toolset {
            dumpbin: PathBuf::from("dumpbin.exe"),
            vcvarsall: PathBuf::from("vcvarsall.bat"),
            vcvarsall_options: vec![],
            version: "v141".to_string(),
            supported_architectures: vec![ToolsetArchOption {
                name: "amd64".to_string(),
                host_arch: system::get_host_processor(),
                target_arch: CpuArchitecture::X64,
            }],
        };
        assert_eq!(to_vcvarsall_toolchain("x64", &toolset).unwrap(), "amd64");
        assert!(to_vcvarsall_toolchain("arm", &toolset).is_err());
        assert!(to_vcvarsall_toolchain("vax", &toolset).is_err());
    }

    #[test]
    fn test_build_result_strings() {
        assert_eq!(BuildResult::Succeeded.to_string(), "SUCCEEDED");
        assert_eq!(
            BuildResult::CascadedDueToMissingDependencies.to_string(),
            "CASCADED_DUE_TO_MISSING_DEPENDENCIES"
        );
        assert_eq!(BuildResult::NullValue.to_string(), "NULLVALUE");
    }

    #[test]
    fn test_error_messages_name_the_spec() {
        let spec = PackageSpec::from_name_and_triplet(
            "zlib",
            Triplet::from_canonical_name("x64-windows"),
        )
        .unwrap();
        assert_eq!(
            create_error_message(BuildResult::BuildFailed, &spec),
            "Error: Building package zlib:x64-windows failed with: BUILD_FAILED"
        );
        assert!(create_user_troubleshooting_message(&spec).contains("zlib:x64-windows"));
    }
}
