// src/toolchain.rs

//! External tool and compiler toolset discovery
//!
//! Tools (CMake, Git, NuGet) are resolved through an ordered candidate
//! list: the copy a previous bootstrap downloaded, whatever is on `PATH`,
//! then well-known install locations. A candidate is accepted when the
//! first `d.d.d` triple in its version output is at least the required
//! version; if nothing qualifies, the bootstrap script is asked to fetch
//! the tool and must hand back the expected download path.
//!
//! Compiler toolsets are discovered once, newest last. A triplet may pin a
//! toolset version; when the pinned version is the older `v140` and a newer
//! toolchain can impersonate it, the impersonating toolset wins.

use crate::error::{Error, Result};
use crate::paths::CaravelPaths;
use crate::system::{self, cmd_execute_and_capture_output, CpuArchitecture};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, warn};

const CMAKE_REQUIRED_VERSION: [u32; 3] = [3, 9, 3];
const GIT_REQUIRED_VERSION: [u32; 3] = [2, 14, 1];
const NUGET_REQUIRED_VERSION: [u32; 3] = [4, 1, 0];

const V_140: &str = "v140";
const V_141: &str = "v141";

fn version_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap())
}

/// First `d.d.d` match in `output`, compared component-wise.
pub fn output_has_equal_or_greater_version(output: &str, expected: [u32; 3]) -> bool {
    let Some(caps) = version_regex().captures(output) else {
        return false;
    };
    let parse = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
    let found = [parse(1), parse(2), parse(3)];
    found >= expected
}

fn exists_and_has_equal_or_greater_version(
    exe: &Path,
    version_arg: Option<&str>,
    expected: [u32; 3],
) -> bool {
    let mut cmd = Command::new(exe);
    if let Some(arg) = version_arg {
        cmd.arg(arg);
    }
    match cmd_execute_and_capture_output(&mut cmd) {
        Ok(rc) if rc.exit_code == 0 => output_has_equal_or_greater_version(&rc.output, expected),
        _ => false,
    }
}

/// Executables named `name` reachable through `PATH`.
fn find_from_path(name: &str) -> Vec<PathBuf> {
    let file_name = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
    let Some(path_var) = std::env::var_os("PATH") else {
        return Vec::new();
    };
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(&file_name))
        .filter(|p| p.is_file())
        .collect()
}

fn exe_name(name: &str) -> String {
    format!("{}{}", name, std::env::consts::EXE_SUFFIX)
}

/// Ask the bootstrap script to download a tool, then verify the reported
/// path is the expected downloaded copy.
fn fetch_dependency(
    paths: &CaravelPaths,
    tool: &str,
    expected_downloaded_path: &Path,
    version: [u32; 3],
) -> Result<PathBuf> {
    let script = paths.scripts.join("fetchDependency.ps1");
    let mut cmd = system::powershell_script_cmd(&script, &["-Dependency", tool]);
    let rc = cmd_execute_and_capture_output(&mut cmd)?;

    let version_string = format!("{}.{}.{}", version[0], version[1], version[2]);
    if rc.exit_code != 0 {
        crate::metrics::track_property("error", "bootstrap failed");
        crate::metrics::track_property("dependency", tool);
        return Err(Error::ToolNotFound {
            tool: tool.to_string(),
            version: version_string,
            reason: format!("bootstrap script exited with code {}", rc.exit_code),
        });
    }

    let fs = paths.get_filesystem();
    let actual: PathBuf = rc.output.trim().into();
    let equivalent = match (fs.canonicalize(&actual), fs.canonicalize(expected_downloaded_path)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if !equivalent {
        return Err(Error::ToolNotFound {
            tool: tool.to_string(),
            version: version_string,
            reason: format!(
                "bootstrap reported {} instead of the expected {}",
                actual.display(),
                expected_downloaded_path.display()
            ),
        });
    }
    Ok(actual)
}

fn find_tool(
    paths: &CaravelPaths,
    tool: &str,
    downloaded_copy: PathBuf,
    version_arg: Option<&str>,
    expected_version: [u32; 3],
    well_known: Vec<PathBuf>,
) -> Result<PathBuf> {
    let mut candidates = vec![downloaded_copy.clone()];
    candidates.extend(find_from_path(tool));
    candidates.extend(well_known);

    for candidate in candidates {
        if exists_and_has_equal_or_greater_version(&candidate, version_arg, expected_version) {
            debug!("{} resolved to {}", tool, candidate.display());
            return Ok(candidate);
        }
    }

    fetch_dependency(paths, tool, &downloaded_copy, expected_version)
}

pub fn find_cmake(paths: &CaravelPaths) -> Result<PathBuf> {
    let downloaded = paths.downloads.join("cmake-3.9.3").join("bin").join(exe_name("cmake"));
    let mut well_known = Vec::new();
    if cfg!(windows) {
        for base in ["ProgramFiles", "ProgramFiles(x86)"] {
            if let Ok(dir) = std::env::var(base) {
                well_known.push(Path::new(&dir).join("CMake").join("bin").join("cmake.exe"));
            }
        }
    }
    find_tool(paths, "cmake", downloaded, Some("--version"), CMAKE_REQUIRED_VERSION, well_known)
}

pub fn find_git(paths: &CaravelPaths) -> Result<PathBuf> {
    let downloaded = paths.downloads.join("git-2.14.1").join("cmd").join(exe_name("git"));
    let mut well_known = Vec::new();
    if cfg!(windows) {
        for base in ["ProgramFiles", "ProgramFiles(x86)"] {
            if let Ok(dir) = std::env::var(base) {
                well_known.push(Path::new(&dir).join("git").join("cmd").join("git.exe"));
            }
        }
    }
    find_tool(paths, "git", downloaded, Some("--version"), GIT_REQUIRED_VERSION, well_known)
}

pub fn find_nuget(paths: &CaravelPaths) -> Result<PathBuf> {
    let downloaded = paths.downloads.join("nuget-4.1.0").join(exe_name("nuget"));
    find_tool(paths, "nuget", downloaded, None, NUGET_REQUIRED_VERSION, Vec::new())
}

/// One `(host, target)` pair a toolset environment script supports, and the
/// argument that selects it.
#[derive(Debug, Clone)]
pub struct ToolsetArchOption {
    pub name: String,
    pub host_arch: CpuArchitecture,
    pub target_arch: CpuArchitecture,
}

/// A discovered compiler toolset.
#[derive(Debug, Clone)]
pub struct Toolset {
    pub dumpbin: PathBuf,
    pub vcvarsall: PathBuf,
    pub vcvarsall_options: Vec<String>,
    pub version: String,
    pub supported_architectures: Vec<ToolsetArchOption>,
}

fn arch_option(name: &str, host: CpuArchitecture, target: CpuArchitecture) -> ToolsetArchOption {
    ToolsetArchOption {
        name: name.to_string(),
        host_arch: host,
        target_arch: target,
    }
}

fn vs2015_instance() -> Option<PathBuf> {
    // The env variable points at <VS>/Common7/Tools/ (the trailing
    // separator disappears in Path normalisation).
    let tools = std::env::var_os("VS140COMNTOOLS")?;
    let tools = PathBuf::from(tools);
    Some(tools.parent()?.parent()?.to_path_buf())
}

fn vs2017_instances(paths: &CaravelPaths) -> Result<Vec<PathBuf>> {
    if !cfg!(windows) {
        return Ok(Vec::new());
    }
    let script = paths.scripts.join("findVisualStudioInstallationInstances.ps1");
    let mut cmd = system::powershell_script_cmd(&script, &[]);
    let rc = cmd_execute_and_capture_output(&mut cmd)?;
    if rc.exit_code != 0 {
        warn!("Visual Studio instance discovery script failed ({})", rc.exit_code);
        return Ok(Vec::new());
    }
    Ok(rc
        .output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Probe the machine for usable toolsets. Sorted oldest-first so that
/// "pick the newest" is `last()`.
pub fn find_toolset_instances(paths: &CaravelPaths) -> Result<Vec<Toolset>> {
    use CpuArchitecture::{Arm, X64, X86};

    let fs = paths.get_filesystem();
    let mut examined = Vec::new();
    let mut found = Vec::new();

    if let Some(instance) = vs2015_instance() {
        let vcvarsall = instance.join("VC").join("vcvarsall.bat");
        examined.push(vcvarsall.clone());
        if fs.exists(&vcvarsall) {
            let bin_dir = instance.join("VC").join("bin");
            let dumpbin = bin_dir.join("dumpbin.exe");
            examined.push(dumpbin.clone());

            let mut archs = Vec::new();
            if fs.exists(&bin_dir.join("vcvars32.bat")) {
                archs.push(arch_option("x86", X86, X86));
            }
            if fs.exists(&bin_dir.join("amd64").join("vcvars64.bat")) {
                archs.push(arch_option("x64", X64, X64));
            }
            if fs.exists(&bin_dir.join("x86_amd64").join("vcvarsx86_amd64.bat")) {
                archs.push(arch_option("x86_amd64", X86, X64));
            }
            if fs.exists(&bin_dir.join("x86_arm").join("vcvarsx86_arm.bat")) {
                archs.push(arch_option("x86_arm", X86, Arm));
            }
            if fs.exists(&bin_dir.join("amd64_x86").join("vcvarsamd64_x86.bat")) {
                archs.push(arch_option("amd64_x86", X64, X86));
            }
            if fs.exists(&bin_dir.join("amd64_arm").join("vcvarsamd64_arm.bat")) {
                archs.push(arch_option("amd64_arm", X64, Arm));
            }

            if fs.exists(&dumpbin) {
                found.push(Toolset {
                    dumpbin,
                    vcvarsall,
                    vcvarsall_options: Vec::new(),
                    version: V_140.to_string(),
                    supported_architectures: archs,
                });
            }
        }
    }

    for instance in vs2017_instances(paths)? {
        let vc_dir = instance.join("VC");
        let vcvarsall_dir = vc_dir.join("Auxiliary").join("Build");
        let vcvarsall = vcvarsall_dir.join("vcvarsall.bat");
        examined.push(vcvarsall.clone());
        if !fs.exists(&vcvarsall) {
            continue;
        }

        let mut archs = Vec::new();
        if fs.exists(&vcvarsall_dir.join("vcvars32.bat")) {
            archs.push(arch_option("x86", X86, X86));
        }
        if fs.exists(&vcvarsall_dir.join("vcvars64.bat")) {
            archs.push(arch_option("amd64", X64, X64));
        }
        if fs.exists(&vcvarsall_dir.join("vcvarsx86_amd64.bat")) {
            archs.push(arch_option("x86_amd64", X86, X64));
        }
        if fs.exists(&vcvarsall_dir.join("vcvarsx86_arm.bat")) {
            archs.push(arch_option("x86_arm", X86, Arm));
        }
        if fs.exists(&vcvarsall_dir.join("vcvarsamd64_x86.bat")) {
            archs.push(arch_option("amd64_x86", X64, X86));
        }
        if fs.exists(&vcvarsall_dir.join("vcvarsamd64_arm.bat")) {
            archs.push(arch_option("amd64_arm", X64, Arm));
        }

        // Newest MSVC toolchain under this instance that has a dumpbin.
        let msvc_dir = vc_dir.join("Tools").join("MSVC");
        let mut subdirs = match fs.get_files_non_recursive(&msvc_dir) {
            Ok(entries) => entries.into_iter().filter(|p| fs.is_directory(p)).collect(),
            Err(_) => Vec::new(),
        };
        subdirs.sort();
        subdirs.reverse();

        for subdir in subdirs {
            let dumpbin = subdir.join("bin").join("HostX86").join("x86").join("dumpbin.exe");
            examined.push(dumpbin.clone());
            if fs.exists(&dumpbin) {
                found.push(Toolset {
                    dumpbin,
                    vcvarsall: vcvarsall.clone(),
                    vcvarsall_options: Vec::new(),
                    version: V_141.to_string(),
                    supported_architectures: archs.clone(),
                });
                break;
            }
        }
    }

    if found.is_empty() {
        return Err(Error::NoToolsets { examined });
    }
    Ok(found)
}

/// For each newer toolset, a variant that invokes it with the back-compat
/// flag so it can stand in for `v140`. Empty when no real `v140` exists.
pub fn create_v140_override_toolsets(toolsets: &[Toolset]) -> Vec<Toolset> {
    if !toolsets.iter().any(|t| t.version == V_140) {
        return Vec::new();
    }
    toolsets
        .iter()
        .filter(|t| t.version == V_141)
        .map(|t| Toolset {
            dumpbin: t.dumpbin.clone(),
            vcvarsall: t.vcvarsall.clone(),
            vcvarsall_options: vec!["-vcvars_ver=14.0".to_string()],
            version: V_140.to_string(),
            supported_architectures: t.supported_architectures.clone(),
        })
        .collect()
}

fn within_vs_root<'a>(toolsets: &'a [Toolset], vs_root: Option<&Path>) -> Vec<&'a Toolset> {
    match vs_root {
        None => toolsets.iter().collect(),
        Some(root) => toolsets.iter().filter(|t| t.vcvarsall.starts_with(root)).collect(),
    }
}

/// Pick the toolset for an optional version hint, restricted to an optional
/// Visual Studio installation root.
pub fn select_toolset<'a>(
    toolsets: &'a [Toolset],
    v140_overrides: &'a [Toolset],
    version_hint: Option<&str>,
    vs_root_hint: Option<&Path>,
) -> Result<&'a Toolset> {
    let candidates = within_vs_root(toolsets, vs_root_hint);

    let hint = version_hint.unwrap_or("");
    if hint.is_empty() {
        return candidates
            .last()
            .copied()
            .ok_or_else(|| Error::ToolsetNotFound(String::from("<default>")));
    }

    let exact = candidates
        .iter()
        .find(|t| t.version == hint)
        .copied()
        .ok_or_else(|| Error::ToolsetNotFound(hint.to_string()))?;

    if hint == V_140 {
        if let Some(override_toolset) = within_vs_root(v140_overrides, vs_root_hint).last().copied()
        {
            return Ok(override_toolset);
        }
    }
    Ok(exact)
}
