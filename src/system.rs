// src/system.rs

//! Synchronous process execution and host introspection
//!
//! Build and probe commands run as child processes with a cleaned
//! environment so that stray user variables cannot leak into port builds.
//! All waits are blocking; a hung tool hangs the engine on purpose.

use crate::error::Result;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Exit code plus combined stdout/stderr of a finished child process.
#[derive(Debug)]
pub struct ExitCodeAndOutput {
    pub exit_code: i32,
    pub output: String,
}

/// Environment variables preserved for child processes.
const KEPT_VARIABLES: &[&str] = &[
    "PATH",
    "HOME",
    "TMPDIR",
    "TEMP",
    "TMP",
    "LANG",
    "TERM",
    "SYSTEMROOT",
    "SystemRoot",
    "COMSPEC",
    "USERPROFILE",
    "PROGRAMFILES",
    "ProgramFiles",
    "ProgramFiles(x86)",
    "ProgramW6432",
    "VS140COMNTOOLS",
];

/// Strip the child environment down to [`KEPT_VARIABLES`].
pub fn clean_env(cmd: &mut Command) {
    cmd.env_clear();
    for name in KEPT_VARIABLES {
        if let Ok(value) = std::env::var(name) {
            cmd.env(name, value);
        }
    }
}

/// Run a command to completion, inheriting stdio. Returns the exit code.
pub fn cmd_execute_clean(cmd: &mut Command) -> Result<i32> {
    clean_env(cmd);
    debug!("executing: {:?}", cmd);
    let status = cmd.status()?;
    Ok(status.code().unwrap_or(-1))
}

/// Run a command to completion, capturing stdout and stderr together.
pub fn cmd_execute_and_capture_output(cmd: &mut Command) -> Result<ExitCodeAndOutput> {
    clean_env(cmd);
    debug!("executing (captured): {:?}", cmd);
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(ExitCodeAndOutput {
        exit_code: output.status.code().unwrap_or(-1),
        output: combined,
    })
}

/// Build the command that launches a PowerShell collaborator script.
pub fn powershell_script_cmd(script: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("powershell");
    cmd.arg("-NoProfile")
        .arg("-ExecutionPolicy")
        .arg("Bypass")
        .arg("-File")
        .arg(script);
    cmd.args(args);
    cmd
}

/// Build the CMake invocation of a script with `-DKEY=VALUE` defines.
pub fn make_cmake_cmd(cmake_exe: &Path, script: &Path, defines: &[(&str, String)]) -> Command {
    let mut cmd = Command::new(cmake_exe);
    for (name, value) in defines {
        cmd.arg(format!("-D{}={}", name, value));
    }
    cmd.arg("-P").arg(script);
    cmd
}

/// CPU architectures the engine knows how to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArchitecture {
    X86,
    X64,
    Arm,
    Arm64,
}

/// Parse the architecture token used by triplet files.
pub fn to_cpu_architecture(arch: &str) -> Option<CpuArchitecture> {
    match arch.to_ascii_lowercase().as_str() {
        "x86" => Some(CpuArchitecture::X86),
        "x64" | "amd64" | "x86_64" => Some(CpuArchitecture::X64),
        "arm" => Some(CpuArchitecture::Arm),
        "arm64" | "aarch64" => Some(CpuArchitecture::Arm64),
        _ => None,
    }
}

/// The architecture this process runs on.
pub fn get_host_processor() -> CpuArchitecture {
    if cfg!(target_arch = "x86") {
        CpuArchitecture::X86
    } else if cfg!(target_arch = "aarch64") {
        CpuArchitecture::Arm64
    } else if cfg!(target_arch = "arm") {
        CpuArchitecture::Arm
    } else {
        CpuArchitecture::X64
    }
}

/// Host architectures usable for cross tools, preferred first.
pub fn get_supported_host_architectures() -> Vec<CpuArchitecture> {
    match get_host_processor() {
        CpuArchitecture::X64 => vec![CpuArchitecture::X64, CpuArchitecture::X86],
        CpuArchitecture::Arm64 => {
            vec![CpuArchitecture::Arm64, CpuArchitecture::X64, CpuArchitecture::X86]
        }
        other => vec![other],
    }
}
