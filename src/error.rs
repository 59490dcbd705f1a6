// src/error.rs

//! Crate-wide error type
//!
//! Input and environment problems get their own variants so the CLI can
//! report them with a plain message and abort before any state is created.
//! Internal errors carry the raising site for bug reports.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Package name failed validation
    #[error("invalid package name '{0}': expected [a-z0-9_-]+")]
    InvalidPackageName(String),

    /// A user-supplied package spec could not be parsed
    #[error("invalid package spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    /// No triplet definition file exists for this name
    #[error("unknown triplet '{0}': no definition file in the triplets directory")]
    UnknownTriplet(String),

    /// No port directory with a CONTROL file exists for this name
    #[error("no port found for '{0}'")]
    PortNotFound(String),

    /// A paragraph file failed to parse
    #[error("error parsing {path}: {reason}")]
    ParagraphParse { path: PathBuf, reason: String },

    /// The dependency graph contains a cycle
    #[error("dependency cycle detected: {0}")]
    DependencyCycle(String),

    /// No acceptable copy of an external tool could be located
    #[error("could not locate {tool} {version} or newer, and bootstrapping failed: {reason}")]
    ToolNotFound {
        tool: String,
        version: String,
        reason: String,
    },

    /// No complete compiler toolset was found
    #[error("could not locate a complete toolset; examined:\n{}",
            .examined.iter().map(|p| format!("    {}", p.display())).collect::<Vec<_>>().join("\n"))]
    NoToolsets { examined: Vec<PathBuf> },

    /// A toolset version was requested that is not installed
    #[error("could not find toolset '{0}'")]
    ToolsetNotFound(String),

    /// The triplet requests a target the engine cannot map to build arguments
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    /// A prior run crashed mid-operation and left this package half done
    #[error("package {0} is in a partially installed or removed state; run 'remove {0}' before retrying")]
    HalfCompleteState(String),

    /// The plan rebuilds installed packages and --recurse was not given
    #[error("the plan would remove and rebuild installed packages; re-run with --recurse to confirm")]
    RecurseRequired,

    /// Engine bug; includes the raising site for bug reports
    #[error("internal error: {msg} ({file}:{line})")]
    Internal {
        msg: String,
        file: &'static str,
        line: u32,
    },
}

/// Construct an [`Error::Internal`] carrying the raising site.
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::Error::Internal {
            msg: format!($($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}
