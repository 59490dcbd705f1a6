// src/lib.rs

//! Caravel Package Manager
//!
//! Source-based C/C++ package manager that drives CMake portfiles and
//! records installed state in a paragraph-format status database, wire
//! compatible with the vcpkg port ecosystem.
//!
//! # Architecture
//!
//! - Plan-first: requests become an ordered remove/build/install plan
//! - Journal-first: every status transition is durable before the
//!   filesystem work it describes, so a crash is always recoverable
//! - File-level tracking: per-package listfiles, conflict detection before
//!   any commit
//! - Sequential by design: one action at a time, no timeouts, child
//!   processes own their parallelism

pub mod build;
pub mod control;
mod error;
pub mod filesystem;
pub mod install;
pub mod metrics;
pub mod paragraph;
pub mod paths;
pub mod plan;
pub mod remove;
pub mod spec;
pub mod status_db;
pub mod system;
pub mod toolchain;

pub use error::{Error, Result};
pub use paths::CaravelPaths;
pub use spec::{FullPackageSpec, PackageSpec, Triplet};
pub use status_db::{database_load_check, StatusDatabase};
