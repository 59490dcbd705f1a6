// src/control/mod.rs

//! Control-file data model
//!
//! Three views of a package, all stored as paragraphs:
//! - [`SourceControlFile`]: the port definition read from `ports/<name>/CONTROL`
//! - [`BinaryControlFile`]: what a build produced, written into staging
//! - [`StatusParagraph`]: a binary paragraph plus install-lifecycle flags

mod binary;
mod source;
mod status;

pub use binary::{BinaryControlFile, BinaryParagraph};
pub use source::{
    filter_dependencies, load_port, Dependency, FeatureParagraph, SourceControlFile,
    SourceParagraph,
};
pub use status::{InstallState, StatusParagraph, Want};
