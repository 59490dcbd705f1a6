// src/control/source.rs

//! Port definitions (`ports/<name>/CONTROL`)

use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::paragraph::{self, parse_comma_list, Paragraph, ParagraphParser};
use crate::spec::Triplet;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// A declared dependency with an optional platform qualifier.
///
/// `zlib (windows)` applies only to triplets whose canonical name contains
/// `windows`; `zlib (!uwp)` applies to every triplet that does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub qualifier: Option<String>,
}

impl Dependency {
    pub fn parse(entry: &str) -> Self {
        let entry = entry.trim();
        if let Some(open) = entry.find('(') {
            if entry.ends_with(')') {
                return Self {
                    name: entry[..open].trim().to_string(),
                    qualifier: Some(entry[open + 1..entry.len() - 1].trim().to_string()),
                };
            }
        }
        Self { name: entry.to_string(), qualifier: None }
    }

    pub fn applies_to(&self, triplet: &Triplet) -> bool {
        match self.qualifier.as_deref() {
            None => true,
            Some(q) => match q.strip_prefix('!') {
                Some(negated) => !triplet.canonical_name().contains(negated),
                None => triplet.canonical_name().contains(q),
            },
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{} ({})", self.name, q),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Names of the dependencies that apply to `triplet`, in declaration order.
pub fn filter_dependencies(depends: &[Dependency], triplet: &Triplet) -> Vec<String> {
    depends
        .iter()
        .filter(|d| d.applies_to(triplet))
        .map(|d| d.name.clone())
        .collect()
}

/// The core paragraph of a port definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceParagraph {
    pub name: String,
    pub version: String,
    pub description: String,
    pub maintainer: String,
    pub depends: Vec<Dependency>,
    pub default_features: Vec<String>,
}

/// An optional feature of a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureParagraph {
    pub name: String,
    pub description: String,
    pub depends: Vec<Dependency>,
}

/// A parsed port definition: core paragraph plus feature paragraphs.
/// Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceControlFile {
    pub core_paragraph: SourceParagraph,
    pub feature_paragraphs: Vec<FeatureParagraph>,
}

impl SourceControlFile {
    pub fn find_feature(&self, name: &str) -> Option<&FeatureParagraph> {
        self.feature_paragraphs.iter().find(|f| f.name == name)
    }

    fn parse(paragraphs: Vec<Paragraph>, origin: &str) -> Result<Self> {
        let mut iter = paragraphs.into_iter();
        let core = iter.next().ok_or_else(|| Error::ParagraphParse {
            path: origin.into(),
            reason: "control file is empty".to_string(),
        })?;

        let mut parser = ParagraphParser::new(core);
        let name = parser.required_field("Source");
        let version = parser.required_field("Version");
        let description = parser.optional_field("Description").unwrap_or_default();
        let maintainer = parser.optional_field("Maintainer").unwrap_or_default();
        let depends = parser
            .optional_field("Build-Depends")
            .map(|v| parse_comma_list(&v).iter().map(|d| Dependency::parse(d)).collect())
            .unwrap_or_default();
        let default_features = parser
            .optional_field("Default-Features")
            .map(|v| parse_comma_list(&v))
            .unwrap_or_default();
        parser.finish_lenient(origin)?;

        let mut feature_paragraphs = Vec::new();
        for pgh in iter {
            let mut parser = ParagraphParser::new(pgh);
            let feature_name = parser.required_field("Feature");
            let description = parser.optional_field("Description").unwrap_or_default();
            let depends = parser
                .optional_field("Build-Depends")
                .map(|v| parse_comma_list(&v).iter().map(|d| Dependency::parse(d)).collect())
                .unwrap_or_default();
            parser.finish_lenient(origin)?;
            feature_paragraphs.push(FeatureParagraph {
                name: feature_name,
                description,
                depends,
            });
        }

        Ok(Self {
            core_paragraph: SourceParagraph {
                name,
                version,
                description,
                maintainer,
                depends,
                default_features,
            },
            feature_paragraphs,
        })
    }
}

/// Load the port definition from a port directory.
pub fn load_port(fs: &dyn Filesystem, port_dir: &Path) -> Result<SourceControlFile> {
    let control_path = port_dir.join("CONTROL");
    if !fs.exists(&control_path) {
        let name = port_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| port_dir.display().to_string());
        return Err(Error::PortNotFound(name));
    }
    debug!("loading port definition from {}", control_path.display());
    let paragraphs = paragraph::get_paragraphs(fs, &control_path)?;
    SourceControlFile::parse(paragraphs, &control_path.display().to_string())
}
