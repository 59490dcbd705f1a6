// src/control/binary.rs

//! Built package metadata (`packages/<dir>/CONTROL`)

use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::paragraph::{self, parse_comma_list, Paragraph, ParagraphParser};
use crate::spec::{PackageSpec, Triplet};
use std::path::Path;

use super::source::{filter_dependencies, FeatureParagraph, SourceParagraph};

/// One paragraph of a binary control file: the concrete result of building
/// a port (or one of its features) for a triplet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryParagraph {
    pub spec: PackageSpec,
    pub version: String,
    pub description: String,
    pub maintainer: String,
    /// Set for feature paragraphs, empty for the core paragraph.
    pub feature: String,
    pub default_features: Vec<String>,
    /// Dependency names already filtered for this triplet.
    pub depends: Vec<String>,
}

impl BinaryParagraph {
    /// Core paragraph for a built port.
    pub fn from_source(spgh: &SourceParagraph, triplet: &Triplet) -> Result<Self> {
        Ok(Self {
            spec: PackageSpec::from_name_and_triplet(&spgh.name, triplet.clone())?,
            version: spgh.version.clone(),
            description: spgh.description.clone(),
            maintainer: spgh.maintainer.clone(),
            feature: String::new(),
            default_features: spgh.default_features.clone(),
            depends: filter_dependencies(&spgh.depends, triplet),
        })
    }

    /// Paragraph for one built feature of a port.
    pub fn from_feature(
        spgh: &SourceParagraph,
        fpgh: &FeatureParagraph,
        triplet: &Triplet,
    ) -> Result<Self> {
        Ok(Self {
            spec: PackageSpec::from_name_and_triplet(&spgh.name, triplet.clone())?,
            version: spgh.version.clone(),
            description: fpgh.description.clone(),
            maintainer: spgh.maintainer.clone(),
            feature: fpgh.name.clone(),
            default_features: Vec::new(),
            depends: filter_dependencies(&fpgh.depends, triplet),
        })
    }

    pub fn is_feature(&self) -> bool {
        !self.feature.is_empty()
    }

    pub fn displayname(&self) -> String {
        if self.is_feature() {
            format!("{}[{}]:{}", self.spec.name(), self.feature, self.spec.triplet())
        } else {
            self.spec.to_string()
        }
    }

    /// Stem of the listfile name under `installed/vcpkg/info/`.
    pub fn fullstem(&self) -> String {
        format!("{}_{}", self.spec.name(), self.spec.triplet())
    }

    pub fn to_paragraph(&self) -> Paragraph {
        let mut pgh = Paragraph::new();
        pgh.push("Package", self.spec.name());
        if self.is_feature() {
            pgh.push("Feature", &self.feature);
        }
        pgh.push("Version", &self.version);
        if !self.depends.is_empty() {
            pgh.push("Depends", self.depends.join(", "));
        }
        pgh.push("Architecture", self.spec.triplet().canonical_name());
        pgh.push("Multi-Arch", "same");
        if !self.maintainer.is_empty() {
            pgh.push("Maintainer", &self.maintainer);
        }
        if !self.description.is_empty() {
            pgh.push("Description", &self.description);
        }
        if !self.default_features.is_empty() {
            pgh.push("Default-Features", self.default_features.join(", "));
        }
        pgh
    }

    /// Reconstruct from a stored paragraph; extra fields (such as `Status`)
    /// are left for the caller.
    pub fn from_paragraph(pgh: &Paragraph, origin: &str) -> Result<Self> {
        let mut parser = ParagraphParser::new(pgh.clone());
        let name = parser.required_field("Package");
        let feature = parser.optional_field("Feature").unwrap_or_default();
        let version = parser.required_field("Version");
        let depends = parser
            .optional_field("Depends")
            .map(|v| parse_comma_list(&v))
            .unwrap_or_default();
        let architecture = parser.required_field("Architecture");
        let _ = parser.optional_field("Multi-Arch");
        let maintainer = parser.optional_field("Maintainer").unwrap_or_default();
        let description = parser.optional_field("Description").unwrap_or_default();
        let default_features = parser
            .optional_field("Default-Features")
            .map(|v| parse_comma_list(&v))
            .unwrap_or_default();
        let _ = parser.optional_field("Status");
        parser.finish_lenient(origin)?;

        let triplet = Triplet::from_canonical_name(architecture);
        Ok(Self {
            spec: PackageSpec::from_name_and_triplet(name, triplet)?,
            version,
            description,
            maintainer,
            feature,
            default_features,
            depends,
        })
    }
}

/// The whole binary control file: the core paragraph plus one paragraph per
/// built feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryControlFile {
    pub core_paragraph: BinaryParagraph,
    pub features: Vec<BinaryParagraph>,
}

impl BinaryControlFile {
    pub fn serialize(&self) -> String {
        let mut paragraphs = vec![self.core_paragraph.to_paragraph()];
        paragraphs.extend(self.features.iter().map(BinaryParagraph::to_paragraph));
        paragraph::serialize_paragraphs(&paragraphs)
    }

    /// Load the control file a previous build left in a staging directory.
    pub fn load(fs: &dyn Filesystem, path: &Path) -> Result<Self> {
        let paragraphs = paragraph::get_paragraphs(fs, path)?;
        let origin = path.display().to_string();
        let mut iter = paragraphs.iter();
        let core = iter.next().ok_or_else(|| Error::ParagraphParse {
            path: path.to_path_buf(),
            reason: "control file is empty".to_string(),
        })?;
        let core_paragraph = BinaryParagraph::from_paragraph(core, &origin)?;
        let features = iter
            .map(|pgh| BinaryParagraph::from_paragraph(pgh, &origin))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { core_paragraph, features })
    }
}
