// src/spec.rs

//! Package and triplet identity
//!
//! A [`Triplet`] names a target platform (`x64-windows`), a [`PackageSpec`]
//! is a package-for-a-target (`zlib:x64-windows`), and a
//! [`FullPackageSpec`] adds a requested feature set. These are pure value
//! types: triplet *validity* (does a definition file exist?) is checked at
//! the filesystem seam, not here.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Canonical triplet name, e.g. `x64-windows`.
///
/// Equality and ordering are plain string comparisons of the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triplet {
    canonical_name: String,
}

impl Triplet {
    pub fn from_canonical_name(name: impl Into<String>) -> Self {
        Self { canonical_name: name.into() }
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name)
    }
}

/// A package name bound to a triplet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageSpec {
    name: String,
    triplet: Triplet,
}

impl PackageSpec {
    /// Construct a spec, validating the package name against `[a-z0-9_-]+`.
    pub fn from_name_and_triplet(name: impl Into<String>, triplet: Triplet) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || !name.bytes().all(is_valid_name_byte) {
            return Err(Error::InvalidPackageName(name));
        }
        Ok(Self { name, triplet })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triplet(&self) -> &Triplet {
        &self.triplet
    }

    /// Staging directory name under `packages/`.
    pub fn dir(&self) -> String {
        format!("{}_{}", self.name, self.triplet)
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.triplet)
    }
}

fn is_valid_name_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_'
}

/// A [`PackageSpec`] plus the requested feature set.
///
/// Feature order is irrelevant for identity, so the set is kept ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullPackageSpec {
    pub package_spec: PackageSpec,
    pub features: BTreeSet<String>,
}

impl FullPackageSpec {
    pub fn new(package_spec: PackageSpec) -> Self {
        Self { package_spec, features: BTreeSet::new() }
    }

    pub fn with_features<I, S>(package_spec: PackageSpec, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            package_spec,
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a user argument of the form `name[f1,f2]:triplet`, where both
    /// the feature list and the triplet are optional.
    pub fn parse(input: &str, default_triplet: &Triplet) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSpec {
            spec: input.to_string(),
            reason: reason.to_string(),
        };

        let (spec_part, triplet_part) = match input.rfind(':') {
            Some(pos) => (&input[..pos], Some(&input[pos + 1..])),
            None => (input, None),
        };

        let (name, features) = match spec_part.find('[') {
            Some(open) => {
                if !spec_part.ends_with(']') {
                    return Err(invalid("unterminated feature list"));
                }
                let list = &spec_part[open + 1..spec_part.len() - 1];
                let features: BTreeSet<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect();
                (&spec_part[..open], features)
            }
            None => (spec_part, BTreeSet::new()),
        };

        let triplet = match triplet_part {
            Some("") => return Err(invalid("empty triplet")),
            Some(t) => Triplet::from_canonical_name(t),
            None => default_triplet.clone(),
        };

        let package_spec = PackageSpec::from_name_and_triplet(name, triplet)?;
        Ok(Self { package_spec, features })
    }
}

impl fmt::Display for FullPackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.features.is_empty() {
            write!(f, "{}", self.package_spec)
        } else {
            let features: Vec<&str> = self.features.iter().map(String::as_str).collect();
            write!(
                f,
                "{}[{}]:{}",
                self.package_spec.name(),
                features.join(","),
                self.package_spec.triplet()
            )
        }
    }
}

impl FromStr for Triplet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Triplet::from_canonical_name(s))
    }
}
