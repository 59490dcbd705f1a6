// src/control/status.rs

//! Installed-status paragraphs
//!
//! A [`StatusParagraph`] is a [`BinaryParagraph`] plus the two lifecycle
//! flags, serialised as a single `Status: <want> ok <state>` field. The
//! lifecycle walks
//! `NOT_INSTALLED → HALF_INSTALLED → INSTALLED → HALF_UNINSTALLED →
//! NOT_INSTALLED`; any HALF state observed at the start of an operation is
//! evidence of a prior crash.

use crate::error::{Error, Result};
use crate::paragraph::Paragraph;
use std::fmt;

use super::binary::BinaryParagraph;

/// What the user asked for this package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Want {
    Unknown,
    Install,
    Hold,
    Deinstall,
    Purge,
}

impl Want {
    pub fn as_str(self) -> &'static str {
        match self {
            Want::Unknown => "unknown",
            Want::Install => "install",
            Want::Hold => "hold",
            Want::Deinstall => "deinstall",
            Want::Purge => "purge",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Want::Unknown),
            "install" => Some(Want::Install),
            "hold" => Some(Want::Hold),
            "deinstall" => Some(Want::Deinstall),
            "purge" => Some(Want::Purge),
            _ => None,
        }
    }
}

/// How far installation or removal has actually progressed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    HalfInstalled,
    Installed,
    HalfUninstalled,
}

impl InstallState {
    pub fn as_str(self) -> &'static str {
        match self {
            InstallState::NotInstalled => "not-installed",
            InstallState::HalfInstalled => "half-installed",
            InstallState::Installed => "installed",
            InstallState::HalfUninstalled => "half-uninstalled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "not-installed" => Some(InstallState::NotInstalled),
            "half-installed" => Some(InstallState::HalfInstalled),
            "installed" => Some(InstallState::Installed),
            "half-uninstalled" => Some(InstallState::HalfUninstalled),
            _ => None,
        }
    }

    /// A half state means a prior run died between journal entries.
    pub fn is_half(self) -> bool {
        matches!(self, InstallState::HalfInstalled | InstallState::HalfUninstalled)
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A binary paragraph with its lifecycle flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusParagraph {
    pub package: BinaryParagraph,
    pub want: Want,
    pub state: InstallState,
}

impl StatusParagraph {
    pub fn new(package: BinaryParagraph, want: Want, state: InstallState) -> Self {
        Self { package, want, state }
    }

    pub fn is_installed(&self) -> bool {
        self.want == Want::Install && self.state == InstallState::Installed
    }

    pub fn to_paragraph(&self) -> Paragraph {
        let mut pgh = self.package.to_paragraph();
        pgh.push("Status", format!("{} ok {}", self.want.as_str(), self.state.as_str()));
        pgh
    }

    pub fn from_paragraph(pgh: &Paragraph, origin: &str) -> Result<Self> {
        let status = pgh.get("Status").ok_or_else(|| Error::ParagraphParse {
            path: origin.into(),
            reason: "missing required fields: Status".to_string(),
        })?;

        let tokens: Vec<&str> = status.split_whitespace().collect();
        let (want, state) = match tokens.as_slice() {
            [want, "ok", state] => (Want::parse(want), InstallState::parse(state)),
            _ => (None, None),
        };
        let (want, state) = match (want, state) {
            (Some(w), Some(s)) => (w, s),
            _ => {
                return Err(Error::ParagraphParse {
                    path: origin.into(),
                    reason: format!("malformed Status field: '{}'", status),
                })
            }
        };

        let package = BinaryParagraph::from_paragraph(pgh, origin)?;
        Ok(Self { package, want, state })
    }
}
