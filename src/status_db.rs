// src/status_db.rs

//! The installed-package status database
//!
//! The single source of truth for "what is installed": an in-memory map
//! from `(name, triplet, feature)` to the latest [`StatusParagraph`],
//! derived from a baseline file plus a journal of numbered update files.
//! `insert` writes the journal entry durably *before* touching the map, so
//! a crash at any point leaves a database that replays to a consistent
//! view. Compaction folds the journal back into the baseline.

use crate::control::StatusParagraph;
use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::paragraph;
use crate::spec::PackageSpec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

type Key = (String, String, String);

fn key_of(spgh: &StatusParagraph) -> Key {
    (
        spgh.package.spec.name().to_string(),
        spgh.package.spec.triplet().canonical_name().to_string(),
        spgh.package.feature.clone(),
    )
}

pub struct StatusDatabase {
    status_file: PathBuf,
    updates_dir: PathBuf,
    entries: BTreeMap<Key, StatusParagraph>,
    next_update: u64,
}

impl StatusDatabase {
    /// Load the baseline and replay the journal in filename order.
    pub fn load(fs: &dyn Filesystem, status_file: &Path, updates_dir: &Path) -> Result<Self> {
        let mut db = Self {
            status_file: status_file.to_path_buf(),
            updates_dir: updates_dir.to_path_buf(),
            entries: BTreeMap::new(),
            next_update: 1,
        };

        if fs.exists(status_file) {
            for pgh in paragraph::get_paragraphs(fs, status_file)? {
                let spgh =
                    StatusParagraph::from_paragraph(&pgh, &status_file.display().to_string())?;
                db.entries.insert(key_of(&spgh), spgh);
            }
        }

        if fs.exists(updates_dir) {
            for update_file in fs.get_files_non_recursive(updates_dir)? {
                if fs.is_directory(&update_file) {
                    continue;
                }
                let stem = update_file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let Ok(id) = stem.parse::<u64>() else {
                    warn!("ignoring unexpected file in updates directory: {}", stem);
                    continue;
                };
                db.next_update = db.next_update.max(id + 1);
                for pgh in paragraph::get_paragraphs(fs, &update_file)? {
                    let spgh =
                        StatusParagraph::from_paragraph(&pgh, &update_file.display().to_string())?;
                    db.entries.insert(key_of(&spgh), spgh);
                }
            }
        }

        debug!(
            "status database loaded: {} paragraphs, next update {:04}",
            db.entries.len(),
            db.next_update
        );
        Ok(db)
    }

    /// Journal a paragraph, then apply it to the in-memory view.
    pub fn insert(&mut self, fs: &dyn Filesystem, spgh: StatusParagraph) -> Result<()> {
        let update_path = self.updates_dir.join(format!("{:04}", self.next_update));
        fs.write_contents(&update_path, &spgh.to_paragraph().serialize())?;
        self.next_update += 1;
        self.entries.insert(key_of(&spgh), spgh);
        Ok(())
    }

    pub fn find(&self, name: &str, triplet: &str, feature: &str) -> Option<&StatusParagraph> {
        self.entries
            .get(&(name.to_string(), triplet.to_string(), feature.to_string()))
    }

    /// The core paragraph of a fully installed package, if any.
    pub fn find_installed(&self, name: &str, triplet: &str) -> Option<&StatusParagraph> {
        self.find(name, triplet, "").filter(|s| s.is_installed())
    }

    /// Any paragraph of this package stuck in a half state from a crash.
    pub fn find_half_complete(&self, spec: &PackageSpec) -> Option<&StatusParagraph> {
        self.entries
            .values()
            .find(|s| s.package.spec == *spec && s.state.is_half())
    }

    /// Names of this package's installed features.
    pub fn installed_features(
        &self,
        name: &str,
        triplet: &str,
    ) -> std::collections::BTreeSet<String> {
        self.entries
            .values()
            .filter(|s| {
                s.is_installed()
                    && s.package.spec.name() == name
                    && s.package.spec.triplet().canonical_name() == triplet
                    && s.package.is_feature()
            })
            .map(|s| s.package.feature.clone())
            .collect()
    }

    pub fn iter_installed(&self) -> impl Iterator<Item = &StatusParagraph> {
        self.entries.values().filter(|s| s.is_installed())
    }

    /// Rewrite the baseline from the in-memory view and drop the journal.
    pub fn compact(&mut self, fs: &dyn Filesystem) -> Result<()> {
        let paragraphs: Vec<_> = self.entries.values().map(StatusParagraph::to_paragraph).collect();
        let contents = paragraph::serialize_paragraphs(&paragraphs);

        let staging = self.status_file.with_file_name("status-new");
        fs.write_contents(&staging, &contents)?;
        fs.rename(&staging, &self.status_file)?;

        if fs.exists(&self.updates_dir) {
            for update_file in fs.get_files_non_recursive(&self.updates_dir)? {
                if !fs.is_directory(&update_file) {
                    fs.remove_file(&update_file)?;
                }
            }
        }
        self.next_update = 1;
        Ok(())
    }

    /// Check that the on-disk representation would reproduce this view.
    pub fn verify_reload(&self, fs: &dyn Filesystem) -> Result<bool> {
        let reloaded = Self::load(fs, &self.status_file, &self.updates_dir)?;
        Ok(reloaded.entries == self.entries)
    }
}

/// Load the status database from its canonical location, creating the
/// directory skeleton on first use.
pub fn database_load_check(fs: &dyn Filesystem, vcpkg_dir: &Path) -> Result<StatusDatabase> {
    let status_file = vcpkg_dir.join("status");
    let updates_dir = vcpkg_dir.join("updates");
    fs.create_dir_all(&updates_dir)?;
    fs.create_dir_all(&vcpkg_dir.join("info"))?;
    StatusDatabase::load(fs, &status_file, &updates_dir)
}

impl std::fmt::Debug for StatusDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusDatabase")
            .field("entries", &self.entries.len())
            .field("next_update", &self.next_update)
            .finish()
    }
}
