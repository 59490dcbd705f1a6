// src/filesystem/mod.rs

//! Filesystem capability interface
//!
//! All engine code performs filesystem work through the [`Filesystem`]
//! trait so that the I/O seam stays in one place. [`RealFilesystem`] is the
//! production implementation; tests run it against temporary roots.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Coarse file kind, used where the engine must skip what it cannot commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Other,
}

/// The filesystem operations the engine needs.
pub trait Filesystem {
    fn exists(&self, path: &Path) -> bool;
    fn is_directory(&self, path: &Path) -> bool;
    fn kind(&self, path: &Path) -> Result<FileKind>;

    fn read_contents(&self, path: &Path) -> Result<String>;
    fn read_lines(&self, path: &Path) -> Result<Vec<String>>;
    fn write_contents(&self, path: &Path, contents: &str) -> Result<()>;
    /// Write one line per entry, creating parent directories as needed.
    fn write_lines(&self, path: &Path, lines: &[String]) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// Create a single directory; an already existing directory is tolerated.
    fn create_directory(&self, path: &Path) -> Result<()>;
    fn copy_file(&self, source: &Path, target: &Path) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    /// Remove a directory only if it is empty; reports whether it was removed.
    fn remove_dir_if_empty(&self, path: &Path) -> Result<bool>;

    /// Every entry below `path`, depth-first, sorted by path.
    fn get_files_recursive(&self, path: &Path) -> Result<Vec<PathBuf>>;
    /// Immediate children of `path`, sorted by path.
    fn get_files_non_recursive(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// [`Filesystem`] backed by the real OS.
#[derive(Debug, Default)]
pub struct RealFilesystem;

static REAL_FILESYSTEM: RealFilesystem = RealFilesystem;

/// Shared instance of the production filesystem.
pub fn real_filesystem() -> &'static dyn Filesystem {
    &REAL_FILESYSTEM
}

impl Filesystem for RealFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn kind(&self, path: &Path) -> Result<FileKind> {
        let meta = fs::symlink_metadata(path)?;
        let ft = meta.file_type();
        if ft.is_file() {
            Ok(FileKind::Regular)
        } else if ft.is_dir() {
            Ok(FileKind::Directory)
        } else {
            Ok(FileKind::Other)
        }
    }

    fn read_contents(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn read_lines(&self, path: &Path) -> Result<Vec<String>> {
        let contents = fs::read_to_string(path)?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    fn write_contents(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> Result<()> {
        let mut contents = lines.join("\n");
        contents.push('\n');
        self.write_contents(path, &contents)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path)?)
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        match fs::create_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn copy_file(&self, source: &Path, target: &Path) -> Result<()> {
        fs::copy(source, target)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        Ok(fs::rename(from, to)?)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        Ok(fs::remove_file(path)?)
    }

    fn remove_dir_if_empty(&self, path: &Path) -> Result<bool> {
        match fs::remove_dir(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                // The "directory not empty" error kind is not stable across
                // platforms; probe for remaining children instead.
                if fs::read_dir(path).map(|mut d| d.next().is_some()).unwrap_or(false) {
                    debug!("not removing non-empty directory {}", path.display());
                    Ok(false)
                } else {
                    Err(Error::Io(e))
                }
            }
        }
    }

    fn get_files_recursive(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(path).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
                }))
            })?;
            files.push(entry.into_path());
        }
        files.sort();
        Ok(files)
    }

    fn get_files_non_recursive(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(path)? {
            files.push(entry?.path());
        }
        files.sort();
        Ok(files)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        Ok(fs::canonicalize(path)?)
    }
}
