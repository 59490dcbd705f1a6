// src/paths.rs

//! Root directory layout and lazily located tools
//!
//! Every on-disk location the engine touches is derived here, once, from
//! the root directory. External tool paths and compiler toolsets are
//! resolved on first use and cached for the life of the process; callers
//! get shared references into the cache.

use crate::control::BinaryParagraph;
use crate::error::Result;
use crate::filesystem::{real_filesystem, Filesystem};
use crate::spec::{PackageSpec, Triplet};
use crate::toolchain::{self, Toolset};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub struct CaravelPaths {
    pub root: PathBuf,
    pub ports: PathBuf,
    pub triplets: PathBuf,
    pub downloads: PathBuf,
    pub buildtrees: PathBuf,
    pub packages: PathBuf,
    pub installed: PathBuf,
    pub scripts: PathBuf,

    pub vcpkg_dir: PathBuf,
    pub vcpkg_dir_status_file: PathBuf,
    pub vcpkg_dir_info: PathBuf,
    pub vcpkg_dir_updates: PathBuf,

    pub ports_cmake: PathBuf,
    pub triplet_environment_cmake: PathBuf,

    cmake_exe: OnceLock<PathBuf>,
    git_exe: OnceLock<PathBuf>,
    nuget_exe: OnceLock<PathBuf>,
    toolsets: OnceLock<Vec<Toolset>>,
    toolsets_v140_override: OnceLock<Vec<Toolset>>,
}

impl CaravelPaths {
    pub fn create(root_dir: &Path) -> Result<Self> {
        let fs = real_filesystem();
        let root = fs.canonicalize(root_dir)?;

        let installed = root.join("installed");
        let scripts = root.join("scripts");
        let vcpkg_dir = installed.join("vcpkg");

        Ok(Self {
            ports: root.join("ports"),
            triplets: root.join("triplets"),
            downloads: root.join("downloads"),
            buildtrees: root.join("buildtrees"),
            packages: root.join("packages"),
            vcpkg_dir_status_file: vcpkg_dir.join("status"),
            vcpkg_dir_info: vcpkg_dir.join("info"),
            vcpkg_dir_updates: vcpkg_dir.join("updates"),
            ports_cmake: scripts.join("ports.cmake"),
            triplet_environment_cmake: scripts.join("get_triplet_environment.cmake"),
            vcpkg_dir,
            installed,
            scripts,
            root,
            cmake_exe: OnceLock::new(),
            git_exe: OnceLock::new(),
            nuget_exe: OnceLock::new(),
            toolsets: OnceLock::new(),
            toolsets_v140_override: OnceLock::new(),
        })
    }

    pub fn get_filesystem(&self) -> &'static dyn Filesystem {
        real_filesystem()
    }

    /// Staging directory a build populates for this spec.
    pub fn package_dir(&self, spec: &PackageSpec) -> PathBuf {
        self.packages.join(spec.dir())
    }

    pub fn port_dir(&self, name: &str) -> PathBuf {
        self.ports.join(name)
    }

    pub fn build_info_file_path(&self, spec: &PackageSpec) -> PathBuf {
        self.package_dir(spec).join("BUILD_INFO")
    }

    pub fn listfile_path(&self, pgh: &BinaryParagraph) -> PathBuf {
        self.vcpkg_dir_info.join(format!("{}.list", pgh.fullstem()))
    }

    pub fn triplet_file_path(&self, triplet: &Triplet) -> PathBuf {
        self.triplets.join(format!("{}.cmake", triplet.canonical_name()))
    }

    /// A triplet is valid iff a definition file for it exists.
    pub fn is_valid_triplet(&self, fs: &dyn Filesystem, triplet: &Triplet) -> bool {
        fs.exists(&self.triplet_file_path(triplet))
    }

    pub fn get_cmake_exe(&self) -> Result<&Path> {
        if let Some(path) = self.cmake_exe.get() {
            return Ok(path);
        }
        let found = toolchain::find_cmake(self)?;
        Ok(self.cmake_exe.get_or_init(|| found))
    }

    pub fn get_git_exe(&self) -> Result<&Path> {
        if let Some(path) = self.git_exe.get() {
            return Ok(path);
        }
        let found = toolchain::find_git(self)?;
        Ok(self.git_exe.get_or_init(|| found))
    }

    pub fn get_nuget_exe(&self) -> Result<&Path> {
        if let Some(path) = self.nuget_exe.get() {
            return Ok(path);
        }
        let found = toolchain::find_nuget(self)?;
        Ok(self.nuget_exe.get_or_init(|| found))
    }

    /// Select the compiler toolset for a triplet's `platform_toolset` and
    /// optional Visual Studio path hints.
    pub fn get_toolset(
        &self,
        version_hint: Option<&str>,
        vs_root_hint: Option<&Path>,
    ) -> Result<&Toolset> {
        let toolsets = match self.toolsets.get() {
            Some(t) => t,
            None => {
                let found = toolchain::find_toolset_instances(self)?;
                self.toolsets.get_or_init(|| found)
            }
        };
        let overrides = match self.toolsets_v140_override.get() {
            Some(t) => t,
            None => {
                let created = toolchain::create_v140_override_toolsets(toolsets);
                self.toolsets_v140_override.get_or_init(|| created)
            }
        };
        toolchain::select_toolset(toolsets, overrides, version_hint, vs_root_hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::RealFilesystem;
    use tempfile::TempDir;

    #[test]
    fn test_layout_derivation() {
        let temp = TempDir::new().unwrap();
        let paths = CaravelPaths::create(temp.path()).unwrap();

        assert_eq!(paths.vcpkg_dir_status_file, paths.installed.join("vcpkg/status"));
        assert_eq!(paths.vcpkg_dir_updates, paths.installed.join("vcpkg/updates"));
        assert_eq!(paths.ports_cmake, paths.scripts.join("ports.cmake"));

        let spec = PackageSpec::from_name_and_triplet(
            "zlib",
            Triplet::from_canonical_name("x64-windows"),
        )
        .unwrap();
        assert_eq!(paths.package_dir(&spec), paths.packages.join("zlib_x64-windows"));
        assert!(paths.build_info_file_path(&spec).ends_with("zlib_x64-windows/BUILD_INFO"));
    }

    #[test]
    fn test_triplet_validity_by_definition_file() {
        let temp = TempDir::new().unwrap();
        let fs = RealFilesystem;
        let paths = CaravelPaths::create(temp.path()).unwrap();
        let triplet = Triplet::from_canonical_name("x64-windows");

        assert!(!paths.is_valid_triplet(&fs, &triplet));
        fs.write_contents(&paths.triplets.join("x64-windows.cmake"), "").unwrap();
        assert!(paths.is_valid_triplet(&fs, &triplet));
    }
}
