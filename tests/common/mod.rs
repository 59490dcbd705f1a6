// tests/common/mod.rs

//! Shared test scaffolding: builds a throwaway root directory with ports,
//! triplet files, and stub cmake/git tools so plans can be driven end to
//! end without a real toolchain.
//!
//! The stub cmake answers the version probe, the triplet-environment
//! probe, and `CMD=BUILD` invocations (by staging a tiny package). A port
//! named `brokenport` always fails its build, which keep-going tests rely
//! on.

use caravel::{database_load_check, CaravelPaths, FullPackageSpec, StatusDatabase, Triplet};
use std::path::Path;
use tempfile::TempDir;

pub const TEST_TRIPLET: &str = "x64-linux";

pub struct TestRoot {
    // Held for its Drop; the paths inside point into it.
    _temp: TempDir,
    pub paths: CaravelPaths,
}

impl TestRoot {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        write(&root.join("triplets").join(format!("{}.cmake", TEST_TRIPLET)),
            "set(VCPKG_TARGET_ARCHITECTURE x64)\nset(VCPKG_CMAKE_SYSTEM_NAME Linux)\n");
        write(&root.join("scripts/ports.cmake"), "# build driver script\n");
        write(&root.join("scripts/get_triplet_environment.cmake"), "# triplet probe script\n");

        let paths = CaravelPaths::create(root).unwrap();
        install_stub_tools(&paths.root);
        TestRoot { _temp: temp, paths }
    }

    pub fn add_port(&self, name: &str, control: &str) {
        let dir = self.paths.ports.join(name);
        write(&dir.join("CONTROL"), control);
        write(&dir.join("portfile.cmake"), "# portfile\n");
    }

    pub fn open_db(&self) -> StatusDatabase {
        database_load_check(self.paths.get_filesystem(), &self.paths.vcpkg_dir).unwrap()
    }

    pub fn request(&self, spec: &str) -> FullPackageSpec {
        FullPackageSpec::parse(spec, &Triplet::from_canonical_name(TEST_TRIPLET)).unwrap()
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

fn install_stub_tools(root: &Path) {
    let cmake = root.join("downloads/cmake-3.9.3/bin/cmake");
    let script = format!(
        r#"#!/bin/sh
ROOT="{root}"
TRIPLET_FILE=""
PORT=""
TRIPLET=""
CMD=""
for arg in "$@"; do
  case "$arg" in
    --version) echo "cmake version 99.0.0"; exit 0 ;;
    -DCMAKE_TRIPLET_FILE=*) TRIPLET_FILE="${{arg#-DCMAKE_TRIPLET_FILE=}}" ;;
    -DCMD=*) CMD="${{arg#-DCMD=}}" ;;
    -DPORT=*) PORT="${{arg#-DPORT=}}" ;;
    -DTARGET_TRIPLET=*) TRIPLET="${{arg#-DTARGET_TRIPLET=}}" ;;
  esac
done
if [ -n "$TRIPLET_FILE" ]; then
  echo "c35112b6-d1ba-415b-aa5d-81de856ef8eb"
  echo "VCPKG_TARGET_ARCHITECTURE=x64"
  echo "VCPKG_CMAKE_SYSTEM_NAME=Linux"
  echo "VCPKG_CMAKE_SYSTEM_VERSION="
  echo "VCPKG_PLATFORM_TOOLSET="
  echo "VCPKG_VISUAL_STUDIO_PATH="
  exit 0
fi
if [ "$CMD" = "BUILD" ]; then
  if [ "$PORT" = "brokenport" ]; then
    echo "CMake Error: configure step failed" >&2
    exit 1
  fi
  PKG="$ROOT/packages/${{PORT}}_${{TRIPLET}}"
  mkdir -p "$PKG/include" "$PKG/share/$PORT"
  echo "/* $PORT */" > "$PKG/include/$PORT.h"
  echo "license text" > "$PKG/share/$PORT/copyright"
  printf 'CRTLinkage: dynamic\nLibraryLinkage: dynamic\n' > "$PKG/BUILD_INFO"
  exit 0
fi
exit 0
"#,
        root = root.display()
    );
    write(&cmake, &script);
    make_executable(&cmake);

    let git = root.join("downloads/git-2.14.1/cmd/git");
    write(&git, "#!/bin/sh\necho \"git version 99.0.0\"\nexit 0\n");
    make_executable(&git);
}
