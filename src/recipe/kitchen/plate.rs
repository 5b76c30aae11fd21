// src/recipe/kitchen/plate.rs

//! Plating: lay out the final package directory
//!
//! ```text
//! <output>/<name>/<version>-<revision>/
//!   include/...          headers
//!   lib/lib<library>.<ext>
//!   <pkgconfig>.pc
//!   license/<name>.txt
//! ```

use super::target::BuildArtifact;
use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Identity and link metadata downstream recipes consume
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    pub name: String,
    /// `<source-version>-<revision>`
    pub version: String,
    /// Link names, without `-l`
    pub libs: Vec<String>,
    /// Runtime dependency references
    pub requires: Vec<String>,
}

impl PackageInfo {
    pub fn from_recipe(recipe: &Recipe) -> Result<Self> {
        Ok(Self {
            name: recipe.package.name.clone(),
            version: recipe.package_version(),
            libs: vec![recipe.library_name().to_string()],
            requires: recipe.requires()?.iter().map(ToString::to_string).collect(),
        })
    }
}

/// A published package directory
#[derive(Debug, Clone)]
pub struct PackageArtifact {
    pub root: PathBuf,
    pub library: PathBuf,
    pub pkgconfig: PathBuf,
    pub license: Option<PathBuf>,
}

/// Where a recipe's package lands under `output_dir`
pub fn package_dir(output_dir: &Path, recipe: &Recipe) -> PathBuf {
    output_dir
        .join(&recipe.package.name)
        .join(recipe.package_version())
}

/// Assemble the package directory from a merged artifact
///
/// Files are laid out in a hidden sibling directory and renamed into place
/// at the end, so a failure never leaves a half-written package behind.
pub fn assemble(
    artifact: &BuildArtifact,
    recipe: &Recipe,
    license: Option<&Path>,
    package_root: &Path,
) -> Result<PackageArtifact> {
    if package_root.exists() {
        return Err(Error::AlreadyExists(package_root.display().to_string()));
    }

    let parent = package_root
        .parent()
        .ok_or_else(|| Error::AlreadyExists(package_root.display().to_string()))?;
    fs::create_dir_all(parent)?;

    let staging = parent.join(format!(".{}.partial", recipe.package_version()));
    if staging.exists() {
        debug!("Removing stale staging directory {}", staging.display());
        fs::remove_dir_all(&staging)?;
    }

    let laid_out = lay_out(artifact, recipe, license, &staging);
    if let Err(e) = laid_out {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    fs::rename(&staging, package_root)?;

    let library_name = file_name(&artifact.library)?;
    let pkgconfig_name = file_name(&artifact.pkgconfig)?;
    let license_path = package_root
        .join("license")
        .join(format!("{}.txt", recipe.package.name));

    info!("Assembled package at {}", package_root.display());
    Ok(PackageArtifact {
        root: package_root.to_path_buf(),
        library: package_root.join("lib").join(library_name),
        pkgconfig: package_root.join(pkgconfig_name),
        license: license_path.is_file().then_some(license_path),
    })
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .ok_or_else(|| Error::Parse(format!("not a file path: {}", path.display())))
}

fn lay_out(
    artifact: &BuildArtifact,
    recipe: &Recipe,
    license: Option<&Path>,
    staging: &Path,
) -> Result<()> {
    let include = staging.join("include");
    fs::create_dir_all(&include)?;
    let mut headers = 0;
    for dir in &recipe.artifact.headers {
        let src = artifact.install_dir.join(dir);
        if !src.is_dir() {
            warn!("Header directory {} not found, skipping", src.display());
            continue;
        }
        headers += copy_headers(&src, &include)?;
    }
    debug!("Copied {} headers", headers);

    let lib = staging.join("lib");
    fs::create_dir_all(&lib)?;
    fs::copy(&artifact.library, lib.join(file_name(&artifact.library)?))?;

    fs::copy(&artifact.pkgconfig, staging.join(file_name(&artifact.pkgconfig)?))?;

    if let Some(license) = license {
        let dir = staging.join("license");
        fs::create_dir_all(&dir)?;
        fs::copy(license, dir.join(format!("{}.txt", recipe.package.name)))?;
    }

    Ok(())
}

/// Copy every `*.h` under `src` into `dest`, keeping relative paths
fn copy_headers(src: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|e| e != "h") {
            continue;
        }
        let relative = path
            .strip_prefix(src)
            .map_err(|_| Error::Parse(format!("header outside {}", src.display())))?;
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &target)?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, BuildTarget, Os};
    use crate::recipe::parser::parse_recipe;

    fn recipe() -> Recipe {
        parse_recipe(
            r#"
[package]
name = "glib"
version = "2.51.1"
revision = "3"

[source]
archive = "glib-%(version)s.tar.xz"
checksum = "1f8e40cde43ac0bcf61defb147326d038310d75d4e50f728f6becfd2a36ac0ac"

[dependencies]
requires = ["libffi/3.0.11-2@vuo/stable", "gettext/0.19.8.1-2@vuo/stable"]

[artifact]
pkgconfig = "glib-2.0.pc"
link_name = "glib-2.0"
headers = ["include/glib-2.0", "lib/glib-2.0/include"]
upstream = { macos = "libglib-2.0.0.dylib" }
"#,
        )
        .unwrap()
    }

    fn built(dir: &Path) -> BuildArtifact {
        let install = dir.join("install");
        fs::create_dir_all(install.join("include/glib-2.0/gobject")).unwrap();
        fs::create_dir_all(install.join("lib/glib-2.0/include")).unwrap();
        fs::create_dir_all(install.join("lib/pkgconfig")).unwrap();
        fs::write(install.join("include/glib-2.0/glib.h"), "").unwrap();
        fs::write(install.join("include/glib-2.0/gobject/gobject.h"), "").unwrap();
        fs::write(install.join("include/glib-2.0/README"), "").unwrap();
        fs::write(install.join("lib/glib-2.0/include/glibconfig.h"), "").unwrap();
        fs::write(install.join("lib/libglib.dylib"), "lib").unwrap();
        fs::write(install.join("lib/pkgconfig/glib-2.0.pc"), "prefix=/x\n").unwrap();
        BuildArtifact {
            targets: vec![BuildTarget::new(Os::MacOs, Arch::Arm64)],
            library: install.join("lib/libglib.dylib"),
            pkgconfig: install.join("lib/pkgconfig/glib-2.0.pc"),
            install_dir: install,
        }
    }

    #[test]
    fn test_package_info() {
        let info = PackageInfo::from_recipe(&recipe()).unwrap();
        assert_eq!(info.name, "glib");
        assert_eq!(info.version, "2.51.1-3");
        assert_eq!(info.libs, vec!["glib"]);
        assert_eq!(info.requires[0], "libffi/3.0.11-2@vuo/stable");
    }

    #[test]
    fn test_assemble_layout() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = built(dir.path());
        let license = dir.path().join("glib.txt");
        fs::write(&license, "LGPL").unwrap();

        let recipe = recipe();
        let root = package_dir(&dir.path().join("out"), &recipe);
        let package = assemble(&artifact, &recipe, Some(&license), &root).unwrap();

        assert_eq!(package.root, dir.path().join("out/glib/2.51.1-3"));
        assert!(root.join("include/glib.h").is_file());
        assert!(root.join("include/gobject/gobject.h").is_file());
        assert!(root.join("include/glibconfig.h").is_file());
        assert!(!root.join("include/README").exists());
        assert!(package.library.ends_with("lib/libglib.dylib"));
        assert!(package.pkgconfig.ends_with("glib-2.0.pc"));
        assert_eq!(fs::read_to_string(root.join("license/glib.txt")).unwrap(), "LGPL");
        assert!(!dir.path().join("out/glib/.2.51.1-3.partial").exists());
    }

    #[test]
    fn test_assemble_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = built(dir.path());
        let recipe = recipe();
        let root = package_dir(&dir.path().join("out"), &recipe);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("marker"), "keep").unwrap();

        let err = assemble(&artifact, &recipe, None, &root).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(root.join("marker").exists());
    }

    #[test]
    fn test_assemble_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = built(dir.path());
        artifact.library = dir.path().join("install/lib/missing.dylib");
        let recipe = recipe();
        let root = package_dir(&dir.path().join("out"), &recipe);

        assert!(assemble(&artifact, &recipe, None, &root).is_err());
        assert!(!root.exists());
        assert!(!dir.path().join("out/glib/.2.51.1-3.partial").exists());
    }
}
