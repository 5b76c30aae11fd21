// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen

use super::plate::{PackageArtifact, PackageInfo};
use crate::error::{Error, Result};
use crate::platform::BuildTarget;
use std::path::{Path, PathBuf};

/// External tools the pipeline calls
///
/// Each entry is a program name looked up on `PATH` or an explicit path.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub make: PathBuf,
    pub meson: PathBuf,
    pub install_name_tool: PathBuf,
    pub patchelf: PathBuf,
    pub lipo: PathBuf,
    pub shell: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            make: PathBuf::from("make"),
            meson: PathBuf::from("meson"),
            install_name_tool: PathBuf::from("install_name_tool"),
            patchelf: PathBuf::from("patchelf"),
            lipo: PathBuf::from("lipo"),
            shell: PathBuf::from("sh"),
        }
    }
}

impl ToolPaths {
    /// Resolve a tool to an executable path, failing early if it is missing
    pub fn resolve(tool: &Path) -> Result<PathBuf> {
        which::which(tool).map_err(|_| Error::ToolNotFound(tool.display().to_string()))
    }
}

/// Configuration for the Kitchen
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Directory for downloaded, verified sources
    pub source_cache: PathBuf,
    /// Where dependency packages live, as `<root>/<name>/<version>`
    pub dependency_root: PathBuf,
    /// Root the published `.pc` prefix is computed against
    ///
    /// The prefix becomes `<root>/<name>/<version>`. Defaults to the output
    /// directory, so the prefix is the package directory itself.
    pub package_prefix: Option<PathBuf>,
    /// Parent for the per-run work directory (system temp if unset)
    pub work_root: Option<PathBuf>,
    /// Number of parallel jobs passed to the build system
    pub jobs: u32,
    /// Build independent targets concurrently
    pub parallel_targets: bool,
    /// Keep the work directory after completion (for debugging)
    pub keep_builddir: bool,
    /// Write the build log here when the run ends, successful or not
    pub log_file: Option<PathBuf>,
    pub tools: ToolPaths,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);
        let cache = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("larder");

        Self {
            source_cache: cache.join("sources"),
            dependency_root: cache.join("packages"),
            package_prefix: None,
            work_root: None,
            jobs,
            parallel_targets: true,
            keep_builddir: false,
            log_file: None,
            tools: ToolPaths::default(),
        }
    }
}

/// Result of cooking a recipe
#[derive(Debug)]
pub struct CookResult {
    pub artifact: PackageArtifact,
    pub info: PackageInfo,
    /// Targets that were built and merged into the artifact
    pub targets: Vec<BuildTarget>,
    /// Build log
    pub log: String,
    /// Warnings generated during the build
    pub warnings: Vec<String>,
    /// Kept work directory, when `keep_builddir` is set
    pub work_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kitchen_config_default() {
        let config = KitchenConfig::default();
        assert!(config.jobs > 0);
        assert!(config.parallel_targets);
        assert!(!config.keep_builddir);
        assert!(config.package_prefix.is_none());
        assert!(config.log_file.is_none());
        assert!(config.source_cache.ends_with("larder/sources"));
    }

    #[test]
    fn test_resolve_missing_tool() {
        let err = ToolPaths::resolve(Path::new("definitely-not-a-real-tool-xyz")).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }
}
