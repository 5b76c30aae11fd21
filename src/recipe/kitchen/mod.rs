// src/recipe/kitchen/mod.rs

//! Kitchen: turns a recipe into a relocatable binary package
//!
//! The Kitchen handles:
//! - Fetching and verifying source archives (cached by checksum)
//! - Extracting and patching sources
//! - Building each target through a build system adapter
//! - Normalizing library names and linkage metadata
//! - Merging architectures and plating the package directory

pub mod adapter;
mod archive;
mod config;
mod cook;
pub mod merge;
pub mod plate;
pub mod target;

pub use config::{CookResult, KitchenConfig, ToolPaths};
pub use cook::Cook;
pub use plate::{PackageArtifact, PackageInfo};

use crate::error::{Error, Result, Stage};
use crate::hash::Checksum;
use crate::platform::{BuildTarget, IdRewriter, Os, PlatformProfile};
use crate::recipe::format::{BuildSystemKind, Recipe};
use crate::recipe::parser::validate_recipe;
use archive::{fetch_to, is_remote};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
}

impl Kitchen {
    /// Create a new Kitchen with the given configuration
    pub fn new(config: KitchenConfig) -> Self {
        Self { config }
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Self {
        Self::new(KitchenConfig::default())
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Cook a recipe for a platform and publish the package under
    /// `output_dir`
    ///
    /// This is the main entry point for building from source.
    ///
    /// ## Cooking Process
    /// 1. **Resolve**: Check the platform, plan targets, check tools (no network)
    /// 2. **Prep**: Fetch and verify the source archive
    /// 3. **Unpack**: Extract sources and apply patches
    /// 4. **Simmer**: Configure, build and normalize each target
    /// 5. **Merge**: Combine architectures into one library
    /// 6. **Plate**: Lay out the package directory
    ///
    /// Any failure is reported as `Error::Failed` naming the stage.
    pub fn cook(&self, recipe: &Recipe, platform: &str, output_dir: &Path) -> Result<CookResult> {
        info!(
            "Cooking {} version {} for {}",
            recipe.package.name,
            recipe.package_version(),
            platform
        );

        let warnings = validate_recipe(recipe).map_err(|e| e.at(Stage::Init))?;
        for warning in &warnings {
            warn!("{}", warning);
        }

        let (profile, targets) = self
            .resolve_platform(recipe, platform)
            .map_err(|e| e.at(Stage::Init))?;

        let package_root = plate::package_dir(output_dir, recipe);
        if package_root.exists() {
            return Err(Error::AlreadyExists(package_root.display().to_string()).at(Stage::Init));
        }

        self.check_tools(recipe, &profile, targets.len())
            .map_err(|e| e.at(Stage::Init))?;

        let prefix_root = self.config.package_prefix.as_deref().unwrap_or(output_dir);
        let final_prefix = plate::package_dir(prefix_root, recipe);
        let mut cook = Cook::new(self, recipe, profile, &targets, &final_prefix)
            .map_err(|e| e.at(Stage::Init))?;
        cook.warnings.extend(warnings);

        let (artifact, info) = match Self::run_phases(&mut cook, recipe, &targets, &package_root) {
            Ok(done) => done,
            Err(e) => {
                debug!("Run stopped after the {} stage", cook.state());
                cook.record_failure(&e);
                return Err(e);
            }
        };
        info!("Cooked {} {} at {}", info.name, info.version, artifact.root.display());

        Ok(cook.finish(artifact, info, targets))
    }

    /// Phases 1-5 of a cook, from fetch to the published package
    fn run_phases(
        cook: &mut Cook<'_>,
        recipe: &Recipe,
        targets: &[BuildTarget],
        package_root: &Path,
    ) -> Result<(PackageArtifact, PackageInfo)> {
        // Phase 1: Prep - fetch ingredients
        info!("Prep: fetching source...");
        let archive = cook.prep().map_err(|e| e.at(Stage::Fetched))?;

        // Phase 2: Unpack and patch
        info!("Unpacking and patching sources...");
        cook.unpack(&archive).map_err(|e| e.at(Stage::Fetched))?;

        // Phase 3: Simmer - build every target
        info!(
            "Simmering: building {} target(s): {}",
            targets.len(),
            targets
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        let artifacts = cook.simmer()?;

        // Phase 4: Merge architectures
        let merged = cook.merge(artifacts)?;

        // Phase 5: Plate - assemble the package
        info!("Plating: assembling package...");
        let artifact = cook.plate(&merged, package_root)?;

        let info = PackageInfo::from_recipe(recipe).map_err(|e| e.at(Stage::Published))?;
        Ok((artifact, info))
    }

    /// Resolve a platform name against a recipe
    ///
    /// Fails with `UnsupportedPlatform` for an unknown OS, an OS the recipe
    /// does not list, or an OS with no declared upstream library. Never
    /// touches the network or a compiler.
    pub fn resolve_platform(
        &self,
        recipe: &Recipe,
        platform: &str,
    ) -> Result<(PlatformProfile, Vec<BuildTarget>)> {
        let os: Os = platform.parse()?;
        if !recipe.supports(os) {
            return Err(Error::UnsupportedPlatform(format!(
                "{} (recipe {} supports: {})",
                os,
                recipe.package.name,
                recipe.package.platforms.join(", ")
            )));
        }
        if recipe.upstream_library(os).is_none() {
            return Err(Error::UnsupportedPlatform(format!(
                "{} (recipe {} declares no upstream library for it)",
                os, recipe.package.name
            )));
        }

        let profile = PlatformProfile::for_os(os);
        let targets = profile.targets(recipe.build.universal)?;
        Ok((profile, targets))
    }

    /// Make sure every external tool the run will need can be found
    fn check_tools(&self, recipe: &Recipe, profile: &PlatformProfile, targets: usize) -> Result<()> {
        let tools = &self.config.tools;
        let mut needed = vec![&tools.shell];
        match recipe.build.system {
            BuildSystemKind::Autotools => needed.push(&tools.make),
            BuildSystemKind::Meson => needed.push(&tools.meson),
            BuildSystemKind::Script => {}
        }
        needed.push(match profile.id_rewriter {
            IdRewriter::InstallNameTool => &tools.install_name_tool,
            IdRewriter::Patchelf => &tools.patchelf,
        });
        if targets > 1 {
            needed.push(&tools.lipo);
        }

        for tool in needed {
            let found = ToolPaths::resolve(tool)?;
            debug!("Using {}", found.display());
        }
        Ok(())
    }

    /// Fetch sources for a recipe without building
    ///
    /// Downloads and verifies the source archive into the cache and checks
    /// that every patch file is present. Useful for:
    /// - Pre-fetching sources for offline builds
    /// - Verifying source availability before building
    ///
    /// # Returns
    /// The cached archive followed by the patch files.
    pub fn fetch(&self, recipe: &Recipe) -> Result<Vec<PathBuf>> {
        info!(
            "Fetching sources for {} version {}",
            recipe.package.name, recipe.package.version
        );

        let checksum = Checksum::parse(&recipe.source.checksum)
            .map_err(|e| Error::Parse(format!("Invalid checksum: {}", e)))?;
        let mut fetched = vec![self.fetch_source(&self.source_location(recipe), &checksum)?];

        for patch in &recipe.patches {
            let path = recipe.resolve_path(&patch.file);
            if !path.is_file() {
                return Err(Error::Patch {
                    patch: patch.file.clone(),
                    reason: format!("patch file not found at {}", path.display()),
                });
            }
            fetched.push(path);
        }

        info!(
            "Fetched {} source file(s) for {}",
            fetched.len(),
            recipe.package.name
        );

        Ok(fetched)
    }

    /// Check if the source archive for a recipe is already cached
    ///
    /// Returns `true` if the build can proceed without network access.
    pub fn sources_cached(&self, recipe: &Recipe) -> bool {
        Checksum::parse(&recipe.source.checksum)
            .map(|c| self.config.source_cache.join(c.cache_key()).is_file())
            .unwrap_or(false)
    }

    /// Metadata a downstream recipe consumes
    pub fn package_info(&self, recipe: &Recipe) -> Result<PackageInfo> {
        PackageInfo::from_recipe(recipe)
    }

    /// Where to fetch a recipe's archive from
    ///
    /// Relative local paths resolve against the recipe's directory.
    pub(crate) fn source_location(&self, recipe: &Recipe) -> String {
        let url = recipe.archive_url();
        if is_remote(&url) || url.starts_with("file://") {
            url
        } else {
            recipe.resolve_path(&url).display().to_string()
        }
    }

    /// Fetch a source archive (with caching)
    ///
    /// The content hash is checked before the file enters the cache, so a
    /// mismatching download never reaches extraction.
    pub(crate) fn fetch_source(&self, location: &str, checksum: &Checksum) -> Result<PathBuf> {
        // Create cache directory if needed
        fs::create_dir_all(&self.config.source_cache)?;

        // Use checksum as cache key
        let cache_key = checksum.cache_key();
        let cached_path = self.config.source_cache.join(&cache_key);

        // Check if already cached
        if cached_path.exists() {
            debug!("Using cached source: {}", cached_path.display());
            let (matches, _) = checksum.verify_file(&cached_path)?;
            if matches {
                return Ok(cached_path);
            }
            warn!("Cached file checksum mismatch, re-fetching");
            fs::remove_file(&cached_path)?;
        }

        info!("Fetching: {}", location);
        let temp_path = self.config.source_cache.join(format!("{}.tmp", cache_key));
        if let Err(e) = fetch_to(location, &temp_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        let (matches, actual) = checksum.verify_file(&temp_path)?;
        if !matches {
            fs::remove_file(&temp_path)?;
            return Err(Error::Integrity {
                url: location.to_string(),
                expected: checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        // Move to final location
        fs::rename(&temp_path, &cached_path)?;
        Ok(cached_path)
    }
}
