// src/recipe/kitchen/cook.rs

//! Cook: the actual build execution for a single recipe

use crate::error::{Error, Result, Stage};
use crate::hash::Checksum;
use crate::platform::{BuildTarget, PlatformProfile};
use crate::recipe::format::{BuildSection, Recipe};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::Kitchen;
use super::adapter::{BuildSystemAdapter, adapter_for};
use super::archive::{apply_patch, extract_archive};
use super::config::CookResult;
use super::merge::merge;
use super::plate::{PackageArtifact, PackageInfo, assemble};
use super::target::{BuildArtifact, TargetPlan, build_target, normalize, substituted_build};

/// A single cook operation
pub struct Cook<'a> {
    pub(super) kitchen: &'a Kitchen,
    pub(super) recipe: &'a Recipe,
    profile: PlatformProfile,
    plans: Vec<TargetPlan>,
    /// Prefix written into the published `.pc` file
    final_prefix: String,
    /// Per-run work directory
    work_dir: TempDir,
    /// Patched source tree, once unpacked
    source_dir: PathBuf,
    /// Upstream license, renamed to `<name>.txt`
    license: Option<PathBuf>,
    state: Stage,
    /// Build log accumulator
    pub(super) log: String,
    /// Warnings
    pub(super) warnings: Vec<String>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(
        kitchen: &'a Kitchen,
        recipe: &'a Recipe,
        profile: PlatformProfile,
        targets: &[BuildTarget],
        final_prefix: &Path,
    ) -> Result<Self> {
        let config = &kitchen.config;
        let work_dir = match &config.work_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix("larder-").tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix("larder-").tempdir()?,
        };
        debug!("Work directory: {}", work_dir.path().display());

        let plans = targets
            .iter()
            .map(|target| TargetPlan::new(*target, recipe, &profile, config, work_dir.path()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            kitchen,
            recipe,
            profile,
            plans,
            final_prefix: final_prefix.display().to_string(),
            source_dir: work_dir.path().join("source"),
            work_dir,
            license: None,
            state: Stage::Init,
            log: String::new(),
            warnings: Vec::new(),
        })
    }

    /// Phase 1: Prep - fetch the verified source archive into the work dir
    pub(super) fn prep(&mut self) -> Result<PathBuf> {
        let checksum = Checksum::parse(&self.recipe.source.checksum)
            .map_err(|e| Error::Parse(format!("Invalid checksum: {}", e)))?;
        let location = self.kitchen.source_location(self.recipe);
        let cached = self.kitchen.fetch_source(&location, &checksum)?;

        let local_archive = self.work_dir.path().join(self.recipe.archive_filename());
        fs::copy(&cached, &local_archive)?;

        self.log_line(&format!("Fetched source: {} ({})", location, checksum));
        self.state = Stage::Fetched;
        Ok(local_archive)
    }

    /// Phase 2: Unpack and patch
    ///
    /// Everything happens in a staging directory that only becomes the
    /// source tree once every patch has applied.
    pub(super) fn unpack(&mut self, archive: &Path) -> Result<()> {
        let staging = self.work_dir.path().join("source.staging");
        let unpacked = self.unpack_into(archive, &staging);
        if unpacked.is_err() {
            let _ = fs::remove_dir_all(&staging);
        }
        let (relative, license) = unpacked?;

        let source_root = self.work_dir.path().join("source");
        fs::rename(&staging, &source_root)?;
        self.source_dir = source_root.join(&relative);
        self.license = license.map(|l| source_root.join(l));
        debug!("Source directory: {}", self.source_dir.display());

        self.state = Stage::Patched;
        Ok(())
    }

    /// Returns the source directory and renamed license file, both relative
    /// to `staging`
    fn unpack_into(
        &mut self,
        archive: &Path,
        staging: &Path,
    ) -> Result<(PathBuf, Option<PathBuf>)> {
        let recipe = self.recipe;
        extract_archive(archive, staging)?;
        fs::remove_file(archive)?;
        self.log_line(&format!("Extracted {}", archive.display()));

        let relative = match &recipe.source.extract_dir {
            Some(dir) => {
                let dir = PathBuf::from(recipe.substitute(dir));
                if !staging.join(&dir).is_dir() {
                    return Err(Error::Parse(format!(
                        "extract_dir {} not found in archive",
                        dir.display()
                    )));
                }
                dir
            }
            None => single_top_dir(staging)?.unwrap_or_default(),
        };
        let root = staging.join(&relative);

        for patch in &recipe.patches {
            let path = recipe.resolve_path(&patch.file);
            if !path.is_file() {
                return Err(Error::Patch {
                    patch: patch.file.clone(),
                    reason: format!("patch file not found at {}", path.display()),
                }
                .at(Stage::Patched));
            }
            info!("Applying patch: {}", patch.file);
            let files = apply_patch(&root, &path, patch.strip).map_err(|e| e.at(Stage::Patched))?;
            self.log_line(&format!("Applied patch: {} ({} files)", patch.file, files));
        }

        let license_file = &recipe.source.license_file;
        let license = if root.join(license_file).is_file() {
            let renamed = format!("{}.txt", recipe.package.name);
            fs::rename(root.join(license_file), root.join(&renamed))?;
            Some(relative.join(renamed))
        } else {
            let warning = format!("License file {} not found in source", license_file);
            warn!("{}", warning);
            self.warnings.push(warning);
            None
        };

        Ok((relative, license))
    }

    /// Phase 3: Simmer - configure, build and normalize every target
    ///
    /// Targets run on the rayon pool when parallel builds are enabled. Each
    /// keeps its own log, appended in target order afterwards.
    pub(super) fn simmer(&mut self) -> Result<Vec<BuildArtifact>> {
        let adapter = adapter_for(self.recipe.build.system);
        let build = substituted_build(self.recipe);

        let outcomes: Vec<(Result<BuildArtifact>, String)> = {
            let this = &*self;
            let run = |plan: &TargetPlan| {
                let mut log = String::new();
                let result = this.cook_target(plan, adapter.as_ref(), &build, &mut log);
                (result, log)
            };
            if this.kitchen.config.parallel_targets && this.plans.len() > 1 {
                this.plans.par_iter().map(run).collect()
            } else {
                this.plans.iter().map(run).collect()
            }
        };

        let mut artifacts = Vec::with_capacity(outcomes.len());
        let mut failure = None;
        for (result, log) in outcomes {
            self.log.push_str(&log);
            match result {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(e) => warn!("Additional target failure: {}", e),
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        self.state = Stage::Normalized;
        Ok(artifacts)
    }

    fn cook_target(
        &self,
        plan: &TargetPlan,
        adapter: &dyn BuildSystemAdapter,
        build: &BuildSection,
        log: &mut String,
    ) -> Result<BuildArtifact> {
        let config = &self.kitchen.config;
        let artifact = build_target(plan, adapter, &self.source_dir, self.recipe, build, config, log)
            .map_err(|e| e.at(Stage::Configured))?;
        normalize(
            artifact,
            self.recipe,
            &self.profile,
            &config.tools,
            &self.final_prefix,
        )
        .map_err(|e| e.at(Stage::Normalized))
    }

    /// Phase 4: Merge per-architecture libraries
    pub(super) fn merge(&mut self, artifacts: Vec<BuildArtifact>) -> Result<BuildArtifact> {
        let count = artifacts.len();
        let merged = merge(
            artifacts,
            &self.work_dir.path().join("universal"),
            &self.kitchen.config.tools.lipo,
        )
        .map_err(|e| e.at(Stage::Merged))?;
        if count > 1 {
            self.log_line(&format!("Merged {} into {}", merged.describe_targets(), merged.library.display()));
        }
        self.state = Stage::Merged;
        Ok(merged)
    }

    /// Phase 5: Plate - lay out the package directory
    pub(super) fn plate(&mut self, merged: &BuildArtifact, package_root: &Path) -> Result<PackageArtifact> {
        let package = assemble(merged, self.recipe, self.license.as_deref(), package_root)
            .map_err(|e| e.at(Stage::Assembled))?;
        self.log_line(&format!("Assembled package: {}", package.root.display()));
        self.state = Stage::Assembled;
        Ok(package)
    }

    /// Finish the run, handing back the log and kept work directory
    pub(super) fn finish(
        mut self,
        artifact: PackageArtifact,
        info: PackageInfo,
        targets: Vec<BuildTarget>,
    ) -> CookResult {
        self.state = Stage::Published;
        self.write_log();
        let work_dir = if self.kitchen.config.keep_builddir {
            let kept = self.work_dir.keep();
            info!("Keeping work directory {}", kept.display());
            Some(kept)
        } else {
            None
        };
        CookResult {
            artifact,
            info,
            targets,
            log: self.log,
            warnings: self.warnings,
            work_dir,
        }
    }

    /// Last stage the run completed
    pub fn state(&self) -> Stage {
        self.state
    }

    /// Record a failure in the build log and write the log out if configured
    pub(super) fn record_failure(&mut self, err: &Error) {
        self.log_line(&format!("=== failed after {} stage ===", self.state));
        self.log_line(&err.to_string());
        self.write_log();
    }

    /// Write the accumulated log to `KitchenConfig::log_file`
    ///
    /// A write failure is only logged; it never masks the run's outcome.
    pub(super) fn write_log(&self) {
        if let Some(path) = &self.kitchen.config.log_file
            && let Err(e) = fs::write(path, &self.log)
        {
            warn!("Failed to write build log {}: {}", path.display(), e);
        }
    }

    fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }
}

/// The archive's single top-level directory, if it has exactly one
fn single_top_dir(dir: &Path) -> Result<Option<PathBuf>> {
    let entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    if entries.len() == 1 && entries[0].file_type().map(|t| t.is_dir()).unwrap_or(false) {
        return Ok(Some(PathBuf::from(entries[0].file_name())));
    }
    Ok(None)
}
