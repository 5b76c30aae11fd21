// src/commands/cook.rs

//! Cook command - build packages from recipes

use anyhow::{Context, Result};
use larder::recipe::{Kitchen, KitchenConfig, parse_recipe_file, validate_recipe};
use larder::{Error, Os};
use std::path::{Path, PathBuf};
use tracing::info;

/// Build a KitchenConfig from defaults and command-line overrides
pub fn kitchen_config(
    source_cache: Option<&str>,
    deps_root: Option<&str>,
    package_prefix: Option<&str>,
) -> KitchenConfig {
    let mut config = KitchenConfig::default();
    if let Some(dir) = source_cache {
        config.source_cache = PathBuf::from(dir);
    }
    if let Some(dir) = deps_root {
        config.dependency_root = PathBuf::from(dir);
    }
    config.package_prefix = package_prefix.map(PathBuf::from);
    config
}

/// Cook a package from a recipe
///
/// # Arguments
/// * `recipe_path` - Path to the recipe file
/// * `output_dir` - Output directory for the package tree
/// * `config` - Kitchen configuration (cache, dependency root, prefix)
/// * `os` - Target OS name (None = host)
/// * `jobs` - Number of parallel build jobs (None = auto)
/// * `keep_builddir` - Keep the work directory after completion
/// * `serial` - Build targets sequentially
/// * `fetch_only` - Only fetch sources, don't build
/// * `validate_only` - Only validate the recipe, don't cook
/// * `log_file` - Where to write the build log, also on failure
#[allow(clippy::too_many_arguments)]
pub fn cmd_cook(
    recipe_path: &str,
    output_dir: &str,
    mut config: KitchenConfig,
    os: Option<&str>,
    jobs: Option<u32>,
    keep_builddir: bool,
    serial: bool,
    fetch_only: bool,
    validate_only: bool,
    log_file: Option<&str>,
) -> Result<()> {
    let recipe_path = Path::new(recipe_path);
    let output_dir = Path::new(output_dir);

    // Parse the recipe
    println!("Reading recipe: {}", recipe_path.display());
    let recipe = parse_recipe_file(recipe_path)
        .with_context(|| format!("Failed to parse recipe: {}", recipe_path.display()))?;

    println!(
        "Recipe: {} version {}",
        recipe.package.name,
        recipe.package_version()
    );

    // Validate the recipe
    let warnings = validate_recipe(&recipe).with_context(|| "Recipe validation failed")?;

    for warning in &warnings {
        println!("Warning: {}", warning);
    }

    if validate_only {
        println!("Recipe validation passed");
        if warnings.is_empty() {
            println!("[OK] No issues found");
        } else {
            println!("[OK] {} warning(s)", warnings.len());
        }
        return Ok(());
    }

    config.keep_builddir = keep_builddir;
    config.log_file = log_file.map(PathBuf::from);
    config.parallel_targets = !serial;
    if let Some(j) = jobs {
        config.jobs = j;
    }

    let kitchen = Kitchen::new(config.clone());

    // Fetch-only mode: just download sources and exit
    if fetch_only {
        return report_fetch(&kitchen, &recipe);
    }

    let platform = match os {
        Some(os) => os.to_string(),
        None => Os::current()?.to_string(),
    };

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    println!("Cooking for {} with {} parallel jobs...", platform, config.jobs);
    if kitchen.sources_cached(&recipe) {
        println!("  - Sources already cached (offline build possible)");
    }

    let result = kitchen
        .cook(&recipe, &platform, output_dir)
        .map_err(|e| describe_failure(&recipe.package.name, e))?;

    println!("\n[COMPLETE] Cooked: {}", result.artifact.root.display());
    println!("  library:  {}", result.artifact.library.display());
    println!("  pkg-config: {}", result.artifact.pkgconfig.display());
    println!(
        "  targets:  {}",
        result
            .targets
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Some(path) = log_file {
        println!("  log:      {}", path);
    }
    if let Some(dir) = &result.work_dir {
        println!("  work dir: {}", dir.display());
    }

    if !result.warnings.is_empty() {
        println!("\nBuild warnings:");
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }

    info!(
        "Successfully cooked {} to {}",
        recipe.package.name,
        result.artifact.root.display()
    );

    Ok(())
}

/// Fetch a recipe's sources into the cache
pub fn cmd_fetch(recipe_path: &str, config: KitchenConfig) -> Result<()> {
    let recipe_path = Path::new(recipe_path);
    let recipe = parse_recipe_file(recipe_path)
        .with_context(|| format!("Failed to parse recipe: {}", recipe_path.display()))?;
    report_fetch(&Kitchen::new(config), &recipe)
}

fn report_fetch(kitchen: &Kitchen, recipe: &larder::Recipe) -> Result<()> {
    println!("Fetching sources (fetch-only mode)...");
    let sources = kitchen
        .fetch(recipe)
        .with_context(|| format!("Failed to fetch sources for {}", recipe.package.name))?;

    println!("\n[COMPLETE] Fetched {} source file(s):", sources.len());
    for source in &sources {
        println!("  - {}", source.display());
    }

    if kitchen.sources_cached(recipe) {
        println!("\n[OK] All sources are cached. Ready for offline build.");
    }

    Ok(())
}

/// Turn a pipeline error into a message naming the failed stage
fn describe_failure(name: &str, err: Error) -> anyhow::Error {
    let stage = err
        .stage()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "init".to_string());
    anyhow::Error::new(err).context(format!("Failed to cook {} ({} stage)", name, stage))
}
