// src/commands/inspect.rs

//! Inspect and check commands - linkage metadata and package smoke tests

use anyhow::{Context, Result, bail};
use larder::linkage::{self, LinkagePolicy};
use larder::smoke::{SmokeOptions, check_package};
use std::path::{Path, PathBuf};

/// Show a binary's linkage metadata
pub fn cmd_inspect(binary: &str, json: bool) -> Result<()> {
    let path = Path::new(binary);
    let report = linkage::inspect(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} ({:?})", path.display(), report.format);
    println!(
        "  id:            {}",
        report.self_id.as_deref().unwrap_or("(none)")
    );
    println!(
        "  architectures: {}",
        report.architectures.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    println!("  dependencies:");
    for dep in &report.dependencies {
        println!("    {}", dep);
    }
    println!("  search paths:");
    for path in &report.search_paths {
        println!("    {}", path);
    }

    let violations = LinkagePolicy::default().check(&report);
    if violations.is_empty() {
        println!("[OK] Relocatable");
    } else {
        for violation in &violations {
            println!("[FAIL] {}", violation);
        }
    }
    Ok(())
}

/// Smoke-test a package directory
pub fn cmd_check(
    package_dir: &str,
    cc: &str,
    symbol: Option<String>,
    lib_paths: &[String],
    no_run: bool,
) -> Result<()> {
    let package_dir = Path::new(package_dir);
    let options = SmokeOptions {
        cc: PathBuf::from(cc),
        symbol,
        library_paths: lib_paths.iter().map(PathBuf::from).collect(),
        run_consumer: !no_run,
    };

    let report = check_package(package_dir, &options)
        .with_context(|| format!("Smoke test failed for {}", package_dir.display()))?;

    println!("Checked {}", report.library.display());
    if report.consumer_ran {
        println!("[OK] Consumer linked and ran");
    }
    for dep in &report.linkage.dependencies {
        println!("  depends on {}", dep);
    }

    if !report.passed() {
        for violation in &report.violations {
            println!("[FAIL] {}", violation);
        }
        bail!(
            "{} has {} linkage violation(s)",
            report.library.display(),
            report.violations.len()
        );
    }

    println!("[OK] Only system and loader-relative references");
    Ok(())
}
