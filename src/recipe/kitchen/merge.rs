// src/recipe/kitchen/merge.rs

//! Multi-architecture merge
//!
//! Combines per-architecture libraries into one universal library with
//! `lipo -create`, then checks that nothing was lost.

use super::target::BuildArtifact;
use crate::error::{Error, Result};
use crate::linkage;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::info;

/// Merge normalized artifacts into one
///
/// A single artifact is returned unchanged. Headers and the `.pc` file of
/// the merged artifact come from the first input.
pub fn merge(mut artifacts: Vec<BuildArtifact>, out_dir: &Path, lipo: &Path) -> Result<BuildArtifact> {
    match artifacts.len() {
        0 => return Err(Error::Merge("no artifacts to merge".to_string())),
        1 => return Ok(artifacts.remove(0)),
        _ => {}
    }

    for artifact in &artifacts {
        if !artifact.library.is_file() {
            return Err(Error::Merge(format!(
                "missing input {} for {}",
                artifact.library.display(),
                artifact.describe_targets()
            )));
        }
    }

    let first = &artifacts[0];
    let filename = first
        .library
        .file_name()
        .ok_or_else(|| Error::Merge(format!("bad library path {}", first.library.display())))?;
    let lib_dir = out_dir.join("lib");
    fs::create_dir_all(&lib_dir)?;
    let output = lib_dir.join(filename);

    let mut cmd = Command::new(lipo);
    cmd.arg("-create");
    for artifact in &artifacts {
        cmd.arg(&artifact.library);
    }
    cmd.arg("-output").arg(&output);

    let result = cmd
        .output()
        .map_err(|e| format!("cannot run {}: {}", lipo.display(), e))
        .and_then(|out| {
            if out.status.success() {
                Ok(())
            } else {
                Err(format!(
                    "lipo exited with {:?}\n{}",
                    out.status.code(),
                    String::from_utf8_lossy(&out.stderr)
                ))
            }
        })
        .and_then(|()| verify_union(&artifacts, &output));

    if let Err(reason) = result {
        let _ = fs::remove_file(&output);
        return Err(Error::Merge(reason));
    }

    info!(
        "Merged {} into {}",
        artifacts
            .iter()
            .map(BuildArtifact::describe_targets)
            .collect::<Vec<_>>()
            .join(" + "),
        output.display()
    );

    let targets = artifacts.iter().flat_map(|a| a.targets.iter().copied()).collect();
    let first = artifacts.swap_remove(0);
    Ok(BuildArtifact {
        targets,
        library: output,
        ..first
    })
}

/// The merged library must contain exactly the inputs' architectures
fn verify_union(artifacts: &[BuildArtifact], output: &Path) -> std::result::Result<(), String> {
    let mut expected = BTreeSet::new();
    for artifact in artifacts {
        let arches = linkage::architectures(&artifact.library).map_err(|e| e.to_string())?;
        expected.extend(arches);
    }
    let actual = linkage::architectures(output).map_err(|e| e.to_string())?;
    if actual != expected {
        return Err(format!(
            "merged library has architectures {:?}, expected {:?}",
            actual, expected
        ));
    }
    Ok(())
}
