// src/commands/info.rs

//! Info command - print published package metadata

use anyhow::{Context, Result};
use larder::recipe::{Kitchen, parse_recipe_file};
use std::path::Path;

/// Print the metadata downstream recipes consume, as JSON
pub fn cmd_info(recipe_path: &str) -> Result<()> {
    let recipe_path = Path::new(recipe_path);
    let recipe = parse_recipe_file(recipe_path)
        .with_context(|| format!("Failed to parse recipe: {}", recipe_path.display()))?;

    let info = Kitchen::with_defaults().package_info(&recipe)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
