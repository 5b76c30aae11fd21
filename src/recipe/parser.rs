// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::hash::Checksum;
use crate::platform::Os;
use crate::recipe::format::{BuildSystemKind, Recipe};
use std::path::Path;

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::Parse(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
///
/// Relative patch and archive paths resolve against the file's directory.
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)?;

    let mut recipe = parse_recipe(&content)?;
    recipe.base_dir = path.parent().map(Path::to_path_buf);
    Ok(recipe)
}

/// Validate a recipe for completeness and correctness
///
/// Returns warnings for things that will probably bite later, and an error
/// for things that make the recipe unusable.
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if recipe.package.name.is_empty() {
        return Err(Error::Parse("Recipe package name cannot be empty".to_string()));
    }
    if recipe.package.version.is_empty() {
        return Err(Error::Parse("Recipe package version cannot be empty".to_string()));
    }

    Checksum::parse(&recipe.source.checksum).map_err(|e| {
        Error::Parse(format!(
            "Invalid checksum {}: {}",
            recipe.source.checksum, e
        ))
    })?;

    recipe.requires()?;
    recipe.build_requires()?;

    for platform in &recipe.package.platforms {
        let os: Os = platform.parse()?;
        if recipe.upstream_library(os).is_none() {
            warnings.push(format!("No upstream library declared for {}", os));
        }
    }

    if recipe.build.system == BuildSystemKind::Script
        && recipe.build.configure.is_none()
        && recipe.build.make.is_none()
        && recipe.build.install.is_none()
    {
        return Err(Error::Parse(
            "Script build system needs at least one of configure, make, install".to_string(),
        ));
    }

    let build_deps = recipe.build_requires()?;
    for (what, dep) in [
        ("compiler", &recipe.build.compiler),
        ("sysroot", &recipe.build.sysroot),
    ] {
        if let Some(dep) = dep
            && !build_deps.iter().any(|r| &r.name == dep)
        {
            return Err(Error::Parse(format!(
                "{} '{}' is not listed in build_requires",
                what, dep
            )));
        }
    }

    if recipe.package.license.is_none() {
        warnings.push("Missing package license".to_string());
    }
    if recipe.package.summary.is_none() {
        warnings.push("Missing package summary".to_string());
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUM: &str = "sha256:1f8e40cde43ac0bcf61defb147326d038310d75d4e50f728f6becfd2a36ac0ac";

    fn recipe_text(extra: &str) -> String {
        format!(
            r#"
[package]
name = "glib"
version = "2.51.1"
revision = "3"
license = "LGPL-2.1"
summary = "Core application building blocks"

[source]
archive = "https://download.gnome.org/sources/glib/2.51/glib-%(version)s.tar.xz"
checksum = "{CHECKSUM}"

[dependencies]
requires = ["libffi/3.0.11-2@vuo/stable", "gettext/0.19.8.1-2@vuo/stable"]

[artifact]
pkgconfig = "glib-2.0.pc"
link_name = "glib-2.0"
upstream = {{ macos = "libglib-2.0.0.dylib", linux = "libglib-2.0.so.0" }}
{extra}
"#
        )
    }

    #[test]
    fn test_parse_valid_recipe() {
        let recipe = parse_recipe(&recipe_text("")).unwrap();
        assert_eq!(recipe.package.name, "glib");
        assert_eq!(recipe.package_version(), "2.51.1-3");
        assert_eq!(recipe.library_name(), "glib");
        assert_eq!(recipe.archive_filename(), "glib-2.51.1.tar.xz");
        assert_eq!(recipe.build.system, BuildSystemKind::Autotools);
        assert_eq!(recipe.requires().unwrap().len(), 2);
        assert!(validate_recipe(&recipe).unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_recipe() {
        assert!(parse_recipe("this is not valid toml at all {}").is_err());
    }

    #[test]
    fn test_validate_bad_checksum() {
        let text = recipe_text("").replace(CHECKSUM, "md5:abc123");
        let recipe = parse_recipe(&text).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_unknown_platform() {
        let text = recipe_text("").replace(
            "revision = \"3\"",
            "revision = \"3\"\nplatforms = [\"windows\"]",
        );
        let recipe = parse_recipe(&text).unwrap();
        let err = validate_recipe(&recipe).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform(_)));
    }

    #[test]
    fn test_validate_compiler_must_be_build_dependency() {
        let text = recipe_text("\n[build]\ncompiler = \"llvm\"\n");
        let recipe = parse_recipe(&text).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_empty_script() {
        let text = recipe_text("\n[build]\nsystem = \"script\"\n");
        let recipe = parse_recipe(&text).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let text = recipe_text("")
            .replace("license = \"LGPL-2.1\"\n", "")
            .replace(", linux = \"libglib-2.0.so.0\"", "");
        let recipe = parse_recipe(&text).unwrap();
        let warnings = validate_recipe(&recipe).unwrap();
        assert!(warnings.iter().any(|w| w.contains("license")));
        assert!(warnings.iter().any(|w| w.contains("linux")));
    }

    #[test]
    fn test_parse_recipe_file_sets_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glib.toml");
        std::fs::write(&path, recipe_text("")).unwrap();

        let recipe = parse_recipe_file(&path).unwrap();
        assert_eq!(
            recipe.resolve_path("patches/fix.patch"),
            dir.path().join("patches/fix.patch")
        );
        assert_eq!(
            recipe.resolve_path("/abs/fix.patch"),
            std::path::PathBuf::from("/abs/fix.patch")
        );
    }
}
