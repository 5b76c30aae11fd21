// src/recipe/mod.rs

//! Recipe system for building packages from source
//!
//! Recipes define how to build a package from source, including:
//! - The source archive and its checksum
//! - Patches to apply
//! - Runtime and build-time dependency packages
//! - Build system, feature toggles and compiler flags
//! - Where the upstream build leaves its library and `.pc` file
//!
//! # Culinary Terminology
//!
//! - **Recipe**: Build instructions for one package (like a recipe card)
//! - **Cook**: Build a package from a recipe
//! - **Kitchen**: The build environment and its caches
//! - **Prep**: Fetch and verify sources
//! - **Simmer**: Configure, build and normalize each target
//! - **Plate**: Lay out the finished package
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "glib"
//! version = "2.51.1"
//! revision = "3"
//!
//! [source]
//! archive = "https://download.gnome.org/sources/glib/2.51/glib-%(version)s.tar.xz"
//! checksum = "sha256:1f8e40cde43ac0bcf61defb147326d038310d75d4e50f728f6becfd2a36ac0ac"
//!
//! [dependencies]
//! requires = ["libffi/3.0.11-2@vuo/stable"]
//!
//! [build]
//! system = "autotools"
//! options = { nls = false, pcre = "internal" }
//!
//! [artifact]
//! pkgconfig = "glib-2.0.pc"
//! link_name = "glib-2.0"
//! upstream = { macos = "libglib-2.0.0.dylib", linux = "libglib-2.0.so.0" }
//! ```

pub mod format;
pub mod kitchen;
pub mod parser;

pub use format::{
    ArtifactSection, BuildSection, BuildSystemKind, OptionValue, PackageRef, PatchInfo, Recipe,
    SourceSection,
};
pub use kitchen::{Cook, CookResult, Kitchen, KitchenConfig, PackageArtifact, PackageInfo, ToolPaths};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
