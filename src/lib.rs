// src/lib.rs

//! Larder: relocatable binary packages from C library sources
//!
//! A recipe pins one upstream release. The Kitchen fetches and verifies it,
//! patches it, builds it for each target architecture, normalizes the
//! library's name and linkage metadata, merges architectures, and publishes
//! a versioned package directory other recipes can link against.
//!
//! # Architecture
//!
//! - Recipes: TOML files, parsed and validated up front
//! - Platform profiles: per-OS conventions chosen once per run
//! - Build system adapters: autotools, meson, or recipe scripts
//! - Linkage inspection: structured ELF and Mach-O parsing, no tool output scraping

mod error;
pub mod hash;
pub mod linkage;
pub mod pkgconfig;
pub mod platform;
pub mod recipe;
pub mod smoke;

pub use error::{Error, Result, Stage};
pub use hash::{Checksum, HashAlgorithm};
pub use platform::{Arch, BuildTarget, Os, PlatformProfile};
pub use recipe::{CookResult, Kitchen, KitchenConfig, PackageInfo, Recipe};
