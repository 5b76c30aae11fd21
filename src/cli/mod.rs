// src/cli/mod.rs
//! CLI definitions for larder
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "larder")]
#[command(version)]
#[command(about = "Build C libraries into relocatable binary packages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cook a package from a recipe
    Cook {
        /// Path to the recipe file
        recipe: String,

        /// Output directory; the package lands in <output>/<name>/<version>
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Directory for cached, verified sources
        #[arg(long)]
        source_cache: Option<String>,

        /// Directory holding dependency packages as <name>/<version>
        #[arg(long)]
        deps_root: Option<String>,

        /// Root for the prefix written into the published .pc file
        #[arg(long)]
        package_prefix: Option<String>,

        /// Target operating system (macos, linux); defaults to the host
        #[arg(long)]
        os: Option<String>,

        /// Number of parallel build jobs
        #[arg(short, long)]
        jobs: Option<u32>,

        /// Keep the work directory after completion
        #[arg(long)]
        keep_builddir: bool,

        /// Build targets one after another instead of in parallel
        #[arg(long)]
        serial: bool,

        /// Only fetch and verify sources, don't build
        #[arg(long)]
        fetch_only: bool,

        /// Only validate the recipe, don't cook
        #[arg(long)]
        validate_only: bool,

        /// Write the build log to this file, even when the cook fails
        #[arg(long)]
        log_file: Option<String>,
    },

    /// Fetch and verify a recipe's sources into the cache
    Fetch {
        /// Path to the recipe file
        recipe: String,

        /// Directory for cached, verified sources
        #[arg(long)]
        source_cache: Option<String>,
    },

    /// Print the metadata a package publishes, as JSON
    Info {
        /// Path to the recipe file
        recipe: String,
    },

    /// Show a shared library's linkage metadata
    Inspect {
        /// Path to the library or executable
        binary: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Smoke-test a published package directory
    Check {
        /// Package directory (contains include/ and lib/)
        package_dir: String,

        /// C compiler used to build the consumer
        #[arg(long, default_value = "cc")]
        cc: String,

        /// Symbol the consumer references
        #[arg(long)]
        symbol: Option<String>,

        /// Extra library directory for dependencies (repeatable)
        #[arg(short = 'L', long = "lib-path")]
        lib_paths: Vec<String>,

        /// Only check linkage metadata; don't build or run the consumer
        #[arg(long)]
        no_run: bool,
    },
}
