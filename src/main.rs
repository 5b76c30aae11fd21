// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Cook {
            recipe,
            output,
            source_cache,
            deps_root,
            package_prefix,
            os,
            jobs,
            keep_builddir,
            serial,
            fetch_only,
            validate_only,
            log_file,
        } => {
            let config = commands::kitchen_config(
                source_cache.as_deref(),
                deps_root.as_deref(),
                package_prefix.as_deref(),
            );
            commands::cmd_cook(
                &recipe,
                &output,
                config,
                os.as_deref(),
                jobs,
                keep_builddir,
                serial,
                fetch_only,
                validate_only,
                log_file.as_deref(),
            )
        }
        Commands::Fetch {
            recipe,
            source_cache,
        } => commands::cmd_fetch(
            &recipe,
            commands::kitchen_config(source_cache.as_deref(), None, None),
        ),
        Commands::Info { recipe } => commands::cmd_info(&recipe),
        Commands::Inspect { binary, json } => commands::cmd_inspect(&binary, json),
        Commands::Check {
            package_dir,
            cc,
            symbol,
            lib_paths,
            no_run,
        } => commands::cmd_check(&package_dir, &cc, symbol, &lib_paths, no_run),
    }
}
