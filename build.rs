// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: recipe file
fn recipe_arg() -> Arg {
    Arg::new("recipe")
        .required(true)
        .value_name("RECIPE")
        .help("Path to the recipe file")
}

/// Common argument: source cache directory
fn source_cache_arg() -> Arg {
    Arg::new("source_cache")
        .long("source-cache")
        .value_name("DIR")
        .help("Directory for cached, verified sources")
}

fn flag(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("larder")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Larder Contributors")
        .about("Build C libraries into relocatable binary packages")
        .subcommand_required(true)
        .subcommand(
            Command::new("cook")
                .about("Cook a package from a recipe")
                .arg(recipe_arg())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value(".")
                        .help("Output directory; the package lands in <output>/<name>/<version>"),
                )
                .arg(source_cache_arg())
                .arg(
                    Arg::new("deps_root")
                        .long("deps-root")
                        .value_name("DIR")
                        .help("Directory holding dependency packages as <name>/<version>"),
                )
                .arg(
                    Arg::new("package_prefix")
                        .long("package-prefix")
                        .value_name("DIR")
                        .help("Root for the prefix written into the published .pc file"),
                )
                .arg(
                    Arg::new("os")
                        .long("os")
                        .help("Target operating system (macos, linux); defaults to the host"),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help("Number of parallel build jobs"),
                )
                .arg(flag("keep_builddir", "keep-builddir", "Keep the work directory after completion"))
                .arg(flag("serial", "serial", "Build targets one after another instead of in parallel"))
                .arg(flag("fetch_only", "fetch-only", "Only fetch and verify sources, don't build"))
                .arg(flag("validate_only", "validate-only", "Only validate the recipe, don't cook"))
                .arg(
                    Arg::new("log_file")
                        .long("log-file")
                        .value_name("FILE")
                        .help("Write the build log to this file, even when the cook fails"),
                ),
        )
        .subcommand(
            Command::new("fetch")
                .about("Fetch and verify a recipe's sources into the cache")
                .arg(recipe_arg())
                .arg(source_cache_arg()),
        )
        .subcommand(
            Command::new("info")
                .about("Print the metadata a package publishes, as JSON")
                .arg(recipe_arg()),
        )
        .subcommand(
            Command::new("inspect")
                .about("Show a shared library's linkage metadata")
                .arg(Arg::new("binary").required(true).help("Path to the library or executable"))
                .arg(flag("json", "json", "Print as JSON")),
        )
        .subcommand(
            Command::new("check")
                .about("Smoke-test a published package directory")
                .arg(
                    Arg::new("package_dir")
                        .required(true)
                        .help("Package directory (contains include/ and lib/)"),
                )
                .arg(
                    Arg::new("cc")
                        .long("cc")
                        .default_value("cc")
                        .help("C compiler used to build the consumer"),
                )
                .arg(Arg::new("symbol").long("symbol").help("Symbol the consumer references"))
                .arg(
                    Arg::new("lib_path")
                        .short('L')
                        .long("lib-path")
                        .action(ArgAction::Append)
                        .help("Extra library directory for dependencies (repeatable)"),
                )
                .arg(flag(
                    "no_run",
                    "no-run",
                    "Only check linkage metadata; don't build or run the consumer",
                )),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("larder.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
