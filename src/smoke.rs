// src/smoke.rs

//! Package smoke test
//!
//! Links a trivial consumer against a published package and runs it, then
//! checks the library's linkage metadata against the relocatability policy.

use crate::error::{Error, Result};
use crate::linkage::{self, LinkagePolicy, LinkageReport, Violation};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// How to build and run the consumer
#[derive(Debug, Clone)]
pub struct SmokeOptions {
    /// C compiler driver
    pub cc: PathBuf,
    /// A symbol the consumer references, forcing a real link against it
    pub symbol: Option<String>,
    /// Extra library directories (dependency packages), added to `-L` and
    /// the consumer's rpath
    pub library_paths: Vec<PathBuf>,
    /// Build and run the consumer; linkage is checked either way
    pub run_consumer: bool,
}

impl Default for SmokeOptions {
    fn default() -> Self {
        Self {
            cc: PathBuf::from("cc"),
            symbol: None,
            library_paths: Vec::new(),
            run_consumer: true,
        }
    }
}

/// Outcome of a smoke test
#[derive(Debug, Clone)]
pub struct SmokeReport {
    pub library: PathBuf,
    pub linkage: LinkageReport,
    pub violations: Vec<Violation>,
    /// Whether the consumer was built and ran successfully
    pub consumer_ran: bool,
}

impl SmokeReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// The package's shared library and its link name
///
/// Expects exactly one `lib<name>.dylib` or `lib<name>.so` under `lib/`.
pub fn find_library(package_dir: &Path) -> Result<(PathBuf, String)> {
    let lib_dir = package_dir.join("lib");
    let mut found = Vec::new();
    for entry in fs::read_dir(&lib_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let link_name = name
            .strip_prefix("lib")
            .and_then(|n| n.strip_suffix(".dylib").or_else(|| n.strip_suffix(".so")));
        if let Some(link_name) = link_name {
            found.push((path.clone(), link_name.to_string()));
        }
    }

    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(Error::Linkage(format!(
            "no shared library in {}",
            lib_dir.display()
        ))),
        n => Err(Error::Linkage(format!(
            "expected one shared library in {}, found {}",
            lib_dir.display(),
            n
        ))),
    }
}

/// Source of the consumer program
pub fn consumer_source(symbol: Option<&str>) -> String {
    match symbol {
        Some(symbol) => format!(
            "#include <stddef.h>\n\
             extern void {symbol}(void);\n\
             int main(void) {{ return {symbol} == NULL; }}\n"
        ),
        None => "int main(void) { return 0; }\n".to_string(),
    }
}

/// Smoke-test a package directory
pub fn check_package(package_dir: &Path, options: &SmokeOptions) -> Result<SmokeReport> {
    let (library, link_name) = find_library(package_dir)?;
    info!("Checking {}", library.display());

    let consumer_ran = if options.run_consumer {
        run_consumer(package_dir, &link_name, options)?;
        true
    } else {
        false
    };

    let linkage = linkage::inspect(&library)?;
    let violations = LinkagePolicy::default().check(&linkage);
    for violation in &violations {
        debug!("Violation: {}", violation);
    }

    Ok(SmokeReport {
        library,
        linkage,
        violations,
        consumer_ran,
    })
}

fn run_consumer(package_dir: &Path, link_name: &str, options: &SmokeOptions) -> Result<()> {
    let work = tempfile::Builder::new().prefix("larder-smoke-").tempdir()?;
    let source = work.path().join("consumer.c");
    let binary = work.path().join("consumer");
    fs::write(&source, consumer_source(options.symbol.as_deref()))?;

    let lib_dir = package_dir.join("lib");
    let mut cmd = Command::new(&options.cc);
    cmd.arg(&source)
        .arg("-o")
        .arg(&binary)
        .arg(format!("-I{}", package_dir.join("include").display()));
    for dir in std::iter::once(&lib_dir).chain(&options.library_paths) {
        cmd.arg(format!("-L{}", dir.display()))
            .arg(format!("-Wl,-rpath,{}", dir.display()));
    }
    if cfg!(target_os = "linux") {
        // Keep the library as a load-time dependency even if unreferenced
        cmd.arg("-Wl,--no-as-needed");
    }
    cmd.arg(format!("-l{}", link_name));

    debug!("Compiling consumer: {:?}", cmd);
    let output = cmd.output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ToolNotFound(options.cc.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;
    if !output.status.success() {
        return Err(Error::Linkage(format!(
            "consumer failed to link:\n{}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let output = Command::new(&binary).output()?;
    if !output.status.success() {
        return Err(Error::Linkage(format!(
            "consumer exited with {:?}:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    info!("Consumer linked against -l{} and ran", link_name);
    Ok(())
}
