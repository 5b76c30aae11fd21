// src/recipe/kitchen/target.rs

//! Per-target build planning, execution and normalization
//!
//! Each [`BuildTarget`] gets its own build and install directories and its
//! own compiler environment. Targets share nothing mutable, so they can be
//! built side by side.

use super::adapter::{BuildContext, BuildSystemAdapter};
use super::config::{KitchenConfig, ToolPaths};
use crate::error::{Error, Result, Stage};
use crate::pkgconfig::PkgConfig;
use crate::platform::{BuildTarget, IdRewriter, Os, PlatformProfile};
use crate::recipe::format::{BuildSection, PackageRef, Recipe};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Directories and environment for one target
#[derive(Debug, Clone)]
pub struct TargetPlan {
    pub target: BuildTarget,
    pub build_dir: PathBuf,
    pub install_dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl TargetPlan {
    /// Plan a target's build under `work_dir`
    ///
    /// Fails with `MissingDependency` when a referenced dependency package
    /// is not present under the dependency root.
    pub fn new(
        target: BuildTarget,
        recipe: &Recipe,
        profile: &PlatformProfile,
        config: &KitchenConfig,
        work_dir: &Path,
    ) -> Result<Self> {
        let slug = target.slug();
        Ok(Self {
            target,
            build_dir: work_dir.join(format!("build-{}", slug)),
            install_dir: work_dir.join(format!("install-{}", slug)),
            env: build_environment(target, recipe, profile, &config.dependency_root)?,
        })
    }
}

/// Root directory of a build-time dependency named by `build.compiler` or
/// `build.sysroot`
fn build_dependency_root(recipe: &Recipe, name: &str, dependency_root: &Path) -> Result<PathBuf> {
    let reference = recipe
        .build_requires()?
        .into_iter()
        .find(|r| r.name == name)
        .ok_or_else(|| Error::MissingDependency(format!("{} is not in build_requires", name)))?;
    existing_root(&reference, dependency_root)
}

fn existing_root(reference: &PackageRef, dependency_root: &Path) -> Result<PathBuf> {
    let root = reference.root_in(dependency_root);
    if !root.is_dir() {
        return Err(Error::MissingDependency(format!(
            "{} (looked in {})",
            reference,
            root.display()
        )));
    }
    Ok(root)
}

/// Compiler environment overrides for a target
///
/// Recipe flags come first, then target flags, then the loader-relative
/// search paths. `build.environment` entries are applied last and win.
pub fn build_environment(
    target: BuildTarget,
    recipe: &Recipe,
    profile: &PlatformProfile,
    dependency_root: &Path,
) -> Result<BTreeMap<String, String>> {
    let build = &recipe.build;
    let mut env = BTreeMap::new();

    if let Some(compiler) = &build.compiler {
        let root = build_dependency_root(recipe, compiler, dependency_root)?;
        env.insert("CC".to_string(), root.join("bin/clang").display().to_string());
        env.insert("CXX".to_string(), root.join("bin/clang++").display().to_string());
    }

    let sysroot = build
        .sysroot
        .as_ref()
        .map(|name| build_dependency_root(recipe, name, dependency_root))
        .transpose()?;

    let mut target_flags = Vec::new();
    match target.os {
        Os::MacOs => {
            target_flags.push(format!("-arch {}", target.arch.apple_name()));
            if let Some(min) = &build.min_macos {
                target_flags.push(format!("-mmacosx-version-min={}", min));
            }
            if let Some(sdk) = &sysroot {
                target_flags.push(format!("-isysroot {}", sdk.display()));
            }
        }
        Os::Linux => {
            if let Some(root) = &sysroot {
                target_flags.push(format!("--sysroot={}", root.display()));
            }
        }
    }

    let cflags: Vec<String> = build
        .cflags
        .iter()
        .map(|f| recipe.substitute(f))
        .chain(target_flags.iter().cloned())
        .collect();
    let ldflags: Vec<String> = build
        .ldflags
        .iter()
        .map(|f| recipe.substitute(f))
        .chain(target_flags.iter().cloned())
        .chain(profile.rpath_link_flags())
        .collect();

    env.insert("CFLAGS".to_string(), cflags.join(" "));
    env.insert("CXXFLAGS".to_string(), cflags.join(" "));
    env.insert("LDFLAGS".to_string(), ldflags.join(" "));

    let pkg_config_path = recipe
        .requires()?
        .iter()
        .map(|r| existing_root(r, dependency_root).map(|p| p.display().to_string()))
        .collect::<Result<Vec<_>>>()?;
    if !pkg_config_path.is_empty() {
        env.insert("PKG_CONFIG_PATH".to_string(), pkg_config_path.join(":"));
    }

    for (key, value) in &build.environment {
        env.insert(key.clone(), recipe.substitute(value));
    }

    Ok(env)
}

/// Build section with recipe variables substituted into script commands
pub fn substituted_build(recipe: &Recipe) -> BuildSection {
    let mut build = recipe.build.clone();
    for command in [&mut build.configure, &mut build.make, &mut build.install]
        .into_iter()
        .flatten()
    {
        *command = recipe.substitute(command);
    }
    build
}

/// Output of one or more targets' builds
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    /// Targets whose code is in `library`
    pub targets: Vec<BuildTarget>,
    /// Install root holding headers
    pub install_dir: PathBuf,
    pub library: PathBuf,
    pub pkgconfig: PathBuf,
}

impl BuildArtifact {
    pub fn describe_targets(&self) -> String {
        self.targets
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Configure, build and install one target
///
/// Captured tool output is appended to `log`. Failures are tagged with the
/// configure or build stage.
pub fn build_target(
    plan: &TargetPlan,
    adapter: &dyn BuildSystemAdapter,
    source_dir: &Path,
    recipe: &Recipe,
    build: &BuildSection,
    config: &KitchenConfig,
    log: &mut String,
) -> Result<BuildArtifact> {
    let upstream = recipe
        .upstream_library(plan.target.os)
        .ok_or_else(|| Error::UnsupportedPlatform(plan.target.os.to_string()))?;

    fs::create_dir_all(&plan.build_dir)?;
    fs::create_dir_all(&plan.install_dir)?;

    let ctx = BuildContext {
        target: plan.target,
        source_dir,
        build_dir: &plan.build_dir,
        install_dir: &plan.install_dir,
        env: &plan.env,
        options: &build.options,
        build,
        jobs: build.jobs.unwrap_or(config.jobs),
        tools: &config.tools,
    };

    info!("Configuring {} with {}", plan.target, adapter.name());
    let output = adapter.configure(&ctx).map_err(|e| e.at(Stage::Configured))?;
    log_section(log, "configure", plan.target, &output);

    info!("Building {}", plan.target);
    let output = adapter.build(&ctx).map_err(|e| e.at(Stage::Built))?;
    log_section(log, "build", plan.target, &output);

    let output = adapter.install(&ctx).map_err(|e| e.at(Stage::Built))?;
    log_section(log, "install", plan.target, &output);

    Ok(BuildArtifact {
        targets: vec![plan.target],
        library: plan.install_dir.join("lib").join(upstream),
        pkgconfig: plan
            .install_dir
            .join("lib/pkgconfig")
            .join(&recipe.artifact.pkgconfig),
        install_dir: plan.install_dir.clone(),
    })
}

fn log_section(log: &mut String, phase: &str, target: BuildTarget, output: &str) {
    log.push_str(&format!("=== {} ({}) ===\n", phase, target));
    if !output.is_empty() {
        log.push_str(output);
        if !output.ends_with('\n') {
            log.push('\n');
        }
    }
}

/// Give the library its canonical name and relocatable linkage metadata
///
/// Renames the upstream library to `lib<library>.<ext>`, rewrites its
/// self-identifier, and points the `.pc` file at `final_prefix` with the
/// canonical `-l` name. Running it again on its own output changes nothing.
pub fn normalize(
    artifact: BuildArtifact,
    recipe: &Recipe,
    profile: &PlatformProfile,
    tools: &ToolPaths,
    final_prefix: &str,
) -> Result<BuildArtifact> {
    let targets = artifact.describe_targets();
    let fail = |reason: String| Error::Normalize {
        target: targets.clone(),
        reason,
    };

    let lib_dir = artifact
        .library
        .parent()
        .ok_or_else(|| fail("library path has no parent directory".to_string()))?
        .to_path_buf();
    let filename = profile.library_filename(recipe.library_name());
    let canonical = lib_dir.join(&filename);

    let upstream_present = fs::symlink_metadata(&artifact.library).is_ok();
    if upstream_present {
        rename_library(&artifact.library, &canonical)?;
    } else if !canonical.is_file() {
        return Err(fail(format!(
            "upstream library {} not found",
            artifact.library.display()
        )));
    }

    let id = profile.self_identifier(&filename);
    let mut cmd = match profile.id_rewriter {
        IdRewriter::InstallNameTool => {
            let mut cmd = Command::new(&tools.install_name_tool);
            cmd.arg("-id").arg(&id).arg(&canonical);
            cmd
        }
        IdRewriter::Patchelf => {
            let mut cmd = Command::new(&tools.patchelf);
            cmd.arg("--set-soname").arg(&id).arg(&canonical);
            cmd
        }
    };
    debug!("Rewriting self-identifier: {:?}", cmd);
    let output = cmd.output().map_err(|e| {
        fail(format!(
            "cannot run {}: {}",
            cmd.get_program().to_string_lossy(),
            e
        ))
    })?;
    if !output.status.success() {
        return Err(fail(format!(
            "self-identifier rewrite failed:\n{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    if !artifact.pkgconfig.is_file() {
        return Err(fail(format!(
            "pkg-config file {} not found",
            artifact.pkgconfig.display()
        )));
    }
    let mut pc = PkgConfig::load(&artifact.pkgconfig)?;
    pc.relocate(&artifact.install_dir.display().to_string(), final_prefix);
    pc.rename_library(&recipe.artifact.link_name, recipe.library_name());
    pc.save(&artifact.pkgconfig)?;

    info!("Normalized {} as {}", targets, id);
    Ok(BuildArtifact {
        library: canonical,
        ..artifact
    })
}

/// Replace `upstream` with a regular file at `canonical`
///
/// Upstream installs usually make the plain name a symlink chain; the
/// package ships one real file.
fn rename_library(upstream: &Path, canonical: &Path) -> Result<()> {
    if upstream == canonical && !is_symlink(canonical) {
        return Ok(());
    }

    let real = fs::canonicalize(upstream)?;
    let canonical_is_real =
        !is_symlink(canonical) && fs::canonicalize(canonical).is_ok_and(|c| c == real);

    if !canonical_is_real {
        if is_symlink(canonical) {
            fs::remove_file(canonical)?;
        }
        fs::copy(&real, canonical)?;
    }
    if upstream != canonical && fs::symlink_metadata(upstream).is_ok() {
        fs::remove_file(upstream)?;
    }
    debug!("Renamed {} to {}", upstream.display(), canonical.display());
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Arch;
    use crate::recipe::parser::parse_recipe;

    fn recipe(extra_build: &str) -> Recipe {
        parse_recipe(&format!(
            r#"
[package]
name = "glib"
version = "2.51.1"
revision = "3"

[source]
archive = "glib-%(version)s.tar.xz"
checksum = "1f8e40cde43ac0bcf61defb147326d038310d75d4e50f728f6becfd2a36ac0ac"

[dependencies]
requires = ["libffi/3.0.11-2@vuo/stable"]
build_requires = ["llvm/5.0.2-3@vuo/stable", "macos-sdk/10.11@vuo/stable"]

[build]
cflags = ["-Oz"]
min_macos = "10.10"
{extra_build}

[artifact]
pkgconfig = "glib-2.0.pc"
link_name = "glib-2.0"
upstream = {{ macos = "libglib-2.0.0.dylib", linux = "libglib-2.0.so.0" }}
"#
        ))
        .unwrap()
    }

    fn dependency_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for pkg in ["libffi/3.0.11-2", "llvm/5.0.2-3", "macos-sdk/10.11"] {
            fs::create_dir_all(dir.path().join(pkg)).unwrap();
        }
        dir
    }

    #[test]
    fn test_macos_environment() {
        let deps = dependency_root();
        let recipe = recipe("compiler = \"llvm\"\nsysroot = \"macos-sdk\"");
        let target = BuildTarget::new(Os::MacOs, Arch::Arm64);
        let env = build_environment(
            target,
            &recipe,
            &PlatformProfile::for_os(Os::MacOs),
            deps.path(),
        )
        .unwrap();

        let sdk = deps.path().join("macos-sdk/10.11");
        assert_eq!(
            env["CC"],
            deps.path().join("llvm/5.0.2-3/bin/clang").display().to_string()
        );
        assert_eq!(
            env["CFLAGS"],
            format!(
                "-Oz -arch arm64 -mmacosx-version-min=10.10 -isysroot {}",
                sdk.display()
            )
        );
        assert!(env["LDFLAGS"].ends_with("-Wl,-rpath,@loader_path -Wl,-rpath,@loader_path/../.."));
        assert_eq!(
            env["PKG_CONFIG_PATH"],
            deps.path().join("libffi/3.0.11-2").display().to_string()
        );
    }

    #[test]
    fn test_linux_environment() {
        let deps = dependency_root();
        let recipe = recipe("environment = { GLIB_EXTRA = \"%(version)s\" }");
        let target = BuildTarget::new(Os::Linux, Arch::X86_64);
        let env = build_environment(
            target,
            &recipe,
            &PlatformProfile::for_os(Os::Linux),
            deps.path(),
        )
        .unwrap();

        assert!(!env.contains_key("CC"));
        assert_eq!(env["CFLAGS"], "-Oz");
        assert_eq!(env["LDFLAGS"], "-Wl,-rpath,$ORIGIN -Wl,-rpath,$ORIGIN/../..");
        assert_eq!(env["GLIB_EXTRA"], "2.51.1");
    }

    #[test]
    fn test_missing_dependency() {
        let deps = tempfile::tempdir().unwrap();
        let recipe = recipe("");
        let err = build_environment(
            BuildTarget::new(Os::Linux, Arch::X86_64),
            &recipe,
            &PlatformProfile::for_os(Os::Linux),
            deps.path(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingDependency(ref s) if s.contains("libffi/3.0.11-2")));
    }

    #[test]
    fn test_plan_directories() {
        let deps = dependency_root();
        let config = KitchenConfig {
            dependency_root: deps.path().to_path_buf(),
            ..KitchenConfig::default()
        };
        let plan = TargetPlan::new(
            BuildTarget::new(Os::MacOs, Arch::X86_64),
            &recipe(""),
            &PlatformProfile::for_os(Os::MacOs),
            &config,
            Path::new("/work"),
        )
        .unwrap();
        assert_eq!(plan.build_dir, PathBuf::from("/work/build-macos-x86_64"));
        assert_eq!(plan.install_dir, PathBuf::from("/work/install-macos-x86_64"));
    }

    fn fake_install(dir: &Path) -> BuildArtifact {
        let install = dir.join("install-linux-x86_64");
        fs::create_dir_all(install.join("lib/pkgconfig")).unwrap();
        fs::write(install.join("lib/libglib-2.0.so.0.5101.0"), b"\x7fELF fake").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(
            "libglib-2.0.so.0.5101.0",
            install.join("lib/libglib-2.0.so.0"),
        )
        .unwrap();
        #[cfg(not(unix))]
        fs::write(install.join("lib/libglib-2.0.so.0"), b"\x7fELF fake").unwrap();
        fs::write(
            install.join("lib/pkgconfig/glib-2.0.pc"),
            format!(
                "prefix={}\nlibdir=${{prefix}}/lib\nName: GLib\nLibs: -L${{libdir}} -lglib-2.0\n",
                install.display()
            ),
        )
        .unwrap();

        BuildArtifact {
            targets: vec![BuildTarget::new(Os::Linux, Arch::X86_64)],
            library: install.join("lib/libglib-2.0.so.0"),
            pkgconfig: install.join("lib/pkgconfig/glib-2.0.pc"),
            install_dir: install,
        }
    }

    fn noop_tools() -> ToolPaths {
        ToolPaths {
            patchelf: PathBuf::from("true"),
            ..ToolPaths::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_normalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = fake_install(dir.path());
        let recipe = recipe("");
        let profile = PlatformProfile::for_os(Os::Linux);

        let once = normalize(artifact, &recipe, &profile, &noop_tools(), "/opt/glib/2.51.1-3").unwrap();
        let pc_once = fs::read_to_string(&once.pkgconfig).unwrap();
        assert!(once.library.ends_with("lib/libglib.so"));
        assert!(!is_symlink(&once.library));
        assert_eq!(fs::read(&once.library).unwrap(), b"\x7fELF fake");

        let mut again = once.clone();
        again.library = once.install_dir.join("lib/libglib-2.0.so.0");
        let twice = normalize(again, &recipe, &profile, &noop_tools(), "/opt/glib/2.51.1-3").unwrap();
        assert_eq!(twice.library, once.library);
        assert_eq!(fs::read_to_string(&twice.pkgconfig).unwrap(), pc_once);

        let pc = PkgConfig::load(&twice.pkgconfig).unwrap();
        assert_eq!(pc.prefix(), Some("/opt/glib/2.51.1-3"));
        assert_eq!(pc.libraries(), vec!["glib"]);
    }

    #[test]
    fn test_normalize_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = BuildArtifact {
            targets: vec![BuildTarget::new(Os::Linux, Arch::X86_64)],
            install_dir: dir.path().to_path_buf(),
            library: dir.path().join("lib/libglib-2.0.so.0"),
            pkgconfig: dir.path().join("lib/pkgconfig/glib-2.0.pc"),
        };
        let err = normalize(
            artifact,
            &recipe(""),
            &PlatformProfile::for_os(Os::Linux),
            &noop_tools(),
            "/opt/glib",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Normalize { .. }));
    }

    #[test]
    fn test_substituted_build() {
        let recipe = recipe("system = \"script\"\nmake = \"make VERSION=%(version)s\"");
        let build = substituted_build(&recipe);
        assert_eq!(build.make.as_deref(), Some("make VERSION=2.51.1"));
        assert!(build.configure.is_none());
    }
}
