// src/recipe/kitchen/adapter.rs

//! Build system adapters
//!
//! The orchestration never talks to autotools or meson directly; it drives a
//! [`BuildSystemAdapter`] through configure, build and install. Supporting a
//! new build system means adding an adapter here.

use super::config::ToolPaths;
use crate::error::{Error, Result};
use crate::platform::BuildTarget;
use crate::recipe::format::{BuildSection, BuildSystemKind, OptionValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Everything an adapter needs to run one target's build
pub struct BuildContext<'a> {
    pub target: BuildTarget,
    pub source_dir: &'a Path,
    pub build_dir: &'a Path,
    pub install_dir: &'a Path,
    /// Computed environment overrides
    pub env: &'a BTreeMap<String, String>,
    /// Feature toggles
    pub options: &'a BTreeMap<String, OptionValue>,
    /// Build section with recipe variables already substituted
    pub build: &'a BuildSection,
    pub jobs: u32,
    pub tools: &'a ToolPaths,
}

/// Which step a command belongs to, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Configure,
    Build,
    Install,
}

impl Step {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
        }
    }
}

/// A build system the Kitchen can drive
pub trait BuildSystemAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Configure into `ctx.build_dir`; returns captured tool output
    fn configure(&self, ctx: &BuildContext<'_>) -> Result<String>;

    fn build(&self, ctx: &BuildContext<'_>) -> Result<String>;

    /// Install into `ctx.install_dir`
    fn install(&self, ctx: &BuildContext<'_>) -> Result<String>;
}

/// Adapter for a recipe's build system
pub fn adapter_for(kind: BuildSystemKind) -> Box<dyn BuildSystemAdapter> {
    match kind {
        BuildSystemKind::Autotools => Box::new(Autotools),
        BuildSystemKind::Meson => Box::new(Meson),
        BuildSystemKind::Script => Box::new(Script),
    }
}

/// Run a command to completion, capturing stdout and stderr
///
/// A non-zero exit becomes `Error::Configure` or `Error::Build` carrying the
/// tool's output verbatim.
pub fn run_step(step: Step, target: BuildTarget, command: &mut Command) -> Result<String> {
    debug!("Running {} for {}: {:?}", step.as_str(), target, command);
    let output = command.output().map_err(|e| {
        let program = command.get_program().to_string_lossy().to_string();
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ToolNotFound(program)
        } else {
            Error::Io(e)
        }
    })?;

    let mut captured = String::from_utf8_lossy(&output.stdout).to_string();
    captured.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        let target = target.to_string();
        let output = format!(
            "{} exited with {:?}\n{}",
            step.as_str(),
            output.status.code(),
            captured
        );
        return Err(match step {
            Step::Configure => Error::Configure { target, output },
            Step::Build | Step::Install => Error::Build { target, output },
        });
    }

    Ok(captured)
}

/// GNU autotools: `configure && make && make install`
pub struct Autotools;

impl Autotools {
    /// Render toggles as `--enable-x`, `--disable-x`, `--with-x=value`
    pub fn render_options(options: &BTreeMap<String, OptionValue>) -> Vec<String> {
        options
            .iter()
            .map(|(name, value)| {
                let name = name.replace('_', "-");
                match value {
                    OptionValue::Bool(true) => format!("--enable-{}", name),
                    OptionValue::Bool(false) => format!("--disable-{}", name),
                    OptionValue::Str(v) => format!("--with-{}={}", name, v),
                }
            })
            .collect()
    }

    /// Make re-expands `$` in flags; `$ORIGIN` has to survive as a literal
    ///
    /// Applied to configure as well as make: config.status copies the flags
    /// into the generated Makefiles, whose values take precedence over the
    /// environment.
    fn escape_for_make(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        env.iter()
            .map(|(k, v)| (k.clone(), v.replace("$ORIGIN", "\\$$ORIGIN")))
            .collect()
    }

    fn make(&self, ctx: &BuildContext<'_>) -> Command {
        let mut cmd = Command::new(&ctx.tools.make);
        cmd.current_dir(ctx.build_dir)
            .envs(Self::escape_for_make(ctx.env));
        cmd
    }
}

impl BuildSystemAdapter for Autotools {
    fn name(&self) -> &'static str {
        "autotools"
    }

    fn configure(&self, ctx: &BuildContext<'_>) -> Result<String> {
        let mut cmd = Command::new(&ctx.tools.shell);
        cmd.arg(ctx.source_dir.join("configure"))
            .arg(format!("--prefix={}", ctx.install_dir.display()))
            .arg("--quiet");
        if ctx.target.is_cross() {
            cmd.arg(format!("--host={}", ctx.target.triple()));
        }
        cmd.args(Self::render_options(ctx.options))
            .current_dir(ctx.build_dir)
            .envs(Self::escape_for_make(ctx.env));
        run_step(Step::Configure, ctx.target, &mut cmd)
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<String> {
        let mut cmd = self.make(ctx);
        cmd.arg(format!("-j{}", ctx.jobs));
        run_step(Step::Build, ctx.target, &mut cmd)
    }

    fn install(&self, ctx: &BuildContext<'_>) -> Result<String> {
        let mut cmd = self.make(ctx);
        cmd.arg("install");
        run_step(Step::Install, ctx.target, &mut cmd)
    }
}

/// Meson + ninja
pub struct Meson;

impl Meson {
    /// Render toggles as `-Dname=value`
    pub fn render_options(options: &BTreeMap<String, OptionValue>) -> Vec<String> {
        options
            .iter()
            .map(|(name, value)| format!("-D{}={}", name, value))
            .collect()
    }

    /// Cross file path for a build directory (a sibling, so `meson setup`
    /// sees an empty build directory)
    pub fn cross_file_path(build_dir: &Path) -> PathBuf {
        build_dir.with_extension("ini")
    }

    /// Meson ignores `CFLAGS`/`LDFLAGS` for the host machine when cross
    /// compiling, so compilers and flags go into the cross file instead
    pub fn cross_file(target: BuildTarget, env: &BTreeMap<String, String>) -> String {
        let quote = |s: &str| format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"));
        let list = |key: &str| {
            let items: Vec<String> = env
                .get(key)
                .map(|v| v.split_whitespace().map(quote).collect())
                .unwrap_or_default();
            format!("[{}]", items.join(", "))
        };
        let tool = |key: &str, default: &str| quote(env.get(key).map(String::as_str).unwrap_or(default));
        // Dependency .pc directories; the host PKG_CONFIG_PATH is ignored too
        let pkg_config_path = match env.get("PKG_CONFIG_PATH") {
            Some(paths) => {
                let items: Vec<String> = paths
                    .split(':')
                    .filter(|p| !p.is_empty())
                    .map(quote)
                    .collect();
                format!("pkg_config_path = [{}]\n", items.join(", "))
            }
            None => String::new(),
        };

        format!(
            "[binaries]\n\
             c = {cc}\n\
             cpp = {cxx}\n\
             objc = {cc}\n\
             ar = 'ar'\n\
             strip = 'strip'\n\
             pkg-config = 'pkg-config'\n\
             \n\
             [built-in options]\n\
             c_args = {cflags}\n\
             cpp_args = {cxxflags}\n\
             objc_args = {cflags}\n\
             c_link_args = {ldflags}\n\
             cpp_link_args = {ldflags}\n\
             objc_link_args = {ldflags}\n\
             {pkg_config_path}\
             \n\
             [host_machine]\n\
             system = '{system}'\n\
             cpu_family = '{family}'\n\
             cpu = '{cpu}'\n\
             endian = 'little'\n",
            cc = tool("CC", "cc"),
            cxx = tool("CXX", "c++"),
            cflags = list("CFLAGS"),
            cxxflags = list("CXXFLAGS"),
            ldflags = list("LDFLAGS"),
            pkg_config_path = pkg_config_path,
            system = target.os.meson_system(),
            family = target.arch.gnu_name(),
            cpu = target.arch.apple_name(),
        )
    }
}

impl BuildSystemAdapter for Meson {
    fn name(&self) -> &'static str {
        "meson"
    }

    fn configure(&self, ctx: &BuildContext<'_>) -> Result<String> {
        let mut cmd = Command::new(&ctx.tools.meson);
        cmd.arg("setup")
            .arg(ctx.build_dir)
            .arg(ctx.source_dir)
            .arg(format!("--prefix={}", ctx.install_dir.display()))
            .args(["--buildtype=release", "--default-library=shared", "--libdir=lib"]);

        if ctx.target.is_cross() {
            let cross_file = Self::cross_file_path(ctx.build_dir);
            fs::write(&cross_file, Self::cross_file(ctx.target, ctx.env))?;
            cmd.arg(format!("--cross-file={}", cross_file.display()));
        }

        cmd.args(Self::render_options(ctx.options)).envs(ctx.env);
        run_step(Step::Configure, ctx.target, &mut cmd)
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<String> {
        let mut cmd = Command::new(&ctx.tools.meson);
        cmd.arg("compile")
            .arg("-C")
            .arg(ctx.build_dir)
            .arg(format!("-j{}", ctx.jobs))
            .envs(ctx.env);
        run_step(Step::Build, ctx.target, &mut cmd)
    }

    fn install(&self, ctx: &BuildContext<'_>) -> Result<String> {
        let mut cmd = Command::new(&ctx.tools.meson);
        cmd.arg("install").arg("-C").arg(ctx.build_dir).envs(ctx.env);
        run_step(Step::Install, ctx.target, &mut cmd)
    }
}

/// Recipe-supplied shell commands
///
/// Commands run from the source directory with `%(prefix)s`,
/// `%(builddir)s` and `%(jobs)s` substituted and the same values exported
/// as `PREFIX`, `BUILD_DIR` and `JOBS`.
pub struct Script;

impl Script {
    fn run(&self, step: Step, command: Option<&String>, ctx: &BuildContext<'_>) -> Result<String> {
        let Some(command) = command else {
            return Ok(String::new());
        };

        let prefix = ctx.install_dir.display().to_string();
        let build_dir = ctx.build_dir.display().to_string();
        let jobs = ctx.jobs.to_string();
        let command = command
            .replace("%(prefix)s", &prefix)
            .replace("%(builddir)s", &build_dir)
            .replace("%(jobs)s", &jobs);

        let mut cmd = Command::new(&ctx.tools.shell);
        cmd.arg("-c")
            .arg(&command)
            .current_dir(ctx.source_dir)
            .envs(ctx.env)
            .env("PREFIX", &prefix)
            .env("BUILD_DIR", &build_dir)
            .env("JOBS", &jobs);
        run_step(step, ctx.target, &mut cmd)
    }
}

impl BuildSystemAdapter for Script {
    fn name(&self) -> &'static str {
        "script"
    }

    fn configure(&self, ctx: &BuildContext<'_>) -> Result<String> {
        self.run(Step::Configure, ctx.build.configure.as_ref(), ctx)
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<String> {
        self.run(Step::Build, ctx.build.make.as_ref(), ctx)
    }

    fn install(&self, ctx: &BuildContext<'_>) -> Result<String> {
        self.run(Step::Install, ctx.build.install.as_ref(), ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};

    fn glib_options() -> BTreeMap<String, OptionValue> {
        let mut options = BTreeMap::new();
        options.insert("nls".to_string(), OptionValue::Bool(false));
        options.insert("libmount".to_string(), OptionValue::Bool(false));
        options.insert("pcre".to_string(), OptionValue::Str("internal".to_string()));
        options
    }

    #[test]
    fn test_autotools_options() {
        assert_eq!(
            Autotools::render_options(&glib_options()),
            vec!["--disable-libmount", "--disable-nls", "--with-pcre=internal"]
        );
    }

    #[test]
    fn test_autotools_underscores_become_dashes() {
        let mut options = BTreeMap::new();
        options.insert("glib_assert".to_string(), OptionValue::Bool(false));
        assert_eq!(Autotools::render_options(&options), vec!["--disable-glib-assert"]);
    }

    #[test]
    fn test_meson_options() {
        assert_eq!(
            Meson::render_options(&glib_options()),
            vec!["-Dlibmount=false", "-Dnls=false", "-Dpcre=internal"]
        );
    }

    #[test]
    fn test_make_escapes_origin() {
        let mut env = BTreeMap::new();
        env.insert("LDFLAGS".to_string(), "-Wl,-rpath,$ORIGIN".to_string());
        let escaped = Autotools::escape_for_make(&env);
        assert_eq!(escaped["LDFLAGS"], "-Wl,-rpath,\\$$ORIGIN");
    }

    #[test]
    fn test_meson_cross_file() {
        let mut env = BTreeMap::new();
        env.insert("CC".to_string(), "/deps/llvm/5.0.2-3/bin/clang".to_string());
        env.insert("CFLAGS".to_string(), "-Oz -arch arm64".to_string());
        env.insert("LDFLAGS".to_string(), "-Wl,-rpath,@loader_path".to_string());

        let cross = Meson::cross_file(BuildTarget::new(Os::MacOs, Arch::Arm64), &env);
        assert!(cross.contains("c = '/deps/llvm/5.0.2-3/bin/clang'\n"));
        assert!(cross.contains("cpp = 'c++'\n"));
        assert!(cross.contains("c_args = ['-Oz', '-arch', 'arm64']\n"));
        assert!(cross.contains("c_link_args = ['-Wl,-rpath,@loader_path']\n"));
        assert!(cross.contains("system = 'darwin'\n"));
        assert!(cross.contains("cpu_family = 'aarch64'\n"));
        assert!(cross.contains("cpu = 'arm64'\n"));
        assert!(!cross.contains("pkg_config_path"));
    }

    #[test]
    fn test_meson_cross_file_carries_dependency_pc_dirs() {
        let mut env = BTreeMap::new();
        env.insert(
            "PKG_CONFIG_PATH".to_string(),
            "/deps/libffi/3.0.11-2:/deps/gettext/0.19.8.1-2".to_string(),
        );

        let cross = Meson::cross_file(BuildTarget::new(Os::MacOs, Arch::X86_64), &env);
        assert!(cross.contains(
            "objc_link_args = []\n\
             pkg_config_path = ['/deps/libffi/3.0.11-2', '/deps/gettext/0.19.8.1-2']\n\
             \n\
             [host_machine]\n"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_autotools_origin_survives_generated_makefile() {
        if which::which("make").is_err() {
            eprintln!("Skipping: make not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let source_dir = dir.path().join("source");
        let build_dir = dir.path().join("build");
        let install_dir = dir.path().join("install");
        fs::create_dir_all(&source_dir).unwrap();
        fs::create_dir_all(&build_dir).unwrap();

        // Copies LDFLAGS into the Makefile like config.status does
        fs::write(
            source_dir.join("configure"),
            "printf 'LDFLAGS = %s\\nall:\\n\\t@echo \"$(LDFLAGS)\" > linked-with.txt\\n' \"$LDFLAGS\" > Makefile\n",
        )
        .unwrap();

        let mut env = BTreeMap::new();
        env.insert(
            "LDFLAGS".to_string(),
            "-Wl,-rpath,$ORIGIN -Wl,-rpath,$ORIGIN/../..".to_string(),
        );
        let options = BTreeMap::new();
        let build = BuildSection::default();
        let tools = ToolPaths::default();
        let ctx = BuildContext {
            target: BuildTarget::new(Os::Linux, Arch::X86_64),
            source_dir: &source_dir,
            build_dir: &build_dir,
            install_dir: &install_dir,
            env: &env,
            options: &options,
            build: &build,
            jobs: 1,
            tools: &tools,
        };

        Autotools.configure(&ctx).unwrap();
        Autotools.build(&ctx).unwrap();
        assert_eq!(
            fs::read_to_string(build_dir.join("linked-with.txt")).unwrap(),
            "-Wl,-rpath,$ORIGIN -Wl,-rpath,$ORIGIN/../..\n"
        );
    }

    #[test]
    fn test_cross_file_is_sibling_of_build_dir() {
        assert_eq!(
            Meson::cross_file_path(Path::new("/work/build-macos-arm64")),
            PathBuf::from("/work/build-macos-arm64.ini")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_step_failure_carries_output() {
        let target = BuildTarget::new(Os::Linux, Arch::X86_64);
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo checking for cc... no; exit 3"]);
        let err = run_step(Step::Configure, target, &mut cmd).unwrap_err();
        match err {
            Error::Configure { output, .. } => {
                assert!(output.contains("checking for cc... no"));
                assert!(output.contains("Some(3)"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_step_missing_program() {
        let target = BuildTarget::new(Os::Linux, Arch::X86_64);
        let mut cmd = Command::new("definitely-not-a-real-build-tool");
        let err = run_step(Step::Build, target, &mut cmd).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }
}
