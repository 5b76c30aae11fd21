// src/recipe/format.rs

//! Recipe file format definitions
//!
//! A recipe is a TOML file that pins one upstream source release and says
//! how to turn it into a relocatable binary package.

use crate::error::{Error, Result};
use crate::platform::Os;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A complete recipe for building a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Package identity and metadata
    pub package: PackageSection,

    /// Upstream source archive
    pub source: SourceSection,

    /// Patches applied to the extracted source, in order
    #[serde(default)]
    pub patches: Vec<PatchInfo>,

    /// Package references this package depends on
    #[serde(default)]
    pub dependencies: DependencySection,

    /// Build configuration
    #[serde(default)]
    pub build: BuildSection,

    /// Where the upstream build puts its artifacts
    pub artifact: ArtifactSection,

    /// Variables for substitution
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Directory the recipe was loaded from; relative paths resolve here
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Recipe {
    /// Substitute variables in a string
    ///
    /// Replaces `%(name)s`, `%(version)s`, `%(revision)s`, `%(library)s`
    /// and any custom `[variables]` entry.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = template
            .replace("%(version)s", &self.package.version)
            .replace("%(name)s", &self.package.name)
            .replace("%(revision)s", &self.package.revision)
            .replace("%(library)s", self.library_name());

        for (key, value) in &self.variables {
            result = result.replace(&format!("%({})s", key), value);
        }

        result
    }

    /// Archive URL with variables substituted
    pub fn archive_url(&self) -> String {
        self.substitute(&self.source.archive)
    }

    /// Archive file name taken from the URL
    pub fn archive_filename(&self) -> String {
        self.archive_url()
            .split('/')
            .next_back()
            .filter(|s| !s.is_empty())
            .unwrap_or("source.tar.gz")
            .to_string()
    }

    /// Canonical link name (`-l<library>`)
    pub fn library_name(&self) -> &str {
        self.package
            .library
            .as_deref()
            .unwrap_or(&self.package.name)
    }

    /// Published version: `<source-version>-<revision>`
    pub fn package_version(&self) -> String {
        format!("{}-{}", self.package.version, self.package.revision)
    }

    /// Whether the recipe declares support for an OS
    pub fn supports(&self, os: Os) -> bool {
        self.package
            .platforms
            .iter()
            .any(|p| p.parse::<Os>().map(|o| o == os).unwrap_or(false))
    }

    /// Upstream library file name for an OS, relative to the install `lib/`
    pub fn upstream_library(&self, os: Os) -> Option<String> {
        self.artifact
            .upstream
            .get(os.as_str())
            .map(|name| self.substitute(name))
    }

    /// Runtime dependency references
    pub fn requires(&self) -> Result<Vec<PackageRef>> {
        self.dependencies.requires.iter().map(|r| r.parse()).collect()
    }

    /// Build-time-only dependency references
    pub fn build_requires(&self) -> Result<Vec<PackageRef>> {
        self.dependencies
            .build_requires
            .iter()
            .map(|r| r.parse())
            .collect()
    }

    /// Resolve a recipe-relative path (patch files, local archives)
    pub fn resolve_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    pub name: String,

    /// Upstream source version
    pub version: String,

    /// Package revision (for rebuilds of the same source version)
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Canonical library name, if different from the package name
    #[serde(default)]
    pub library: Option<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub license: Option<String>,

    #[serde(default)]
    pub homepage: Option<String>,

    /// Operating systems this recipe builds for
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,
}

fn default_revision() -> String {
    "1".to_string()
}

fn default_platforms() -> Vec<String> {
    vec!["macos".to_string(), "linux".to_string()]
}

/// Source archive section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    /// Archive URL or path (supports `%(version)s`)
    pub archive: String,

    /// Expected checksum, `sha256:<hex>`
    pub checksum: String,

    /// Top-level directory inside the archive, if not the only entry
    #[serde(default)]
    pub extract_dir: Option<String>,

    /// Upstream license file, relative to the source root
    #[serde(default = "default_license_file")]
    pub license_file: String,
}

fn default_license_file() -> String {
    "COPYING".to_string()
}

/// One patch to apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchInfo {
    /// Patch file, relative to the recipe
    pub file: String,

    /// Leading path components to strip (`patch -p`)
    #[serde(default = "default_strip")]
    pub strip: u32,
}

fn default_strip() -> u32 {
    1
}

/// Dependency references, written `name/version@user/channel`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencySection {
    /// Runtime dependencies; their `.pc` files are visible to the build
    #[serde(default)]
    pub requires: Vec<String>,

    /// Build-time-only dependencies (compilers, SDKs)
    #[serde(default)]
    pub build_requires: Vec<String>,
}

/// A reference to another package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
    pub user: Option<String>,
    pub channel: Option<String>,
}

impl PackageRef {
    /// Install location under a dependency root
    pub fn root_in(&self, dependency_root: &Path) -> PathBuf {
        dependency_root.join(&self.name).join(&self.version)
    }
}

impl FromStr for PackageRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (identity, origin) = match s.split_once('@') {
            Some((identity, origin)) => (identity, Some(origin)),
            None => (s, None),
        };

        let (name, version) = identity
            .split_once('/')
            .filter(|(n, v)| !n.is_empty() && !v.is_empty() && !v.contains('/'))
            .ok_or_else(|| Error::Parse(format!("Invalid package reference: {}", s)))?;

        let (user, channel) = match origin {
            Some(origin) => {
                let (user, channel) = origin
                    .split_once('/')
                    .filter(|(u, c)| !u.is_empty() && !c.is_empty())
                    .ok_or_else(|| Error::Parse(format!("Invalid package reference: {}", s)))?;
                (Some(user.to_string()), Some(channel.to_string()))
            }
            None => (None, None),
        };

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            user,
            channel,
        })
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        if let (Some(user), Some(channel)) = (&self.user, &self.channel) {
            write!(f, "@{}/{}", user, channel)?;
        }
        Ok(())
    }
}

/// Build system driving the upstream build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystemKind {
    #[default]
    Autotools,
    Meson,
    /// Recipe-supplied shell commands
    Script,
}

/// A feature toggle value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Build instructions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub system: BuildSystemKind,

    /// Feature toggles passed to the build system
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,

    #[serde(default)]
    pub cflags: Vec<String>,

    #[serde(default)]
    pub ldflags: Vec<String>,

    /// Extra environment, applied after computed overrides
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// `-mmacosx-version-min` value
    #[serde(default)]
    pub min_macos: Option<String>,

    /// Build x86_64 and arm64 on macOS and merge them
    #[serde(default)]
    pub universal: bool,

    /// Build dependency providing `bin/clang` and `bin/clang++`
    #[serde(default)]
    pub compiler: Option<String>,

    /// Build dependency whose root is the SDK sysroot
    #[serde(default)]
    pub sysroot: Option<String>,

    /// Parallel jobs override
    #[serde(default)]
    pub jobs: Option<u32>,

    /// Script build system: configure command
    #[serde(default)]
    pub configure: Option<String>,

    /// Script build system: build command
    #[serde(default)]
    pub make: Option<String>,

    /// Script build system: install command
    #[serde(default)]
    pub install: Option<String>,
}

/// Upstream artifact layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSection {
    /// Upstream library file name per OS (`macos`, `linux`)
    #[serde(default)]
    pub upstream: BTreeMap<String, String>,

    /// Generated `.pc` file name, under the install `lib/pkgconfig/`
    pub pkgconfig: String,

    /// Upstream `-l` name replaced by the canonical library name
    pub link_name: String,

    /// Install-relative directories whose headers are published
    #[serde(default = "default_headers")]
    pub headers: Vec<String>,
}

fn default_headers() -> Vec<String> {
    vec!["include".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_ref_full() {
        let r: PackageRef = "libffi/3.2.1-4@vuo/stable".parse().unwrap();
        assert_eq!(r.name, "libffi");
        assert_eq!(r.version, "3.2.1-4");
        assert_eq!(r.user.as_deref(), Some("vuo"));
        assert_eq!(r.channel.as_deref(), Some("stable"));
        assert_eq!(r.to_string(), "libffi/3.2.1-4@vuo/stable");
    }

    #[test]
    fn test_package_ref_without_channel() {
        let r: PackageRef = "gettext/0.19.8.1-2".parse().unwrap();
        assert_eq!(r.user, None);
        assert_eq!(
            r.root_in(Path::new("/deps")),
            PathBuf::from("/deps/gettext/0.19.8.1-2")
        );
    }

    #[test]
    fn test_package_ref_invalid() {
        assert!("libffi".parse::<PackageRef>().is_err());
        assert!("libffi/".parse::<PackageRef>().is_err());
        assert!("libffi/1.0@vuo".parse::<PackageRef>().is_err());
        assert!("a/b/c".parse::<PackageRef>().is_err());
    }

    #[test]
    fn test_option_value_untagged() {
        #[derive(Deserialize)]
        struct Wrapper {
            options: BTreeMap<String, OptionValue>,
        }
        let w: Wrapper = toml::from_str(
            r#"
options = { nls = "disabled", glib_assert = false }
"#,
        )
        .unwrap();
        assert_eq!(w.options["nls"], OptionValue::Str("disabled".to_string()));
        assert_eq!(w.options["glib_assert"], OptionValue::Bool(false));
    }
}
