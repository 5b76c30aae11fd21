// src/platform.rs

//! Target platforms and per-OS packaging conventions
//!
//! Only two operating systems are supported. Everything that differs between
//! them (library extension, how a library's self-identifier is rewritten, the
//! loader-relative path token) lives in a [`PlatformProfile`] chosen once per
//! run, so later stages never branch on the OS directly.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Operating systems we can package for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    MacOs,
}

impl Os {
    /// The OS this process is running on
    pub fn current() -> Result<Self> {
        std::env::consts::OS.parse()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
        }
    }

    /// Meson `host_machine.system` value
    pub const fn meson_system(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "darwin",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" | "osx" => Ok(Self::MacOs),
            _ => Err(Error::UnsupportedPlatform(s.to_string())),
        }
    }
}

/// CPU architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86_64,
    Arm64,
}

impl Arch {
    pub fn current() -> Result<Self> {
        std::env::consts::ARCH.parse()
    }

    /// Apple spelling, as used by `-arch` and `lipo`
    pub const fn apple_name(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }

    /// GNU spelling, as used in target triples and meson `cpu_family`
    pub const fn gnu_name(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.apple_name())
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "arm64" | "aarch64" | "armv8" => Ok(Self::Arm64),
            _ => Err(Error::UnsupportedPlatform(format!("architecture {}", s))),
        }
    }
}

/// One (os, arch) pair to build for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BuildTarget {
    pub os: Os,
    pub arch: Arch,
}

impl BuildTarget {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Target triple for `--host=` and cross files
    pub fn triple(&self) -> String {
        match self.os {
            Os::MacOs => format!("{}-apple-darwin", self.arch.gnu_name()),
            Os::Linux => format!("{}-linux-gnu", self.arch.gnu_name()),
        }
    }

    /// Directory-safe identifier, e.g. `macos-arm64`
    pub fn slug(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    /// Whether building this target from the current host needs cross flags
    pub fn is_cross(&self) -> bool {
        Os::current().map(|os| os != self.os).unwrap_or(true)
            || Arch::current().map(|a| a != self.arch).unwrap_or(true)
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Tool used to rewrite a shared library's self-identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRewriter {
    /// `install_name_tool -id <id> <lib>`
    InstallNameTool,
    /// `patchelf --set-soname <id> <lib>`
    Patchelf,
}

/// Per-OS packaging conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    pub os: Os,
    pub library_extension: &'static str,
    pub id_rewriter: IdRewriter,
    /// Token the loader expands to the loading binary's directory
    pub loader_token: &'static str,
    /// Prefix applied to the library's self-identifier
    pub id_prefix: &'static str,
}

impl PlatformProfile {
    pub const fn for_os(os: Os) -> Self {
        match os {
            Os::MacOs => Self {
                os,
                library_extension: "dylib",
                id_rewriter: IdRewriter::InstallNameTool,
                loader_token: "@loader_path",
                id_prefix: "@rpath/",
            },
            Os::Linux => Self {
                os,
                library_extension: "so",
                id_rewriter: IdRewriter::Patchelf,
                loader_token: "$ORIGIN",
                id_prefix: "",
            },
        }
    }

    /// `lib<name>.<ext>`
    pub fn library_filename(&self, name: &str) -> String {
        format!("lib{}.{}", name, self.library_extension)
    }

    /// Relocatable self-identifier for a library file
    pub fn self_identifier(&self, filename: &str) -> String {
        format!("{}{}", self.id_prefix, filename)
    }

    /// Linker flags making the library search next to, and two levels above,
    /// the loading binary
    pub fn rpath_link_flags(&self) -> Vec<String> {
        vec![
            format!("-Wl,-rpath,{}", self.loader_token),
            format!("-Wl,-rpath,{}/../..", self.loader_token),
        ]
    }

    /// Targets built for this OS
    ///
    /// macOS universal builds cover both architectures; everything else
    /// builds for the host architecture only.
    pub fn targets(&self, universal: bool) -> Result<Vec<BuildTarget>> {
        if self.os == Os::MacOs && universal {
            return Ok(vec![
                BuildTarget::new(self.os, Arch::X86_64),
                BuildTarget::new(self.os, Arch::Arm64),
            ]);
        }
        Ok(vec![BuildTarget::new(self.os, Arch::current()?)])
    }
}
