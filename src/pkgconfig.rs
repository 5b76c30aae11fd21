// src/pkgconfig.rs

//! pkg-config `.pc` files
//!
//! The build writes a `.pc` file whose `prefix` points into the local
//! install tree and whose `Libs:` names the upstream library. Packaging
//! rewrites both. Lines are kept in order so untouched content survives the
//! rewrite byte for byte.

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// `name=value`
    Variable { name: String, value: String },
    /// `Key: value`
    Field { key: String, value: String },
    /// Comments, blank lines, anything else
    Other(String),
}

/// A parsed `.pc` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgConfig {
    lines: Vec<Line>,
}

impl PkgConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        content.parse()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Variable { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Field { key: k, value } if k.eq_ignore_ascii_case(key) => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn prefix(&self) -> Option<&str> {
        self.variable("prefix")
    }

    /// Library names from `-l` tokens in `Libs:`
    pub fn libraries(&self) -> Vec<&str> {
        self.field("Libs")
            .map(|libs| {
                libs.split_whitespace()
                    .filter_map(|t| t.strip_prefix("-l"))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set `prefix=`, adding it at the top if absent
    pub fn set_prefix(&mut self, prefix: &str) {
        for line in &mut self.lines {
            if let Line::Variable { name, value } = line
                && name == "prefix"
            {
                *value = prefix.to_string();
                return;
            }
        }
        self.lines.insert(
            0,
            Line::Variable {
                name: "prefix".to_string(),
                value: prefix.to_string(),
            },
        );
    }

    /// Point the file at a new install prefix
    ///
    /// Sets `prefix=` and replaces the old prefix with `${prefix}` anywhere
    /// else it appears literally, so nothing keeps referring to the build
    /// tree.
    pub fn relocate(&mut self, old_prefix: &str, new_prefix: &str) {
        self.set_prefix(new_prefix);
        if old_prefix.is_empty() || old_prefix == new_prefix {
            return;
        }
        for line in &mut self.lines {
            match line {
                Line::Variable { name, value } if name != "prefix" => {
                    *value = value.replace(old_prefix, "${prefix}");
                }
                Line::Field { value, .. } => {
                    *value = value.replace(old_prefix, "${prefix}");
                }
                _ => {}
            }
        }
    }

    /// Replace `-l<from>` with `-l<to>` in every field
    ///
    /// Token-based, so `-lglib-2.0` → `-lglib` leaves an existing `-lglib`
    /// alone and a second rename is a no-op.
    pub fn rename_library(&mut self, from: &str, to: &str) {
        let old = format!("-l{}", from);
        let new = format!("-l{}", to);
        for line in &mut self.lines {
            if let Line::Field { value, .. } = line {
                *value = value
                    .split(' ')
                    .map(|t| if t == old { new.as_str() } else { t })
                    .collect::<Vec<_>>()
                    .join(" ");
            }
        }
    }
}

impl FromStr for PkgConfig {
    type Err = Error;

    fn from_str(content: &str) -> Result<Self> {
        let lines = content.lines().map(parse_line).collect();
        Ok(Self { lines })
    }
}

fn parse_line(raw: &str) -> Line {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Other(raw.to_string());
    }

    // Whichever of '=' and ':' comes first decides the line kind
    let eq = raw.find('=');
    let colon = raw.find(':');
    match (eq, colon) {
        (Some(e), c) if c.is_none_or(|c| e < c) && is_identifier(&raw[..e]) => Line::Variable {
            name: raw[..e].to_string(),
            value: raw[e + 1..].to_string(),
        },
        (_, Some(c)) if is_identifier(&raw[..c]) => Line::Field {
            key: raw[..c].to_string(),
            value: raw[c + 1..].trim_start().to_string(),
        },
        _ => Line::Other(raw.to_string()),
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

impl fmt::Display for PkgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                Line::Variable { name, value } => writeln!(f, "{}={}", name, value)?,
                Line::Field { key, value } => writeln!(f, "{}: {}", key, value)?,
                Line::Other(raw) => writeln!(f, "{}", raw)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLIB_PC: &str = "\
prefix=/tmp/build/_install
libdir=${prefix}/lib
includedir=/tmp/build/_install/include

glib_genmarshal=glib-genmarshal

Name: GLib
Description: C Utility Library
Version: 2.51.1
Requires.private: libffi
Libs: -L${libdir} -lglib-2.0 -lintl
Libs.private: -Wl,-framework,CoreFoundation
Cflags: -I${includedir}/glib-2.0 -I${libdir}/glib-2.0/include
";

    #[test]
    fn test_parse_variables_and_fields() {
        let pc: PkgConfig = GLIB_PC.parse().unwrap();
        assert_eq!(pc.prefix(), Some("/tmp/build/_install"));
        assert_eq!(pc.variable("libdir"), Some("${prefix}/lib"));
        assert_eq!(pc.field("Name"), Some("GLib"));
        assert_eq!(pc.field("libs"), Some("-L${libdir} -lglib-2.0 -lintl"));
        assert_eq!(pc.libraries(), vec!["glib-2.0", "intl"]);
    }

    #[test]
    fn test_untouched_content_survives() {
        let pc: PkgConfig = GLIB_PC.parse().unwrap();
        assert_eq!(pc.to_string(), GLIB_PC);
    }

    #[test]
    fn test_relocate_and_rename() {
        let mut pc: PkgConfig = GLIB_PC.parse().unwrap();
        pc.relocate("/tmp/build/_install", "/opt/pkgs/glib/2.51.1-3");
        pc.rename_library("glib-2.0", "glib");

        assert_eq!(pc.prefix(), Some("/opt/pkgs/glib/2.51.1-3"));
        assert_eq!(pc.variable("includedir"), Some("${prefix}/include"));
        assert_eq!(pc.libraries(), vec!["glib", "intl"]);
        assert!(!pc.to_string().contains("/tmp/build"));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let mut once: PkgConfig = GLIB_PC.parse().unwrap();
        once.relocate("/tmp/build/_install", "/opt/glib");
        once.rename_library("glib-2.0", "glib");

        let mut twice = once.clone();
        twice.relocate("/tmp/build/_install", "/opt/glib");
        twice.rename_library("glib-2.0", "glib");

        assert_eq!(once.to_string(), twice.to_string());
    }

    #[test]
    fn test_set_prefix_when_missing() {
        let mut pc: PkgConfig = "Name: x\nLibs: -lx\n".parse().unwrap();
        pc.set_prefix("/opt/x");
        assert_eq!(pc.to_string(), "prefix=/opt/x\nName: x\nLibs: -lx\n");
    }

    #[test]
    fn test_rename_matches_whole_tokens() {
        let mut pc: PkgConfig = "Libs: -lglib-2.0 -lglib-2.0-extra\n".parse().unwrap();
        pc.rename_library("glib-2.0", "glib");
        assert_eq!(pc.field("Libs"), Some("-lglib -lglib-2.0-extra"));
    }
}
