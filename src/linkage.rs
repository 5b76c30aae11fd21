// src/linkage.rs

//! Shared library linkage inspection
//!
//! Reads a library's self-identifier, declared dependencies, search paths and
//! architectures straight from its ELF or Mach-O headers using goblin, then
//! checks them against the relocatability policy: dependencies are system
//! libraries or loader-relative, and no search path is absolute.

use crate::error::{Error, Result};
use goblin::Object;
use goblin::elf::Elf;
use goblin::elf::header::{EM_AARCH64, EM_X86_64};
use goblin::mach::{Mach, MachO, SingleArch};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

const CPU_TYPE_X86_64: u32 = 0x0100_0007;
const CPU_TYPE_ARM64: u32 = 0x0100_000c;

/// Container format of an inspected binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryFormat {
    Elf,
    MachO,
    /// Multi-architecture Mach-O
    Universal,
}

/// Linkage metadata declared by a binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkageReport {
    pub format: BinaryFormat,
    /// Install name (Mach-O) or soname (ELF)
    pub self_id: Option<String>,
    /// Libraries the binary asks the loader for
    pub dependencies: Vec<String>,
    /// `LC_RPATH`, `DT_RPATH` and `DT_RUNPATH` entries
    pub search_paths: Vec<String>,
    pub architectures: BTreeSet<String>,
}

impl LinkageReport {
    fn empty(format: BinaryFormat) -> Self {
        Self {
            format,
            self_id: None,
            dependencies: Vec::new(),
            search_paths: Vec::new(),
            architectures: BTreeSet::new(),
        }
    }

    fn absorb_macho(&mut self, macho: &MachO<'_>) {
        if self.self_id.is_none() {
            self.self_id = macho.name.map(str::to_string);
        }
        // goblin lists the binary itself as "self"
        for lib in macho.libs.iter().filter(|l| **l != "self") {
            push_unique(&mut self.dependencies, lib);
        }
        for rpath in &macho.rpaths {
            push_unique(&mut self.search_paths, rpath);
        }
        self.architectures
            .insert(macho_arch_name(macho.header.cputype).to_string());
    }

    fn absorb_elf(&mut self, elf: &Elf<'_>) {
        self.self_id = elf.soname.map(str::to_string);
        for lib in &elf.libraries {
            push_unique(&mut self.dependencies, lib);
        }
        for entry in elf.rpaths.iter().chain(elf.runpaths.iter()) {
            for path in entry.split(':').filter(|p| !p.is_empty()) {
                push_unique(&mut self.search_paths, path);
            }
        }
        let arch = match elf.header.e_machine {
            EM_X86_64 => "x86_64".to_string(),
            EM_AARCH64 => "arm64".to_string(),
            other => format!("elf-machine-{}", other),
        };
        self.architectures.insert(arch);
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

fn macho_arch_name(cputype: u32) -> String {
    match cputype {
        CPU_TYPE_X86_64 => "x86_64".to_string(),
        CPU_TYPE_ARM64 => "arm64".to_string(),
        other => format!("cputype-{:#x}", other),
    }
}

/// Inspect a shared library or executable
pub fn inspect(path: &Path) -> Result<LinkageReport> {
    let bytes = fs::read(path)?;
    inspect_bytes(&bytes)
        .map_err(|e| Error::Linkage(format!("{}: {}", path.display(), e)))
}

fn inspect_bytes(bytes: &[u8]) -> std::result::Result<LinkageReport, String> {
    match Object::parse(bytes).map_err(|e| e.to_string())? {
        Object::Elf(elf) => {
            let mut report = LinkageReport::empty(BinaryFormat::Elf);
            report.absorb_elf(&elf);
            Ok(report)
        }
        Object::Mach(Mach::Binary(macho)) => {
            let mut report = LinkageReport::empty(BinaryFormat::MachO);
            report.absorb_macho(&macho);
            Ok(report)
        }
        Object::Mach(Mach::Fat(multi)) => {
            let mut report = LinkageReport::empty(BinaryFormat::Universal);
            for arch in &multi {
                match arch.map_err(|e| e.to_string())? {
                    SingleArch::MachO(macho) => report.absorb_macho(&macho),
                    SingleArch::Archive(_) => {
                        return Err("universal binary contains a static archive".to_string());
                    }
                }
            }
            Ok(report)
        }
        _ => Err("not an ELF or Mach-O binary".to_string()),
    }
}

/// Architectures contained in a binary
pub fn architectures(path: &Path) -> Result<BTreeSet<String>> {
    Ok(inspect(path)?.architectures)
}

/// Which references count as system or in-package
#[derive(Debug, Clone)]
pub struct LinkagePolicy {
    pub system_prefixes: Vec<String>,
    pub relative_tokens: Vec<String>,
}

impl Default for LinkagePolicy {
    fn default() -> Self {
        Self {
            system_prefixes: ["/usr/lib/", "/System/", "/lib/", "/lib64/"]
                .map(String::from)
                .to_vec(),
            relative_tokens: ["@rpath/", "@loader_path/", "@executable_path/", "$ORIGIN/"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl LinkagePolicy {
    fn is_relative_token(&self, reference: &str) -> bool {
        self.relative_tokens.iter().any(|t| reference.starts_with(t))
    }

    /// A dependency is fine if it is a system library, loader-relative, or a
    /// bare soname the loader resolves through its search paths
    pub fn dependency_allowed(&self, dependency: &str) -> bool {
        !dependency.contains('/')
            || self.is_relative_token(dependency)
            || self.system_prefixes.iter().any(|p| dependency.starts_with(p))
    }

    /// Search paths must never be absolute
    pub fn search_path_allowed(&self, path: &str) -> bool {
        !path.starts_with('/')
    }

    /// The library's own identifier must not pin a build-machine path
    pub fn self_id_allowed(&self, id: &str) -> bool {
        !id.starts_with('/')
    }

    /// Every violation in a report; empty means relocatable
    pub fn check(&self, report: &LinkageReport) -> Vec<Violation> {
        let mut violations = Vec::new();
        if let Some(id) = &report.self_id
            && !self.self_id_allowed(id)
        {
            violations.push(Violation::SelfId(id.clone()));
        }
        for dep in &report.dependencies {
            if !self.dependency_allowed(dep) {
                violations.push(Violation::Dependency(dep.clone()));
            }
        }
        for path in &report.search_paths {
            if !self.search_path_allowed(path) {
                violations.push(Violation::SearchPath(path.clone()));
            }
        }
        violations
    }
}

/// A reference that breaks relocatability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    SelfId(String),
    Dependency(String),
    SearchPath(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfId(id) => write!(f, "absolute self-identifier: {}", id),
            Self::Dependency(dep) => write!(f, "non-system absolute dependency: {}", dep),
            Self::SearchPath(path) => write!(f, "absolute search path: {}", path),
        }
    }
}
