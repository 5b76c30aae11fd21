// src/hash.rs

//! Source checksums
//!
//! Recipes pin every source archive by content hash. Checksums are written
//! as `algorithm:hex` (e.g. `sha256:1f8e40...`); a bare hex string is
//! taken as SHA-256.

use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Digest length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(ChecksumError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Malformed checksum strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("invalid digest length: expected {expected} hex chars, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid hex in digest: {0}")]
    InvalidHex(String),
}

/// An expected or computed content hash
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: HashAlgorithm, digest: &str) -> Result<Self, ChecksumError> {
        let expected = algorithm.output_len() * 2;
        if digest.len() != expected {
            return Err(ChecksumError::InvalidLength {
                expected,
                got: digest.len(),
            });
        }
        if hex::decode(digest).is_err() {
            return Err(ChecksumError::InvalidHex(digest.to_string()));
        }
        Ok(Self {
            algorithm,
            digest: digest.to_lowercase(),
        })
    }

    /// Parse `algorithm:hex`, or bare hex as SHA-256
    pub fn parse(s: &str) -> Result<Self, ChecksumError> {
        match s.split_once(':') {
            Some((algo, digest)) => Self::new(algo.parse()?, digest),
            None => Self::new(HashAlgorithm::Sha256, s),
        }
    }

    /// Hash a file with this checksum's algorithm and compare
    ///
    /// Returns the actual checksum either way so callers can report it.
    pub fn verify_file(&self, path: &Path) -> io::Result<(bool, Checksum)> {
        let actual = hash_file(self.algorithm, path)?;
        Ok((actual == *self, actual))
    }

    /// Cache-safe file name for content with this checksum
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.algorithm, self.digest)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

enum HasherState {
    Sha256(Sha256),
    Sha512(Sha512),
}

/// Stream a reader through the given algorithm
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Checksum> {
    let mut state = match algorithm {
        HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
        HashAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
    };
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        match &mut state {
            HasherState::Sha256(h) => h.update(&buffer[..n]),
            HasherState::Sha512(h) => h.update(&buffer[..n]),
        }
    }

    let digest = match state {
        HasherState::Sha256(h) => hex::encode(h.finalize()),
        HasherState::Sha512(h) => hex::encode(h.finalize()),
    };
    Ok(Checksum { algorithm, digest })
}

pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<Checksum> {
    let mut file = File::open(path)?;
    hash_reader(algorithm, &mut file)
}
