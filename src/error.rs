// src/error.rs

//! Error types for the larder pipeline

use std::fmt;
use std::io;
use thiserror::Error;

/// Pipeline stage, used both as run state and as failure context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    Fetched,
    Patched,
    Configured,
    Built,
    Normalized,
    Merged,
    Assembled,
    Published,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Fetched => "fetch",
            Self::Patched => "patch",
            Self::Configured => "configure",
            Self::Built => "build",
            Self::Normalized => "normalize",
            Self::Merged => "merge",
            Self::Assembled => "assemble",
            Self::Published => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while cooking a recipe
#[derive(Error, Debug)]
pub enum Error {
    /// Downloaded content does not match the recipe checksum
    #[error("Integrity check failed for {url}: expected {expected}, got {actual}")]
    Integrity {
        url: String,
        expected: String,
        actual: String,
    },

    /// A patch did not apply cleanly
    #[error("Patch {patch} failed: {reason}")]
    Patch { patch: String, reason: String },

    /// The build system's configure step exited non-zero
    #[error("Configure failed for {target}:\n{output}")]
    Configure { target: String, output: String },

    /// The build system's build or install step exited non-zero
    #[error("Build failed for {target}:\n{output}")]
    Build { target: String, output: String },

    /// The build output does not have the expected layout
    #[error("Normalize failed for {target}: {reason}")]
    Normalize { target: String, reason: String },

    /// Architecture merge failed or an input is missing
    #[error("Merge failed: {0}")]
    Merge(String),

    /// Requested platform is not one we build for
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    /// A declared dependency package is not installed under the dependency root
    #[error("Dependency not available: {0}")]
    MissingDependency(String),

    /// Refusing to overwrite a published package
    #[error("Package already exists: {0}")]
    AlreadyExists(String),

    /// Linkage inspection failed or found violations
    #[error("Linkage check failed: {0}")]
    Linkage(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A pipeline stage failed
    #[error("{stage} stage failed: {source}")]
    Failed {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the stage it occurred in
    ///
    /// Already-wrapped errors keep their original stage.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            Self::Failed { .. } => self,
            other => Self::Failed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, with any stage wrapping removed
    pub fn cause(&self) -> &Error {
        match self {
            Self::Failed { source, .. } => source.cause(),
            other => other,
        }
    }

    /// The stage this error was reported from, if it was wrapped
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        match e.into_io_error() {
            Some(io) => Self::Io(io),
            None => Self::Io(io::Error::other("filesystem loop while walking directory")),
        }
    }
}

/// Result type for larder operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_keeps_first_stage() {
        let err = Error::Merge("missing input".to_string())
            .at(Stage::Merged)
            .at(Stage::Assembled);
        assert_eq!(err.stage(), Some(Stage::Merged));
        assert!(matches!(err.cause(), Error::Merge(_)));
    }

    #[test]
    fn test_failed_message_names_stage() {
        let err = Error::Patch {
            patch: "fix.patch".to_string(),
            reason: "hunk 1 rejected".to_string(),
        }
        .at(Stage::Patched);
        let msg = err.to_string();
        assert!(msg.starts_with("patch stage failed"));
        assert!(msg.contains("hunk 1 rejected"));
    }
}
