//! # Error — Failure Taxonomy for the Moduli Pipeline
//!
//! Three families of failure surface from the library:
//!
//! - [`ConfigError`]: bad or missing configuration, or a request the
//!   configuration does not allow (unknown bit-length, zero count). Always
//!   raised before any external process is spawned.
//! - [`EngineError`]: the external `ssh-keygen` process could not be started
//!   or exited non-zero. Wrapped by [`ModuliError::Generate`] and
//!   [`ModuliError::Screen`] together with the bit-length being worked on.
//! - Filesystem failures: I/O errors tagged with the action and path, plus the
//!   protected-path guard used by the destructive operations.
//!
//! Stages return these to the caller; only the binary decides exit codes.

use std::io;
use std::path::{Path, PathBuf};

/// Configuration and request validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config required attribute `{0}` is missing")]
    MissingAttribute(String),

    #[error("config attribute `{key}` is invalid: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize configuration: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot determine home directory (set HOME or --root-dir)")]
    NoHomeDirectory,

    #[error("bit length {bits} is not enabled (enabled: {enabled:?})")]
    BitsizeNotEnabled { bits: u32, enabled: Vec<u32> },

    #[error("no bit lengths requested: use --all or --bitsizes <BITS>...")]
    NoBitsizes,

    #[error("candidate batch count must be positive")]
    InvalidCount,
}

/// Failures of the external key-generation tool.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} -M {mode} exited with {status}")]
    Exited {
        tool: String,
        mode: &'static str,
        status: String,
    },

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Top-level library error.
#[derive(Debug, thiserror::Error)]
pub enum ModuliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("error generating {bits}-bit candidates: {source}")]
    Generate {
        bits: u32,
        #[source]
        source: EngineError,
    },

    #[error("error screening candidates for {bits} bit length ({path}): {source}")]
    Screen {
        bits: u32,
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("not a {expected} artifact name: {name}")]
    ArtifactName { expected: &'static str, name: String },

    #[error("illegal path selected: {0} is protected")]
    ProtectedPath(PathBuf),

    #[error("supplied path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("{path}:{line}: malformed moduli record: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ModuliError {
    /// Adapter for `map_err` that tags an I/O error with what was being done and where.
    pub fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> ModuliError {
        let path = path.to_path_buf();
        move |source| ModuliError::Io {
            action,
            path,
            source,
        }
    }

    /// Bit-length the failure relates to, when it is a tool failure.
    pub fn bits(&self) -> Option<u32> {
        match self {
            ModuliError::Generate { bits, .. } | ModuliError::Screen { bits, .. } => Some(*bits),
            ModuliError::Config(ConfigError::BitsizeNotEnabled { bits, .. }) => Some(*bits),
            _ => None,
        }
    }
}

pub type Result<T, E = ModuliError> = std::result::Result<T, E>;
