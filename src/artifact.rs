//! # Artifact — Naming and Discovery of Pipeline Files
//!
//! Every file the pipeline leaves in the moduli directory encodes its state in
//! its name:
//!
//! ```text
//! {bits}.candidate_{timestamp}    raw candidates awaiting screening
//! .{bits}.candidate_{timestamp}   ssh-keygen checkpoint for the above
//! {bits}.screened_{timestamp}     vetted moduli, ready for assembly
//! ```
//!
//! The on-disk encoding is kept for compatibility with existing moduli
//! directories, but names are parsed exactly once into an [`ArtifactName`]
//! (bit-length, [`ArtifactKind`], timestamp) when the directory is listed.
//! Converting a candidate name into its screened name swaps the kind field of
//! the parsed value; it never does a substring replace on the raw name.
//!
//! ## Timestamps
//!
//! RFC 3339 UTC with microsecond precision and an explicit `+00:00` offset,
//! e.g. `2024-05-01T12:00:00.123456+00:00`. Several generator processes may
//! share one directory, so files are created with create-new semantics and the
//! timestamp is bumped by one microsecond on collision.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ModuliError, Result};

/// Attempts before giving up on finding a free timestamped name.
const MAX_NAME_ATTEMPTS: usize = 1_000;

/// Lifecycle state encoded in an artifact's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Candidate,
    Screened,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Candidate => "candidate",
            ArtifactKind::Screened => "screened",
        }
    }

    fn from_field(field: &str) -> Option<Self> {
        match field {
            "candidate" => Some(ArtifactKind::Candidate),
            "screened" => Some(ArtifactKind::Screened),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format `now` the way artifact and snapshot names carry it.
pub fn iso_utc_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// A parsed artifact file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub bits: u32,
    pub kind: ArtifactKind,
    /// Timestamp exactly as it appears in the name.
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
}

impl ArtifactName {
    pub fn new(bits: u32, kind: ArtifactKind, now: DateTime<Utc>) -> Self {
        ArtifactName {
            bits,
            kind,
            timestamp: iso_utc_timestamp(now),
            created_at: now,
        }
    }

    /// Parse `{bits}.{kind}_{timestamp}`. Returns `None` for anything else,
    /// including checkpoint files (leading `.`).
    pub fn parse(name: &str) -> Option<Self> {
        let (bits, rest) = name.split_once('.')?;
        if bits.is_empty() || !bits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let bits = bits.parse::<u32>().ok().filter(|&b| b > 0)?;
        let (kind, timestamp) = rest.split_once('_')?;
        let kind = ArtifactKind::from_field(kind)?;
        let created_at = DateTime::parse_from_rfc3339(timestamp)
            .ok()?
            .with_timezone(&Utc);
        Some(ArtifactName {
            bits,
            kind,
            timestamp: timestamp.to_string(),
            created_at,
        })
    }

    /// The same bit-length and timestamp under a different lifecycle state.
    pub fn with_kind(&self, kind: ArtifactKind) -> Self {
        ArtifactName {
            kind,
            ..self.clone()
        }
    }

    /// Name of the ssh-keygen checkpoint file belonging to this artifact.
    pub fn checkpoint(&self) -> String {
        format!(".{}", self)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}_{}", self.bits, self.kind, self.timestamp)
    }
}

/// `{bits}.candidate_{ISO8601_UTC(now)}`
pub fn candidate_name(bits: u32, now: DateTime<Utc>) -> String {
    ArtifactName::new(bits, ArtifactKind::Candidate, now).to_string()
}

/// Screened name for a candidate name, preserving bit-length and timestamp.
pub fn screened_name(candidate: &str) -> Result<String> {
    let parsed = parse_candidate(candidate)?;
    Ok(parsed.with_kind(ArtifactKind::Screened).to_string())
}

/// `.{candidate}`
pub fn checkpoint_name(candidate: &str) -> String {
    format!(".{}", candidate)
}

/// Parse a name that must be a candidate artifact.
pub fn parse_candidate(name: &str) -> Result<ArtifactName> {
    ArtifactName::parse(name)
        .filter(|n| n.kind == ArtifactKind::Candidate)
        .ok_or_else(|| ModuliError::ArtifactName {
            expected: "candidate",
            name: name.to_string(),
        })
}

/// A pipeline file found in the moduli directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: ArtifactName,
    pub path: PathBuf,
}

impl Artifact {
    pub fn bits(&self) -> u32 {
        self.name.bits
    }

    pub fn kind(&self) -> ArtifactKind {
        self.name.kind
    }

    /// Path of the screened sibling of this artifact.
    pub fn screened_path(&self) -> PathBuf {
        self.sibling(&self.name.with_kind(ArtifactKind::Screened).to_string())
    }

    /// Path of the checkpoint sibling of this artifact.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.sibling(&self.name.checkpoint())
    }

    fn sibling(&self, name: &str) -> PathBuf {
        match self.path.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Build an artifact from an existing path, validating its name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = ArtifactName::parse(path.file_name()?.to_str()?)?;
        Some(Artifact {
            name,
            path: path.to_path_buf(),
        })
    }
}

/// List every artifact directly under `dir`, ordered by bit-length, then
/// creation time. Subdirectories, symlinks and unparseable names are ignored.
pub fn scan(dir: &Path) -> Result<Vec<Artifact>> {
    let entries = fs::read_dir(dir).map_err(ModuliError::io("list", dir))?;
    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(ModuliError::io("list", dir))?;
        let file_type = entry
            .file_type()
            .map_err(ModuliError::io("stat", &entry.path()))?;
        if !file_type.is_file() {
            continue;
        }
        if let Some(artifact) = Artifact::from_path(&entry.path()) {
            artifacts.push(artifact);
        }
    }
    artifacts.sort_by(|a, b| {
        (a.name.bits, a.name.created_at, &a.name.timestamp).cmp(&(
            b.name.bits,
            b.name.created_at,
            &b.name.timestamp,
        ))
    });
    Ok(artifacts)
}

/// Artifacts of a single kind, in [`scan`] order.
pub fn scan_kind(dir: &Path, kind: ArtifactKind) -> Result<Vec<Artifact>> {
    Ok(scan(dir)?.into_iter().filter(|a| a.kind() == kind).collect())
}

/// Create a new empty file whose name embeds a timestamp, retrying with a
/// later timestamp while the name is taken.
///
/// Returns the open file, its path and the timestamp that was used.
pub fn create_unique<F>(start: DateTime<Utc>, path_for: F) -> Result<(File, PathBuf, String)>
where
    F: Fn(&str) -> PathBuf,
{
    let mut now = start;
    for _ in 0..MAX_NAME_ATTEMPTS {
        let stamp = iso_utc_timestamp(now);
        let path = path_for(&stamp);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path, stamp)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                now = now + Duration::microseconds(1);
            }
            Err(e) => return Err(ModuliError::io("create", &path)(e)),
        }
    }
    let path = path_for(&iso_utc_timestamp(now));
    Err(ModuliError::Io {
        action: "create",
        path,
        source: io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free timestamped name after repeated attempts",
        ),
    })
}

/// Create an empty candidate artifact for `bits` in `dir`.
pub fn create_candidate(dir: &Path, bits: u32) -> Result<Artifact> {
    let (_file, path, stamp) = create_unique(Utc::now(), |stamp| {
        dir.join(format!("{}.{}_{}", bits, ArtifactKind::Candidate, stamp))
    })?;
    Artifact::from_path(&path).ok_or_else(|| ModuliError::ArtifactName {
        expected: "candidate",
        name: format!("{}.{}_{}", bits, ArtifactKind::Candidate, stamp),
    })
}
