//! # Screen — Safe-Prime Screening and Restart Recovery
//!
//! Screening turns one candidate artifact into one screened artifact:
//!
//! ```text
//! 3072.candidate_T ──ssh-keygen -M screen──▶ 3072.screened_T
//!        │                                        ▲
//!        └── checkpoint .3072.candidate_T ────────┘ (resume state)
//! ```
//!
//! The candidate is deleted only after the screener exits successfully. A
//! failed or killed screening run leaves both the candidate and the checkpoint
//! behind, so [`restart_candidate_screening`] can find the candidate by name and
//! hand the same checkpoint back to the tool, which resumes instead of starting
//! over. There is no separate journal: the directory listing is the state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::artifact::{self, Artifact, ArtifactKind};
use crate::error::{ModuliError, Result};
use crate::keygen::{PrimeEngine, ScreenRequest};

/// Screen one candidate artifact. On success the candidate (and any leftover
/// checkpoint) is removed and the screened artifact's path is returned.
pub fn screen_candidates<E: PrimeEngine>(
    engine: &E,
    generator: u32,
    candidate_path: &Path,
) -> Result<PathBuf> {
    let name = candidate_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let candidate = Artifact {
        name: artifact::parse_candidate(name)?,
        path: candidate_path.to_path_buf(),
    };
    screen_artifact(engine, generator, &candidate)
}

fn screen_artifact<E: PrimeEngine>(
    engine: &E,
    generator: u32,
    candidate: &Artifact,
) -> Result<PathBuf> {
    let bits = candidate.bits();
    if !candidate.path.is_file() {
        return Err(ModuliError::io("screen", &candidate.path)(io::Error::from(
            io::ErrorKind::NotFound,
        )));
    }

    let checkpoint = candidate.checkpoint_path();
    let screened = candidate.screened_path();
    if checkpoint.exists() {
        info!(bits, checkpoint = %checkpoint.display(), "resuming screening from checkpoint");
    }
    info!(
        bits,
        generator,
        candidate = %candidate.path.display(),
        "screening candidates for safe primes"
    );

    let request = ScreenRequest {
        generator,
        candidates: &candidate.path,
        checkpoint: &checkpoint,
        output: &screened,
    };
    engine
        .screen(&request)
        .map_err(|source| ModuliError::Screen {
            bits,
            path: candidate.path.clone(),
            source,
        })?;

    // The screened file is now the artifact of record.
    fs::remove_file(&candidate.path).map_err(ModuliError::io("remove", &candidate.path))?;
    remove_if_present(&checkpoint)?;

    info!(bits, screened = %screened.display(), "screening complete");
    Ok(screened)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ModuliError::io("remove", path)(e)),
    }
}

/// Outcome of a restart scan.
#[derive(Debug, Default)]
pub struct RestartReport {
    /// Screened artifacts produced by this scan, in processing order.
    pub screened: Vec<PathBuf>,
    /// Candidates whose screening failed again; they stay on disk.
    pub failed: Vec<ModuliError>,
}

impl RestartReport {
    /// Number of candidates the scan found.
    pub fn attempted(&self) -> usize {
        self.screened.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Screen every candidate artifact left in `moduli_dir`, in ascending
/// bit-length then timestamp order. Failures are collected and the scan moves
/// on to the next candidate.
pub fn restart_candidate_screening<E: PrimeEngine>(
    engine: &E,
    generator: u32,
    moduli_dir: &Path,
) -> Result<RestartReport> {
    let candidates = artifact::scan_kind(moduli_dir, ArtifactKind::Candidate)?;
    info!(found = candidates.len(), dir = %moduli_dir.display(), "restarting candidate screening");

    let mut report = RestartReport::default();
    for candidate in &candidates {
        match screen_artifact(engine, generator, candidate) {
            Ok(path) => report.screened.push(path),
            Err(e) => {
                warn!(bits = candidate.bits(), error = %e, "screening failed, candidate kept for restart");
                report.failed.push(e);
            }
        }
    }
    Ok(report)
}
