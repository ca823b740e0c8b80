//! # Pipeline — Bound Context and Batch Orchestration
//!
//! [`ModuliAssembly`] binds a [`Workspace`] (config plus resolved directories),
//! a [`PrimeEngine`] and the protected-path denylist. Its methods are thin
//! wrappers that feed the stage functions their explicit parameters; there is
//! no global state.
//!
//! ## Batch Run
//!
//! [`ModuliAssembly::run_batch`] is the full pipeline behind `generate`:
//!
//! ```text
//! requested [3072, 4096, 3072]
//!   └─ plan ──────────▶ {3072: 2, 4096: 1}    (validated, ascending)
//!        └─ generate ─▶ one candidate per bit-length
//!             └─ screen ▶ one screened file per candidate, logged
//!                  └─ assemble ▶ MODULI_FILE -> MODULI_FILE_{timestamp}
//! ```
//!
//! Every request is validated before the first process is spawned. A failure
//! in one bit-length is recorded and the batch carries on; the moduli file is
//! assembled from whatever screened artifacts exist at the end.

use rand::Rng;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::assemble::{self, Assembly};
use crate::config::Workspace;
use crate::error::{ConfigError, ModuliError, Result};
use crate::generate::{self, validate_bits};
use crate::keygen::PrimeEngine;
use crate::screen::{self, RestartReport};
use crate::store::{self, ProtectedPaths};

/// Validate `requested` against `enabled` and count repeats. Duplicates
/// become the number of generator runs batched into that bit-length's
/// candidate.
pub fn plan_batches(requested: &[u32], enabled: &[u32]) -> Result<BTreeMap<u32, usize>, ConfigError> {
    if requested.is_empty() {
        return Err(ConfigError::NoBitsizes);
    }
    let mut plan = BTreeMap::new();
    for &bits in requested {
        validate_bits(bits, enabled)?;
        *plan.entry(bits).or_insert(0) += 1;
    }
    Ok(plan)
}

/// Outcome of [`ModuliAssembly::run_batch`].
#[derive(Debug)]
pub struct BatchReport {
    pub plan: BTreeMap<u32, usize>,
    pub screened: Vec<PathBuf>,
    pub failures: Vec<ModuliError>,
    pub assembly: Option<Assembly>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.assembly.is_some()
    }
}

pub struct ModuliAssembly<E: PrimeEngine> {
    workspace: Workspace,
    engine: E,
    protected: ProtectedPaths,
}

impl<E: PrimeEngine> ModuliAssembly<E> {
    pub fn new(workspace: Workspace, engine: E) -> Self {
        let protected = ProtectedPaths::default().with(workspace.root());
        ModuliAssembly {
            workspace,
            engine,
            protected,
        }
    }

    /// Replace the denylist used by the destructive operations.
    pub fn with_protected(mut self, protected: ProtectedPaths) -> Self {
        self.protected = protected;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn enabled(&self) -> Vec<u32> {
        self.workspace.config().enabled_bitsizes()
    }

    pub fn generate_candidates(&self, bits: u32, count: usize) -> Result<PathBuf> {
        generate::generate_candidates(
            &self.engine,
            &self.workspace.moduli_dir(),
            &self.enabled(),
            bits,
            count,
        )
    }

    pub fn screen_candidates(&self, candidate: &Path) -> Result<PathBuf> {
        screen::screen_candidates(&self.engine, self.workspace.config().generator_type, candidate)
    }

    pub fn restart_candidate_screening(&self) -> Result<RestartReport> {
        screen::restart_candidate_screening(
            &self.engine,
            self.workspace.config().generator_type,
            &self.workspace.moduli_dir(),
        )
    }

    /// Assemble into `target`, or the configured moduli file when `None`.
    pub fn create_moduli_file(&self, target: Option<&Path>) -> Result<Assembly> {
        self.create_moduli_file_with_rng(target, &mut rand::thread_rng())
    }

    pub fn create_moduli_file_with_rng<R: Rng + ?Sized>(
        &self,
        target: Option<&Path>,
        rng: &mut R,
    ) -> Result<Assembly> {
        let target = target
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workspace.moduli_file());
        assemble::create_moduli_file(&self.workspace.moduli_dir(), &self.enabled(), &target, rng)
    }

    pub fn clear_artifacts(&self) -> Result<usize> {
        store::clear_directory(&self.workspace.moduli_dir(), &self.protected)
    }

    pub fn remove_config(&self) -> Result<bool> {
        self.workspace.remove(&self.protected)
    }

    /// Generate, screen and assemble for the requested bit-lengths.
    pub fn run_batch(&self, requested: &[u32]) -> Result<BatchReport> {
        self.run_batch_with_rng(requested, &mut rand::thread_rng())
    }

    pub fn run_batch_with_rng<R: Rng + ?Sized>(
        &self,
        requested: &[u32],
        rng: &mut R,
    ) -> Result<BatchReport> {
        let plan = plan_batches(requested, &self.enabled())?;
        info!(batches = ?plan, "starting moduli batch");

        let mut failures = Vec::new();
        let mut candidates = Vec::new();
        for (&bits, &count) in &plan {
            match self.generate_candidates(bits, count) {
                Ok(path) => candidates.push(path),
                Err(e) => {
                    warn!(bits, error = %e, "generation failed, candidate left for restart");
                    failures.push(e);
                }
            }
        }

        let mut screened = Vec::new();
        for candidate in &candidates {
            match self.screen_candidates(candidate) {
                Ok(path) => {
                    if let Err(e) = self.log_screened(&path) {
                        warn!(error = %e, "could not record screened file in listing log");
                        failures.push(e);
                    }
                    screened.push(path);
                }
                Err(e) => {
                    warn!(error = %e, "screening failed, candidate kept for restart");
                    failures.push(e);
                }
            }
        }

        let assembly = match self.create_moduli_file_with_rng(None, rng) {
            Ok(assembly) => Some(assembly),
            Err(e) => {
                warn!(error = %e, "assembly failed");
                failures.push(e);
                None
            }
        };

        Ok(BatchReport {
            plan,
            screened,
            failures,
            assembly,
        })
    }

    fn log_screened(&self, screened: &Path) -> Result<()> {
        let log = self.workspace.screened_log();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .map_err(ModuliError::io("open", &log))?;
        writeln!(file, "Screened File: {}", screened.display()).map_err(ModuliError::io("write", &log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_counts_and_orders() {
        let enabled = [2048, 3072, 4096];
        let plan = plan_batches(&[4096, 3072, 3072], &enabled).unwrap();
        assert_eq!(plan.into_iter().collect::<Vec<_>>(), vec![(3072, 2), (4096, 1)]);
    }

    #[test]
    fn plan_rejects_unknown_before_anything_runs() {
        let err = plan_batches(&[3072, 1024], &[3072]).unwrap_err();
        assert!(matches!(err, ConfigError::BitsizeNotEnabled { bits: 1024, .. }));
    }

    #[test]
    fn plan_rejects_empty_request() {
        assert!(matches!(plan_batches(&[], &[3072]), Err(ConfigError::NoBitsizes)));
    }
}
