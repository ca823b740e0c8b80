//! # Generate — Candidate Generation Stage
//!
//! Produces one candidate artifact per call by running the generator `count`
//! times and appending every run's output to the same file. Batching several
//! generator runs into one candidate gives the screener a larger pool per
//! bit-length (one run of `ssh-keygen -M generate` yields roughly 20 safe
//! primes after screening).
//!
//! Each run writes into a private temporary directory; the output is copied
//! into the candidate and the directory is removed. If a run fails the loop
//! stops and the error names the bit-length. Content appended by earlier runs
//! stays in the candidate file, which remains usable for a manual screening.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::artifact;
use crate::error::{ConfigError, ModuliError, Result};
use crate::keygen::PrimeEngine;

/// Reject bit-lengths that are not in the enabled set.
pub fn validate_bits(bits: u32, enabled: &[u32]) -> Result<(), ConfigError> {
    if enabled.contains(&bits) {
        Ok(())
    } else {
        Err(ConfigError::BitsizeNotEnabled {
            bits,
            enabled: enabled.to_vec(),
        })
    }
}

/// Run the generator `count` times for `bits`, accumulating all output in one
/// new candidate artifact under `moduli_dir`. Returns the candidate's path.
pub fn generate_candidates<E: PrimeEngine>(
    engine: &E,
    moduli_dir: &Path,
    enabled: &[u32],
    bits: u32,
    count: usize,
) -> Result<PathBuf> {
    validate_bits(bits, enabled)?;
    if count == 0 {
        return Err(ConfigError::InvalidCount.into());
    }

    let candidate = artifact::create_candidate(moduli_dir, bits)?;
    info!(bits, count, path = %candidate.path.display(), "generating candidates");

    for run in 1..=count {
        let scratch = tempfile::Builder::new()
            .prefix("moduli-generate-")
            .tempdir()
            .map_err(ModuliError::io("create scratch directory in", &std::env::temp_dir()))?;
        let output = scratch.path().join(format!("{}.raw", bits));

        engine
            .generate(bits, &output)
            .map_err(|source| ModuliError::Generate { bits, source })?;

        let appended = append_file(&output, &candidate.path)?;
        debug!(bits, run, bytes = appended, "appended generator output");
    }

    Ok(candidate.path)
}

/// Append the full contents of `src` to `dst`.
fn append_file(src: &Path, dst: &Path) -> Result<u64> {
    let mut input = File::open(src).map_err(ModuliError::io("read", src))?;
    let mut output = OpenOptions::new()
        .append(true)
        .open(dst)
        .map_err(ModuliError::io("append to", dst))?;
    io::copy(&mut input, &mut output).map_err(ModuliError::io("append to", dst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::keygen::ScreenRequest;
    use std::cell::Cell;
    use std::fs;

    const ENABLED: &[u32] = &[2048, 3072, 4096];

    /// Writes one line per run; fails on the run numbered `fail_on`.
    struct CountingEngine {
        runs: Cell<usize>,
        fail_on: Option<usize>,
    }

    impl CountingEngine {
        fn new(fail_on: Option<usize>) -> Self {
            CountingEngine {
                runs: Cell::new(0),
                fail_on,
            }
        }
    }

    impl PrimeEngine for CountingEngine {
        fn generate(&self, bits: u32, output: &Path) -> Result<(), EngineError> {
            let run = self.runs.get() + 1;
            self.runs.set(run);
            if self.fail_on == Some(run) {
                return Err(EngineError::Exited {
                    tool: "fake".into(),
                    mode: "generate",
                    status: "exit status: 1".into(),
                });
            }
            fs::write(output, format!("run{} {}\n", run, bits))?;
            Ok(())
        }

        fn screen(&self, _request: &ScreenRequest<'_>) -> Result<(), EngineError> {
            unreachable!("generation never screens")
        }
    }

    #[test]
    fn batches_all_runs_into_one_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(None);
        let path = generate_candidates(&engine, dir.path(), ENABLED, 3072, 3).unwrap();

        assert_eq!(engine.runs.get(), 3);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "run1 3072\nrun2 3072\nrun3 3072\n"
        );
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("3072.candidate_"), "{}", name);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn rejects_disabled_bits_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(None);
        let err = generate_candidates(&engine, dir.path(), ENABLED, 1024, 1).unwrap_err();
        assert!(matches!(
            err,
            ModuliError::Config(ConfigError::BitsizeNotEnabled { bits: 1024, .. })
        ));
        assert_eq!(engine.runs.get(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_zero_count() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(None);
        let err = generate_candidates(&engine, dir.path(), ENABLED, 2048, 0).unwrap_err();
        assert!(matches!(err, ModuliError::Config(ConfigError::InvalidCount)));
        assert_eq!(engine.runs.get(), 0);
    }

    #[test]
    fn failure_aborts_and_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(Some(2));
        let err = generate_candidates(&engine, dir.path(), ENABLED, 4096, 3).unwrap_err();

        assert_eq!(err.bits(), Some(4096));
        assert_eq!(engine.runs.get(), 2, "no runs after the failing one");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(leftovers.len(), 1);
        assert_eq!(fs::read_to_string(&leftovers[0]).unwrap(), "run1 4096\n");
    }
}
