//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use moduli_assembly::{Config, EngineError, PrimeEngine, ScreenRequest, Workspace};

/// Records produced per generator run.
pub const RECORDS_PER_RUN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Generate { bits: u32 },
    Screen { candidates: PathBuf, checkpoint: PathBuf, generator: u32 },
}

/// In-process stand-in for ssh-keygen.
///
/// `generate` writes [`RECORDS_PER_RUN`] well-formed records whose size field
/// is `bits - 1`. `screen` copies the candidates through unchanged, without a
/// trailing newline like the real tool. Either can be told to fail for a
/// bit-length; a failing screen leaves a checkpoint behind.
#[derive(Default)]
pub struct FakeEngine {
    pub fail_generate: Vec<u32>,
    pub fail_screen: Vec<u32>,
    pub calls: Mutex<Vec<Call>>,
    pub counter: Mutex<usize>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn generate_calls(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Generate { bits } => Some(bits),
                _ => None,
            })
            .collect()
    }

    pub fn screen_calls(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Screen { candidates, .. } => Some(candidates),
                _ => None,
            })
            .collect()
    }
}

fn bits_of(path: &Path) -> u32 {
    let name = path.file_name().unwrap().to_str().unwrap();
    name.split('.').next().unwrap().parse().unwrap()
}

impl PrimeEngine for FakeEngine {
    fn generate(&self, bits: u32, output: &Path) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(Call::Generate { bits });
        if self.fail_generate.contains(&bits) {
            return Err(EngineError::Exited {
                tool: "fake-keygen".into(),
                mode: "generate",
                status: "exit status: 1".into(),
            });
        }
        let mut counter = self.counter.lock().unwrap();
        let mut body = String::new();
        for _ in 0..RECORDS_PER_RUN {
            *counter += 1;
            body.push_str(&record(bits, *counter));
            body.push('\n');
        }
        fs::write(output, body)?;
        Ok(())
    }

    fn screen(&self, request: &ScreenRequest<'_>) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(Call::Screen {
            candidates: request.candidates.to_path_buf(),
            checkpoint: request.checkpoint.to_path_buf(),
            generator: request.generator,
        });
        if self.fail_screen.contains(&bits_of(request.candidates)) {
            fs::write(request.checkpoint, "checkpoint\n")?;
            return Err(EngineError::Exited {
                tool: "fake-keygen".into(),
                mode: "screen",
                status: "exit status: 255".into(),
            });
        }
        let content = fs::read_to_string(request.candidates)?;
        fs::write(request.output, content.trim_end())?;
        Ok(())
    }
}

/// A record line in `/etc/ssh/moduli` format.
pub fn record(bits: u32, serial: usize) -> String {
    format!("20240501120000 2 6 100 {} 2 {:064X}", bits - 1, serial)
}

/// Size field of a record line.
pub fn size_field(line: &str) -> u32 {
    line.split(' ').nth(4).unwrap().parse().unwrap()
}

/// Fresh workspace under a temporary root.
pub fn workspace(enabled: &[u32]) -> (tempfile::TempDir, Workspace) {
    let root = tempfile::tempdir().unwrap();
    let config = Config {
        auth_bitsizes: enabled.to_vec(),
        ..Config::default()
    };
    let ws = Workspace::new(root.path(), config).unwrap();
    ws.save().unwrap();
    let ws = Workspace::load_or_init(root.path()).unwrap();
    (root, ws)
}

/// Names of the entries in `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
