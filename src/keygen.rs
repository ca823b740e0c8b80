//! ssh-keygen subprocess integration for candidate generation and safe-prime
//! screening.
//!
//! OpenSSH's `ssh-keygen` implements both halves of moduli construction:
//!
//! - `ssh-keygen -M generate -O bits=N out` sieves raw candidates of N bits.
//! - `ssh-keygen -M screen -O generator=G -O checkpoint=C -f in out` runs the
//!   safe-prime tests and writes vetted records. When `C` exists the tool
//!   resumes from it, which is what makes interrupted screening restartable.
//!
//! The pipeline talks to the tool through the [`PrimeEngine`] trait so it can be
//! driven by a test double. Both invocations block until the process exits and
//! impose no timeout; screening 8192-bit candidates takes hours. The tool's
//! stdout/stderr are inherited so its progress output reaches the operator.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::EngineError;

/// Arguments for one screening run.
#[derive(Debug, Clone, Copy)]
pub struct ScreenRequest<'a> {
    pub generator: u32,
    pub candidates: &'a Path,
    pub checkpoint: &'a Path,
    pub output: &'a Path,
}

/// The external prime generation and screening engine.
pub trait PrimeEngine {
    /// Write raw candidate moduli of `bits` bits to `output`.
    fn generate(&self, bits: u32, output: &Path) -> Result<(), EngineError>;

    /// Screen the candidates in `request.candidates` into `request.output`,
    /// recording resume state in `request.checkpoint`.
    fn screen(&self, request: &ScreenRequest<'_>) -> Result<(), EngineError>;
}

impl<E: PrimeEngine + ?Sized> PrimeEngine for &E {
    fn generate(&self, bits: u32, output: &Path) -> Result<(), EngineError> {
        (**self).generate(bits, output)
    }

    fn screen(&self, request: &ScreenRequest<'_>) -> Result<(), EngineError> {
        (**self).screen(request)
    }
}

/// `ssh-keygen` driven as a subprocess.
#[derive(Debug, Clone)]
pub struct SshKeygen {
    binary: PathBuf,
}

impl SshKeygen {
    pub const TOOL: &'static str = "ssh-keygen";

    pub fn new(binary: impl Into<PathBuf>) -> Self {
        SshKeygen {
            binary: binary.into(),
        }
    }

    /// Use the configured binary if it exists, otherwise whatever `ssh-keygen`
    /// resolves to on PATH. A missing binary surfaces as a spawn error at the
    /// first invocation.
    pub fn locate(configured: Option<PathBuf>) -> Self {
        if let Some(path) = configured {
            if path.exists() {
                return SshKeygen::new(path);
            }
            tracing::warn!(path = %path.display(), "configured ssh-keygen not found, falling back to PATH");
        }
        SshKeygen::new(find_in_path(Self::TOOL).unwrap_or_else(|| PathBuf::from(Self::TOOL)))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn generate_command(&self, bits: u32, output: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-M")
            .arg("generate")
            .arg("-O")
            .arg(format!("bits={}", bits))
            .arg(output);
        cmd
    }

    pub fn screen_command(&self, request: &ScreenRequest<'_>) -> Command {
        let mut checkpoint = std::ffi::OsString::from("checkpoint=");
        checkpoint.push(request.checkpoint);
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-M")
            .arg("screen")
            .arg("-O")
            .arg(format!("generator={}", request.generator))
            .arg("-O")
            .arg(checkpoint)
            .arg("-f")
            .arg(request.candidates)
            .arg(request.output);
        cmd
    }

    fn run(&self, mut cmd: Command, mode: &'static str) -> Result<(), EngineError> {
        let tool = self.binary.display().to_string();
        let status = cmd
            .stdin(Stdio::null())
            .status()
            .map_err(|source| EngineError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Exited {
                tool,
                mode,
                status: status.to_string(),
            })
        }
    }
}

impl Default for SshKeygen {
    fn default() -> Self {
        SshKeygen::new(Self::TOOL)
    }
}

impl PrimeEngine for SshKeygen {
    fn generate(&self, bits: u32, output: &Path) -> Result<(), EngineError> {
        self.run(self.generate_command(bits, output), "generate")
    }

    fn screen(&self, request: &ScreenRequest<'_>) -> Result<(), EngineError> {
        self.run(self.screen_command(request), "screen")
    }
}

/// Search for a binary in PATH.
fn find_in_path(name: &str) -> Option<PathBuf> {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| PathBuf::from(s.trim()))
        .filter(|p| p.exists())
}
