pub mod artifact;
pub mod assemble;
pub mod config;
pub mod error;
pub mod frequency;
pub mod generate;
pub mod keygen;
pub mod pipeline;
pub mod screen;
pub mod scripts;
pub mod store;

pub use artifact::{Artifact, ArtifactKind, ArtifactName};
pub use assemble::Assembly;
pub use config::{Config, Workspace};
pub use error::{ConfigError, EngineError, ModuliError, Result};
pub use keygen::{PrimeEngine, ScreenRequest, SshKeygen};
pub use pipeline::{BatchReport, ModuliAssembly};
pub use screen::RestartReport;
pub use store::ProtectedPaths;
