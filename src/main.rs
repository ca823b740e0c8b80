//! # Main — CLI Entry Point
//!
//! Parses the command line, initialises logging and hands each subcommand to
//! its runner in `cli.rs`.
//!
//! ## Subcommands
//!
//! `generate` runs the full pipeline (generate, screen, assemble) for the
//! requested bit-lengths. `restart` resumes screening left behind by an
//! interrupted run. `write` assembles the moduli file from current screened
//! artifacts. `clear`, `export-config` and `remove-config` manage the
//! per-user directory. `frequency` and `export-script` are reporting helpers.
//!
//! ## Global Options
//!
//! - `--root-dir` / `MODULI_ASSEMBLY_ROOT`: directory holding `.moduli_assembly`
//!   (default: the user's home).
//! - `--keygen-path` / `MODULI_ASSEMBLY_KEYGEN`: `ssh-keygen` binary (auto-detected
//!   from PATH if not set).

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use moduli_assembly::scripts::ShellFlavor;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "moduli-assembly",
    version,
    about = "Build SSH2 Diffie-Hellman moduli files with ssh-keygen"
)]
struct Cli {
    /// Directory containing .moduli_assembly (defaults to $HOME)
    #[arg(long, global = true, env = "MODULI_ASSEMBLY_ROOT")]
    root_dir: Option<PathBuf>,

    /// Path to the ssh-keygen binary (auto-detected from PATH if not set)
    #[arg(long, global = true, env = "MODULI_ASSEMBLY_KEYGEN")]
    keygen_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, screen and assemble moduli for the requested bit lengths
    Generate {
        /// Every enabled bit length (overrides --bitsizes)
        #[arg(short, long)]
        all: bool,
        /// Bit lengths to generate; repeat one to batch more runs into it
        #[arg(short, long, num_args = 1..)]
        bitsizes: Vec<u32>,
    },
    /// Restart screening of candidates left by an interrupted run
    Restart {
        /// Assemble the moduli file afterwards
        #[arg(short, long)]
        write: bool,
    },
    /// Write the moduli file from the current screened files
    Write {
        /// Stable output name (defaults to the configured moduli file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete every artifact in the moduli directory
    Clear,
    /// Print the effective configuration as JSON
    ExportConfig,
    /// Delete the configuration directory and everything in it
    RemoveConfig,
    /// Frequency distribution of modulus sizes in a moduli file
    Frequency {
        /// Moduli file to read
        #[arg(short, long, default_value = moduli_assembly::frequency::SYSTEM_MODULI_FILE)]
        file: PathBuf,
    },
    /// Print a shell script that runs several generation batches in parallel
    ExportScript {
        #[arg(long, value_enum, default_value_t = ShellFlavor::Bash)]
        shell: ShellFlavor,
        /// Parallel runs
        #[arg(long, default_value_t = 4)]
        runs: u32,
        /// Niceness of each run
        #[arg(long, default_value_t = 15)]
        nice: i32,
        /// Emit a bash script counting moduli per enabled size instead
        #[arg(long, conflicts_with_all = ["runs", "nice"])]
        frequency: bool,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { all, bitsizes } => cli::run_generate(&cli, *all, bitsizes),
        Commands::Restart { write } => cli::run_restart(&cli, *write),
        Commands::Write { output } => cli::run_write(&cli, output.as_deref()),
        Commands::Clear => cli::run_clear(&cli),
        Commands::ExportConfig => cli::run_export_config(&cli),
        Commands::RemoveConfig => cli::run_remove_config(&cli),
        Commands::Frequency { file } => cli::run_frequency(&cli, file),
        Commands::ExportScript {
            shell,
            runs,
            nice,
            frequency,
        } => cli::run_export_script(&cli, *shell, *runs, *nice, *frequency),
    }
}
