//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Each runner resolves
//! the workspace, binds it to `ssh-keygen` and reports the outcome. Errors
//! propagate to `main`, which exits non-zero.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use moduli_assembly::config::{self, Workspace};
use moduli_assembly::frequency;
use moduli_assembly::scripts::{self, BuilderOptions, ShellFlavor};
use moduli_assembly::{ModuliAssembly, SshKeygen};

use super::Cli;

// ── Context ─────────────────────────────────────────────────────

fn root_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.root_dir {
        Some(root) => Ok(root.clone()),
        None => Ok(config::home_dir()?),
    }
}

fn open_assembly(cli: &Cli) -> Result<ModuliAssembly<SshKeygen>> {
    let root = root_dir(cli)?;
    let workspace = Workspace::load_or_init(&root)
        .with_context(|| format!("loading configuration under {}", root.display()))?;
    let engine = SshKeygen::locate(cli.keygen_path.clone());
    info!(
        config = %workspace.config_file().display(),
        keygen = %engine.binary().display(),
        "workspace ready"
    );
    Ok(ModuliAssembly::new(workspace, engine))
}

// ── Pipeline ────────────────────────────────────────────────────

/// Run the batch pipeline. `--all` overrides any explicit bit lengths.
pub fn run_generate(cli: &Cli, all: bool, bitsizes: &[u32]) -> Result<()> {
    let assembly = open_assembly(cli)?;
    let requested = if all {
        assembly.workspace().config().enabled_bitsizes()
    } else {
        bitsizes.to_vec()
    };

    let report = assembly.run_batch(&requested)?;
    for path in &report.screened {
        println!("Screened File: {}", path.display());
    }
    if let Some(written) = &report.assembly {
        println!(
            "Wrote moduli file {} ({} records)",
            written.path.display(),
            written.total_records()
        );
    }
    if !report.is_success() {
        for failure in &report.failures {
            eprintln!("error: {}", failure);
        }
        bail!("{} stage(s) failed", report.failures.len());
    }
    Ok(())
}

pub fn run_restart(cli: &Cli, write: bool) -> Result<()> {
    let assembly = open_assembly(cli)?;
    let report = assembly.restart_candidate_screening()?;
    println!(
        "Restarted candidate screening: {} screened, {} failed",
        report.screened.len(),
        report.failed.len()
    );
    for path in &report.screened {
        println!("Screened File: {}", path.display());
    }

    if write {
        let written = assembly.create_moduli_file(None)?;
        println!("Wrote moduli file {}", written.path.display());
    }

    if !report.is_success() {
        for failure in &report.failed {
            eprintln!("error: {}", failure);
        }
        bail!("{} candidate(s) failed screening", report.failed.len());
    }
    Ok(())
}

pub fn run_write(cli: &Cli, output: Option<&Path>) -> Result<()> {
    let assembly = open_assembly(cli)?;
    let written = assembly.create_moduli_file(output)?;
    if written.total_records() == 0 {
        warn!("no screened moduli found, wrote header only");
    }
    println!(
        "Wrote moduli file {} -> {}",
        written.link.display(),
        written.path.display()
    );
    Ok(())
}

// ── Workspace Management ────────────────────────────────────────

pub fn run_clear(cli: &Cli) -> Result<()> {
    let assembly = open_assembly(cli)?;
    let removed = assembly.clear_artifacts()?;
    println!(
        "Removed {} entries from {}",
        removed,
        assembly.workspace().moduli_dir().display()
    );
    Ok(())
}

pub fn run_export_config(cli: &Cli) -> Result<()> {
    let root = root_dir(cli)?;
    let workspace = Workspace::open(&root)?;
    println!("{}", workspace.export()?);
    Ok(())
}

pub fn run_remove_config(cli: &Cli) -> Result<()> {
    let root = root_dir(cli)?;
    let workspace = Workspace::open(&root)?;
    let assembly = ModuliAssembly::new(workspace, SshKeygen::locate(cli.keygen_path.clone()));
    let dir = assembly.workspace().config_dir();
    if assembly.remove_config()? {
        println!("Removed {}", dir.display());
    } else {
        println!("Nothing to remove at {}", dir.display());
    }
    Ok(())
}

// ── Reports ─────────────────────────────────────────────────────

pub fn run_frequency(cli: &Cli, file: &Path) -> Result<()> {
    let root = root_dir(cli)?;
    let workspace = Workspace::open(&root)?;
    let enabled = workspace.config().enabled_bitsizes();
    let table = frequency::moduli_frequency(file, &enabled)
        .with_context(|| format!("provided moduli file {} could not be read", file.display()))?;
    print!("{}", frequency::render_report(file, &table));
    Ok(())
}

/// Print a builder script, or with `frequency` the per-size counter for the
/// enabled bit lengths.
pub fn run_export_script(
    cli: &Cli,
    shell: ShellFlavor,
    runs: u32,
    nice: i32,
    frequency: bool,
) -> Result<()> {
    if frequency {
        if shell != ShellFlavor::Bash {
            warn!(shell = %shell, "the frequency script is bash only");
        }
        let workspace = Workspace::open(&root_dir(cli)?)?;
        print!(
            "{}",
            scripts::frequency_script(&workspace.config().enabled_bitsizes())
        );
        return Ok(());
    }
    let opts = BuilderOptions {
        flavor: shell,
        runs,
        nice,
        ..Default::default()
    };
    print!("{}", scripts::builder_script(&opts));
    Ok(())
}
