//! # Assemble — Moduli File Assembly and Publication
//!
//! Builds an `/etc/ssh/moduli`-format file from every screened artifact in the
//! moduli directory:
//!
//! 1. Write a fresh snapshot `{target}_{timestamp}` (never reused, created
//!    with create-new semantics).
//! 2. Group screened artifacts by the bit-length parsed from their names and
//!    emit the groups in ascending order, so consumers see the weakest moduli
//!    first.
//! 3. Shuffle the records of each group uniformly. This hides whatever order
//!    the screener produced them in while keeping the grouping deterministic.
//! 4. Publish: point the stable `{target}` name at the snapshot.
//!
//! ## Atomic Publish
//!
//! The snapshot is fully written and synced before anything touches
//! `{target}`. Publication creates a symlink under a temporary sibling name and
//! renames it over `{target}`, so a reader that opens `{target}` sees either the
//! previous snapshot or the new one, never a partial file. A failed assembly
//! leaves the previous link untouched and deletes its own snapshot.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::artifact::{self, ArtifactKind};
use crate::error::{ModuliError, Result};

/// Leading text of the comment line written at the top of every assembled file.
pub const HEADER_MARKER: &str = "#/etc/ssh/moduli: moduli_assembly:";

/// Result of one assembly run.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// The timestamped snapshot that was written.
    pub path: PathBuf,
    /// The stable name now pointing at `path`.
    pub link: PathBuf,
    /// Records written per bit-length.
    pub records: BTreeMap<u32, usize>,
}

impl Assembly {
    pub fn total_records(&self) -> usize {
        self.records.values().sum()
    }
}

/// True for lines that carry a modulus record.
pub fn is_record(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with('#')
}

/// Assemble all screened artifacts in `moduli_dir` into a new snapshot next to
/// `target` and repoint `target` at it.
pub fn create_moduli_file<R: Rng + ?Sized>(
    moduli_dir: &Path,
    enabled: &[u32],
    target: &Path,
    rng: &mut R,
) -> Result<Assembly> {
    let link = absolute(target)?;
    let (file, snapshot, stamp) = artifact::create_unique(Utc::now(), |stamp| {
        let mut name = OsString::from(link.as_os_str());
        name.push("_");
        name.push(stamp);
        PathBuf::from(name)
    })?;

    let written = write_snapshot(file, &snapshot, &stamp, moduli_dir, enabled, rng)
        .and_then(|records| publish(&link, &snapshot).map(|()| records));
    let records_written = match written {
        Ok(records) => records,
        Err(e) => {
            // The previous link still stands; drop the half-written snapshot.
            if let Err(rm) = fs::remove_file(&snapshot) {
                warn!(path = %snapshot.display(), error = %rm, "could not remove incomplete snapshot");
            }
            return Err(e);
        }
    };

    let assembly = Assembly {
        path: snapshot,
        link,
        records: records_written,
    };
    info!(
        path = %assembly.path.display(),
        link = %assembly.link.display(),
        records = assembly.total_records(),
        groups = assembly.records.len(),
        "wrote moduli file"
    );
    Ok(assembly)
}

/// Write the header and every enabled screened record into `file`, grouped by
/// bit-length ascending and shuffled within each group. Returns the record
/// count per bit-length.
fn write_snapshot<R: Rng + ?Sized>(
    file: File,
    snapshot: &Path,
    stamp: &str,
    moduli_dir: &Path,
    enabled: &[u32],
    rng: &mut R,
) -> Result<BTreeMap<u32, usize>> {
    let mut groups: BTreeMap<u32, Vec<PathBuf>> = BTreeMap::new();
    for screened in artifact::scan_kind(moduli_dir, ArtifactKind::Screened)? {
        if !enabled.contains(&screened.bits()) {
            warn!(
                bits = screened.bits(),
                path = %screened.path.display(),
                "skipping screened file for a bit length that is not enabled"
            );
            continue;
        }
        groups.entry(screened.bits()).or_default().push(screened.path);
    }

    let mut out = BufWriter::new(file);
    let mut records_written = BTreeMap::new();
    writeln!(out, "{} {}", HEADER_MARKER, stamp).map_err(ModuliError::io("write", snapshot))?;
    for (bits, files) in &groups {
        let mut records = Vec::new();
        for path in files {
            let content = fs::read_to_string(path).map_err(ModuliError::io("read", path))?;
            records.extend(content.lines().filter(|l| is_record(l)).map(str::to_owned));
        }
        records.shuffle(&mut *rng);
        for record in &records {
            writeln!(out, "{}", record).map_err(ModuliError::io("write", snapshot))?;
        }
        records_written.insert(*bits, records.len());
    }
    out.flush().map_err(ModuliError::io("write", snapshot))?;
    out.get_ref()
        .sync_all()
        .map_err(ModuliError::io("sync", snapshot))?;
    Ok(records_written)
}

/// Point `link` at `snapshot`, replacing an existing file or symlink atomically.
pub fn publish(link: &Path, snapshot: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(link) {
        if meta.is_dir() {
            return Err(ModuliError::io("replace", link)(io::Error::new(
                io::ErrorKind::Other,
                "moduli file target is a directory",
            )));
        }
    }

    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = link.with_file_name(format!(".{}.link-{}", file_name, std::process::id()));
    match fs::remove_file(&staging) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(ModuliError::io("remove", &staging)(e)),
    }

    symlink(snapshot, &staging).map_err(ModuliError::io("link", &staging))?;
    if let Err(e) = fs::rename(&staging, link) {
        let _ = fs::remove_file(&staging);
        return Err(ModuliError::io("publish", link)(e));
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(ModuliError::io("resolve", path))?;
    Ok(cwd.join(path))
}
