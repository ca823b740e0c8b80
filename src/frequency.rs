//! Frequency distribution of modulus sizes in an `/etc/ssh/moduli`-format file.
//!
//! Each record line is `timestamp type tests tries size generator modulus`;
//! the size field is one less than the nominal bit-length (a 3072-bit modulus
//! is recorded as `3071`). Comment lines, blank lines and lines starting with a
//! space are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{ModuliError, Result};

/// System moduli file read when no path is given.
pub const SYSTEM_MODULI_FILE: &str = "/etc/ssh/moduli";

/// One parsed modulus record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuliRecord {
    pub timestamp: String,
    pub kind: u32,
    pub tests: u32,
    pub tries: u32,
    pub size: u32,
    pub generator: String,
    pub modulus: String,
}

impl ModuliRecord {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(format!("expected 7 fields, found {}", fields.len()));
        }
        let number = |idx: usize, name: &str| {
            fields[idx]
                .parse::<u32>()
                .map_err(|_| format!("{} field {:?} is not a number", name, fields[idx]))
        };
        Ok(ModuliRecord {
            timestamp: fields[0].to_string(),
            kind: number(1, "type")?,
            tests: number(2, "tests")?,
            tries: number(3, "tries")?,
            size: number(4, "size")?,
            generator: fields[5].to_string(),
            modulus: fields[6].to_string(),
        })
    }

    /// Nominal bit-length of the modulus.
    pub fn bits(&self) -> u32 {
        self.size + 1
    }
}

fn is_counted(line: &str) -> bool {
    !(line.starts_with('#') || line.starts_with(' ') || line.trim().is_empty())
}

/// Count of records per size field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: BTreeMap<u32, usize>,
}

impl FrequencyTable {
    /// A table with a zero row for each enabled bit-length, keyed by size field.
    pub fn seeded(enabled: &[u32]) -> Self {
        let counts = enabled
            .iter()
            .filter(|&&bits| bits > 0)
            .map(|&bits| (bits - 1, 0))
            .collect();
        FrequencyTable { counts }
    }

    /// Tally every record in `text`. `path` only labels errors.
    pub fn tally(&mut self, text: &str, path: &Path) -> Result<usize> {
        let mut counted = 0;
        for (idx, line) in text.lines().enumerate() {
            if !is_counted(line) {
                continue;
            }
            let record = ModuliRecord::parse(line).map_err(|reason| ModuliError::MalformedRecord {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            })?;
            *self.counts.entry(record.size).or_default() += 1;
            counted += 1;
        }
        Ok(counted)
    }

    pub fn count(&self, size: u32) -> usize {
        self.counts.get(&size).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.counts.iter().map(|(&size, &count)| (size, count))
    }
}

impl fmt::Display for FrequencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mod  Count")?;
        for (size, count) in self.iter() {
            writeln!(f, "{} {}", size, count)?;
        }
        Ok(())
    }
}

/// Frequency distribution of `path`, seeded with the enabled bit-lengths.
pub fn moduli_frequency(path: &Path, enabled: &[u32]) -> Result<FrequencyTable> {
    let text = fs::read_to_string(path).map_err(ModuliError::io("read", path))?;
    let mut table = FrequencyTable::seeded(enabled);
    table.tally(&text, path)?;
    Ok(table)
}

/// Heading and table as printed by the `frequency` command.
pub fn render_report(path: &Path, table: &FrequencyTable) -> String {
    format!("\nModulus Frequency of {}:\n{}", path.display(), table)
}
