//! # Config — Per-User Configuration and Directory Layout
//!
//! A flat JSON document stored at `{root}/.moduli_assembly/.config`, where
//! `{root}` is the user's home directory unless overridden:
//!
//! ```json
//! {
//!   "generator_type": 2,
//!   "auth_bitsizes": [2048, 3072, 4096, 6144, 7680, 8192],
//!   "config_dir": ".moduli_assembly",
//!   "config_file": ".config",
//!   "moduli_dir": ".moduli",
//!   "moduli_file": "MODULI_FILE"
//! }
//! ```
//!
//! The stored names are resolved into paths by [`Workspace`]:
//!
//! ```text
//! {root}/{config_dir}/{config_file}   this document
//! {root}/{config_dir}/{moduli_dir}/   candidate, checkpoint and screened artifacts
//! {root}/{config_dir}/{moduli_file}   symlink to the newest assembled moduli file
//! ```
//!
//! An existing file on disk always wins over the built-in defaults. All six
//! attributes are required; a missing one is reported by name. Bit-lengths
//! written as JSON strings by older releases are accepted.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ConfigError, ModuliError, Result};
use crate::store::{self, ProtectedPaths};

pub const DEFAULT_CONFIG_DIR: &str = ".moduli_assembly";
pub const DEFAULT_CONFIG_FILE: &str = ".config";

/// Listing of screened outputs appended by each batch run.
pub const SCREENED_LOG: &str = "screened-files.txt";

/// Attributes every config document must carry.
pub const REQUIRED_ATTRIBUTES: [&str; 6] = [
    "generator_type",
    "auth_bitsizes",
    "config_dir",
    "config_file",
    "moduli_dir",
    "moduli_file",
];

/// Operational parameters of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Passed through to `ssh-keygen -M screen -O generator=`.
    pub generator_type: u32,
    /// Enabled modulus sizes in bits.
    #[serde(deserialize_with = "deserialize_bitsizes")]
    pub auth_bitsizes: Vec<u32>,
    pub config_dir: String,
    pub config_file: String,
    pub moduli_dir: String,
    pub moduli_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            generator_type: 2,
            auth_bitsizes: vec![2048, 3072, 4096, 6144, 7680, 8192],
            config_dir: DEFAULT_CONFIG_DIR.to_string(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            moduli_dir: ".moduli".to_string(),
            moduli_file: "MODULI_FILE".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BitsizeRepr {
    Number(u32),
    Text(String),
}

fn deserialize_bitsizes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
    use serde::de::Error;
    Vec::<BitsizeRepr>::deserialize(deserializer)?
        .into_iter()
        .map(|repr| match repr {
            BitsizeRepr::Number(n) => Ok(n),
            BitsizeRepr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid bit length {:?}", s))),
        })
        .collect()
}

impl Config {
    /// Parse and validate a config document read from `path`.
    pub fn from_json(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let parse_err = |source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        };
        let value: serde_json::Value = serde_json::from_str(raw).map_err(parse_err)?;
        if let Some(object) = value.as_object() {
            for attr in REQUIRED_ATTRIBUTES {
                if !object.contains_key(attr) {
                    return Err(ConfigError::MissingAttribute(attr.to_string()));
                }
            }
        }
        let config: Config = serde_json::from_value(value).map_err(parse_err)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator_type < 2 {
            return Err(ConfigError::InvalidValue {
                key: "generator_type",
                reason: format!("{} (must be at least 2)", self.generator_type),
            });
        }
        if self.auth_bitsizes.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "auth_bitsizes",
                reason: "no bit lengths enabled".into(),
            });
        }
        if self.auth_bitsizes.contains(&0) {
            return Err(ConfigError::InvalidValue {
                key: "auth_bitsizes",
                reason: "bit lengths must be positive".into(),
            });
        }
        for (key, value) in [
            ("config_dir", &self.config_dir),
            ("config_file", &self.config_file),
            ("moduli_dir", &self.moduli_dir),
            ("moduli_file", &self.moduli_file),
        ] {
            validate_name(key, value)?;
        }
        Ok(())
    }

    /// Enabled bit-lengths in ascending order.
    pub fn enabled_bitsizes(&self) -> Vec<u32> {
        let mut bits = self.auth_bitsizes.clone();
        bits.sort_unstable();
        bits.dedup();
        bits
    }
}

/// Names are single path components relative to their parent directory.
fn validate_name(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\');
    if bad {
        Err(ConfigError::InvalidValue {
            key,
            reason: format!("{:?} is not a plain file name", value),
        })
    } else {
        Ok(())
    }
}

/// Home directory of the current user.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or(ConfigError::NoHomeDirectory)
}

/// A config bound to the root directory its names resolve against.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: Config,
}

impl Workspace {
    /// Bind `config` to `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Workspace {
            root: root.into(),
            config,
        })
    }

    /// Location of the config document under `root`.
    pub fn default_config_path(root: &Path) -> PathBuf {
        root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE)
    }

    /// Read the config under `root`, falling back to the defaults. Writes nothing.
    pub fn open(root: &Path) -> Result<Self> {
        let path = Self::default_config_path(root);
        let config = if path.is_file() {
            let raw = fs::read_to_string(&path).map_err(ModuliError::io("read", &path))?;
            Config::from_json(&raw, &path)?
        } else {
            Config::default()
        };
        Ok(Workspace::new(root, config)?)
    }

    /// Load the config under `root`, or write the defaults if there is none.
    /// Creates the config and moduli directories.
    pub fn load_or_init(root: &Path) -> Result<Self> {
        let existing = Self::default_config_path(root).is_file();
        let workspace = Self::open(root)?;
        fs::create_dir_all(workspace.moduli_dir())
            .map_err(ModuliError::io("create", &workspace.moduli_dir()))?;
        if !existing {
            workspace.save()?;
            info!(path = %workspace.config_file().display(), "wrote default configuration");
        }
        Ok(workspace)
    }

    /// Write the config document atomically.
    pub fn save(&self) -> Result<()> {
        let path = self.config_file();
        let dir = self.config_dir();
        fs::create_dir_all(&dir).map_err(ModuliError::io("create", &dir))?;
        let json = self.export()?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).map_err(ModuliError::io("write", &tmp))?;
        fs::rename(&tmp, &path).map_err(ModuliError::io("replace", &path))?;
        Ok(())
    }

    /// The effective config as pretty-printed JSON.
    pub fn export(&self) -> Result<String> {
        self.config
            .to_json()
            .map_err(|source| ModuliError::from(ConfigError::Serialize { source }))
    }

    /// Delete the whole config directory, artifacts and assembled files included.
    pub fn remove(&self, protected: &ProtectedPaths) -> Result<bool> {
        let protected = protected.clone().with(&self.root);
        store::remove_directory(&self.config_dir(), &protected)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(&self.config.config_dir)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join(&self.config.config_file)
    }

    pub fn moduli_dir(&self) -> PathBuf {
        self.config_dir().join(&self.config.moduli_dir)
    }

    /// Stable name of the assembled moduli file.
    pub fn moduli_file(&self) -> PathBuf {
        self.config_dir().join(&self.config.moduli_file)
    }

    pub fn screened_log(&self) -> PathBuf {
        self.moduli_dir().join(SCREENED_LOG)
    }
}
