use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stvgd_kv::RedbStore;
use tracing::info;

use crate::error::TraceError;

/// Numeric rules applied when records enter the world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Allowed distance between a composition total and 100.
    /// `0.0` demands exact equality.
    pub composition_tolerance: f64,

    pub score_min: f64,
    pub score_max: f64,

    /// Accept negative per-contributor percentages as long as the total
    /// still balances.
    pub allow_negative_shares: bool,

    /// On production, require the declared output composition to match the
    /// quantity-weighted composition of the inputs.
    pub verify_derived_composition: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            composition_tolerance: 1e-3,
            score_min: -10.0,
            score_max: 10.0,
            allow_negative_shares: false,
            verify_derived_composition: false,
        }
    }
}

/// Configuration for a traceability service instance.
///
/// ```toml
/// data_dir = "/var/lib/stvgd"
///
/// [validation]
/// composition_tolerance = 0.001
/// verify_derived_composition = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StvgdConfig {
    /// Directory holding the world-state database.
    pub data_dir: Option<PathBuf>,

    /// Path to the redb database file.
    /// Defaults to `{data_dir}/stvgd.redb` if not specified.
    pub db_path: Option<PathBuf>,

    pub validation: ValidationPolicy,
}

impl StvgdConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TraceError::Config(format!("read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| TraceError::Config(format!("parse {}: {e}", path.display())))
    }

    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--data-dir=PATH`
    /// - `--db=PATH`
    /// - `--tolerance=FLOAT`
    /// - `--allow-negative-shares`
    /// - `--verify-derived-composition`
    ///
    /// Unknown flags are ignored.
    pub fn from_args(args: &[String]) -> Result<Self, TraceError> {
        let mut config = StvgdConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--data-dir=") {
                config.data_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--db=") {
                config.db_path = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--tolerance=") {
                let tolerance: f64 = val
                    .parse()
                    .map_err(|_| TraceError::Config(format!("--tolerance: not a number: {val}")))?;
                if !(tolerance >= 0.0) {
                    return Err(TraceError::Config(format!(
                        "--tolerance must be 0 or greater, got {val}"
                    )));
                }
                config.validation.composition_tolerance = tolerance;
            } else if arg == "--allow-negative-shares" {
                config.validation.allow_negative_shares = true;
            } else if arg == "--verify-derived-composition" {
                config.validation.verify_derived_composition = true;
            }
        }

        Ok(config)
    }

    /// Resolve the redb database path, falling back to `{data_dir}/stvgd.redb`.
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            self.data_dir
                .as_ref()
                .map(|d| d.join("stvgd.redb"))
                .unwrap_or_else(|| PathBuf::from("stvgd.redb"))
        })
    }

    /// Open the world state this configuration points at.
    pub fn open_store(&self) -> Result<RedbStore, TraceError> {
        let path = self.resolve_db_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TraceError::Config(format!("create {}: {e}", parent.display())))?;
        }
        info!("Opening world state at {}", path.display());
        RedbStore::open(&path).map_err(TraceError::store(format!("open {}", path.display())))
    }
}
