//! Runtime configuration loaded from the process environment.
//!
//! Relative file paths are resolved against `DPE_DATA_ROOT` so the dashboard
//! can be launched from any working directory.

use std::env;
use std::path::{Path, PathBuf};

use crate::common::error::{EngineError, EngineResult};

pub const DEFAULT_HOUSING_CSV: &str = "data/donnees_ademe_finales_nettoyees_69_final_pret.csv";
pub const DEFAULT_ENEDIS_CSV: &str = "data/donnees_enedis_finales_69.csv";
pub const DEFAULT_CLASSIFIER_PATH: &str = "models/classification_model.json";
pub const DEFAULT_REGRESSOR_PATH: &str = "models/regression_model.json";

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug, PartialEq)]
pub struct AppCfg {
    pub data_root: PathBuf,
    pub housing_csv: PathBuf,
    pub enedis_csv: PathBuf,
    pub classifier_path: PathBuf,
    pub regressor_path: PathBuf,
    /// `tracing` filter directive, e.g. `info` or `dpe_core=debug`.
    pub log_filter: String,
    /// Decimal places kept for floating values on export.
    pub export_precision: usize,
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> EngineResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let data_root = PathBuf::from(env_or("DPE_DATA_ROOT", "."));
        let resolve = |key: &str, default: &str| resolve_path(&data_root, &env_or(key, default));

        let precision_raw = env_or("DPE_EXPORT_PRECISION", "2");
        let export_precision = precision_raw.trim().parse::<usize>().map_err(|_| {
            EngineError::invalid(format!(
                "DPE_EXPORT_PRECISION must be a non-negative integer, got '{precision_raw}'"
            ))
        })?;

        Ok(Self {
            housing_csv: resolve("DPE_HOUSING_CSV", DEFAULT_HOUSING_CSV),
            enedis_csv: resolve("DPE_ENEDIS_CSV", DEFAULT_ENEDIS_CSV),
            classifier_path: resolve("DPE_CLASSIFIER_PATH", DEFAULT_CLASSIFIER_PATH),
            regressor_path: resolve("DPE_REGRESSOR_PATH", DEFAULT_REGRESSOR_PATH),
            log_filter: env_or("DPE_LOG", "info"),
            export_precision,
            data_root,
        })
    }

    /// Configuration rooted at `root` with every other value defaulted.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let data_root = root.as_ref().to_path_buf();
        Self {
            housing_csv: data_root.join(DEFAULT_HOUSING_CSV),
            enedis_csv: data_root.join(DEFAULT_ENEDIS_CSV),
            classifier_path: data_root.join(DEFAULT_CLASSIFIER_PATH),
            regressor_path: data_root.join(DEFAULT_REGRESSOR_PATH),
            log_filter: "info".to_string(),
            export_precision: 2,
            data_root,
        }
    }
}

fn resolve_path(root: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}
