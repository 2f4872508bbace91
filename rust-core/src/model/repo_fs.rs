//! Filesystem repository for model artefacts.
//!
//! Artefacts are JSON files at fixed, configurable paths. Anything that
//! prevents using one (missing file, bad JSON, inconsistent dimensions,
//! feature order drift) is reported as `ModelUnavailable`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{EngineError, EngineResult};

use super::domain::{ClassifierArtefact, LinearRegressor, ModelRepo};

pub struct FsModelRepo {
    classifier_path: PathBuf,
    regressor_path: PathBuf,
    features: Vec<String>,
}

impl FsModelRepo {
    /// Repository at the configured paths, checking artefacts against the
    /// expected feature order.
    pub fn new(cfg: &AppCfg, features: &[&str]) -> Self {
        Self {
            classifier_path: cfg.classifier_path.clone(),
            regressor_path: cfg.regressor_path.clone(),
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn classifier_path(&self) -> &Path {
        &self.classifier_path
    }

    pub fn regressor_path(&self) -> &Path {
        &self.regressor_path
    }

    pub fn put_classifier(&self, model: &ClassifierArtefact) -> EngineResult<()> {
        write_artefact(&self.classifier_path, model)
    }

    pub fn put_regressor(&self, model: &LinearRegressor) -> EngineResult<()> {
        write_artefact(&self.regressor_path, model)
    }

    fn check_features(&self, path: &Path, found: &[String]) -> EngineResult<()> {
        if found != self.features.as_slice() {
            return Err(unavailable(
                path,
                format!(
                    "artefact features {:?} do not match the encoder order {:?}",
                    found, self.features
                ),
            ));
        }
        Ok(())
    }
}

impl ModelRepo for FsModelRepo {
    fn classifier(&self) -> EngineResult<ClassifierArtefact> {
        let path = &self.classifier_path;
        let model: ClassifierArtefact = read_artefact(path)?;
        model.validate().map_err(|reason| unavailable(path, reason))?;
        self.check_features(path, model.features())?;
        info!(path = %path.display(), "classifier loaded");
        Ok(model)
    }

    fn regressor(&self) -> EngineResult<LinearRegressor> {
        let path = &self.regressor_path;
        let model: LinearRegressor = read_artefact(path)?;
        model.validate().map_err(|reason| unavailable(path, reason))?;
        self.check_features(path, &model.features)?;
        info!(path = %path.display(), "regressor loaded");
        Ok(model)
    }
}

fn unavailable(path: &Path, reason: impl Into<String>) -> EngineError {
    let reason = reason.into();
    warn!(path = %path.display(), reason = %reason, "model unavailable");
    EngineError::ModelUnavailable {
        path: path.to_path_buf(),
        reason,
    }
}

fn read_artefact<T: DeserializeOwned>(path: &Path) -> EngineResult<T> {
    if !path.exists() {
        return Err(unavailable(path, "file not found"));
    }
    let bytes = fs::read(path).map_err(|e| unavailable(path, e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| unavailable(path, e.to_string()))
}

fn write_artefact<T: Serialize>(path: &Path, model: &T) -> EngineResult<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;
    }
    let json = serde_json::to_vec_pretty(model)?;
    fs::write(path, json).map_err(|e| EngineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::domain::ThresholdClassifier;

    const FEATURES: [&str; 2] = ["surface", "conso_m2"];

    fn repo(root: &Path) -> FsModelRepo {
        FsModelRepo::new(&AppCfg::rooted_at(root), &FEATURES)
    }

    fn names() -> Vec<String> {
        FEATURES.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn round_trips_artefacts_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let clf = ClassifierArtefact::IntensityThreshold(ThresholdClassifier::intensity(
            names(),
            "conso_m2",
        ));
        let reg = LinearRegressor {
            features: names(),
            coefficients: vec![1.0, 2.0],
            intercept: 0.5,
        };
        repo.put_classifier(&clf).unwrap();
        repo.put_regressor(&reg).unwrap();
        assert_eq!(repo.classifier().unwrap(), clf);
        assert_eq!(repo.regressor().unwrap(), reg);
    }

    #[test]
    fn missing_file_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = repo(dir.path()).classifier().unwrap_err();
        match err {
            EngineError::ModelUnavailable { reason, .. } => assert_eq!(reason, "file not found"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn garbage_and_drifted_features_are_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        fs::create_dir_all(repo.regressor_path().parent().unwrap()).unwrap();
        fs::write(repo.regressor_path(), b"\x80\x03pickle").unwrap();
        assert!(matches!(
            repo.regressor().unwrap_err(),
            EngineError::ModelUnavailable { .. }
        ));

        let drifted = LinearRegressor {
            features: vec!["conso_m2".into(), "surface".into()],
            coefficients: vec![1.0, 2.0],
            intercept: 0.0,
        };
        repo.put_regressor(&drifted).unwrap();
        assert!(matches!(
            repo.regressor().unwrap_err(),
            EngineError::ModelUnavailable { .. }
        ));
    }
}
