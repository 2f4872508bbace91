//! Loaded model pair used by prediction and evaluation.

use std::time::Instant;

use tracing::info;

use crate::common::error::EngineResult;
use crate::common::log::elapsed_ms;

use super::domain::{ClassifierArtefact, LinearRegressor, ModelRepo};

/// Classifier and regressor loaded together; either failing fails both.
#[derive(Clone, Debug, PartialEq)]
pub struct Models {
    pub classifier: ClassifierArtefact,
    pub regressor: LinearRegressor,
}

impl Models {
    pub fn load(repo: &impl ModelRepo) -> EngineResult<Self> {
        let start = Instant::now();
        let classifier = repo.classifier()?;
        let regressor = repo.regressor()?;
        info!(duration_ms = elapsed_ms(start), "models ready");
        Ok(Self {
            classifier,
            regressor,
        })
    }
}
