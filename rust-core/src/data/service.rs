//! Session service owning configuration and the table cache.
//!
//! One `Session` lives per dashboard user session; nothing is shared between
//! sessions. Tables and models are loaded on first use and kept until an
//! explicit reload.

use std::path::Path;
use std::sync::Arc;

use crate::common::config::AppCfg;
use crate::common::error::EngineResult;
use crate::inference::encoding::FEATURES;
use crate::model::repo_fs::FsModelRepo;
use crate::model::service::Models;

use super::cache::TableCache;
use super::domain::{SchemaSpec, Table};
use super::repo_fs::ExportOptions;
use super::schemas;

#[derive(Debug)]
pub struct Session {
    cfg: AppCfg,
    cache: TableCache,
    models: Option<Arc<Models>>,
}

impl Session {
    pub fn new(cfg: AppCfg) -> Self {
        Self {
            cfg,
            cache: TableCache::new(),
            models: None,
        }
    }

    pub fn cfg(&self) -> &AppCfg {
        &self.cfg
    }

    /// DPE housing dataset at the configured path.
    pub fn housing(&mut self) -> EngineResult<Arc<Table>> {
        let path = self.cfg.housing_csv.clone();
        self.cache.get_or_load(&path, &schemas::housing_spec())
    }

    /// Enedis consumption dataset at the configured path.
    pub fn enedis(&mut self) -> EngineResult<Arc<Table>> {
        let path = self.cfg.enedis_csv.clone();
        self.cache.get_or_load(&path, &schemas::enedis_spec())
    }

    /// Any other table, e.g. an uploaded batch-prediction file.
    pub fn table(&mut self, path: &Path, spec: &SchemaSpec) -> EngineResult<Arc<Table>> {
        self.cache.get_or_load(path, spec)
    }

    /// Explicit reload: re-read the file, keep the cached table if unchanged.
    pub fn reload(&mut self, path: &Path, spec: &SchemaSpec) -> EngineResult<Arc<Table>> {
        self.cache.refresh(path, spec)
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.cache.invalidate(path)
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    /// Classifier and regressor from the configured artefact paths. A failed
    /// load is not cached, so a fixed artefact is picked up on the next call.
    pub fn models(&mut self) -> EngineResult<Arc<Models>> {
        if let Some(models) = &self.models {
            return Ok(Arc::clone(models));
        }
        let models = Arc::new(Models::load(&FsModelRepo::new(&self.cfg, &FEATURES))?);
        self.models = Some(Arc::clone(&models));
        Ok(models)
    }

    pub fn reload_models(&mut self) -> EngineResult<Arc<Models>> {
        self.models = None;
        self.models()
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions::with_precision(self.cfg.export_precision)
    }
}
