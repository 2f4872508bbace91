//! Model collaborators: classifier/regressor contracts and artefact storage.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Classifier, ClassifierArtefact, EncodedRow, LinearRegressor, ModelRepo, Regressor};
pub use repo_fs::FsModelRepo;
pub use service::Models;
