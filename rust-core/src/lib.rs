//! Query and prediction core of the DPE housing dashboard.
//!
//! Loads the DPE housing and Enedis consumption datasets, answers filter and
//! aggregation queries over them, compares two dwellings, and wraps the
//! pre-trained label classifier and cost regressor.

pub mod api;
pub mod common;
pub mod compare;
pub mod data;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod query;

pub use common::{AppCfg, EngineError, EngineResult, ErrorCode};
pub use data::Session;
