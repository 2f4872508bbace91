//! Prediction adapter: encodes dwelling inputs and bands model outputs.

pub mod domain;
pub mod encoding;
pub mod service;

pub use domain::{BatchPrediction, BatchSummary, DpeLabel, PredictionResult, RowOutcome, Tier};
pub use encoding::{
    encode, DwellingInput, EncodingTable, RawInput, UnknownCategoryPolicy, FEATURES,
};
pub use service::{predict, predict_batch, predict_input, write_predictions};
