//! Comparison engine: side-by-side deltas of two housing records.

pub mod domain;
pub mod service;

pub use domain::{
    Comparison, Direction, DirectionTable, Favorable, FieldDelta, RowSelector, DPE_COMPARE_FIELDS,
};
pub use service::{compare, compare_selected, record_label, resolve};
