//! Evaluation metrics of the model pair.

use serde::Serialize;

/// Scores of the classifier and regressor against labelled records.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EvalSuite {
    /// Rows in the evaluated view.
    pub rows: usize,
    pub scored: usize,
    /// Rows without ground truth or that failed encoding.
    pub skipped: usize,
    pub accuracy: Option<f64>,
    /// Unweighted mean of per-label F1 over labels seen in truth or prediction.
    pub macro_f1: Option<f64>,
    /// `None` when the ground-truth cost has no variance.
    pub r2: Option<f64>,
}

/// Per-label confusion counts.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct LabelTally {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl LabelTally {
    pub fn f1(&self) -> f64 {
        let denom = 2 * self.tp + self.fp + self.fn_;
        if denom == 0 {
            0.0
        } else {
            2.0 * self.tp as f64 / denom as f64
        }
    }

    pub fn seen(&self) -> bool {
        self.tp + self.fp + self.fn_ > 0
    }
}
