//! Prediction results, label banding and batch summaries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::{EngineError, EngineResult, ErrorCode};

use super::encoding::EncodeWarning;

/// DPE energy label, `A` best to `G` worst.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum DpeLabel {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl DpeLabel {
    pub const ALL: [DpeLabel; 7] = [
        DpeLabel::A,
        DpeLabel::B,
        DpeLabel::C,
        DpeLabel::D,
        DpeLabel::E,
        DpeLabel::F,
        DpeLabel::G,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == raw.trim())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DpeLabel::A => "A",
            DpeLabel::B => "B",
            DpeLabel::C => "C",
            DpeLabel::D => "D",
            DpeLabel::E => "E",
            DpeLabel::F => "F",
            DpeLabel::G => "G",
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            DpeLabel::A | DpeLabel::B | DpeLabel::C => Tier::Good,
            DpeLabel::D | DpeLabel::E => Tier::Medium,
            DpeLabel::F | DpeLabel::G => Tier::Poor,
        }
    }

    /// Labels for which a renovation savings estimate is shown.
    pub fn needs_renovation(&self) -> bool {
        matches!(self, DpeLabel::E | DpeLabel::F | DpeLabel::G)
    }
}

impl fmt::Display for DpeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommendation tier derived from the label.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Good,
    Medium,
    Poor,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Good => "good",
            Tier::Medium => "medium",
            Tier::Poor => "poor",
        }
    }
}

/// Share of the predicted yearly cost saved by a renovation.
pub const RENOVATION_SAVINGS_RATE: f64 = 0.4;

const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassProbability {
    pub label: String,
    pub p: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: DpeLabel,
    /// In classifier class order, summing to one.
    pub probabilities: Option<Vec<ClassProbability>>,
    /// Predicted yearly cost of the five uses, in euros.
    pub cost: f64,
    pub tier: Tier,
    pub savings: Option<f64>,
    pub warnings: Vec<EncodeWarning>,
}

impl PredictionResult {
    pub fn new(
        label: DpeLabel,
        probabilities: Option<Vec<ClassProbability>>,
        cost: f64,
        warnings: Vec<EncodeWarning>,
    ) -> EngineResult<Self> {
        if let Some(probs) = &probabilities {
            let total: f64 = probs.iter().map(|c| c.p).sum();
            // NaN fails this comparison too.
            let sums_to_one = (total - 1.0).abs() <= PROBABILITY_TOLERANCE;
            if !sums_to_one {
                return Err(EngineError::invalid(format!(
                    "class probabilities sum to {total}, expected 1"
                )));
            }
        }
        Ok(Self {
            label,
            probabilities,
            cost,
            tier: label.tier(),
            savings: label
                .needs_renovation()
                .then(|| cost * RENOVATION_SAVINGS_RATE),
            warnings,
        })
    }

    /// Probabilities as percentages with one decimal, e.g. `("D", "61.2%")`.
    pub fn probability_percentages(&self) -> Vec<(String, String)> {
        self.probabilities
            .iter()
            .flatten()
            .map(|c| (c.label.clone(), format!("{:.1}%", c.p * 100.0)))
            .collect()
    }
}

/// Outcome of one batch row. Failed rows stay in the output.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Predicted(PredictionResult),
    Failed { code: &'static str, message: String },
}

impl RowOutcome {
    pub fn failed(err: &EngineError) -> Self {
        RowOutcome::Failed {
            code: err.code().as_str(),
            message: err.to_string(),
        }
    }

    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            RowOutcome::Predicted(p) => Some(p),
            RowOutcome::Failed { .. } => None,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            RowOutcome::Predicted(_) => ErrorCode::Ok,
            RowOutcome::Failed { code, .. } => match *code {
                "unknown_category" => ErrorCode::UnknownCategory,
                "invalid_input" => ErrorCode::InvalidInput,
                _ => ErrorCode::Internal,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchRow {
    /// Row position in the input table.
    pub row: usize,
    pub outcome: RowOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabelCount {
    pub label: DpeLabel,
    pub count: usize,
}

/// Statistics over successfully predicted rows only.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub predicted: usize,
    pub failed: usize,
    pub mean_cost: Option<f64>,
    /// Most frequent label, ties to the best label.
    pub mode_label: Option<DpeLabel>,
    /// Share of `A`/`B`/`C` labels.
    pub good_share: Option<f64>,
    /// Counts in label order, labels never predicted omitted.
    pub label_counts: Vec<LabelCount>,
}

impl BatchSummary {
    pub fn from_rows(rows: &[BatchRow]) -> Self {
        let predicted: Vec<&PredictionResult> =
            rows.iter().filter_map(|r| r.outcome.prediction()).collect();
        let n = predicted.len();

        let mut counts = [0usize; 7];
        for p in &predicted {
            counts[p.label as usize] += 1;
        }
        let label_counts: Vec<LabelCount> = DpeLabel::ALL
            .into_iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .map(|(label, count)| LabelCount { label, count })
            .collect();
        let mode_label = label_counts
            .iter()
            .fold(None::<&LabelCount>, |best, c| match best {
                Some(b) if b.count >= c.count => Some(b),
                _ => Some(c),
            })
            .map(|c| c.label);

        let good = predicted.iter().filter(|p| p.tier == Tier::Good).count();
        let cost: f64 = predicted.iter().map(|p| p.cost).sum();

        Self {
            total: rows.len(),
            predicted: n,
            failed: rows.len() - n,
            mean_cost: (n > 0).then(|| cost / n as f64),
            mode_label,
            good_share: (n > 0).then(|| good as f64 / n as f64),
            label_counts,
        }
    }
}

/// Per-row outcomes plus the summary over the successful ones.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchPrediction {
    pub rows: Vec<BatchRow>,
    pub summary: BatchSummary,
}
