//! Model contracts and the serialised artefact formats.
//!
//! Models are black boxes to the rest of the crate: the prediction adapter
//! only talks to [`Classifier`] and [`Regressor`].

use serde::{Deserialize, Serialize};

use crate::common::error::{EngineError, EngineResult};

/// Model input: feature values in the model's fixed feature order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EncodedRow {
    pub features: Vec<f64>,
}

impl EncodedRow {
    pub fn new(features: Vec<f64>) -> Self {
        Self { features }
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.features.get(idx).copied()
    }
}

/// Label classifier.
pub trait Classifier {
    /// Class labels in the column order of `predict_proba`.
    fn classes(&self) -> &[String];

    fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<String>>;

    /// Per-class probabilities, `None` when the model has none to give.
    fn predict_proba(&self, _rows: &[EncodedRow]) -> EngineResult<Option<Vec<Vec<f64>>>> {
        Ok(None)
    }
}

/// Numeric regressor.
pub trait Regressor {
    fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<f64>>;
}

/// Source of model artefacts.
pub trait ModelRepo {
    fn classifier(&self) -> EngineResult<ClassifierArtefact>;
    fn regressor(&self) -> EngineResult<LinearRegressor>;
}

/// Serialised classifier, tagged by `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtefact {
    Softmax(SoftmaxClassifier),
    IntensityThreshold(ThresholdClassifier),
}

impl ClassifierArtefact {
    pub fn features(&self) -> &[String] {
        match self {
            ClassifierArtefact::Softmax(m) => &m.features,
            ClassifierArtefact::IntensityThreshold(m) => &m.features,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ClassifierArtefact::Softmax(m) => m.validate(),
            ClassifierArtefact::IntensityThreshold(m) => m.validate(),
        }
    }
}

impl Classifier for ClassifierArtefact {
    fn classes(&self) -> &[String] {
        match self {
            ClassifierArtefact::Softmax(m) => m.classes(),
            ClassifierArtefact::IntensityThreshold(m) => m.classes(),
        }
    }

    fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<String>> {
        match self {
            ClassifierArtefact::Softmax(m) => m.predict(rows),
            ClassifierArtefact::IntensityThreshold(m) => m.predict(rows),
        }
    }

    fn predict_proba(&self, rows: &[EncodedRow]) -> EngineResult<Option<Vec<Vec<f64>>>> {
        match self {
            ClassifierArtefact::Softmax(m) => m.predict_proba(rows),
            ClassifierArtefact::IntensityThreshold(m) => m.predict_proba(rows),
        }
    }
}

/// Multinomial logistic model: one weight vector and intercept per class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    pub features: Vec<String>,
    pub classes: Vec<String>,
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl SoftmaxClassifier {
    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("no classes".into());
        }
        if self.weights.len() != self.classes.len() || self.intercepts.len() != self.classes.len() {
            return Err(format!(
                "{} classes but {} weight rows and {} intercepts",
                self.classes.len(),
                self.weights.len(),
                self.intercepts.len()
            ));
        }
        match self.weights.iter().find(|w| w.len() != self.features.len()) {
            Some(w) => Err(format!(
                "weight row of width {} for {} features",
                w.len(),
                self.features.len()
            )),
            None => Ok(()),
        }
    }

    fn probabilities(&self, row: &EncodedRow) -> EngineResult<Vec<f64>> {
        check_width(row, self.features.len())?;
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| b + w.iter().zip(&row.features).map(|(w, x)| w * x).sum::<f64>())
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        Ok(exp.into_iter().map(|e| e / total).collect())
    }
}

impl Classifier for SoftmaxClassifier {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<String>> {
        rows.iter()
            .map(|row| {
                let probs = self.probabilities(row)?;
                // first class wins ties
                let best = probs
                    .iter()
                    .enumerate()
                    .fold(0, |best, (i, p)| if *p > probs[best] { i } else { best });
                Ok(self.classes[best].clone())
            })
            .collect()
    }

    fn predict_proba(&self, rows: &[EncodedRow]) -> EngineResult<Option<Vec<Vec<f64>>>> {
        rows.iter()
            .map(|row| self.probabilities(row))
            .collect::<EngineResult<Vec<_>>>()
            .map(Some)
    }
}

/// Labels by energy intensity: the first threshold strictly above the value
/// picks the class, values past the last threshold take the last class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdClassifier {
    pub features: Vec<String>,
    /// Feature the thresholds apply to.
    pub feature: String,
    pub thresholds: Vec<f64>,
    pub classes: Vec<String>,
}

impl ThresholdClassifier {
    /// kWh/m²/year bands: `< 100 A`, `< 150 B`, `< 200 C`, `< 250 D`,
    /// `< 300 E`, else `F`.
    pub fn intensity(features: Vec<String>, feature: &str) -> Self {
        Self {
            features,
            feature: feature.to_string(),
            thresholds: vec![100.0, 150.0, 200.0, 250.0, 300.0],
            classes: ["A", "B", "C", "D", "E", "F"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.classes.len() != self.thresholds.len() + 1 {
            return Err(format!(
                "{} thresholds need {} classes, found {}",
                self.thresholds.len(),
                self.thresholds.len() + 1,
                self.classes.len()
            ));
        }
        if self.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err("thresholds must be strictly increasing".into());
        }
        self.feature_index().map(|_| ())
    }

    fn feature_index(&self) -> Result<usize, String> {
        self.features
            .iter()
            .position(|f| *f == self.feature)
            .ok_or_else(|| format!("threshold feature '{}' is not a model feature", self.feature))
    }
}

impl Classifier for ThresholdClassifier {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<String>> {
        let idx = self.feature_index().map_err(EngineError::InvalidInput)?;
        rows.iter()
            .map(|row| {
                check_width(row, self.features.len())?;
                let x = row.features[idx];
                let band = self
                    .thresholds
                    .iter()
                    .position(|t| x < *t)
                    .unwrap_or(self.thresholds.len());
                Ok(self.classes[band].clone())
            })
            .collect()
    }
}

/// Ordinary linear model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressor {
    pub fn validate(&self) -> Result<(), String> {
        if self.coefficients.len() != self.features.len() {
            return Err(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                self.features.len()
            ));
        }
        Ok(())
    }
}

impl Regressor for LinearRegressor {
    fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<f64>> {
        rows.iter()
            .map(|row| {
                check_width(row, self.coefficients.len())?;
                Ok(self.intercept
                    + self
                        .coefficients
                        .iter()
                        .zip(&row.features)
                        .map(|(c, x)| c * x)
                        .sum::<f64>())
            })
            .collect()
    }
}

fn check_width(row: &EncodedRow, expected: usize) -> EngineResult<()> {
    if row.features.len() != expected {
        return Err(EngineError::invalid(format!(
            "encoded row has {} features, model expects {expected}",
            row.features.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn softmax_probabilities_sum_to_one() {
        let model = SoftmaxClassifier {
            features: names(2),
            classes: vec!["A".into(), "B".into(), "C".into()],
            weights: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
            intercepts: vec![0.0, 0.0, 0.0],
        };
        let rows = [EncodedRow::new(vec![3.0, 1.0]), EncodedRow::new(vec![0.0, 900.0])];
        let probs = model.predict_proba(&rows).unwrap().unwrap();
        for p in &probs {
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.predict(&rows).unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn intensity_bands() {
        let model = ThresholdClassifier::intensity(names(3), "f1");
        assert!(model.validate().is_ok());
        let rows: Vec<_> = [99.9, 100.0, 249.0, 300.0, 1200.0]
            .iter()
            .map(|x| EncodedRow::new(vec![0.0, *x, 0.0]))
            .collect();
        assert_eq!(model.predict(&rows).unwrap(), vec!["A", "B", "D", "F", "F"]);
        assert_eq!(model.predict_proba(&rows).unwrap(), None);
    }

    #[test]
    fn linear_regression_and_width_checks() {
        let model = LinearRegressor {
            features: names(2),
            coefficients: vec![2.0, -1.0],
            intercept: 10.0,
        };
        assert_eq!(
            model.predict(&[EncodedRow::new(vec![5.0, 4.0])]).unwrap(),
            vec![16.0]
        );
        assert!(model.predict(&[EncodedRow::new(vec![1.0])]).is_err());
    }

    #[test]
    fn artefacts_deserialise_by_kind() {
        let json = r#"{"kind":"intensity_threshold","features":["f0"],"feature":"f0",
            "thresholds":[100.0],"classes":["A","B"]}"#;
        let artefact: ClassifierArtefact = serde_json::from_str(json).unwrap();
        assert!(artefact.validate().is_ok());
        assert_eq!(artefact.classes(), &["A".to_string(), "B".to_string()]);

        let broken = SoftmaxClassifier {
            features: names(2),
            classes: vec!["A".into()],
            weights: vec![vec![1.0]],
            intercepts: vec![0.0],
        };
        assert!(ClassifierArtefact::Softmax(broken).validate().is_err());
    }
}
