//! Scores the loaded models against the labelled housing records.

use std::time::Instant;

use tracing::info;

use crate::common::error::{EngineError, EngineResult};
use crate::common::log::elapsed_ms;
use crate::data::schemas::housing;
use crate::inference::domain::DpeLabel;
use crate::inference::encoding::{encode, EncodingTable, RawInput, UnknownCategoryPolicy};
use crate::model::domain::{Classifier, Regressor};
use crate::query::view::View;

use super::domain::{EvalSuite, LabelTally};

/// Accuracy and macro-F1 on `etiquette_dpe`, R² on `cout_total_5_usages`.
pub fn evaluate(
    view: &View<'_>,
    codes: &EncodingTable,
    classifier: &dyn Classifier,
    regressor: &dyn Regressor,
) -> EngineResult<EvalSuite> {
    let start = Instant::now();
    let table = view.table();
    let (label_idx, _) = table.schema().require(housing::ETIQUETTE_DPE)?;
    let (cost_idx, _) = table.schema().require(housing::COUT_TOTAL)?;

    let mut encoded = Vec::new();
    let mut truth = Vec::new();
    for &row in view.row_indices() {
        let Some(cells) = table.row(row) else { continue };
        let label = cells[label_idx].as_str().and_then(DpeLabel::parse);
        let (Some(label), Some(cost)) = (label, cells[cost_idx].as_f64()) else {
            continue;
        };
        match encode(&RawInput::from_row(table, row), codes, UnknownCategoryPolicy::Reject) {
            Ok(enc) => {
                encoded.push(enc.row);
                truth.push((label, cost));
            }
            Err(EngineError::UnknownCategory { .. } | EngineError::InvalidInput(_)) => {}
            Err(err) => return Err(err),
        }
    }

    let mut suite = EvalSuite {
        rows: view.len(),
        scored: encoded.len(),
        skipped: view.len() - encoded.len(),
        ..EvalSuite::default()
    };
    if encoded.is_empty() {
        return Ok(suite);
    }

    let labels = classifier.predict(&encoded)?;
    let costs = regressor.predict(&encoded)?;
    if labels.len() != encoded.len() || costs.len() != encoded.len() {
        return Err(EngineError::invalid("model returned a different number of rows"));
    }

    let mut tallies = [LabelTally::default(); 7];
    let mut correct = 0;
    for ((want, _), got) in truth.iter().zip(&labels) {
        let got = DpeLabel::parse(got);
        if got == Some(*want) {
            correct += 1;
            tallies[*want as usize].tp += 1;
        } else {
            tallies[*want as usize].fn_ += 1;
            if let Some(got) = got {
                tallies[got as usize].fp += 1;
            }
        }
    }
    let seen: Vec<f64> = tallies.iter().filter(|t| t.seen()).map(LabelTally::f1).collect();

    suite.accuracy = Some(correct as f64 / encoded.len() as f64);
    suite.macro_f1 = Some(seen.iter().sum::<f64>() / seen.len() as f64);
    suite.r2 = r_squared(truth.iter().map(|(_, c)| *c), &costs);

    info!(
        rows = suite.rows,
        scored = suite.scored,
        accuracy = suite.accuracy,
        macro_f1 = suite.macro_f1,
        r2 = suite.r2,
        duration_ms = elapsed_ms(start),
        "models evaluated"
    );
    Ok(suite)
}

fn r_squared(actual: impl Iterator<Item = f64> + Clone, predicted: &[f64]) -> Option<f64> {
    let n = predicted.len() as f64;
    let mean = actual.clone().sum::<f64>() / n;
    let ss_tot: f64 = actual.clone().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual.zip(predicted).map(|(y, p)| (y - p).powi(2)).sum();
    (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::{ColumnKind, Table, Value};
    use crate::inference::encoding::{DwellingInput, FEATURES};
    use crate::model::domain::{LinearRegressor, ThresholdClassifier};

    fn labelled(rows: &[(&str, f64, Option<f64>, &str)]) -> Table {
        // (etiquette_dpe, conso_m2, cout, type_batiment)
        let template = RawInput::from(&DwellingInput::template());
        let codes = EncodingTable::v1();
        let mut columns: Vec<(&str, ColumnKind)> = FEATURES
            .iter()
            .map(|f| match codes.map(f) {
                Some(_) => (*f, ColumnKind::Categorical),
                None => (*f, ColumnKind::Numeric),
            })
            .collect();
        columns.push((housing::ETIQUETTE_DPE, ColumnKind::Categorical));
        columns.push((housing::COUT_TOTAL, ColumnKind::Numeric));

        let data = rows
            .iter()
            .map(|(label, conso, cout, kind)| {
                let mut row: Vec<Value> = FEATURES
                    .iter()
                    .map(|f| match *f {
                        housing::CONSO_PAR_M2 => Value::Float(*conso),
                        housing::TYPE_BATIMENT => Value::text(*kind),
                        other => template.get(other).cloned().unwrap_or_default(),
                    })
                    .collect();
                row.push(Value::text(*label));
                row.push(Value::from(*cout));
                row
            })
            .collect();
        Table::from_rows(&columns, data).unwrap()
    }

    fn models() -> (ThresholdClassifier, LinearRegressor) {
        let names: Vec<String> = FEATURES.iter().map(|f| f.to_string()).collect();
        let idx = FEATURES.iter().position(|f| *f == housing::CONSO_PAR_M2).unwrap();
        let mut coefficients = vec![0.0; FEATURES.len()];
        coefficients[idx] = 10.0;
        (
            ThresholdClassifier::intensity(names.clone(), housing::CONSO_PAR_M2),
            LinearRegressor {
                features: names,
                coefficients,
                intercept: 0.0,
            },
        )
    }

    #[test]
    fn scores_labelled_rows_and_skips_the_rest() {
        let table = labelled(&[
            ("A", 50.0, Some(500.0), "maison"),
            ("B", 120.0, Some(1200.0), "maison"),
            ("D", 180.0, Some(1900.0), "appartement"),
            ("C", 190.0, Some(1850.0), "maison"),
            ("C", 190.0, None, "maison"),
            ("C", 190.0, Some(1800.0), "chateau"),
        ]);
        let (clf, reg) = models();
        let suite = evaluate(&View::all(&table), &EncodingTable::v1(), &clf, &reg).unwrap();

        assert_eq!(suite.rows, 6);
        assert_eq!(suite.scored, 4);
        assert_eq!(suite.skipped, 2);
        assert_eq!(suite.accuracy, Some(0.75));
        // A: 1, B: 1, C: tp 1 fp 1 -> 2/3, D: fn 1 -> 0
        let f1 = suite.macro_f1.unwrap();
        assert!((f1 - (1.0 + 1.0 + 2.0 / 3.0 + 0.0) / 4.0).abs() < 1e-12);
        let r2 = suite.r2.unwrap();
        assert!(r2 > 0.9 && r2 < 1.0);
    }

    #[test]
    fn empty_view_scores_nothing() {
        let table = labelled(&[]);
        let (clf, reg) = models();
        let suite = evaluate(&View::all(&table), &EncodingTable::v1(), &clf, &reg).unwrap();
        assert_eq!(suite, EvalSuite::default());
    }

    #[test]
    fn missing_truth_column_is_schema_error() {
        let table = Table::from_rows(&[("x", ColumnKind::Numeric)], vec![]).unwrap();
        let (clf, reg) = models();
        let err = evaluate(&View::all(&table), &EncodingTable::v1(), &clf, &reg).unwrap_err();
        assert!(matches!(err, EngineError::SchemaError { .. }));
    }
}
