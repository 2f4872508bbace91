//! Prediction orchestration: encode, call the models, band the result.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::common::error::{EngineError, EngineResult};
use crate::common::log::elapsed_ms;
use crate::data::domain::{Column, ColumnKind, Schema, Table, Value};
use crate::data::repo_fs::{self, ExportOptions};
use crate::data::schemas::prediction;
use crate::model::domain::{Classifier, Regressor};

use super::domain::{
    BatchPrediction, BatchRow, BatchSummary, ClassProbability, DpeLabel, PredictionResult,
    RowOutcome,
};
use super::encoding::{
    encode, DwellingInput, Encoded, EncodingTable, RawInput, UnknownCategoryPolicy, FEATURES,
};

/// Run both models on one encoded row.
pub fn predict(
    encoded: Encoded,
    classifier: &dyn Classifier,
    regressor: &dyn Regressor,
) -> EngineResult<PredictionResult> {
    let rows = std::slice::from_ref(&encoded.row);
    let label = classifier
        .predict(rows)?
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::invalid("classifier returned no label"))?;
    let label = DpeLabel::parse(&label).ok_or_else(|| {
        EngineError::invalid(format!("classifier returned unknown label '{label}'"))
    })?;

    let probabilities = classifier.predict_proba(rows)?.and_then(|mut p| p.pop()).map(|p| {
        classifier
            .classes()
            .iter()
            .zip(p)
            .map(|(label, p)| ClassProbability {
                label: label.clone(),
                p,
            })
            .collect()
    });

    let cost = regressor
        .predict(rows)?
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::invalid("regressor returned no value"))?;

    PredictionResult::new(label, probabilities, cost, encoded.warnings)
}

/// Form path: derive totals, encode, predict.
pub fn predict_input(
    input: &DwellingInput,
    codes: &EncodingTable,
    policy: UnknownCategoryPolicy,
    classifier: &dyn Classifier,
    regressor: &dyn Regressor,
) -> EngineResult<PredictionResult> {
    let start = Instant::now();
    let input = input.clone().with_derived_totals();
    let encoded = encode(&RawInput::from(&input), codes, policy)?;
    let result = predict(encoded, classifier, regressor)?;
    info!(
        label = result.label.as_str(),
        cost = result.cost,
        warnings = result.warnings.len(),
        encoding = codes.version(),
        duration_ms = elapsed_ms(start),
        "dwelling predicted"
    );
    Ok(result)
}

/// Predict every row of `table`. Any failure on a row, from encoding or from
/// the models, is recorded on that row and never aborts the batch. Only a
/// missing feature column fails the whole call.
pub fn predict_batch(
    table: &Table,
    codes: &EncodingTable,
    policy: UnknownCategoryPolicy,
    classifier: &dyn Classifier,
    regressor: &dyn Regressor,
) -> EngineResult<BatchPrediction> {
    let start = Instant::now();
    for name in FEATURES {
        table.schema().require(name)?;
    }

    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let outcome = match encode(&RawInput::from_row(table, row), codes, policy)
            .and_then(|enc| predict(enc, classifier, regressor))
        {
            Ok(result) => RowOutcome::Predicted(result),
            Err(err) => {
                debug!(row, code = err.code().as_str(), error = %err, "batch row failed");
                RowOutcome::failed(&err)
            }
        };
        rows.push(BatchRow { row, outcome });
    }

    let summary = BatchSummary::from_rows(&rows);
    if summary.failed > 0 {
        warn!(failed = summary.failed, total = summary.total, "batch rows not predicted");
    }
    info!(
        rows = summary.total,
        predicted = summary.predicted,
        encoding = codes.version(),
        duration_ms = elapsed_ms(start),
        "batch predicted"
    );
    Ok(BatchPrediction { rows, summary })
}

/// Input columns followed by the predicted label, cost and error message.
pub fn write_predictions<W: Write>(
    table: &Table,
    batch: &BatchPrediction,
    writer: W,
    opts: &ExportOptions,
) -> EngineResult<usize> {
    if batch.rows.len() != table.len() {
        return Err(EngineError::invalid(format!(
            "batch has {} rows, table has {}",
            batch.rows.len(),
            table.len()
        )));
    }

    let mut columns = table.columns().to_vec();
    for (name, kind) in [
        (prediction::PREDICTED_LABEL, ColumnKind::Categorical),
        (prediction::PREDICTED_COST, ColumnKind::Numeric),
        (prediction::ERROR, ColumnKind::Categorical),
    ] {
        columns.push(Column {
            name: name.to_string(),
            kind,
        });
    }
    let schema = Schema::new(columns)?;

    let rows: Vec<Vec<Value>> = table
        .rows()
        .zip(&batch.rows)
        .map(|(cells, out)| {
            let mut row = cells.to_vec();
            match &out.outcome {
                RowOutcome::Predicted(p) => {
                    row.push(Value::text(p.label.as_str()));
                    row.push(Value::Float(p.cost));
                    row.push(Value::Null);
                }
                RowOutcome::Failed { message, .. } => {
                    row.push(Value::Null);
                    row.push(Value::Null);
                    row.push(Value::text(message.as_str()));
                }
            }
            row
        })
        .collect();

    repo_fs::write_rows(writer, &schema, rows.iter().map(Vec::as_slice), opts)
}

pub fn export_predictions(
    table: &Table,
    batch: &BatchPrediction,
    path: &Path,
    opts: &ExportOptions,
) -> EngineResult<usize> {
    let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
    let written = write_predictions(table, batch, BufWriter::new(file), opts)?;
    info!(path = %path.display(), rows = written, "predictions exported");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::ColumnKind;
    use crate::data::repo_fs::read_table;
    use crate::data::schemas::{self, housing};
    use crate::inference::domain::Tier;
    use crate::inference::encoding::template_table;
    use crate::model::domain::EncodedRow;

    /// Labels by the `etiquette_ges` code, costs by surface.
    struct StubClassifier {
        classes: Vec<String>,
        with_proba: bool,
    }

    impl StubClassifier {
        fn new(with_proba: bool) -> Self {
            Self {
                classes: DpeLabel::ALL.iter().map(|l| l.to_string()).collect(),
                with_proba,
            }
        }
    }

    fn ges_code(row: &EncodedRow) -> usize {
        let idx = FEATURES.iter().position(|f| *f == housing::ETIQUETTE_GES).unwrap();
        row.features[idx] as usize
    }

    impl Classifier for StubClassifier {
        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<String>> {
            Ok(rows.iter().map(|r| self.classes[ges_code(r)].clone()).collect())
        }

        fn predict_proba(&self, rows: &[EncodedRow]) -> EngineResult<Option<Vec<Vec<f64>>>> {
            if !self.with_proba {
                return Ok(None);
            }
            Ok(Some(
                rows.iter()
                    .map(|r| {
                        let mut p = vec![0.0; 7];
                        p[ges_code(r)] = 0.75;
                        p[(ges_code(r) + 1) % 7] = 0.25;
                        p
                    })
                    .collect(),
            ))
        }
    }

    struct StubRegressor;

    impl Regressor for StubRegressor {
        fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<f64>> {
            let idx = FEATURES.iter().position(|f| *f == housing::SURFACE).unwrap();
            Ok(rows.iter().map(|r| r.features[idx] * 10.0).collect())
        }
    }

    #[test]
    fn single_prediction_bands_and_formats() {
        let mut input = DwellingInput::template();
        input.etiquette_ges = "F".into();
        input.conso_5_usages_ef = None;
        let result = predict_input(
            &input,
            &EncodingTable::v1(),
            UnknownCategoryPolicy::Reject,
            &StubClassifier::new(true),
            &StubRegressor,
        )
        .unwrap();
        assert_eq!(result.label, DpeLabel::F);
        assert_eq!(result.tier, Tier::Poor);
        assert_eq!(result.cost, 1000.0);
        assert_eq!(result.savings, Some(400.0));
        let pct = result.probability_percentages();
        assert_eq!(pct[5], ("F".to_string(), "75.0%".to_string()));
        assert_eq!(pct[6], ("G".to_string(), "25.0%".to_string()));
    }

    #[test]
    fn sentinel_policy_warns_but_proceeds() {
        let mut input = DwellingInput::template();
        input.type_energie_recodee = "Bois".into();
        let clf = StubClassifier::new(false);
        let reject = predict_input(
            &input,
            &EncodingTable::v1(),
            UnknownCategoryPolicy::Reject,
            &clf,
            &StubRegressor,
        );
        assert!(matches!(reject, Err(EngineError::UnknownCategory { .. })));

        let result = predict_input(
            &input,
            &EncodingTable::v1(),
            UnknownCategoryPolicy::Sentinel(-1),
            &clf,
            &StubRegressor,
        )
        .unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].value, "Bois");
        assert_eq!(result.probabilities, None);
    }

    const UPLOAD: &str = "\
conso_auxiliaires_ef,cout_eclairage,conso_5_usages_par_m2_ef,emission_ges_ecs,conso_5_usages_ef,surface_habitable_logement,cout_ecs,cout_auxiliaires,type_batiment,conso_ecs_ef,emission_ges_5_usages,etiquette_ges,conso_refroidissement_ef,type_energie_recodee
500,80,200,500,20000,100,300,100,maison,2000,2500,D,0,Electricite
500,80,200,500,20000,100,300,100,chateau,2000,2500,D,0,Electricite
400,60,90,200,4500,50,250,80,appartement,1500,1000,B,0,Gaz_naturel
400,60,90,200,4500,abc,250,80,appartement,1500,1000,B,0,Gaz_naturel
";

    #[test]
    fn batch_isolates_bad_rows() {
        let table = read_table(UPLOAD.as_bytes(), &schemas::prediction_input_spec()).unwrap();
        let batch = predict_batch(
            &table,
            &EncodingTable::v1(),
            UnknownCategoryPolicy::Reject,
            &StubClassifier::new(true),
            &StubRegressor,
        )
        .unwrap();
        assert_eq!(batch.rows.len(), 4);
        assert_eq!(batch.summary.predicted, 2);
        assert_eq!(batch.summary.failed, 2);
        assert_eq!(batch.summary.mean_cost, Some(750.0));
        assert_eq!(batch.summary.good_share, Some(0.5));
        assert!(matches!(
            batch.rows[1].outcome,
            RowOutcome::Failed { code: "unknown_category", .. }
        ));
        assert!(matches!(
            batch.rows[3].outcome,
            RowOutcome::Failed { code: "invalid_input", .. }
        ));

        let mut out = Vec::new();
        let n = write_predictions(&table, &batch, &mut out, &ExportOptions::default()).unwrap();
        assert_eq!(n, 4);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("etiquette_dpe_predite,cout_total_predit,erreur"));
        assert!(lines[1].ends_with(",D,1000.00,"));
        assert!(lines[2].contains("chateau") && lines[2].ends_with("'type_batiment'"));
    }

    /// Fails on small dwellings, delegates otherwise.
    struct FailingOnSmall(StubClassifier);

    impl Classifier for FailingOnSmall {
        fn classes(&self) -> &[String] {
            self.0.classes()
        }

        fn predict(&self, rows: &[EncodedRow]) -> EngineResult<Vec<String>> {
            let idx = FEATURES.iter().position(|f| *f == housing::SURFACE).unwrap();
            if rows.iter().any(|r| r.features[idx] < 60.0) {
                let source = std::io::Error::new(std::io::ErrorKind::Other, "scorer offline");
                return Err(EngineError::io("scorer", source));
            }
            self.0.predict(rows)
        }
    }

    #[test]
    fn model_failures_stay_on_their_row() {
        let table = read_table(UPLOAD.as_bytes(), &schemas::prediction_input_spec()).unwrap();
        let batch = predict_batch(
            &table,
            &EncodingTable::v1(),
            UnknownCategoryPolicy::Reject,
            &FailingOnSmall(StubClassifier::new(false)),
            &StubRegressor,
        )
        .unwrap();
        assert_eq!(batch.summary.predicted, 1);
        assert_eq!(batch.summary.failed, 3);
        assert_eq!(batch.rows[0].outcome.prediction().map(|p| p.label), Some(DpeLabel::D));
        assert!(matches!(
            batch.rows[2].outcome,
            RowOutcome::Failed { code: "internal", .. }
        ));
    }

    #[test]
    fn single_and_batch_paths_agree() {
        let table = template_table().unwrap();
        let clf = StubClassifier::new(true);
        let batch = predict_batch(
            &table,
            &EncodingTable::v1(),
            UnknownCategoryPolicy::Reject,
            &clf,
            &StubRegressor,
        )
        .unwrap();
        let single = predict_input(
            &DwellingInput::template(),
            &EncodingTable::v1(),
            UnknownCategoryPolicy::Reject,
            &clf,
            &StubRegressor,
        )
        .unwrap();
        assert_eq!(batch.rows[0].outcome.prediction(), Some(&single));
    }

    #[test]
    fn batch_without_feature_column_is_schema_error() {
        let table = Table::from_rows(&[("surface", ColumnKind::Numeric)], vec![]).unwrap();
        let err = predict_batch(
            &table,
            &EncodingTable::v1(),
            UnknownCategoryPolicy::Reject,
            &StubClassifier::new(false),
            &StubRegressor,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::SchemaError { .. }));
    }
}
