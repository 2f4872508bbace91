//! JSON request/response layer used by the host dashboard.
//!
//! Every operation of the core is reachable through one [`Request`] variant.
//! Errors never escape as panics: they come back as a [`Response`] carrying
//! the stable [`ErrorCode`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::common::error::{EngineError, EngineResult, ErrorCode};
use crate::common::log::elapsed_ms;
use crate::compare::domain::{DirectionTable, RowSelector, DPE_COMPARE_FIELDS};
use crate::compare::service::{compare, record_label, resolve};
use crate::data::domain::Table;
use crate::data::schemas;
use crate::data::service::Session;
use crate::evaluation::service::evaluate;
use crate::inference::encoding::{
    template_table, DwellingInput, EncodingTable, UnknownCategoryPolicy,
};
use crate::inference::service::{export_predictions, predict_batch, predict_input};
use crate::query::aggregate::{self, AggregationSpec, SummarySpec};
use crate::query::filter::FilterSet;
use crate::query::view::View;

/// Which configured input file a request addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Housing,
    Enedis,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Query {
        dataset: Dataset,
        #[serde(default)]
        filters: FilterSet,
        #[serde(default)]
        limit: Option<usize>,
    },
    Distinct {
        dataset: Dataset,
        column: String,
    },
    Aggregate {
        dataset: Dataset,
        #[serde(default)]
        filters: FilterSet,
        spec: AggregationSpec,
    },
    Summarize {
        dataset: Dataset,
        #[serde(default)]
        filters: FilterSet,
        spec: SummarySpec,
    },
    Bin {
        dataset: Dataset,
        #[serde(default)]
        filters: FilterSet,
        column: String,
        edges: Vec<f64>,
        labels: Vec<String>,
    },
    Stats {
        dataset: Dataset,
        #[serde(default)]
        filters: FilterSet,
        column: String,
    },
    Export {
        dataset: Dataset,
        #[serde(default)]
        filters: FilterSet,
        path: PathBuf,
    },
    Compare {
        a: RowSelector,
        b: RowSelector,
        #[serde(default)]
        fields: Option<Vec<String>>,
        #[serde(default)]
        directions: Option<DirectionTable>,
    },
    Predict {
        input: DwellingInput,
        #[serde(default)]
        policy: UnknownCategoryPolicy,
    },
    PredictBatch {
        path: PathBuf,
        #[serde(default)]
        policy: UnknownCategoryPolicy,
        #[serde(default)]
        output: Option<PathBuf>,
    },
    Template {
        path: PathBuf,
    },
    Evaluate {
        #[serde(default)]
        filters: FilterSet,
    },
    /// Re-read a configured dataset, or a batch upload by `path`.
    Reload {
        #[serde(default)]
        dataset: Option<Dataset>,
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::Query { .. } => "query",
            Request::Distinct { .. } => "distinct",
            Request::Aggregate { .. } => "aggregate",
            Request::Summarize { .. } => "summarize",
            Request::Bin { .. } => "bin",
            Request::Stats { .. } => "stats",
            Request::Export { .. } => "export",
            Request::Compare { .. } => "compare",
            Request::Predict { .. } => "predict",
            Request::PredictBatch { .. } => "predict_batch",
            Request::Template { .. } => "template",
            Request::Evaluate { .. } => "evaluate",
            Request::Reload { .. } => "reload",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Response {
    /// `ok`, `empty_selection` or the error code name.
    pub status: &'static str,
    pub code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok(data: serde_json::Value, empty: bool) -> Self {
        let code = if empty {
            ErrorCode::EmptySelection
        } else {
            ErrorCode::Ok
        };
        Self {
            status: code.as_str(),
            code: code as u32,
            data: Some(data),
            error: None,
        }
    }

    fn error(err: &EngineError) -> Self {
        let code = err.code();
        Self {
            status: code.as_str(),
            code: code as u32,
            data: None,
            error: Some(err.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok as u32 || self.code == ErrorCode::EmptySelection as u32
    }
}

/// Parse a JSON request, run it, and serialise the response.
pub fn handle(session: &mut Session, raw: &str) -> String {
    let response = match serde_json::from_str::<Request>(raw) {
        Ok(req) => dispatch(session, req),
        Err(e) => Response::error(&EngineError::invalid(format!("bad request: {e}"))),
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(
            "{{\"status\":\"internal\",\"code\":{},\"error\":{}}}",
            ErrorCode::Internal as u32,
            json!(e.to_string())
        )
    })
}

pub fn dispatch(session: &mut Session, req: Request) -> Response {
    let start = Instant::now();
    let op = req.op();
    match run(session, req) {
        Ok((data, empty)) => {
            info!(op, empty, duration_ms = elapsed_ms(start), "request served");
            Response::ok(data, empty)
        }
        Err(err) => {
            warn!(op, code = err.code().as_str(), error = %err, "request failed");
            Response::error(&err)
        }
    }
}

fn dataset(session: &mut Session, ds: Dataset) -> EngineResult<Arc<Table>> {
    match ds {
        Dataset::Housing => session.housing(),
        Dataset::Enedis => session.enedis(),
    }
}

fn run(session: &mut Session, req: Request) -> EngineResult<(serde_json::Value, bool)> {
    match req {
        Request::Query {
            dataset: ds,
            filters,
            limit,
        } => {
            let table = dataset(session, ds)?;
            let view = filters.apply(&table)?;
            let total = view.len();
            let page = match limit {
                Some(n) => view.head(n),
                None => view,
            };
            let rows: Vec<_> = page.rows().collect();
            let data = json!({
                "columns": table.schema().names().collect::<Vec<_>>(),
                "total": total,
                "rows": rows,
            });
            Ok((data, total == 0))
        }
        Request::Distinct { dataset: ds, column } => {
            let table = dataset(session, ds)?;
            Ok((serde_json::to_value(table.distinct(&column)?)?, false))
        }
        Request::Aggregate {
            dataset: ds,
            filters,
            spec,
        } => {
            let table = dataset(session, ds)?;
            let view = filters.apply(&table)?;
            let groups = aggregate::aggregate(&view, &spec)?;
            Ok((serde_json::to_value(groups)?, view.is_empty()))
        }
        Request::Summarize {
            dataset: ds,
            filters,
            spec,
        } => {
            let table = dataset(session, ds)?;
            let view = filters.apply(&table)?;
            let summary = aggregate::summarize(&view, &spec)?;
            Ok((serde_json::to_value(summary)?, view.is_empty()))
        }
        Request::Bin {
            dataset: ds,
            filters,
            column,
            edges,
            labels,
        } => {
            let table = dataset(session, ds)?;
            let view = filters.apply(&table)?;
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            let binned = aggregate::bin(&view, &column, &edges, &labels)?;
            Ok((serde_json::to_value(binned)?, view.is_empty()))
        }
        Request::Stats {
            dataset: ds,
            filters,
            column,
        } => {
            let table = dataset(session, ds)?;
            let view = filters.apply(&table)?;
            let stats = aggregate::column_stats(&view, &column)?;
            Ok((serde_json::to_value(stats)?, view.is_empty()))
        }
        Request::Export {
            dataset: ds,
            filters,
            path,
        } => {
            let table = dataset(session, ds)?;
            let view = filters.apply(&table)?;
            let written = view.export(&path, &session.export_options())?;
            Ok((json!({ "path": path, "rows": written }), written == 0))
        }
        Request::Compare {
            a,
            b,
            fields,
            directions,
        } => {
            let table = session.housing()?;
            let fields = fields
                .unwrap_or_else(|| DPE_COMPARE_FIELDS.iter().map(|f| f.to_string()).collect());
            let directions = directions.unwrap_or_else(DirectionTable::dpe_default);
            let ra = resolve(&table, &a)?;
            let rb = resolve(&table, &b)?;
            let comparison = compare(&ra, &rb, &fields, &directions)?;
            let data = json!({
                "label_a": record_label(&table, ra.row())?,
                "label_b": record_label(&table, rb.row())?,
                "deltas": comparison.deltas,
                "verdict": comparison.verdict,
                "overall": comparison.verdict.overall(),
            });
            Ok((data, false))
        }
        Request::Predict { input, policy } => {
            let models = session.models()?;
            let result = predict_input(
                &input,
                &EncodingTable::v1(),
                policy,
                &models.classifier,
                &models.regressor,
            )?;
            let percentages = result.probability_percentages();
            let mut data = serde_json::to_value(&result)?;
            data["percentages"] = serde_json::to_value(percentages)?;
            Ok((data, false))
        }
        Request::PredictBatch {
            path,
            policy,
            output,
        } => {
            let models = session.models()?;
            // Uploads are rewritten in place, so always check the file content.
            let table = session.reload(&path, &schemas::prediction_input_spec())?;
            let batch = predict_batch(
                &table,
                &EncodingTable::v1(),
                policy,
                &models.classifier,
                &models.regressor,
            )?;
            if let Some(out) = &output {
                export_predictions(&table, &batch, out, &session.export_options())?;
            }
            Ok((serde_json::to_value(&batch)?, table.is_empty()))
        }
        Request::Template { path } => {
            let template = template_table()?;
            View::all(&template).export(&path, &session.export_options())?;
            Ok((json!({ "path": path }), false))
        }
        Request::Evaluate { filters } => {
            let models = session.models()?;
            let table = session.housing()?;
            let view = filters.apply(&table)?;
            let suite = evaluate(
                &view,
                &EncodingTable::v1(),
                &models.classifier,
                &models.regressor,
            )?;
            Ok((serde_json::to_value(suite)?, view.is_empty()))
        }
        Request::Reload { dataset, path } => {
            let (path, spec) = match (dataset, path) {
                (Some(Dataset::Housing), None) => {
                    (session.cfg().housing_csv.clone(), schemas::housing_spec())
                }
                (Some(Dataset::Enedis), None) => {
                    (session.cfg().enedis_csv.clone(), schemas::enedis_spec())
                }
                (None, Some(upload)) => (upload, schemas::prediction_input_spec()),
                _ => {
                    return Err(EngineError::invalid(
                        "reload takes exactly one of 'dataset' or 'path'",
                    ))
                }
            };
            let table = session.reload(&path, &spec)?;
            Ok((json!({ "rows": table.len() }), table.is_empty()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::AppCfg;
    use crate::inference::encoding::FEATURES;
    use crate::model::domain::{ClassifierArtefact, LinearRegressor, ThresholdClassifier};
    use crate::model::repo_fs::FsModelRepo;
    use serde_json::Value as Json;
    use std::fs;

    const HOUSING_CSV: &str = "\
type_batiment,etiquette_dpe,etiquette_ges,type_energie_recodee,code_postal_ban,surface_habitable_logement,cout_total_5_usages,conso_5_usages_par_m2_ef,conso_5_usages_ef,emission_ges_5_usages,conso_ecs_ef,conso_auxiliaires_ef,conso_refroidissement_ef
maison,D,C,Electricite,69001,100,1800,210,21000,900,2000,500,0
appartement,B,A,Gaz_naturel,69003,45,720,95,4275,300,1200,300,0
maison,F,F,Fioul domestique,69003,130,3100,330,42900,5200,2500,700,0
";

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppCfg::rooted_at(dir.path());
        fs::create_dir_all(cfg.housing_csv.parent().unwrap()).unwrap();
        fs::write(&cfg.housing_csv, HOUSING_CSV).unwrap();
        (dir, Session::new(cfg))
    }

    fn install_models(session: &Session) {
        let names: Vec<String> = FEATURES.iter().map(|f| f.to_string()).collect();
        let idx = FEATURES
            .iter()
            .position(|f| *f == schemas::housing::SURFACE)
            .unwrap();
        let mut coefficients = vec![0.0; FEATURES.len()];
        coefficients[idx] = 12.0;
        let repo = FsModelRepo::new(session.cfg(), &FEATURES);
        repo.put_classifier(&ClassifierArtefact::IntensityThreshold(
            ThresholdClassifier::intensity(names.clone(), schemas::housing::CONSO_PAR_M2),
        ))
        .unwrap();
        repo.put_regressor(&LinearRegressor {
            features: names,
            coefficients,
            intercept: 0.0,
        })
        .unwrap();
    }

    fn call(session: &mut Session, raw: &str) -> Json {
        serde_json::from_str(&handle(session, raw)).unwrap()
    }

    #[test]
    fn aggregate_request_round_trip() {
        let (_dir, mut s) = session();
        let resp = call(
            &mut s,
            r#"{"op":"aggregate","dataset":"housing",
                "spec":{"group_by":["type_batiment"],"metric":"cout_total_5_usages",
                        "reducer":"mean","order":"value_desc","top_n":1}}"#,
        );
        assert_eq!(resp["status"], "ok");
        assert_eq!(resp["data"][0]["key"][0], "maison");
        assert_eq!(resp["data"][0]["value"], 2450.0);
        assert_eq!(resp["data"][0]["count"], 2);
    }

    #[test]
    fn empty_selection_is_a_status_not_an_error() {
        let (_dir, mut s) = session();
        let resp = call(
            &mut s,
            r#"{"op":"query","dataset":"housing",
                "filters":[{"column":"etiquette_dpe","op":"in_set","values":[]}]}"#,
        );
        assert_eq!(resp["status"], "empty_selection");
        assert_eq!(resp["code"], 4);
        assert_eq!(resp["data"]["total"], 0);
    }

    #[test]
    fn errors_carry_codes() {
        let (_dir, mut s) = session();
        let resp = call(
            &mut s,
            r#"{"op":"stats","dataset":"housing","column":"nope"}"#,
        );
        assert_eq!(resp["status"], "schema_error");
        assert!(resp["error"].as_str().unwrap().contains("nope"));

        let resp = call(&mut s, r#"{"op":"stats","dataset":"enedis","column":"x"}"#);
        assert_eq!(resp["status"], "file_not_found");

        let resp = call(&mut s, "not json");
        assert_eq!(resp["status"], "invalid_input");

        let resp = call(&mut s, r#"{"op":"predict","input":{
            "type_batiment":"maison","type_energie_recodee":"Electricite","etiquette_ges":"D",
            "surface_habitable_logement":100,"conso_5_usages_par_m2_ef":200,
            "conso_ecs_ef":2000,"conso_auxiliaires_ef":500,"conso_refroidissement_ef":0,
            "cout_ecs":300,"cout_auxiliaires":100,"cout_eclairage":80,"emission_ges_ecs":500}}"#);
        assert_eq!(resp["status"], "model_unavailable");
        assert_eq!(resp["code"], 6);
    }

    #[test]
    fn compare_defaults_to_dpe_fields() {
        let (_dir, mut s) = session();
        let resp = call(
            &mut s,
            r#"{"op":"compare","a":{"index":0},"b":{"filters":[
                {"column":"etiquette_dpe","op":"equals","value":"B"}]}}"#,
        );
        assert_eq!(resp["status"], "ok");
        assert_eq!(resp["data"]["label_a"], "maison - D - 69001 - 0");
        assert_eq!(resp["data"]["deltas"].as_array().unwrap().len(), 4);
        assert_eq!(resp["data"]["deltas"][0]["delta"], 1080.0);
        assert_eq!(resp["data"]["deltas"][0]["favorable"], "B");
        assert_eq!(resp["data"]["overall"], "B");
    }

    #[test]
    fn predict_and_batch_through_the_api() {
        let (dir, mut s) = session();
        install_models(&s);

        let resp = call(&mut s, r#"{"op":"predict","policy":{"sentinel":-1},"input":{
            "type_batiment":"maison","type_energie_recodee":"Bois","etiquette_ges":"D",
            "surface_habitable_logement":100,"conso_5_usages_par_m2_ef":260,
            "conso_ecs_ef":2000,"conso_auxiliaires_ef":500,"conso_refroidissement_ef":0,
            "cout_ecs":300,"cout_auxiliaires":100,"cout_eclairage":80,"emission_ges_ecs":500}}"#);
        assert_eq!(resp["status"], "ok");
        assert_eq!(resp["data"]["label"], "E");
        assert_eq!(resp["data"]["tier"], "medium");
        assert_eq!(resp["data"]["cost"], 1200.0);
        assert_eq!(resp["data"]["savings"], 480.0);
        assert_eq!(resp["data"]["warnings"][0]["value"], "Bois");

        let template = dir.path().join("template_prediction.csv");
        let output = dir.path().join("predictions.csv");
        let req = json!({"op": "template", "path": template});
        assert_eq!(call(&mut s, &req.to_string())["status"], "ok");

        let req = json!({"op": "predict_batch", "path": template, "output": output});
        let resp = call(&mut s, &req.to_string());
        assert_eq!(resp["status"], "ok");
        assert_eq!(resp["data"]["summary"]["predicted"], 1);
        assert_eq!(resp["data"]["rows"][0]["outcome"]["status"], "predicted");
        assert_eq!(resp["data"]["rows"][0]["outcome"]["label"], "D");

        let exported = fs::read_to_string(&output).unwrap();
        assert!(exported.lines().nth(1).unwrap().ends_with(",D,1200.00,"));
    }

    #[test]
    fn rewritten_upload_is_read_again() {
        let (dir, mut s) = session();
        install_models(&s);
        let upload = dir.path().join("upload.csv");
        let req = json!({"op": "template", "path": upload});
        assert_eq!(call(&mut s, &req.to_string())["status"], "ok");

        let batch = json!({"op": "predict_batch", "path": upload}).to_string();
        assert_eq!(call(&mut s, &batch)["data"]["summary"]["total"], 1);

        let text = fs::read_to_string(&upload).unwrap();
        let row = text.lines().nth(1).unwrap();
        fs::write(&upload, format!("{text}{row}\n{row}\n")).unwrap();
        assert_eq!(call(&mut s, &batch)["data"]["summary"]["total"], 3);

        let reload = json!({"op": "reload", "path": upload}).to_string();
        assert_eq!(call(&mut s, &reload)["data"]["rows"], 3);

        let resp = call(&mut s, r#"{"op":"reload"}"#);
        assert_eq!(resp["status"], "invalid_input");
        let resp = call(&mut s, r#"{"op":"reload","dataset":"housing"}"#);
        assert_eq!(resp["data"]["rows"], 3);
    }
}
