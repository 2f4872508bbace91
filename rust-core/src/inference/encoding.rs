//! Feature encoding shared by single and batch prediction.
//!
//! There is exactly one categorical code table. Both prediction paths go
//! through [`encode`], so a dwelling gets the same encoded row whichever
//! path it comes from.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::error::{EngineError, EngineResult};
use crate::data::domain::{ColumnKind, Table, Value};
use crate::data::schemas::{housing, prediction};
use crate::model::domain::EncodedRow;

/// Model features, in the order the models were fitted on.
pub const FEATURES: [&str; 14] = [
    housing::CONSO_AUXILIAIRES,
    prediction::COUT_ECLAIRAGE,
    housing::CONSO_PAR_M2,
    prediction::EMISSION_GES_ECS,
    housing::CONSO_TOTALE,
    housing::SURFACE,
    prediction::COUT_ECS,
    prediction::COUT_AUXILIAIRES,
    housing::TYPE_BATIMENT,
    housing::CONSO_ECS,
    housing::EMISSION_GES,
    housing::ETIQUETTE_GES,
    housing::CONSO_REFROIDISSEMENT,
    housing::TYPE_ENERGIE,
];

/// Codes of one categorical feature.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryMap {
    pub column: &'static str,
    codes: Vec<(&'static str, i64)>,
}

impl CategoryMap {
    pub fn code(&self, value: &str) -> Option<i64> {
        self.codes
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, code)| *code)
    }

    pub fn values(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.codes.iter().map(|(name, _)| *name)
    }
}

/// Versioned categorical code table.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodingTable {
    version: &'static str,
    maps: Vec<CategoryMap>,
}

impl EncodingTable {
    /// Codes the current models were trained with.
    pub fn v1() -> Self {
        Self {
            version: "v1",
            maps: vec![
                CategoryMap {
                    column: housing::TYPE_BATIMENT,
                    codes: vec![("maison", 0), ("appartement", 1), ("immeuble", 2)],
                },
                CategoryMap {
                    column: housing::TYPE_ENERGIE,
                    codes: vec![
                        ("Electricite", 0),
                        ("Gaz_naturel", 1),
                        ("Fioul domestique", 2),
                        ("Reseau_de_chauffage_urbain", 3),
                        ("Autres", 4),
                    ],
                },
                CategoryMap {
                    column: housing::ETIQUETTE_GES,
                    codes: vec![
                        ("A", 0),
                        ("B", 1),
                        ("C", 2),
                        ("D", 3),
                        ("E", 4),
                        ("F", 5),
                        ("G", 6),
                    ],
                },
            ],
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn map(&self, column: &str) -> Option<&CategoryMap> {
        self.maps.iter().find(|m| m.column == column)
    }
}

impl Default for EncodingTable {
    fn default() -> Self {
        Self::v1()
    }
}

/// What to do with a categorical value missing from the code table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    /// Fail with `UnknownCategory`.
    #[default]
    Reject,
    /// Encode with the given code and record a warning.
    Sentinel(i64),
}

/// Unknown category that was encoded with a sentinel code.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EncodeWarning {
    pub column: String,
    pub value: String,
    pub code: i64,
}

impl fmt::Display for EncodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown category '{}' for column '{}', encoded as {}",
            self.value, self.column, self.code
        )
    }
}

/// Encoded model input plus the warnings raised while producing it.
#[derive(Clone, Debug, PartialEq)]
pub struct Encoded {
    pub row: EncodedRow,
    pub warnings: Vec<EncodeWarning>,
}

/// Raw field values keyed by column name, before encoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawInput(BTreeMap<String, Value>);

impl RawInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Model features of one table row. Absent columns stay absent.
    pub fn from_row(table: &Table, row: usize) -> Self {
        let mut raw = Self::new();
        if let Some(cells) = table.row(row) {
            for name in FEATURES {
                if let Some(ci) = table.column_index(name) {
                    raw.set(name, cells[ci].clone());
                }
            }
        }
        raw
    }
}

/// Typed form input for a single dwelling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DwellingInput {
    pub type_batiment: String,
    pub type_energie_recodee: String,
    pub etiquette_ges: String,
    pub surface_habitable_logement: f64,
    pub conso_5_usages_par_m2_ef: f64,
    #[serde(default)]
    pub conso_5_usages_ef: Option<f64>,
    pub conso_ecs_ef: f64,
    pub conso_auxiliaires_ef: f64,
    pub conso_refroidissement_ef: f64,
    pub cout_ecs: f64,
    pub cout_auxiliaires: f64,
    pub cout_eclairage: f64,
    pub emission_ges_ecs: f64,
    #[serde(default)]
    pub emission_ges_5_usages: Option<f64>,
}

impl DwellingInput {
    /// Fill the totals the form does not ask for: consumption is intensity
    /// times surface, emissions are approximated as five times the hot-water
    /// emissions.
    pub fn with_derived_totals(mut self) -> Self {
        if self.conso_5_usages_ef.is_none() {
            self.conso_5_usages_ef =
                Some(self.conso_5_usages_par_m2_ef * self.surface_habitable_logement);
        }
        if self.emission_ges_5_usages.is_none() {
            self.emission_ges_5_usages = Some(5.0 * self.emission_ges_ecs);
        }
        self
    }

    /// Values of the batch upload template.
    pub fn template() -> Self {
        Self {
            type_batiment: "maison".into(),
            type_energie_recodee: "Electricite".into(),
            etiquette_ges: "D".into(),
            surface_habitable_logement: 100.0,
            conso_5_usages_par_m2_ef: 200.0,
            conso_5_usages_ef: Some(20000.0),
            conso_ecs_ef: 2000.0,
            conso_auxiliaires_ef: 500.0,
            conso_refroidissement_ef: 0.0,
            cout_ecs: 300.0,
            cout_auxiliaires: 100.0,
            cout_eclairage: 80.0,
            emission_ges_ecs: 500.0,
            emission_ges_5_usages: Some(2500.0),
        }
    }
}

impl From<&DwellingInput> for RawInput {
    fn from(d: &DwellingInput) -> Self {
        let mut raw = RawInput::new();
        raw.set(housing::TYPE_BATIMENT, d.type_batiment.as_str());
        raw.set(housing::TYPE_ENERGIE, d.type_energie_recodee.as_str());
        raw.set(housing::ETIQUETTE_GES, d.etiquette_ges.as_str());
        raw.set(housing::SURFACE, d.surface_habitable_logement);
        raw.set(housing::CONSO_PAR_M2, d.conso_5_usages_par_m2_ef);
        raw.set(housing::CONSO_TOTALE, d.conso_5_usages_ef);
        raw.set(housing::CONSO_ECS, d.conso_ecs_ef);
        raw.set(housing::CONSO_AUXILIAIRES, d.conso_auxiliaires_ef);
        raw.set(housing::CONSO_REFROIDISSEMENT, d.conso_refroidissement_ef);
        raw.set(prediction::COUT_ECS, d.cout_ecs);
        raw.set(prediction::COUT_AUXILIAIRES, d.cout_auxiliaires);
        raw.set(prediction::COUT_ECLAIRAGE, d.cout_eclairage);
        raw.set(prediction::EMISSION_GES_ECS, d.emission_ges_ecs);
        raw.set(housing::EMISSION_GES, d.emission_ges_5_usages);
        raw
    }
}

/// One-row table in upload layout, with the template values.
pub fn template_table() -> EngineResult<Table> {
    let raw = RawInput::from(&DwellingInput::template());
    let codes = EncodingTable::v1();
    let columns: Vec<_> = FEATURES
        .iter()
        .map(|name| match codes.map(name) {
            Some(_) => (*name, ColumnKind::Categorical),
            None => (*name, ColumnKind::Numeric),
        })
        .collect();
    let row = FEATURES
        .iter()
        .map(|name| raw.get(name).cloned().unwrap_or_default())
        .collect();
    Table::from_rows(&columns, vec![row])
}

/// Encode raw values into the model's feature order.
pub fn encode(
    raw: &RawInput,
    table: &EncodingTable,
    policy: UnknownCategoryPolicy,
) -> EngineResult<Encoded> {
    let mut features = Vec::with_capacity(FEATURES.len());
    let mut warnings = Vec::new();

    for name in FEATURES {
        let value = raw
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| EngineError::invalid(format!("feature '{name}' is missing")))?;

        let encoded = match table.map(name) {
            Some(map) => {
                let text = value.to_string();
                let text = text.trim();
                match (map.code(text), policy) {
                    (Some(code), _) => code as f64,
                    (None, UnknownCategoryPolicy::Reject) => {
                        return Err(EngineError::UnknownCategory {
                            column: name.to_string(),
                            value: text.to_string(),
                        })
                    }
                    (None, UnknownCategoryPolicy::Sentinel(code)) => {
                        warn!(
                            column = name,
                            value = text,
                            code,
                            "unknown category encoded as sentinel"
                        );
                        warnings.push(EncodeWarning {
                            column: name.to_string(),
                            value: text.to_string(),
                            code,
                        });
                        code as f64
                    }
                }
            }
            None => numeric(name, value)?,
        };
        features.push(encoded);
    }

    Ok(Encoded {
        row: EncodedRow::new(features),
        warnings,
    })
}

fn numeric(name: &str, value: &Value) -> EngineResult<f64> {
    let parsed = match value {
        Value::Text(s) => Value::parse_numeric(s).and_then(|v| v.as_f64()),
        other => other.as_f64(),
    };
    parsed.ok_or_else(|| {
        EngineError::invalid(format!("feature '{name}' is not numeric: '{value}'"))
    })
}
