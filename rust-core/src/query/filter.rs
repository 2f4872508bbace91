//! Filter engine: conjunctions of per-column predicates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::common::error::{EngineError, EngineResult};
use crate::data::domain::{Table, Value};

use super::view::View;

/// Comparison applied to a single column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PredicateOp {
    /// Exact match. `Null` matches missing cells.
    Equals { value: Value },
    /// Membership; an empty set matches nothing.
    InSet { values: Vec<Value> },
    /// Inclusive numeric range; missing and non-numeric cells never match.
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    #[serde(flatten)]
    pub op: PredicateOp,
}

impl Predicate {
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::Equals {
                value: value.into(),
            },
        }
    }

    pub fn in_set<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::InSet {
                values: values.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn range(column: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::Range { min, max },
        }
    }
}

/// Predicates combined with logical AND. An empty set keeps every row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet {
    predicates: Vec<Predicate>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluate against the whole table.
    pub fn apply<'t>(&self, table: &'t Table) -> EngineResult<View<'t>> {
        View::all(table).refine(self)
    }

    /// Resolve column names once so row evaluation is index based.
    pub(crate) fn compile(&self, table: &Table) -> EngineResult<Vec<Compiled>> {
        self.predicates
            .iter()
            .map(|p| {
                let (idx, col) = table.schema().require(&p.column)?;
                let test = match &p.op {
                    PredicateOp::Equals { value } => Test::Equals(value.clone()),
                    PredicateOp::InSet { values } => {
                        Test::InSet(values.iter().cloned().collect())
                    }
                    PredicateOp::Range { min, max } => {
                        if !col.kind.is_numeric() {
                            return Err(EngineError::SchemaError {
                                column: p.column.clone(),
                                reason: "is not numeric and cannot take a range filter",
                            });
                        }
                        Test::Range {
                            min: min.unwrap_or(f64::NEG_INFINITY),
                            max: max.unwrap_or(f64::INFINITY),
                        }
                    }
                };
                Ok(Compiled { idx, test })
            })
            .collect()
    }
}

impl FromIterator<Predicate> for FilterSet {
    fn from_iter<I: IntoIterator<Item = Predicate>>(iter: I) -> Self {
        Self {
            predicates: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug)]
enum Test {
    Equals(Value),
    InSet(HashSet<Value>),
    Range { min: f64, max: f64 },
}

#[derive(Debug)]
pub(crate) struct Compiled {
    idx: usize,
    test: Test,
}

impl Compiled {
    pub(crate) fn matches(&self, row: &[Value]) -> bool {
        let cell = &row[self.idx];
        match &self.test {
            Test::Equals(v) => cell == v,
            Test::InSet(set) => set.contains(cell),
            Test::Range { min, max } => cell
                .as_f64()
                .map(|x| x >= *min && x <= *max)
                .unwrap_or(false),
        }
    }
}
