//! Types of the record comparison: field directions, selectors and deltas.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::domain::{Table, Value};
use crate::data::schemas::housing;
use crate::query::filter::FilterSet;

/// Which end of a numeric field is the favourable one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

/// Explicit per-field direction configuration. Nothing is inferred from
/// column names.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectionTable {
    fields: HashMap<String, Direction>,
}

impl DirectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.fields.insert(field.into(), direction);
        self
    }

    /// Cost, consumption and emission fields of the housing dataset.
    pub fn dpe_default() -> Self {
        Self::new()
            .with(housing::COUT_TOTAL, Direction::LowerIsBetter)
            .with(housing::CONSO_PAR_M2, Direction::LowerIsBetter)
            .with(housing::CONSO_TOTALE, Direction::LowerIsBetter)
            .with(housing::EMISSION_GES, Direction::LowerIsBetter)
    }

    pub fn get(&self, field: &str) -> Option<Direction> {
        self.fields.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Fields shown by the comparison page, in display order.
pub const DPE_COMPARE_FIELDS: [&str; 4] = [
    housing::COUT_TOTAL,
    housing::CONSO_PAR_M2,
    housing::CONSO_TOTALE,
    housing::EMISSION_GES,
];

/// How one side of a comparison picks its record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSelector {
    /// Row position in the base table.
    Index(usize),
    /// Filters that must match exactly one row.
    Filters(FilterSet),
}

/// A single resolved record: one row of a table.
#[derive(Copy, Clone, Debug)]
pub struct Record<'t> {
    pub(crate) table: &'t Table,
    pub(crate) row: usize,
}

impl<'t> Record<'t> {
    pub fn table(&self) -> &'t Table {
        self.table
    }

    pub fn row(&self) -> usize {
        self.row
    }

    /// Cell of `field`, `None` when the table has no such column.
    pub fn get(&self, field: &str) -> Option<&'t Value> {
        let ci = self.table.column_index(field)?;
        self.table.row(self.row).map(|r| &r[ci])
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Favorable {
    A,
    B,
    Equal,
}

impl Favorable {
    pub fn flipped(self) -> Self {
        match self {
            Favorable::A => Favorable::B,
            Favorable::B => Favorable::A,
            Favorable::Equal => Favorable::Equal,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDelta {
    pub field: String,
    pub value_a: Value,
    pub value_b: Value,
    /// `a - b`; `None` when either side is missing.
    pub delta: Option<f64>,
    pub favorable: Favorable,
}

/// Count of fields favouring each side.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Verdict {
    pub a: usize,
    pub b: usize,
    pub equal: usize,
}

impl Verdict {
    pub fn overall(&self) -> Favorable {
        match self.a.cmp(&self.b) {
            std::cmp::Ordering::Greater => Favorable::A,
            std::cmp::Ordering::Less => Favorable::B,
            std::cmp::Ordering::Equal => Favorable::Equal,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comparison {
    pub deltas: Vec<FieldDelta>,
    pub verdict: Verdict,
}
