//! Core table definitions: cell values, schemas and the loaded table.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::error::{EngineError, EngineResult};

/// Sentinel bucket for missing postal codes.
pub const UNKNOWN_POSTAL_CODE: &str = "Inconnu";

/// A single scalar cell.
///
/// Missing cells are always `Null`; nothing is silently coerced to zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell; `None` for text and missing values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integral value for a float with no fractional part, used so that
    /// `Int(3)` and `Float(3.0)` compare and hash alike.
    fn integral(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(*f as i64),
            _ => None,
        }
    }

    /// Typed ordering: numbers numerically, then text lexically, then nulls.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Int(_) | Value::Float(_) => 0,
                Value::Text(_) => 1,
                Value::Null => 2,
            }
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => rank(a).cmp(&rank(b)),
            },
        }
    }

    /// Parse a numeric cell. Missing-value tokens yield `Some(Null)`,
    /// text that is not a number yields `None`.
    pub fn parse_numeric(raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        if is_missing_token(trimmed) {
            return Some(Value::Null);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(Value::Int(i));
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Some(Value::Float(f)),
            _ => None,
        }
    }

    /// Parse a categorical cell, mapping missing-value tokens to `Null`.
    pub fn parse_text(raw: &str) -> Value {
        if is_missing_token(raw.trim()) {
            Value::Null
        } else {
            Value::Text(raw.to_string())
        }
    }
}

fn is_missing_token(trimmed: &str) -> bool {
    matches!(trimmed, "" | "NA" | "NaN" | "nan" | "null" | "NULL" | "None")
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
                match (self.integral(), other.integral()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
            Value::Int(_) | Value::Float(_) => {
                2u8.hash(state);
                match self.integral() {
                    Some(i) => i.hash(state),
                    None => {
                        let f = self.as_f64().unwrap_or(f64::NAN);
                        let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
                        bits.hash(state);
                    }
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Semantic type of a column.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Categorical,
    Numeric,
    Identifier,
    Geo,
}

impl ColumnKind {
    /// Numeric reducers and range predicates are only defined on these.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::Geo)
    }
}

/// Column descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Documented default-fill rules applied while loading.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FillRule {
    /// Zero-pad numeric postal codes to five digits; missing or zero codes
    /// go to the [`UNKNOWN_POSTAL_CODE`] bucket.
    PostalCode,
}

impl FillRule {
    pub fn apply(&self, raw: &str) -> Value {
        match self {
            FillRule::PostalCode => {
                let trimmed = raw.trim();
                match Value::parse_numeric(trimmed) {
                    Some(Value::Null) => Value::text(UNKNOWN_POSTAL_CODE),
                    Some(v) => match v.as_f64() {
                        Some(n) if n == 0.0 => Value::text(UNKNOWN_POSTAL_CODE),
                        Some(n) if n > 0.0 && n.fract() == 0.0 => {
                            Value::Text(format!("{:05}", n as i64))
                        }
                        _ => Value::text(trimmed),
                    },
                    None => Value::text(trimmed),
                }
            }
        }
    }
}

/// Expected column in a dataset contract.
#[derive(Clone, Debug)]
pub struct ExpectedColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Absent optional columns are not a schema error.
    pub required: bool,
    pub fill: Option<FillRule>,
}

impl ExpectedColumn {
    pub const fn required(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            fill: None,
        }
    }

    pub const fn optional(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            fill: None,
        }
    }

    pub const fn with_fill(mut self, rule: FillRule) -> Self {
        self.fill = Some(rule);
        self
    }
}

/// Column contract for one input file.
#[derive(Clone, Debug)]
pub struct SchemaSpec {
    pub name: &'static str,
    pub columns: Vec<ExpectedColumn>,
}

impl SchemaSpec {
    /// Contract that accepts any header and infers every column kind.
    pub fn open(name: &'static str) -> Self {
        Self {
            name,
            columns: Vec::new(),
        }
    }

    pub fn expected(&self, name: &str) -> Option<&ExpectedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Fail loudly on the first required column absent from `header`.
    pub fn check_header(&self, header: &[String]) -> EngineResult<()> {
        for col in self.columns.iter().filter(|c| c.required) {
            if !header.iter().any(|h| h == col.name) {
                return Err(EngineError::SchemaError {
                    column: col.name.to_string(),
                    reason: "is missing from the file header",
                });
            }
        }
        Ok(())
    }
}

/// Ordered column descriptors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> EngineResult<Self> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if index.insert(col.name.clone(), i).is_some() {
                return Err(EngineError::SchemaError {
                    column: col.name.clone(),
                    reason: "appears more than once in the header",
                });
            }
        }
        Ok(Self { columns, index })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Column lookup that reports the offending name on failure.
    pub fn require(&self, name: &str) -> EngineResult<(usize, &Column)> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| EngineError::unknown_column(name))?;
        Ok((idx, &self.columns[idx]))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Immutable in-memory table. Every row has exactly `schema.len()` cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    source: Option<PathBuf>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> EngineResult<Self> {
        if let Some((i, _)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != schema.len())
        {
            return Err(EngineError::invalid(format!(
                "row {} has a different width than the schema ({} columns)",
                i + 1,
                schema.len()
            )));
        }
        Ok(Self {
            schema,
            rows,
            source: None,
        })
    }

    pub(crate) fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    /// Convenience builder for small in-memory tables.
    pub fn from_rows(columns: &[(&str, ColumnKind)], rows: Vec<Vec<Value>>) -> EngineResult<Self> {
        let schema = Schema::new(
            columns
                .iter()
                .map(|(name, kind)| Column {
                    name: name.to_string(),
                    kind: *kind,
                })
                .collect(),
        )?;
        Self::new(schema, rows)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[Column] {
        self.schema.columns()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    pub fn row(&self, idx: usize) -> Option<&[Value]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Cell at (`row`, column named `col`).
    pub fn value(&self, row: usize, col: &str) -> EngineResult<&Value> {
        let (ci, _) = self.schema.require(col)?;
        self.rows
            .get(row)
            .map(|r| &r[ci])
            .ok_or_else(|| EngineError::invalid(format!("row {row} is out of range")))
    }

    /// Distinct non-null values of a column in first-seen order.
    pub fn distinct(&self, col: &str) -> EngineResult<Vec<Value>> {
        let (ci, _) = self.schema.require(col)?;
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .rows
            .iter()
            .map(|r| &r[ci])
            .filter(|v| !v.is_null() && seen.insert((*v).clone()))
            .cloned()
            .collect())
    }
}
