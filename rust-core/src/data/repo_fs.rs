//! Delimited-file reader and writer for tables.
//!
//! Loading is all-or-nothing: a missing file, a missing expected column or a
//! single malformed cell aborts the load and no table is produced.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{debug, info};

use crate::common::error::{EngineError, EngineResult};
use crate::common::fingerprint::Fingerprint;
use crate::common::log::elapsed_ms;

use super::domain::{Column, ColumnKind, ExpectedColumn, Schema, SchemaSpec, Table, Value};

/// Presentation-boundary formatting applied when writing tables back out.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Decimal places for `Float` cells; `None` writes full precision.
    pub float_precision: Option<usize>,
    pub delimiter: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            float_precision: Some(2),
            delimiter: b',',
        }
    }
}

impl ExportOptions {
    pub fn with_precision(precision: usize) -> Self {
        Self {
            float_precision: Some(precision),
            ..Self::default()
        }
    }

    pub fn format(&self, value: &Value) -> String {
        match (value, self.float_precision) {
            (Value::Float(f), Some(p)) => format!("{f:.p$}"),
            (other, _) => other.to_string(),
        }
    }
}

/// Load a comma-separated file and validate it against `spec`.
pub fn load(path: &Path, spec: &SchemaSpec) -> EngineResult<Table> {
    load_fingerprinted(path, spec).map(|(table, _)| table)
}

/// Load a file and return the digest of the exact bytes that were parsed.
pub fn load_fingerprinted(path: &Path, spec: &SchemaSpec) -> EngineResult<(Table, Fingerprint)> {
    let start = Instant::now();
    if !path.exists() {
        return Err(EngineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path).map_err(|e| EngineError::io(path, e))?;
    let fingerprint = Fingerprint::of_bytes(&bytes);
    let table = read_table(bytes.as_slice(), spec)?.with_source(path.to_path_buf());

    info!(
        path = %path.display(),
        dataset = spec.name,
        rows = table.len(),
        columns = table.columns().len(),
        fingerprint = fingerprint.as_str(),
        duration_ms = elapsed_ms(start),
        "table loaded"
    );
    Ok((table, fingerprint))
}

/// Parse a table from any reader. Exposed for in-memory uploads.
pub fn read_table<R: Read>(reader: R, spec: &SchemaSpec) -> EngineResult<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let header: Vec<String> = rdr
        .headers()
        .map_err(map_csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    spec.check_header(&header)?;

    let mut records = Vec::new();
    for record in rdr.records() {
        records.push(record.map_err(map_csv_error)?);
    }

    let columns: Vec<Column> = header
        .iter()
        .enumerate()
        .map(|(ci, name)| Column {
            name: name.clone(),
            kind: match spec.expected(name) {
                Some(expected) => expected.kind,
                None => infer_kind(&records, ci),
            },
        })
        .collect();

    let mut rows = Vec::with_capacity(records.len());
    for (ri, record) in records.iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len());
        for (ci, col) in columns.iter().enumerate() {
            let raw = record.get(ci).unwrap_or_default();
            row.push(parse_cell(raw, col, spec.expected(&col.name), ri + 1)?);
        }
        rows.push(row);
    }

    debug!(dataset = spec.name, rows = rows.len(), "records parsed");
    Table::new(Schema::new(columns)?, rows)
}

fn parse_cell(
    raw: &str,
    col: &Column,
    expected: Option<&ExpectedColumn>,
    row: usize,
) -> EngineResult<Value> {
    if let Some(rule) = expected.and_then(|e| e.fill) {
        return Ok(rule.apply(raw));
    }
    if col.kind.is_numeric() {
        Value::parse_numeric(raw).ok_or_else(|| EngineError::ParseError {
            row,
            column: col.name.clone(),
            value: raw.to_string(),
        })
    } else {
        Ok(Value::parse_text(raw))
    }
}

/// Unlisted columns are numeric when every non-missing cell parses as one.
fn infer_kind(records: &[StringRecord], ci: usize) -> ColumnKind {
    let mut saw_number = false;
    for record in records {
        match Value::parse_numeric(record.get(ci).unwrap_or_default()) {
            Some(Value::Null) => {}
            Some(_) => saw_number = true,
            None => return ColumnKind::Categorical,
        }
    }
    if saw_number {
        ColumnKind::Numeric
    } else {
        ColumnKind::Categorical
    }
}

fn map_csv_error(err: csv::Error) -> EngineError {
    let row = err
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or_default();
    match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => EngineError::MalformedRow {
            row,
            reason: format!("{len} fields, expected {expected_len}"),
        },
        csv::ErrorKind::Utf8 { .. } => EngineError::MalformedRow {
            row,
            reason: "invalid UTF-8".to_string(),
        },
        _ => EngineError::Csv(err),
    }
}

/// Write a header plus rows in schema order.
pub fn write_rows<'a, W, I>(
    writer: W,
    schema: &Schema,
    rows: I,
    opts: &ExportOptions,
) -> EngineResult<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a [Value]>,
{
    let mut wtr = WriterBuilder::new()
        .delimiter(opts.delimiter)
        .from_writer(writer);
    wtr.write_record(schema.names())?;

    let mut written = 0;
    for row in rows {
        wtr.write_record(row.iter().map(|v| opts.format(v)))?;
        written += 1;
    }
    wtr.flush().map_err(|e| EngineError::io("<export>", e))?;
    Ok(written)
}
