//! Filtered views over a table.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::common::error::{EngineError, EngineResult};
use crate::data::domain::{Table, Value};
use crate::data::repo_fs::{self, ExportOptions};

use super::filter::FilterSet;

/// Row subset of a table, in the table's original row order.
///
/// The base table is borrowed, never copied or mutated.
#[derive(Clone, Debug)]
pub struct View<'t> {
    table: &'t Table,
    rows: Vec<usize>,
}

impl<'t> View<'t> {
    /// View over every row.
    pub fn all(table: &'t Table) -> Self {
        Self {
            table,
            rows: (0..table.len()).collect(),
        }
    }

    pub(crate) fn from_indices(table: &'t Table, rows: Vec<usize>) -> Self {
        Self { table, rows }
    }

    pub fn table(&self) -> &'t Table {
        self.table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Zero rows is a valid terminal state, not an error.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Indices into the base table.
    pub fn row_indices(&self) -> &[usize] {
        &self.rows
    }

    pub fn rows(&self) -> impl Iterator<Item = &'t [Value]> + '_ {
        let table = self.table;
        self.rows.iter().filter_map(move |&i| table.row(i))
    }

    /// Cells of one column, in view order.
    pub fn column(&self, name: &str) -> EngineResult<impl Iterator<Item = &'t Value> + '_> {
        let (ci, _) = self.table.schema().require(name)?;
        Ok(self.rows().map(move |row| &row[ci]))
    }

    /// Narrow this view further. Filtering is idempotent.
    pub fn refine(&self, filters: &FilterSet) -> EngineResult<View<'t>> {
        let compiled = filters.compile(self.table)?;
        let rows = self
            .rows
            .iter()
            .copied()
            .filter(|&i| {
                self.table
                    .row(i)
                    .map(|row| compiled.iter().all(|p| p.matches(row)))
                    .unwrap_or(false)
            })
            .collect();
        Ok(View::from_indices(self.table, rows))
    }

    /// First `n` rows of the view.
    pub fn head(&self, n: usize) -> View<'t> {
        View::from_indices(self.table, self.rows.iter().copied().take(n).collect())
    }

    /// Copy the selected rows into a standalone table.
    pub fn to_table(&self) -> EngineResult<Table> {
        Table::new(
            self.table.schema().clone(),
            self.rows().map(<[Value]>::to_vec).collect(),
        )
    }

    /// Serialise the view in the same delimited format the loader reads.
    pub fn write_csv<W: Write>(&self, writer: W, opts: &ExportOptions) -> EngineResult<usize> {
        repo_fs::write_rows(writer, self.table.schema(), self.rows(), opts)
    }

    pub fn export(&self, path: &Path, opts: &ExportOptions) -> EngineResult<usize> {
        let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
        let written = self.write_csv(BufWriter::new(file), opts)?;
        info!(path = %path.display(), rows = written, "view exported");
        Ok(written)
    }
}

impl PartialEq for View<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.table, other.table) && self.rows == other.rows
    }
}
