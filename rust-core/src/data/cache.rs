//! Session-scoped cache of loaded tables.
//!
//! Entries are keyed by path and dataset contract and remember the content
//! fingerprint they were parsed from. A cached table is served until the
//! caller explicitly invalidates or refreshes it; the cache never re-reads a
//! file on its own.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::common::error::EngineResult;
use crate::common::fingerprint::Fingerprint;

use super::domain::{SchemaSpec, Table};
use super::repo_fs;

#[derive(Debug)]
struct Entry {
    fingerprint: Fingerprint,
    table: Arc<Table>,
}

type Key = (PathBuf, &'static str);

#[derive(Debug, Default)]
pub struct TableCache {
    entries: HashMap<Key, Entry>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached table for `path`, loading it on first use.
    pub fn get_or_load(&mut self, path: &Path, spec: &SchemaSpec) -> EngineResult<Arc<Table>> {
        let key = (path.to_path_buf(), spec.name);
        if let Some(entry) = self.entries.get(&key) {
            debug!(path = %path.display(), "table cache hit");
            return Ok(Arc::clone(&entry.table));
        }
        let (table, fingerprint) = repo_fs::load_fingerprinted(path, spec)?;
        let table = Arc::new(table);
        self.entries.insert(
            key,
            Entry {
                fingerprint,
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    /// Re-read `path` and replace the entry when its content changed.
    ///
    /// Returns the current table; an unchanged file keeps the same `Arc`.
    /// A failed reload leaves the previous entry untouched.
    pub fn refresh(&mut self, path: &Path, spec: &SchemaSpec) -> EngineResult<Arc<Table>> {
        let key = (path.to_path_buf(), spec.name);
        let current = Fingerprint::of_file(path)?;
        if let Some(entry) = self.entries.get(&key) {
            if entry.fingerprint == current {
                debug!(path = %path.display(), "table unchanged on refresh");
                return Ok(Arc::clone(&entry.table));
            }
        }
        let (table, fingerprint) = repo_fs::load_fingerprinted(path, spec)?;
        info!(path = %path.display(), fingerprint = fingerprint.as_str(), "table reloaded");
        let table = Arc::new(table);
        self.entries.insert(
            key,
            Entry {
                fingerprint,
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    /// Drop every entry for `path`. Returns whether anything was evicted.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(p, _), _| p != path);
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fingerprint(&self, path: &Path, spec: &SchemaSpec) -> Option<&Fingerprint> {
        self.entries
            .get(&(path.to_path_buf(), spec.name))
            .map(|e| &e.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::{SchemaSpec, Value};
    use std::fs;

    fn spec() -> SchemaSpec {
        SchemaSpec::open("test")
    }

    #[test]
    fn serves_cached_table_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "cat,v\nA,10\n").unwrap();

        let mut cache = TableCache::new();
        let first = cache.get_or_load(&path, &spec()).unwrap();

        // A silent change on disk is not picked up.
        fs::write(&path, "cat,v\nA,99\n").unwrap();
        let second = cache.get_or_load(&path, &spec()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.value(0, "v").unwrap(), &Value::Int(10));

        assert!(cache.invalidate(&path));
        assert!(cache.is_empty());
        let third = cache.get_or_load(&path, &spec()).unwrap();
        assert_eq!(third.value(0, "v").unwrap(), &Value::Int(99));
    }

    #[test]
    fn refresh_keeps_unchanged_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "cat,v\nA,10\n").unwrap();

        let mut cache = TableCache::new();
        let first = cache.get_or_load(&path, &spec()).unwrap();
        let fp = cache.fingerprint(&path, &spec()).cloned().unwrap();

        let same = cache.refresh(&path, &spec()).unwrap();
        assert!(Arc::ptr_eq(&first, &same));

        fs::write(&path, "cat,v\nA,11\n").unwrap();
        let changed = cache.refresh(&path, &spec()).unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_ne!(cache.fingerprint(&path, &spec()), Some(&fp));
        assert_eq!(changed.value(0, "v").unwrap(), &Value::Int(11));
    }

    #[test]
    fn failed_load_caches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TableCache::new();
        assert!(cache
            .get_or_load(&dir.path().join("missing.csv"), &spec())
            .is_err());
        assert!(cache.is_empty());
    }
}
