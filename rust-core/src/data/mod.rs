//! Record store: typed tables loaded from delimited files.

pub mod cache;
pub mod domain;
pub mod repo_fs;
pub mod schemas;
pub mod service;

pub use domain::{Column, ColumnKind, Schema, SchemaSpec, Table, Value};
pub use repo_fs::ExportOptions;
pub use service::Session;
