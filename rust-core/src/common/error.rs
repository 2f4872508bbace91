//! Error handling primitives shared across the core.
//!
//! Every failure carries enough context (path, column, row) to be shown to
//! the dashboard user as-is. The numeric [`ErrorCode`] is what crosses the
//! C ABI and the JSON responses.

use std::path::PathBuf;

use thiserror::Error;

/// Stable error codes that cross the FFI boundary.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Input file does not exist.
    FileNotFound = 1,
    /// Expected column missing, or an operation addressed an unknown column.
    SchemaError = 2,
    /// Malformed numeric cell or row.
    ParseError = 3,
    /// Filter produced zero rows. A status, never raised as an error.
    EmptySelection = 4,
    /// Categorical prediction input outside the encoding table.
    UnknownCategory = 5,
    /// Model artefact missing or failed to deserialise.
    ModelUnavailable = 6,
    /// Compared records do not share the requested fields.
    SchemaMismatch = 7,
    /// Row selector resolved to zero or several records.
    SelectionError = 8,
    /// Request or configuration failed validation.
    InvalidInput = 9,
    /// Catch-all for IO and serialisation failures.
    Internal = 10,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::FileNotFound => "file_not_found",
            ErrorCode::SchemaError => "schema_error",
            ErrorCode::ParseError => "parse_error",
            ErrorCode::EmptySelection => "empty_selection",
            ErrorCode::UnknownCategory => "unknown_category",
            ErrorCode::ModelUnavailable => "model_unavailable",
            ErrorCode::SchemaMismatch => "schema_mismatch",
            ErrorCode::SelectionError => "selection_error",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("schema error: column '{column}' {reason}")]
    SchemaError { column: String, reason: &'static str },

    #[error("parse error at row {row}, column '{column}': cannot read '{value}' as a number")]
    ParseError {
        row: usize,
        column: String,
        value: String,
    },

    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("unknown category '{value}' for column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("model unavailable at {}: {reason}", path.display())]
    ModelUnavailable { path: PathBuf, reason: String },

    #[error("schema mismatch: field '{field}' is missing from record {side}")]
    SchemaMismatch { field: String, side: &'static str },

    #[error("no direction configured for field '{field}'")]
    UnknownDirection { field: String },

    #[error("no record matches the selector")]
    RecordNotFound,

    #[error("selector matched {matched} records, expected exactly one")]
    AmbiguousSelection { matched: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Machine parsable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::FileNotFound { .. } => ErrorCode::FileNotFound,
            EngineError::SchemaError { .. } => ErrorCode::SchemaError,
            EngineError::ParseError { .. } | EngineError::MalformedRow { .. } => {
                ErrorCode::ParseError
            }
            EngineError::UnknownCategory { .. } => ErrorCode::UnknownCategory,
            EngineError::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            EngineError::SchemaMismatch { .. } | EngineError::UnknownDirection { .. } => {
                ErrorCode::SchemaMismatch
            }
            EngineError::RecordNotFound | EngineError::AmbiguousSelection { .. } => {
                ErrorCode::SelectionError
            }
            EngineError::InvalidInput(_) => ErrorCode::InvalidInput,
            EngineError::Io { .. } | EngineError::Csv(_) | EngineError::Json(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Unknown column helper.
    pub fn unknown_column(column: impl Into<String>) -> Self {
        EngineError::SchemaError {
            column: column.into(),
            reason: "is not present in the table",
        }
    }

    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert_eq!(ErrorCode::FileNotFound as u32, 1);
        assert_eq!(ErrorCode::SchemaError as u32, 2);
        assert_eq!(ErrorCode::ParseError as u32, 3);
        assert_eq!(ErrorCode::EmptySelection as u32, 4);
        assert_eq!(ErrorCode::UnknownCategory as u32, 5);
        assert_eq!(ErrorCode::ModelUnavailable as u32, 6);
        assert_eq!(ErrorCode::SchemaMismatch as u32, 7);
        assert_eq!(ErrorCode::SelectionError as u32, 8);
        assert_eq!(ErrorCode::InvalidInput as u32, 9);
        assert_eq!(ErrorCode::Internal as u32, 10);
    }

    #[test]
    fn errors_map_to_codes() {
        let err = EngineError::unknown_column("etiquette_dpe");
        assert_eq!(err.code(), ErrorCode::SchemaError);
        assert!(err.to_string().contains("etiquette_dpe"));

        let err = EngineError::AmbiguousSelection { matched: 3 };
        assert_eq!(err.code(), ErrorCode::SelectionError);
        assert_eq!(err.code().as_str(), "selection_error");
    }
}
