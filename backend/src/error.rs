//! Error types for the sheetload ingestion pipeline.
//!
//! Only two things are exceptional control flow in an import session:
//! reading the source file and committing the selected rows. Everything
//! that happens per row (missing fields, unparseable cells, duplicates) is
//! returned as data on the parsed rows instead.
//!
//! - [`SourceError`] - the uploaded file could not be turned into a grid
//! - [`TransformError`] - invalid wide-format (matrix) configuration
//! - [`ValidationError`] - per-row validation messages
//! - [`StoreError`] - saved mapping store failures
//! - [`SinkError`] - persistence collaborator failures
//! - [`SessionError`] - top-level import session errors
//! - [`ConfigError`] - invalid environment configuration
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while reading an uploaded document into a raw grid.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the text content.
    #[error("Failed to decode file: {0}")]
    EncodingError(String),

    /// Delimited text could not be parsed.
    #[error("Invalid delimited file: {0}")]
    ParseError(String),

    /// Workbook could not be opened or read.
    #[error("Invalid workbook: {0}")]
    WorkbookError(String),

    /// The file contains no rows.
    #[error("File is empty")]
    EmptyFile,
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors in the configuration of a wide-format expansion.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A configured column is not among the detected headers.
    #[error("Missing source column: {0}")]
    MissingColumn(String),

    /// A selected period header is not a known period name.
    #[error("Unknown period column: {0}")]
    UnknownPeriod(String),

    /// No period columns were selected.
    #[error("No period columns selected")]
    NoPeriods,
}

// =============================================================================
// Validation Errors
// =============================================================================

/// A single row-level validation problem.
///
/// These are rendered into `validation_errors` on a parsed row and never
/// abort a batch.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema validation failed.
    #[error("Validation failed: {errors:?}")]
    SchemaError { errors: Vec<String> },

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid field value.
    #[error("Invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Row holds nothing but empty or zero values.
    #[error("Row has no data")]
    EmptyRow,
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the saved mapping store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("Mapping store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Mapping store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Nothing stored for this context.
    #[error("No saved mapping for context: {0}")]
    NotFound(String),
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum SinkError {
    /// IO error.
    #[error("Record sink IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Record sink JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The destination refused the batch.
    #[error("Insert into '{table}' rejected: {message}")]
    Rejected { table: String, message: String },
}

// =============================================================================
// Session Errors (top-level)
// =============================================================================

/// Top-level import session errors.
///
/// This is the error type returned by [`crate::transform::pipeline::ImportSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The source could not be read; the session was reset.
    #[error("Could not read file: {0}")]
    Source(#[from] SourceError),

    /// Wide-format configuration error.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Mapping store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Commit failed; the session state is kept for a retry.
    #[error("Commit failed: {0}")]
    Sink(#[from] SinkError),

    /// An operation needs a loaded grid.
    #[error("No file loaded")]
    NoGrid,

    /// Header row index outside the grid.
    #[error("Header row {row} is outside the grid ({rows} rows)")]
    InvalidHeaderRow { row: usize, rows: usize },

    /// Header label not present in the current file.
    #[error("Unknown column: {0}")]
    UnknownHeader(String),

    /// System field key not present in the registry.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Commit requested with an empty selection.
    #[error("No rows selected")]
    NothingSelected,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be parsed.
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: String, value: String },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown session or context.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for source reading.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for matrix expansion.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for mapping store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for persistence operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for import session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // SourceError -> SessionError
        let source_err = SourceError::EmptyFile;
        let session_err: SessionError = source_err.into();
        assert!(session_err.to_string().contains("empty"));

        // TransformError -> SessionError
        let transform_err = TransformError::MissingColumn("Cuenta".into());
        let session_err: SessionError = transform_err.into();
        assert!(session_err.to_string().contains("Cuenta"));
    }

    #[test]
    fn test_validation_error_format() {
        let err = ValidationError::InvalidValue {
            field: "Fecha".into(),
            message: "not a calendar date".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Fecha"));
        assert!(msg.contains("not a calendar date"));

        let missing = ValidationError::MissingField("Monto".into());
        assert_eq!(missing.to_string(), "Missing required field: Monto");
    }

    #[test]
    fn test_sink_rejection_mentions_table() {
        let err = SinkError::Rejected {
            table: "purchases".into(),
            message: "connection reset".into(),
        };
        let session_err: SessionError = err.into();
        assert!(session_err.to_string().contains("purchases"));
    }
}
