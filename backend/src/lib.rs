//! # Sheetload - spreadsheet to system-record normalization
//!
//! Sheetload turns arbitrary user spreadsheets (CSV, TSV, XLSX, XLS, ODS) into
//! records keyed by the fields of an import context, ready for bulk insertion.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌─────────────┐   ┌─────────────┐
//! │  Upload     │──▶│   Parser    │──▶│   Analysis   │──▶│  Normalize  │──▶│   Commit    │
//! │ (CSV/XLSX)  │   │ (raw grid)  │   │ header/types │   │ flat/matrix │   │ (sink)      │
//! └─────────────┘   └─────────────┘   │ mapping      │   │ + validate  │   └─────────────┘
//!                                     └──────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheetload::{fields, ImportOptions, ImportSession, MemoryMappingStore, MemorySink};
//!
//! let mut store = MemoryMappingStore::new();
//! let mut sink = MemorySink::new();
//! let mut session = ImportSession::new(fields::purchase(), ImportOptions::default());
//!
//! session.load_bytes(&std::fs::read("compras.xlsx")?, "compras.xlsx", &store)?;
//! session.normalize()?;
//! println!("{} valid rows", session.valid_count());
//! session.commit(&mut sink, &mut store)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Grid, column, field registry and parsed row types
//! - [`locale`] - Month names and vocabularies
//! - [`config`] - Environment settings and import options
//! - [`parser`] - Delimited text and workbook reading
//! - [`transform`] - Header, inference, mapping, normalization, matrix expansion, session
//! - [`validation`] - Row validation and JSON Schema checks
//! - [`fields`] - Built-in import contexts
//! - [`cache`] - Saved mappings
//! - [`sink`] - Persistence boundary
//! - [`api`] - HTTP API server and log broadcaster

// Core modules
pub mod error;
pub mod locale;
pub mod models;
pub mod config;

// Reading
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Import contexts
pub mod fields;

// Saved mappings
pub mod cache;

// Persistence
pub mod sink;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ServerError, SessionError, SinkError, SourceError, StoreError, TransformError,
    ValidationError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use locale::Locale;
pub use models::{
    Cell, ColumnConfig, ColumnType, FieldMapping, FieldRegistry, ParsedRow, RawGrid, RecordKind,
    SystemField, ValidationMode,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{DuplicatePolicy, ImportOptions, Settings};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, read_grid, read_grid_file, read_grid_file_async,
    GridSource, SourceFormat, SourceInfo,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    auto_map, coerce, default_row_id, detect_matrix, extract_headers, infer_type, locate_header_row,
    CoerceContext, MatrixConfig, MatrixExpander, Normalizer, RowKeyFn,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{CommitSummary, ImportSession, ImportStep, Layout};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, validate, validate_row};

// =============================================================================
// Re-exports - Stores and sinks
// =============================================================================

pub use cache::{FileMappingStore, MappingStore, MemoryMappingStore, StoredPreference};
pub use sink::{CommitRecord, JsonLinesSink, MemorySink, RecordSink};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
