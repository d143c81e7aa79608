//! Transformation module.
//!
//! The pure pipeline steps and the session that drives them:
//! - Header: header row location and label extraction
//! - Infer: column type inference
//! - Coerce: cell to normalized value
//! - Mapper: header to system field assignment
//! - Normalize: flat rows to parsed rows
//! - Matrix: wide-format detection and expansion
//! - Identity: row identifiers and duplicate flagging
//! - Pipeline: the import session

pub mod coerce;
pub mod header;
pub mod identity;
pub mod infer;
pub mod mapper;
pub mod matrix;
pub mod normalize;
pub mod pipeline;

pub use coerce::{coerce, CoerceContext};
pub use header::{extract_headers, locate_header_row};
pub use identity::{default_row_id, djb2, flag_duplicates, RowKeyFn};
pub use infer::{infer_column_configs, infer_type};
pub use mapper::{auto_map, auto_map_detailed, FieldMatch, MatchKind};
pub use matrix::{detect_matrix, MatrixConfig, MatrixExpander};
pub use normalize::Normalizer;
pub use pipeline::*;
