//! Row identifiers and duplicate flagging.
//!
//! The default identifier is a DJB2 hash of the row's structured data
//! serialized as JSON, rendered as `row_<hex>`. Identical content always
//! yields the same identifier, so re-importing a file is detectable.
//! Contexts with a natural key can supply their own [`RowKeyFn`].

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::models::ParsedRow;

/// Custom identifier derivation for a context.
pub type RowKeyFn = dyn Fn(&Map<String, Value>) -> String + Send + Sync;

/// DJB2 over UTF-16 code units with 32-bit signed wrapping arithmetic,
/// returning the magnitude.
pub fn djb2(input: &str) -> u32 {
    let mut hash: i32 = 5381;
    for unit in input.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_add(hash) ^ i32::from(unit);
    }
    hash.unsigned_abs()
}

/// `row_<hex>` identifier of a row's structured data.
///
/// The JSON is serialized with keys in sorted order, not column order. Ids
/// therefore do not match hashes taken over insertion-ordered JSON, such as
/// ids stored by earlier importers.
pub fn default_row_id(data: &Map<String, Value>) -> String {
    let serialized = serde_json::to_string(data).unwrap_or_default();
    format!("row_{:x}", djb2(&serialized))
}

/// Identifier of a row, using the custom key function when given.
pub fn row_id(data: &Map<String, Value>, key_fn: Option<&RowKeyFn>) -> String {
    match key_fn {
        Some(f) => f(data),
        None => default_row_id(data),
    }
}

/// Warning attached to rows whose identifier already exists downstream.
pub const DUPLICATE_WARNING: &str = "Row already exists at the destination";

/// Flag rows whose identifier is in `existing`. Returns the number flagged.
///
/// Flags are recomputed from scratch, so calling this twice is harmless.
pub fn flag_duplicates(rows: &mut [ParsedRow], existing: &HashSet<String>) -> usize {
    let mut flagged = 0;
    for row in rows.iter_mut() {
        row.warnings.retain(|w| w != DUPLICATE_WARNING);
        row.is_duplicate = existing.contains(&row.id);
        if row.is_duplicate {
            row.warnings.push(DUPLICATE_WARNING.to_string());
            flagged += 1;
        }
    }
    flagged
}
