//! Domain models for the ingestion pipeline.
//!
//! This module contains the data structures shared by every pipeline step:
//!
//! - [`Cell`] / [`RawGrid`] - the unprocessed spreadsheet content
//! - [`ColumnType`] / [`ColumnConfig`] - per-column semantic type
//! - [`SystemField`] / [`FieldRegistry`] - known target fields of an import context
//! - [`FieldMapping`] - header assignment for system fields
//! - [`ParsedRow`] - normalized output unit
//! - [`RecordKind`] - income/expense direction of wide-format records

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Cells and Grid
// =============================================================================

/// A single spreadsheet cell as read from the source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    /// Build a cell from delimited text; blank text becomes [`Cell::Empty`].
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    /// True for empty cells and whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering of the cell, as a user would read it.
    pub fn display_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Bool(b) => b.to_string(),
        }
    }

    /// Trimmed, upper-cased text used for alias comparisons.
    pub fn normalized_text(&self) -> String {
        normalize_label(&self.display_text())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::from(value.as_str())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

/// Render a float without a trailing `.0` when it holds an integer.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Trim and upper-case a header or alias for comparison.
pub fn normalize_label(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Rows of cells exactly as read from the source. Never mutated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawGrid {
    rows: Vec<Vec<Cell>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a grid from anything convertible into cells.
    ///
    /// ```ignore
    /// let grid = RawGrid::from_rows(vec![vec!["Fecha", "Monto"], vec!["2024-01-05", "1.500"]]);
    /// ```
    pub fn from_rows<R, C>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widest row length.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at a position; out-of-range positions read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// True if every cell of the row is empty (or the row does not exist).
    pub fn is_blank_row(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .map_or(true, |cells| cells.iter().all(Cell::is_empty))
    }
}

// =============================================================================
// Column Types
// =============================================================================

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Currency,
    Date,
    Boolean,
}

impl ColumnType {
    pub fn variants() -> &'static [&'static str] {
        &["text", "number", "currency", "date", "boolean"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Currency => "currency",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Ok(ColumnType::Text),
            "number" | "integer" | "int" => Ok(ColumnType::Number),
            "currency" | "money" => Ok(ColumnType::Currency),
            "date" => Ok(ColumnType::Date),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            _ => Err(format!(
                "Unknown column type '{}'. Supported types: {}",
                value,
                ColumnType::variants().join(", ")
            )),
        }
    }
}

/// Type assigned to one detected column (inferred, then user-editable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    pub header: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnConfig {
    pub fn new(header: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            header: header.into(),
            column_type,
        }
    }
}

// =============================================================================
// System Fields and Registries
// =============================================================================

/// A known target field of an import context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemField {
    pub key: String,
    pub label: String,
    /// Normalized (trimmed, upper-cased) header spellings.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub required: bool,
    /// Column type forced on the mapped header, overriding inference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
}

impl SystemField {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            aliases: Vec::new(),
            required: false,
            column_type: None,
        }
    }

    /// Add aliases; each is normalized and blanks are dropped.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for alias in aliases {
            let normalized = normalize_label(alias.as_ref());
            if !normalized.is_empty() && !self.aliases.contains(&normalized) {
                self.aliases.push(normalized);
            }
        }
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Codes and document numbers: keep them as text so `0101` stays `0101`.
    pub fn identifier(mut self) -> Self {
        self.column_type = Some(ColumnType::Text);
        self
    }
}

/// How strictly rows of a context are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Valid when the row holds any non-empty, non-zero value.
    #[default]
    Permissive,
    /// Valid when every required field is present and the date is real.
    Strict,
}

/// The known fields of one import context, as a plain data table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRegistry {
    /// Context name, also the key of the saved mapping.
    pub context: String,
    pub label: String,
    /// Destination table handed to the persistence collaborator.
    pub table: String,
    #[serde(default)]
    pub mode: ValidationMode,
    pub fields: Vec<SystemField>,
    /// Extra JSON Schema each row must satisfy in strict mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_schema: Option<Value>,
}

impl FieldRegistry {
    pub fn new(context: impl Into<String>, table: impl Into<String>, mode: ValidationMode) -> Self {
        let context = context.into();
        Self {
            label: context.clone(),
            context,
            table: table.into(),
            mode,
            fields: Vec::new(),
            record_schema: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Append a field; a field with the same key is replaced in place.
    pub fn with_field(mut self, field: SystemField) -> Self {
        match self.fields.iter_mut().find(|f| f.key == field.key) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.record_schema = Some(schema);
        self
    }

    pub fn field(&self, key: &str) -> Option<&SystemField> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Every alias of every field, in registry order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .flat_map(|f| f.aliases.iter().map(String::as_str))
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &SystemField> {
        self.fields.iter().filter(|f| f.required)
    }
}

// =============================================================================
// Field Mapping
// =============================================================================

/// Assignment of headers to system field keys.
///
/// At most one header per key, and a header is never held by two keys:
/// [`FieldMapping::assign`] releases the header from any other key first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, String>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn assign(&mut self, key: impl Into<String>, header: impl Into<String>) {
        let header = header.into();
        self.0.retain(|_, h| *h != header);
        self.0.insert(key.into(), header);
    }

    pub fn unassign(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn key_for_header(&self, header: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, h)| h.as_str() == header)
            .map(|(k, _)| k.as_str())
    }

    /// Drop assignments whose header is not in `headers`.
    pub fn retain_headers(&mut self, headers: &[String]) {
        self.0.retain(|_, h| headers.contains(h));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, h)| (k.as_str(), h.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, H: Into<String>> FromIterator<(K, H)> for FieldMapping {
    fn from_iter<T: IntoIterator<Item = (K, H)>>(iter: T) -> Self {
        let mut mapping = FieldMapping::new();
        for (key, header) in iter {
            mapping.assign(key, header);
        }
        mapping
    }
}

// =============================================================================
// Parsed Rows
// =============================================================================

/// Normalized output of one source row (or one row × period pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRow {
    /// Deduplication identifier.
    pub id: String,
    /// Values under raw headers and under mapped system keys.
    pub structured_data: Map<String, Value>,
    /// Index of the source row in the raw grid.
    pub raw_row_index: usize,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    /// Identifier already exists downstream.
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ParsedRow {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.structured_data.get(key)
    }
}

// =============================================================================
// Record Kind
// =============================================================================

/// Direction of a wide-format record, inferred from its account code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Income,
    Expense,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Income => "income",
            RecordKind::Expense => "expense",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
