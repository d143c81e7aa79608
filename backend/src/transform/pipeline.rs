//! Import session: the stateful driver around the pure pipeline steps.
//!
//! ```text
//!  Upload ──load──▶ Mapping ──normalize──▶ Review ──commit──▶ Committed
//!    ▲                 ▲  │                  │
//!    │                 └──┘ edit header row, └──▶ select / deselect
//!    │                      types, mapping
//!    └──── unreadable file resets the session
//! ```
//!
//! Loading a file runs the analysis: header row, column types, automatic
//! mapping (seeded by the saved mapping of the context) and matrix
//! detection. Edits invalidate the parsed rows until `normalize` runs again.
//! Only reading the file and committing can fail; both leave the previous
//! state untouched except for an unreadable file, which resets the session.
//!
//! # Example
//!
//! ```rust,ignore
//! use sheetload::{fields, ImportOptions, ImportSession, MemoryMappingStore, MemorySink};
//!
//! let mut store = MemoryMappingStore::new();
//! let mut sink = MemorySink::new();
//! let mut session = ImportSession::new(fields::purchase(), ImportOptions::default());
//!
//! session.load_bytes(&bytes, "compras.csv", &store)?;
//! session.refresh_existing_ids(&sink)?;
//! session.normalize()?;
//! let summary = session.commit(&mut sink, &mut store)?;
//! println!("Inserted {} rows into {}", summary.inserted, summary.table);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::cache::{MappingStore, StoredPreference};
use crate::config::{DuplicatePolicy, ImportOptions};
use crate::error::{SessionError, SessionResult};
use crate::models::{
    ColumnConfig, ColumnType, FieldMapping, FieldRegistry, ParsedRow, RawGrid, SystemField, ValidationMode,
};
use crate::parser::{read_grid, SourceInfo};
use crate::sink::{CommitRecord, RecordSink};
use crate::transform::coerce::CoerceContext;
use crate::transform::header::{best_header_row, extract_headers};
use crate::transform::identity::{flag_duplicates, RowKeyFn};
use crate::transform::infer::infer_column_configs;
use crate::transform::mapper::auto_map;
use crate::transform::matrix::{detect_matrix, suggest_matrix_config, MatrixConfig, MatrixExpander};
use crate::transform::normalize::Normalizer;

/// Where the session is in the import flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStep {
    Upload,
    Mapping,
    Review,
    Committed,
}

/// How rows are produced from the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Layout {
    /// One record per row
    Flat,
    /// One record per (account row, period column)
    Matrix(MatrixConfig),
}

/// Outcome of a successful commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub context: String,
    pub table: String,
    pub inserted: usize,
    /// Selected rows that were flagged as duplicates
    pub duplicates: usize,
    /// Whether the mapping was saved for the next import
    pub mapping_saved: bool,
}

/// One spreadsheet import, from upload to commit.
pub struct ImportSession {
    registry: FieldRegistry,
    options: ImportOptions,
    context: CoerceContext,
    key_fn: Option<Box<RowKeyFn>>,
    existing_ids: HashSet<String>,

    step: ImportStep,
    source: Option<SourceInfo>,
    grid: Option<RawGrid>,
    prior: Option<StoredPreference>,
    header_row: usize,
    headers: Vec<String>,
    columns: Vec<ColumnConfig>,
    mapping: FieldMapping,
    matrix_detected: bool,
    layout: Layout,
    rows: Vec<ParsedRow>,
    selection: BTreeSet<usize>,
}

impl ImportSession {
    pub fn new(registry: FieldRegistry, options: ImportOptions) -> Self {
        let context = options.coerce_context();
        Self {
            registry,
            options,
            context,
            key_fn: None,
            existing_ids: HashSet::new(),
            step: ImportStep::Upload,
            source: None,
            grid: None,
            prior: None,
            header_row: 0,
            headers: Vec::new(),
            columns: Vec::new(),
            mapping: FieldMapping::new(),
            matrix_detected: false,
            layout: Layout::Flat,
            rows: Vec::new(),
            selection: BTreeSet::new(),
        }
    }

    /// Derive row identifiers with a context-specific key instead of the content hash.
    pub fn with_key_fn(mut self, key_fn: Box<RowKeyFn>) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    /// Identifiers already present downstream, used for duplicate flagging.
    pub fn set_existing_ids(&mut self, ids: HashSet<String>) {
        self.existing_ids = ids;
    }

    /// Fetch the existing identifiers of the registry's table from `sink`.
    pub fn refresh_existing_ids(&mut self, sink: &dyn RecordSink) -> SessionResult<usize> {
        self.existing_ids = sink.existing_ids(&self.registry.table)?;
        Ok(self.existing_ids.len())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn step(&self) -> ImportStep {
        self.step
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn source_info(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    pub fn grid(&self) -> Option<&RawGrid> {
        self.grid.as_ref()
    }

    pub fn header_row(&self) -> usize {
        self.header_row
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn columns(&self) -> &[ColumnConfig] {
        &self.columns
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn matrix_detected(&self) -> bool {
        self.matrix_detected
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    // =========================================================================
    // Loading and analysis
    // =========================================================================

    /// Read an uploaded document and analyze it.
    ///
    /// On an unreadable document the session is reset and the error returned.
    pub fn load_bytes(
        &mut self,
        bytes: &[u8],
        file_name: &str,
        store: &dyn MappingStore,
    ) -> SessionResult<&SourceInfo> {
        log_info(format!("📖 Reading {}...", file_name));

        let source = match read_grid(bytes, file_name) {
            Ok(source) => source,
            Err(e) => {
                log_error(format!("Could not read {}: {}", file_name, e));
                self.reset();
                return Err(e.into());
            }
        };

        log_success(format!(
            "Read {} rows × {} columns",
            source.info.rows, source.info.columns
        ));
        self.load_grid(source.grid, Some(source.info), store);

        self.source.as_ref().ok_or(SessionError::NoGrid)
    }

    /// Start a session from an already-read grid.
    pub fn load_grid(&mut self, grid: RawGrid, info: Option<SourceInfo>, store: &dyn MappingStore) {
        self.reset();
        self.prior = store.get(&self.registry.context);
        if self.prior.is_some() {
            log_info(format!("Using saved mapping for '{}'", self.registry.context));
        }

        self.header_row = self.initial_header_row(&grid);
        self.grid = Some(grid);
        self.source = info;
        self.analyze();
    }

    /// Forced row, else the best alias match, else the densest row, else row 0.
    fn initial_header_row(&self, grid: &RawGrid) -> usize {
        if let Some(row) = self.options.header_row {
            if row < grid.len() {
                return row;
            }
            log_warning(format!("Header row {} is outside the file, detecting instead", row));
        }

        let depth = self.options.search_depth;
        best_header_row(grid, depth, Some(&self.registry))
            .or_else(|| best_header_row(grid, depth, None))
            .unwrap_or(0)
    }

    /// Recompute headers, types, mapping and layout from the current header row.
    fn analyze(&mut self) {
        let Some(grid) = self.grid.as_ref() else {
            return;
        };

        self.headers = extract_headers(grid, self.header_row);
        self.columns = infer_column_configs(
            grid,
            self.header_row,
            &self.headers,
            self.options.sample_size,
            self.options.locale,
        );

        self.mapping = auto_map(
            &self.headers,
            &self.registry,
            self.prior.as_ref().map(|p| &p.mapping),
        );
        for field in &self.registry.fields {
            apply_field_type(field, &self.mapping, &mut self.columns);
        }

        if let Some(prior) = &self.prior {
            for column in &mut self.columns {
                if let Some(saved) = prior.column_types.get(&column.header) {
                    column.column_type = *saved;
                }
            }
        }

        self.matrix_detected = detect_matrix(&self.headers, self.options.locale);
        self.layout = if self.matrix_detected {
            suggest_matrix_config(&self.headers, self.options.locale, self.context.reference_year)
                .map(Layout::Matrix)
                .unwrap_or(Layout::Flat)
        } else {
            Layout::Flat
        };

        log_info(format!("📋 Header row {} with {} columns:", self.header_row + 1, self.headers.len()));
        for column in &self.columns {
            let field = self.mapping.key_for_header(&column.header).unwrap_or("-");
            log_info_indent(format!("{} ({}) → {}", column.header, column.column_type, field), 1);
        }
        if let Layout::Matrix(config) = &self.layout {
            log_info(format!(
                "Wide format detected: {} period columns, year {}",
                config.periods.len(),
                config.year
            ));
        }

        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.rows.clear();
        self.selection.clear();
        self.step = ImportStep::Mapping;
    }

    fn require_grid(&self) -> SessionResult<&RawGrid> {
        self.grid.as_ref().ok_or(SessionError::NoGrid)
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Use another row as header row; re-runs the analysis.
    pub fn set_header_row(&mut self, row: usize) -> SessionResult<()> {
        let rows = self.require_grid()?.len();
        if row >= rows {
            return Err(SessionError::InvalidHeaderRow { row, rows });
        }
        self.header_row = row;
        self.analyze();
        Ok(())
    }

    /// Override the type of one column.
    pub fn set_column_type(&mut self, header: &str, column_type: ColumnType) -> SessionResult<()> {
        self.require_grid()?;
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.header == header)
            .ok_or_else(|| SessionError::UnknownHeader(header.to_string()))?;
        column.column_type = column_type;
        self.invalidate();
        Ok(())
    }

    /// Assign a header to a system field, or clear the field with `None`.
    ///
    /// Mapping a header to an identifier field switches the column to text.
    pub fn set_mapping(&mut self, key: &str, header: Option<&str>) -> SessionResult<()> {
        self.require_grid()?;
        let Some(field) = self.registry.field(key) else {
            return Err(SessionError::UnknownField(key.to_string()));
        };
        match header {
            Some(header) => {
                if !self.headers.iter().any(|h| h == header) {
                    return Err(SessionError::UnknownHeader(header.to_string()));
                }
                self.mapping.assign(key, header);
                apply_field_type(field, &self.mapping, &mut self.columns);
            }
            None => {
                self.mapping.unassign(key);
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Expand the grid as a matrix with `config`.
    pub fn use_matrix(&mut self, config: MatrixConfig) -> SessionResult<()> {
        self.require_grid()?;
        self.layout = Layout::Matrix(config);
        self.invalidate();
        Ok(())
    }

    /// Treat the grid as one record per row.
    pub fn use_flat(&mut self) -> SessionResult<()> {
        self.require_grid()?;
        self.layout = Layout::Flat;
        self.invalidate();
        Ok(())
    }

    // =========================================================================
    // Normalization and review
    // =========================================================================

    /// Produce parsed rows from the current configuration.
    ///
    /// Rebuilds the default selection: every valid row, minus duplicates
    /// when the duplicate policy is `skip`.
    pub fn normalize(&mut self) -> SessionResult<&[ParsedRow]> {
        let grid = self.require_grid()?;
        let key_fn = self.key_fn.as_deref();

        log_info("⚙️  Normalizing rows...");
        let mut rows = match &self.layout {
            Layout::Flat => Normalizer::new(&self.registry, self.context)
                .with_key_fn(key_fn)
                .normalize(grid, self.header_row, &self.mapping, &self.columns),
            Layout::Matrix(config) => MatrixExpander::new(self.options.locale)
                .with_key_fn(key_fn)
                .expand(grid, self.header_row, &self.headers, config)?,
        };

        let duplicates = flag_duplicates(&mut rows, &self.existing_ids);
        let skip_duplicates = self.options.duplicate_policy == DuplicatePolicy::Skip;
        self.selection = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.is_valid && !(skip_duplicates && row.is_duplicate))
            .map(|(idx, _)| idx)
            .collect();
        self.rows = rows;
        self.step = ImportStep::Review;

        log_success(format!(
            "{} rows: {} valid, {} with errors",
            self.rows.len(),
            self.valid_count(),
            self.error_count()
        ));
        if duplicates > 0 {
            log_warning(format!("{} rows already exist at the destination", duplicates));
        }

        Ok(&self.rows)
    }

    pub fn parsed_rows(&self) -> &[ParsedRow] {
        &self.rows
    }

    pub fn valid_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_valid).count()
    }

    pub fn error_count(&self) -> usize {
        self.rows.len() - self.valid_count()
    }

    pub fn duplicate_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_duplicate).count()
    }

    /// Add a row to the selection. Returns false for bad indices.
    ///
    /// Strict contexts only accept valid rows; permissive ones take any row.
    pub fn select(&mut self, index: usize) -> bool {
        let permissive = self.registry.mode == ValidationMode::Permissive;
        match self.rows.get(index) {
            Some(row) if row.is_valid || permissive => {
                self.selection.insert(index);
                true
            }
            _ => false,
        }
    }

    /// Returns whether the row was selected.
    pub fn deselect(&mut self, index: usize) -> bool {
        self.selection.remove(&index)
    }

    /// Replace the selection with every valid row.
    pub fn select_all_valid(&mut self) {
        self.selection = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_valid)
            .map(|(idx, _)| idx)
            .collect();
    }

    /// Remove every duplicate from the selection. Returns how many were removed.
    pub fn deselect_duplicates(&mut self) -> usize {
        let before = self.selection.len();
        let rows = &self.rows;
        self.selection.retain(|idx| !rows[*idx].is_duplicate);
        before - self.selection.len()
    }

    /// Selected row indices, ascending.
    pub fn selection(&self) -> Vec<usize> {
        self.selection.iter().copied().collect()
    }

    pub fn selected_rows(&self) -> Vec<&ParsedRow> {
        self.selection.iter().map(|idx| &self.rows[*idx]).collect()
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Hand the selected rows to `sink`, then remember the mapping.
    ///
    /// A failed insert leaves the session as it was so the commit can be
    /// retried. A failure to save the mapping is only a warning.
    pub fn commit(
        &mut self,
        sink: &mut dyn RecordSink,
        store: &mut dyn MappingStore,
    ) -> SessionResult<CommitSummary> {
        self.require_grid()?;
        if self.selection.is_empty() {
            return Err(SessionError::NothingSelected);
        }

        let records: Vec<CommitRecord> = self
            .selected_rows()
            .into_iter()
            .map(|row| CommitRecord {
                id: row.id.clone(),
                data: row.structured_data.clone(),
            })
            .collect();
        let duplicates = self.selected_rows().iter().filter(|r| r.is_duplicate).count();
        let table = self.registry.table.clone();

        log_info(format!("💾 Inserting {} rows into '{}'...", records.len(), table));
        let inserted = match sink.bulk_insert(&table, &records) {
            Ok(n) => n,
            Err(e) => {
                log_error(format!("Insert failed: {}", e));
                return Err(e.into());
            }
        };
        log_success(format!("Inserted {} rows", inserted));

        let column_types: BTreeMap<String, ColumnType> = self
            .columns
            .iter()
            .map(|c| (c.header.clone(), c.column_type))
            .collect();
        let mapping_saved = match store.remember(&self.registry.context, self.mapping.clone(), column_types) {
            Ok(()) => true,
            Err(e) => {
                log_warning(format!("Could not save mapping: {}", e));
                false
            }
        };

        let summary = CommitSummary {
            context: self.registry.context.clone(),
            table,
            inserted,
            duplicates,
            mapping_saved,
        };

        self.reset();
        self.step = ImportStep::Committed;
        Ok(summary)
    }

    /// Drop the file and everything derived from it.
    pub fn reset(&mut self) {
        self.step = ImportStep::Upload;
        self.source = None;
        self.grid = None;
        self.prior = None;
        self.header_row = 0;
        self.headers.clear();
        self.columns.clear();
        self.mapping = FieldMapping::new();
        self.matrix_detected = false;
        self.layout = Layout::Flat;
        self.rows.clear();
        self.selection.clear();
    }

    /// Reference year used for bare month names and matrix dates.
    pub fn reference_year(&self) -> i32 {
        self.context.reference_year
    }
}

/// Force the field's column type, if it has one, on the header mapped to it.
fn apply_field_type(field: &SystemField, mapping: &FieldMapping, columns: &mut [ColumnConfig]) {
    let Some(column_type) = field.column_type else {
        return;
    };
    let Some(header) = mapping.get(&field.key) else {
        return;
    };
    if let Some(column) = columns.iter_mut().find(|c| c.header == header) {
        column.column_type = column_type;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryMappingStore;
    use crate::error::SourceError;
    use crate::fields;
    use crate::sink::MemorySink;
    use crate::transform::identity::default_row_id;
    use serde_json::json;

    fn options() -> ImportOptions {
        ImportOptions {
            reference_year: Some(2024),
            ..ImportOptions::default()
        }
    }

    fn generic_session() -> ImportSession {
        ImportSession::new(fields::generic(), options())
    }

    const PURCHASES_CSV: &str = "Compras enero;;;\n\
        ;;;\n\
        Fecha;Proveedor;Folio;Total\n\
        05/01/2024;ACME;101;$ 1.500\n\
        06/01/2024;Sur Ltda;102;$ 2.000\n\
        07/01/2024;ACME;103;\n";

    #[test]
    fn test_load_detects_header_types_and_mapping() {
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(fields::purchase(), options());
        session.load_bytes(PURCHASES_CSV.as_bytes(), "compras.csv", &store).unwrap();

        assert_eq!(session.step(), ImportStep::Mapping);
        assert_eq!(session.header_row(), 2);
        assert_eq!(session.headers(), &["Fecha", "Proveedor", "Folio", "Total"]);
        assert_eq!(session.columns()[0].column_type, ColumnType::Date);
        assert_eq!(session.columns()[3].column_type, ColumnType::Currency);
        assert_eq!(session.mapping().get("date"), Some("Fecha"));
        assert_eq!(session.mapping().get("supplier"), Some("Proveedor"));
        assert_eq!(session.mapping().get("amount"), Some("Total"));
        assert_eq!(session.layout(), &Layout::Flat);
    }

    #[test]
    fn test_strict_rows_and_default_selection() {
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(fields::purchase(), options());
        session.load_bytes(PURCHASES_CSV.as_bytes(), "compras.csv", &store).unwrap();

        let rows = session.normalize().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("amount"), Some(&json!(1500)));
        assert_eq!(rows[0].get("date"), Some(&json!("2024-01-05")));
        assert!(!rows[2].is_valid);
        assert_eq!(rows[2].validation_errors, vec!["Missing required field: Monto"]);

        assert_eq!(session.valid_count(), 2);
        assert_eq!(session.error_count(), 1);
        assert_eq!(session.selection(), vec![0, 1]);
        assert!(!session.select(2));
    }

    #[test]
    fn test_journal_account_codes_stay_text() {
        let csv = "Fecha;Cuenta;Glosa;Debe;Haber\n\
            05/01/2024;1101;Caja;5000;0\n\
            05/01/2024;2101;Proveedores;0;5000\n\
            06/01/2024;0101;Banco;1200;0\n";
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(fields::accounting_entry(), options());
        session.load_bytes(csv.as_bytes(), "asientos.csv", &store).unwrap();

        assert_eq!(session.mapping().get("account_code"), Some("Cuenta"));
        assert_eq!(session.columns()[1].column_type, ColumnType::Text);
        assert_eq!(session.columns()[3].column_type, ColumnType::Number);

        let rows = session.normalize().unwrap();
        assert!(rows.iter().all(|r| r.is_valid), "{:?}", rows);
        assert_eq!(rows[0].get("account_code"), Some(&json!("1101")));
        assert_eq!(rows[2].get("account_code"), Some(&json!("0101")));
        assert_eq!(rows[1].get("credit"), Some(&json!(5000)));
        assert_eq!(session.selection(), vec![0, 1, 2]);
    }

    #[test]
    fn test_mapping_an_identifier_field_switches_to_text() {
        let csv = b"Fecha;Codigo;Monto\n2024-01-01;7;10\n2024-01-02;8;20\n";
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(fields::purchase(), options());
        session.load_bytes(csv, "a.csv", &store).unwrap();
        assert_eq!(session.columns()[1].column_type, ColumnType::Number);

        session.set_mapping("document_number", Some("Codigo")).unwrap();
        assert_eq!(session.columns()[1].column_type, ColumnType::Text);
        let rows = session.normalize().unwrap();
        assert_eq!(rows[0].get("document_number"), Some(&json!("7")));
    }

    #[test]
    fn test_permissive_context_selects_invalid_rows() {
        let grid = RawGrid::from_rows(vec![vec!["Detalle", "Monto"], vec!["", "0"], vec!["a", "5"]]);
        let store = MemoryMappingStore::new();
        let mut session = generic_session();
        session.load_grid(grid, None, &store);

        let validity: Vec<bool> = session.normalize().unwrap().iter().map(|r| r.is_valid).collect();
        assert_eq!(validity, vec![false, true]);
        assert_eq!(session.selection(), vec![1]);

        assert!(session.select(0));
        assert_eq!(session.selection(), vec![0, 1]);
        assert!(!session.select(7));

        session.select_all_valid();
        assert_eq!(session.selection(), vec![1]);
    }

    #[test]
    fn test_strict_context_refuses_invalid_rows() {
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(fields::purchase(), options());
        session.load_bytes(PURCHASES_CSV.as_bytes(), "compras.csv", &store).unwrap();
        session.normalize().unwrap();

        assert!(!session.parsed_rows()[2].is_valid);
        assert!(!session.select(2));
        assert_eq!(session.selection(), vec![0, 1]);
    }

    #[test]
    fn test_normalize_twice_is_identical() {
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(fields::purchase(), options());
        session.load_bytes(PURCHASES_CSV.as_bytes(), "compras.csv", &store).unwrap();

        let first = session.normalize().unwrap().to_vec();
        let second = session.normalize().unwrap().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_row_flagged_and_skipped() {
        let grid = RawGrid::from_rows(vec![
            vec!["Fecha", "Detalle", "Monto"],
            vec!["2024-01-01", "a", "10"],
            vec!["2024-01-02", "b", "20"],
            vec!["2024-01-03", "c", "30"],
            vec!["2024-01-04", "d", "40"],
            vec!["2024-01-05", "e", "50"],
            vec!["2024-01-06", "f", "60"],
        ]);
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(
            fields::generic(),
            ImportOptions {
                duplicate_policy: DuplicatePolicy::Skip,
                ..options()
            },
        );
        session.load_grid(grid, None, &store);

        let row5 = session
            .normalize()
            .unwrap()
            .iter()
            .find(|r| r.raw_row_index == 5)
            .map(|r| r.structured_data.clone())
            .unwrap();

        session.set_existing_ids([default_row_id(&row5)].into_iter().collect());
        let rows = session.normalize().unwrap();
        let flagged: Vec<usize> = rows
            .iter()
            .filter(|r| r.is_duplicate)
            .map(|r| r.raw_row_index)
            .collect();
        assert_eq!(flagged, vec![5]);
        assert_eq!(session.duplicate_count(), 1);

        // Row 5 is the fifth parsed row (index 4)
        assert_eq!(session.selection(), vec![0, 1, 2, 3, 5]);
    }

    #[test]
    fn test_keep_policy_selects_duplicates_until_bulk_deselect() {
        let grid = RawGrid::from_rows(vec![vec!["Detalle"], vec!["a"], vec!["b"]]);
        let store = MemoryMappingStore::new();
        let mut session = generic_session();
        session.load_grid(grid, None, &store);

        let first = session.normalize().unwrap()[0].id.clone();
        session.set_existing_ids([first].into_iter().collect());
        session.normalize().unwrap();

        assert_eq!(session.selection(), vec![0, 1]);
        assert_eq!(session.deselect_duplicates(), 1);
        assert_eq!(session.selection(), vec![1]);

        session.select_all_valid();
        assert_eq!(session.selection(), vec![0, 1]);
        assert!(session.deselect(0));
        assert_eq!(session.selected_rows().len(), 1);
    }

    #[test]
    fn test_matrix_sheet_is_expanded() {
        let csv = "Cuenta;Nombre;Enero;Febrero;Marzo;Abril\n\
            4101;Ventas;100;200;300;400\n\
            5101;Arriendo;-50;-50;-50;-50\n\
            6101;Sueldos;10;20;0;40\n";
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(fields::income_statement(), options());
        session.load_bytes(csv.as_bytes(), "resultados.csv", &store).unwrap();

        assert!(session.matrix_detected());
        let Layout::Matrix(config) = session.layout().clone() else {
            panic!("expected matrix layout");
        };
        assert_eq!(config.year, 2024);

        let rows = session.normalize().unwrap();
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[0].get("kind"), Some(&json!("income")));
        assert_eq!(rows[4].get("amount"), Some(&json!(50)));

        session.use_flat().unwrap();
        assert_eq!(session.normalize().unwrap().len(), 3);
    }

    #[test]
    fn test_unreadable_source_resets() {
        let store = MemoryMappingStore::new();
        let mut session = generic_session();
        session.load_bytes(b"Fecha;Monto\n2024-01-01;5\n", "ok.csv", &store).unwrap();
        assert!(session.grid().is_some());

        let err = session.load_bytes(b"", "vacio.csv", &store).unwrap_err();
        assert!(matches!(err, SessionError::Source(SourceError::EmptyFile)));
        assert_eq!(session.step(), ImportStep::Upload);
        assert!(session.grid().is_none());
        assert!(session.headers().is_empty());
    }

    #[test]
    fn test_edits_validate_their_inputs() {
        let store = MemoryMappingStore::new();
        let mut session = generic_session();
        assert!(matches!(session.set_header_row(0), Err(SessionError::NoGrid)));

        session.load_bytes(b"Fecha;Monto\n2024-01-01;5\n", "ok.csv", &store).unwrap();
        assert!(matches!(
            session.set_header_row(9),
            Err(SessionError::InvalidHeaderRow { row: 9, rows: 2 })
        ));
        assert!(matches!(
            session.set_mapping("nope", Some("Fecha")),
            Err(SessionError::UnknownField(_))
        ));
        assert!(matches!(
            session.set_mapping("amount", Some("Total")),
            Err(SessionError::UnknownHeader(_))
        ));
        assert!(matches!(
            session.set_column_type("Total", ColumnType::Number),
            Err(SessionError::UnknownHeader(_))
        ));

        session.normalize().unwrap();
        session.set_mapping("amount", None).unwrap();
        assert_eq!(session.step(), ImportStep::Mapping);
        assert!(session.parsed_rows().is_empty());
        assert_eq!(session.mapping().get("amount"), None);
    }

    #[test]
    fn test_failed_commit_keeps_state() {
        let mut store = MemoryMappingStore::new();
        let mut sink = MemorySink::new();
        sink.reject_inserts("connection reset");

        let mut session = generic_session();
        session.load_bytes(b"Fecha;Monto\n2024-01-01;5\n", "ok.csv", &store).unwrap();
        session.normalize().unwrap();

        let err = session.commit(&mut sink, &mut store).unwrap_err();
        assert!(matches!(err, SessionError::Sink(_)));
        assert_eq!(session.step(), ImportStep::Review);
        assert_eq!(session.selection(), vec![0]);
        assert!(store.get("generic").is_none());

        sink.accept_inserts();
        let summary = session.commit(&mut sink, &mut store).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.table, "records");
        assert!(summary.mapping_saved);
        assert_eq!(session.step(), ImportStep::Committed);
        assert!(session.grid().is_none());
        assert_eq!(sink.records("records").len(), 1);
    }

    #[test]
    fn test_empty_selection_cannot_commit() {
        let mut store = MemoryMappingStore::new();
        let mut sink = MemorySink::new();
        let mut session = generic_session();
        session.load_bytes(b"Fecha;Monto\n2024-01-01;5\n", "ok.csv", &store).unwrap();
        session.normalize().unwrap();
        session.deselect(0);

        assert!(matches!(
            session.commit(&mut sink, &mut store),
            Err(SessionError::NothingSelected)
        ));
    }

    #[test]
    fn test_saved_mapping_and_types_are_reused() {
        let mut store = MemoryMappingStore::new();
        let mut sink = MemorySink::new();
        let csv = b"Fecha;Pago;Cantidad\n2024-01-01;5;77\n";

        let mut session = generic_session();
        session.load_bytes(csv, "a.csv", &store).unwrap();
        assert_eq!(session.mapping().get("amount"), None);
        session.set_mapping("amount", Some("Pago")).unwrap();
        session.set_column_type("Cantidad", ColumnType::Text).unwrap();
        session.normalize().unwrap();
        session.commit(&mut sink, &mut store).unwrap();

        let mut next = generic_session();
        next.load_bytes(csv, "b.csv", &store).unwrap();
        assert_eq!(next.mapping().get("amount"), Some("Pago"));
        assert_eq!(next.columns()[2].column_type, ColumnType::Text);
        assert_eq!(store.get("generic").unwrap().use_count, 1);
    }

    #[test]
    fn test_existing_ids_from_sink() {
        let store = MemoryMappingStore::new();
        let mut session = generic_session();
        session.load_bytes(b"Detalle\nx\n", "a.csv", &store).unwrap();
        let id = session.normalize().unwrap()[0].id.clone();

        let sink = MemorySink::new().with_records(
            "records",
            vec![CommitRecord {
                id,
                data: serde_json::Map::new(),
            }],
        );
        assert_eq!(session.refresh_existing_ids(&sink).unwrap(), 1);
        session.normalize().unwrap();
        assert_eq!(session.duplicate_count(), 1);
    }
}
