//! Flat (one record per row) normalization.
//!
//! ```text
//! raw row ──▶ coerce every column under its raw header
//!         ──▶ copy mapped columns under their system keys
//!         ──▶ validate ──▶ identify ──▶ ParsedRow
//! ```
//!
//! Blank rows are skipped entirely. Normalization is a pure function of its
//! inputs: same grid, header row, mapping and configuration in, same rows out.

use serde_json::{Map, Value};

use crate::models::{ColumnConfig, ColumnType, FieldMapping, FieldRegistry, ParsedRow, RawGrid};
use crate::transform::coerce::{coerce, CoerceContext};
use crate::transform::identity::{row_id, RowKeyFn};
use crate::validation::validate_row;

/// Normalizes flat spreadsheets for one registry.
pub struct Normalizer<'a> {
    registry: &'a FieldRegistry,
    context: CoerceContext,
    key_fn: Option<&'a RowKeyFn>,
}

impl<'a> Normalizer<'a> {
    pub fn new(registry: &'a FieldRegistry, context: CoerceContext) -> Self {
        Self {
            registry,
            context,
            key_fn: None,
        }
    }

    pub fn with_key_fn(mut self, key_fn: Option<&'a RowKeyFn>) -> Self {
        self.key_fn = key_fn;
        self
    }

    /// Normalize every non-blank row below `header_row`.
    ///
    /// `configs` is positional: entry `i` describes column `i`. A mapped
    /// header that is not in `configs` is ignored.
    pub fn normalize(
        &self,
        grid: &RawGrid,
        header_row: usize,
        mapping: &FieldMapping,
        configs: &[ColumnConfig],
    ) -> Vec<ParsedRow> {
        let mapped: Vec<(&str, usize, ColumnType)> = mapping
            .iter()
            .filter_map(|(key, header)| {
                configs
                    .iter()
                    .position(|c| c.header == header)
                    .map(|col| (key, col, configs[col].column_type))
            })
            .collect();

        (header_row + 1..grid.len())
            .filter(|&idx| !grid.is_blank_row(idx))
            .map(|idx| {
                let mut data = Map::new();

                for (col, config) in configs.iter().enumerate() {
                    let value = coerce(grid.cell(idx, col), config.column_type, &self.context);
                    data.insert(config.header.clone(), value);
                }

                // System keys win over a raw header of the same name
                for (key, col, column_type) in &mapped {
                    let value = coerce(grid.cell(idx, *col), *column_type, &self.context);
                    data.insert(key.to_string(), value);
                }

                self.finish_row(idx, data)
            })
            .collect()
    }

    fn finish_row(&self, raw_row_index: usize, data: Map<String, Value>) -> ParsedRow {
        let validation_errors: Vec<String> = validate_row(&data, self.registry)
            .iter()
            .map(ToString::to_string)
            .collect();

        ParsedRow {
            id: row_id(&data, self.key_fn),
            raw_row_index,
            is_valid: validation_errors.is_empty(),
            validation_errors,
            is_duplicate: false,
            warnings: Vec::new(),
            structured_data: data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;
    use crate::models::{SystemField, ValidationMode};
    use serde_json::json;

    fn ctx() -> CoerceContext {
        CoerceContext::new(Locale::Es, 2024)
    }

    fn configs(pairs: &[(&str, ColumnType)]) -> Vec<ColumnConfig> {
        pairs.iter().map(|(h, t)| ColumnConfig::new(*h, *t)).collect()
    }

    fn permissive() -> FieldRegistry {
        FieldRegistry::new("generic", "records", ValidationMode::Permissive)
            .with_field(SystemField::new("amount", "Monto").with_aliases(["monto"]))
    }

    #[test]
    fn test_raw_and_system_keys() {
        let grid = RawGrid::from_rows(vec![
            vec!["Fecha", "Monto"],
            vec!["05/01/2024", "$ 1.500"],
        ]);
        let mapping: FieldMapping = [("amount", "Monto")].into_iter().collect();
        let registry = permissive();
        let rows = Normalizer::new(&registry, ctx()).normalize(
            &grid,
            0,
            &mapping,
            &configs(&[("Fecha", ColumnType::Date), ("Monto", ColumnType::Currency)]),
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.raw_row_index, 1);
        assert_eq!(row.get("Fecha"), Some(&json!("2024-01-05")));
        assert_eq!(row.get("Monto"), Some(&json!(1500)));
        assert_eq!(row.get("amount"), Some(&json!(1500)));
        assert!(row.is_valid);
    }

    #[test]
    fn test_blank_rows_dropped_and_single_cell_valid() {
        let grid = RawGrid::from_rows(vec![
            vec!["A", "B", "C"],
            vec!["", "", ""],
            vec!["", "x", ""],
            vec!["", "", ""],
        ]);
        let registry = permissive();
        let rows = Normalizer::new(&registry, ctx()).normalize(
            &grid,
            0,
            &FieldMapping::new(),
            &configs(&[("A", ColumnType::Text), ("B", ColumnType::Text), ("C", ColumnType::Text)]),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].raw_row_index, 2);
        assert!(rows[0].is_valid);
    }

    #[test]
    fn test_zero_only_row_is_invalid_in_permissive_mode() {
        let grid = RawGrid::from_rows(vec![vec!["Monto"], vec!["$ 0"]]);
        let registry = permissive();
        let rows = Normalizer::new(&registry, ctx()).normalize(
            &grid,
            0,
            &FieldMapping::new(),
            &configs(&[("Monto", ColumnType::Currency)]),
        );
        assert!(!rows[0].is_valid);
    }

    #[test]
    fn test_header_row_offset() {
        let grid = RawGrid::from_rows(vec![
            vec!["Informe de compras", ""],
            vec!["", ""],
            vec!["Fecha", "Monto"],
            vec!["2024-01-05", "100"],
            vec!["2024-01-06", "200"],
        ]);
        let registry = permissive();
        let rows = Normalizer::new(&registry, ctx()).normalize(
            &grid,
            2,
            &FieldMapping::new(),
            &configs(&[("Fecha", ColumnType::Date), ("Monto", ColumnType::Number)]),
        );
        let indices: Vec<usize> = rows.iter().map(|r| r.raw_row_index).collect();
        assert_eq!(indices, vec![3, 4]);
    }

    #[test]
    fn test_strict_errors_carry_labels() {
        let registry = FieldRegistry::new("purchase", "purchases", ValidationMode::Strict)
            .with_field(SystemField::new("date", "Fecha").required())
            .with_field(SystemField::new("amount", "Monto").required());
        let grid = RawGrid::from_rows(vec![
            vec!["Fecha", "Total"],
            vec!["2024-01-05", ""],
        ]);
        let mapping: FieldMapping = [("date", "Fecha"), ("amount", "Total")].into_iter().collect();
        let rows = Normalizer::new(&registry, ctx()).normalize(
            &grid,
            0,
            &mapping,
            &configs(&[("Fecha", ColumnType::Date), ("Total", ColumnType::Currency)]),
        );

        assert!(!rows[0].is_valid);
        assert_eq!(rows[0].validation_errors, vec!["Missing required field: Monto"]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let grid = RawGrid::from_rows(vec![
            vec!["Fecha", "Monto", "Glosa"],
            vec!["05/01/2024", "$ 1.500", "Compra"],
            vec!["", "", ""],
            vec!["marzo 2024", "-300", "Ajuste"],
        ]);
        let mapping: FieldMapping = [("amount", "Monto")].into_iter().collect();
        let cfg = configs(&[
            ("Fecha", ColumnType::Date),
            ("Monto", ColumnType::Currency),
            ("Glosa", ColumnType::Text),
        ]);
        let registry = permissive();
        let normalizer = Normalizer::new(&registry, ctx());

        let first = normalizer.normalize(&grid, 0, &mapping, &cfg);
        let second = normalizer.normalize(&grid, 0, &mapping, &cfg);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
