//! Header row detection and header label extraction.
//!
//! Uploaded spreadsheets often carry titles, company names or blank lines
//! above the real column labels. The locator scores the leading rows and
//! picks the most header-like one.
//!
//! ## Scoring
//!
//! | Mode | Used when | Score of a row |
//! |------|-----------|----------------|
//! | density | no registry | non-empty cells |
//! | alias | registry supplied | cells equal to or containing a registry alias |
//!
//! The lowest row index with the highest score wins.

use std::collections::HashSet;

use crate::models::{FieldRegistry, RawGrid};

/// Leading rows inspected by default.
pub const DEFAULT_SEARCH_DEPTH: usize = 15;

/// Locate the header row. Falls back to row 0 when every row scores zero.
pub fn locate_header_row(
    grid: &RawGrid,
    search_depth: usize,
    registry: Option<&FieldRegistry>,
) -> usize {
    best_header_row(grid, search_depth, registry).unwrap_or(0)
}

/// Highest-scoring row within `search_depth`, or `None` if all score zero.
pub fn best_header_row(
    grid: &RawGrid,
    search_depth: usize,
    registry: Option<&FieldRegistry>,
) -> Option<usize> {
    let aliases: Option<Vec<&str>> = registry.map(|r| r.aliases().collect());

    let mut best: Option<(usize, usize)> = None;
    for (idx, row) in grid.rows().iter().take(search_depth).enumerate() {
        let score = match &aliases {
            Some(aliases) => row
                .iter()
                .filter(|cell| !cell.is_empty())
                .filter(|cell| {
                    let text = cell.normalized_text();
                    aliases.iter().any(|alias| text == *alias || text.contains(alias))
                })
                .count(),
            None => row.iter().filter(|cell| !cell.is_empty()).count(),
        };

        if score > 0 && best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
    }

    best.map(|(idx, _)| idx)
}

/// Extract one unique label per column of the grid from the header row.
///
/// Blank header cells become `Column <n>` (1-based). A repeated label is
/// suffixed with its column index (`TOTAL_4`) so labels stay unique.
pub fn extract_headers(grid: &RawGrid, header_row: usize) -> Vec<String> {
    let width = grid.width();
    let mut seen: HashSet<String> = HashSet::with_capacity(width);
    let mut headers = Vec::with_capacity(width);

    for col in 0..width {
        let text = grid.cell(header_row, col).display_text();
        let base = match text.trim() {
            "" => format!("Column {}", col + 1),
            trimmed => trimmed.to_string(),
        };

        let mut label = base.clone();
        let mut attempt = 0;
        while seen.contains(&label) {
            attempt += 1;
            label = if attempt == 1 {
                format!("{}_{}", base, col)
            } else {
                format!("{}_{}_{}", base, col, attempt)
            };
        }

        seen.insert(label.clone());
        headers.push(label);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SystemField, ValidationMode};

    fn registry() -> FieldRegistry {
        FieldRegistry::new("generic", "records", ValidationMode::Permissive)
            .with_field(SystemField::new("date", "Fecha").with_aliases(["fecha", "date"]))
            .with_field(SystemField::new("amount", "Monto").with_aliases(["monto", "total"]))
    }

    #[test]
    fn test_density_picks_fullest_row() {
        let grid = RawGrid::from_rows(vec![
            vec!["Empresa Demo SpA", "", "", ""],
            vec!["", "", "", ""],
            vec!["Fecha", "Detalle", "Monto", "Folio"],
            vec!["2024-01-02", "Compra", "1500", ""],
        ]);
        assert_eq!(locate_header_row(&grid, 10, None), 2);
    }

    #[test]
    fn test_tie_goes_to_first_row() {
        let grid = RawGrid::from_rows(vec![
            vec!["a", "b"],
            vec!["c", "d"],
        ]);
        assert_eq!(locate_header_row(&grid, 10, None), 0);
    }

    #[test]
    fn test_alias_mode_beats_dense_data_rows() {
        let grid = RawGrid::from_rows(vec![
            vec!["Reporte mensual", "", ""],
            vec!["Fecha de emisión", "Glosa", "Total $"],
            vec!["2024-01-02", "Compra insumos", "1500"],
        ]);
        assert_eq!(locate_header_row(&grid, 10, Some(&registry())), 1);
    }

    #[test]
    fn test_all_zero_falls_back_to_first_row() {
        let grid = RawGrid::from_rows(vec![vec!["x", "y"], vec!["1", "2"]]);
        assert_eq!(best_header_row(&grid, 10, Some(&registry())), None);
        assert_eq!(locate_header_row(&grid, 10, Some(&registry())), 0);

        let empty = RawGrid::default();
        assert_eq!(locate_header_row(&empty, 10, None), 0);
    }

    #[test]
    fn test_search_depth_is_respected() {
        let mut rows: Vec<Vec<&str>> = vec![vec!["x"]; 5];
        rows.push(vec!["a", "b", "c"]);
        let grid = RawGrid::from_rows(rows);
        assert_eq!(locate_header_row(&grid, 3, None), 0);
        assert_eq!(locate_header_row(&grid, 10, None), 5);
    }

    #[test]
    fn test_headers_unique_and_named() {
        let grid = RawGrid::from_rows(vec![
            vec!["Fecha", "Total", "", "Total", " Glosa "],
            vec!["1", "2", "3", "4", "5", "6"],
        ]);
        let headers = extract_headers(&grid, 0);
        assert_eq!(
            headers,
            vec!["Fecha", "Total", "Column 3", "Total_3", "Glosa", "Column 6"]
        );
    }

    #[test]
    fn test_suffix_collision_is_resolved() {
        let grid = RawGrid::from_rows(vec![vec!["A_2", "A", "A"]]);
        let headers = extract_headers(&grid, 0);
        assert_eq!(headers, vec!["A_2", "A", "A_2_2"]);
    }
}
