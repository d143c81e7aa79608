//! Column type inference from sample values.
//!
//! Each check is a majority vote over the non-empty samples (more than half
//! must agree), tried in priority order:
//!
//! 1. `date` - native dates, `D/M/Y`-like numerics, "Month Year" text
//! 2. `currency` - leading currency symbol, or grouped thousands plus decimals
//! 3. `number` - native numbers, or digit strings once separators are removed
//! 4. `boolean` - native booleans, or yes/no vocabulary
//! 5. `text` otherwise
//!
//! The result is only a suggestion; normalization always uses the column
//! configuration the user confirmed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::locale::Locale;
use crate::models::{Cell, ColumnConfig, ColumnType, RawGrid};

/// Non-empty values sampled per column by default.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,4}[-/]\d{1,2}[-/]\d{1,4}(?:[ T].*)?$").expect("valid date regex")
});

static MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\p{L}+)\.?[\s\-/]*(?:(?:de|del|of)\s+)?(\d{2}|\d{4})$")
        .expect("valid month-year regex")
});

static CURRENCY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-\s]*(?:US|CLP|USD|EUR|CL)?\s*[$€£¥]").expect("valid currency regex")
});

static GROUPED_DECIMAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\s*(?:\d{1,3}(?:\.\d{3})+,\d+|\d{1,3}(?:,\d{3})+\.\d+)$")
        .expect("valid grouped decimal regex")
});

type Check = fn(&Cell, Locale) -> bool;

/// Classify a column from its sample values.
pub fn infer_type(samples: &[&Cell], locale: Locale) -> ColumnType {
    let values: Vec<&Cell> = samples.iter().copied().filter(|c| !c.is_empty()).collect();
    if values.is_empty() {
        return ColumnType::Text;
    }

    let checks: [(ColumnType, Check); 4] = [
        (ColumnType::Date, is_date_like),
        (ColumnType::Currency, is_currency_like),
        (ColumnType::Number, is_number_like),
        (ColumnType::Boolean, is_boolean_like),
    ];

    for (column_type, check) in checks {
        let votes = values.iter().filter(|cell| check(cell, locale)).count();
        if votes * 2 > values.len() {
            return column_type;
        }
    }

    ColumnType::Text
}

/// First `limit` non-empty values of a column below the header row.
pub fn sample_column(grid: &RawGrid, header_row: usize, col: usize, limit: usize) -> Vec<&Cell> {
    (header_row + 1..grid.len())
        .map(|row| grid.cell(row, col))
        .filter(|cell| !cell.is_empty())
        .take(limit)
        .collect()
}

/// Infer a configuration for every header.
pub fn infer_column_configs(
    grid: &RawGrid,
    header_row: usize,
    headers: &[String],
    sample_size: usize,
    locale: Locale,
) -> Vec<ColumnConfig> {
    headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            let samples = sample_column(grid, header_row, col, sample_size);
            ColumnConfig::new(header.clone(), infer_type(&samples, locale))
        })
        .collect()
}

fn is_date_like(cell: &Cell, locale: Locale) -> bool {
    match cell {
        Cell::Date(_) => true,
        Cell::Text(s) => {
            let s = s.trim();
            if NUMERIC_DATE.is_match(s) {
                return true;
            }
            MONTH_YEAR
                .captures(s)
                .and_then(|caps| caps.get(1))
                .is_some_and(|word| locale.month_index(word.as_str()).is_some())
        }
        _ => false,
    }
}

fn is_currency_like(cell: &Cell, _locale: Locale) -> bool {
    match cell {
        Cell::Text(s) => {
            let s = s.trim();
            CURRENCY_PREFIX.is_match(s) || GROUPED_DECIMAL.is_match(s)
        }
        _ => false,
    }
}

fn is_number_like(cell: &Cell, _locale: Locale) -> bool {
    match cell {
        Cell::Number(n) => n.is_finite(),
        Cell::Text(s) => {
            let trimmed = s.trim();
            let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
            let digits: String = unsigned
                .chars()
                .filter(|c| !matches!(c, '.' | ',' | '$' | '€' | '£' | '¥' | '\'') && !c.is_whitespace())
                .collect();
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn is_boolean_like(cell: &Cell, locale: Locale) -> bool {
    match cell {
        Cell::Bool(_) => true,
        Cell::Text(s) => {
            let word = s.trim().to_uppercase();
            matches!(word.as_str(), "TRUE" | "FALSE")
                || locale.affirmatives().contains(&word.as_str())
                || locale.negatives().contains(&word.as_str())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn infer(values: &[&str]) -> ColumnType {
        let cells: Vec<Cell> = values.iter().map(|v| Cell::from(*v)).collect();
        let refs: Vec<&Cell> = cells.iter().collect();
        infer_type(&refs, Locale::Es)
    }

    #[test]
    fn test_no_samples_is_text() {
        assert_eq!(infer(&[]), ColumnType::Text);
        assert_eq!(infer(&["", "  "]), ColumnType::Text);
    }

    #[test]
    fn test_numeric_dates() {
        assert_eq!(infer(&["15/03/2024", "2024-03-16", "17-03-24"]), ColumnType::Date);
    }

    #[test]
    fn test_month_year_dates() {
        assert_eq!(infer(&["Marzo 2024", "abr-24", "Mayo de 2024"]), ColumnType::Date);
        // "Total 2024" is not a month
        assert_eq!(infer(&["Total 2024", "Saldo 2023"]), ColumnType::Text);
    }

    #[test]
    fn test_native_dates() {
        let d = Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(infer_type(&[&d, &d, &Cell::from("x")], Locale::Es), ColumnType::Date);
    }

    #[test]
    fn test_currency() {
        assert_eq!(infer(&["$ 1.500", "$2.300", "$ 900"]), ColumnType::Currency);
        assert_eq!(infer(&["1.234,50", "12.000,00", "5"]), ColumnType::Currency);
        assert_eq!(infer(&["1,234.50", "9,999.99"]), ColumnType::Currency);
    }

    #[test]
    fn test_number() {
        assert_eq!(infer(&["1.500", "-20", "300"]), ColumnType::Number);
        let cells = [Cell::Number(1.0), Cell::Number(2.5)];
        assert_eq!(infer_type(&[&cells[0], &cells[1]], Locale::Es), ColumnType::Number);
    }

    #[test]
    fn test_boolean() {
        assert_eq!(infer(&["Sí", "no", "SI"]), ColumnType::Boolean);
        assert_eq!(
            infer_type(&[&Cell::Bool(true), &Cell::Bool(false)], Locale::En),
            ColumnType::Boolean
        );
    }

    #[test]
    fn test_majority_needs_more_than_half() {
        // 2 of 4 is not a majority
        assert_eq!(infer(&["100", "200", "abc", "def"]), ColumnType::Text);
        assert_eq!(infer(&["100", "200", "300", "def"]), ColumnType::Number);
    }

    #[test]
    fn test_date_outranks_number() {
        // Both checks would accept "2024/01/02"-like values only as dates
        assert_eq!(infer(&["2024/01/02", "2024/01/03"]), ColumnType::Date);
    }

    #[test]
    fn test_sample_column_skips_empty_and_limits() {
        let grid = RawGrid::from_rows(vec![
            vec!["h"],
            vec![""],
            vec!["1"],
            vec!["2"],
            vec!["3"],
        ]);
        let samples = sample_column(&grid, 0, 0, 2);
        assert_eq!(samples, vec![&Cell::from("1"), &Cell::from("2")]);
    }

    #[test]
    fn test_infer_column_configs() {
        let grid = RawGrid::from_rows(vec![
            vec!["Fecha", "Monto", "Glosa"],
            vec!["01/02/2024", "$ 1.000", "Compra"],
            vec!["02/02/2024", "$ 2.000", "Venta"],
        ]);
        let headers = vec!["Fecha".to_string(), "Monto".to_string(), "Glosa".to_string()];
        let configs = infer_column_configs(&grid, 0, &headers, 10, Locale::Es);
        let types: Vec<ColumnType> = configs.iter().map(|c| c.column_type).collect();
        assert_eq!(types, vec![ColumnType::Date, ColumnType::Currency, ColumnType::Text]);
    }
}
