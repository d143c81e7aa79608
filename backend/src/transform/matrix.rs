//! Wide-format (matrix) detection and expansion.
//!
//! A matrix sheet has one row per account and one column per period:
//!
//! ```text
//! Cuenta | Nombre  | Enero | Febrero | Marzo
//! 4101   | Ventas  | 1.000 |   1.200 |     0
//! 5101   | Arriendo|  -300 |    -300 |  -300
//! ```
//!
//! Expansion emits one record per (account row, selected period) pair whose
//! cell holds a non-zero amount. The record's date is the first day of the
//! period's month in the configured year, its kind comes from the account
//! code, and its amount is the absolute value.
//!
//! | Leading character of the code | Kind |
//! |-------------------------------|------|
//! | `4`, `7`, `I` | income |
//! | `5`, `6`, `8`, `E`, `G` | expense |
//! | anything else | expense |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TransformError, TransformResult};
use crate::locale::Locale;
use crate::models::{normalize_label, ParsedRow, RawGrid, RecordKind};
use crate::transform::coerce::coerce_integer;
use crate::transform::identity::{row_id, RowKeyFn};

/// Which columns of a matrix sheet to expand, and for which year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixConfig {
    pub account_code_header: String,
    #[serde(default)]
    pub account_name_header: Option<String>,
    pub year: i32,
    /// Selected period headers, in any order.
    pub periods: Vec<String>,
}

/// True when the headers hold an account column and at least one period column.
pub fn detect_matrix(headers: &[String], locale: Locale) -> bool {
    headers.iter().any(|h| is_account_header(h, locale))
        && headers.iter().any(|h| period_index(h, locale).is_some())
}

/// Header mentions the account/code vocabulary ("Cuenta", "Código contable").
pub fn is_account_header(header: &str, locale: Locale) -> bool {
    let text = normalize_label(header);
    locale.account_vocabulary().iter().any(|word| text.contains(word))
}

fn is_name_header(header: &str, locale: Locale) -> bool {
    let text = normalize_label(header);
    locale.name_vocabulary().iter().any(|word| text.contains(word))
}

/// Zero-based month index of a period header.
///
/// Accepts a bare month ("Marzo", "mar.") or a month followed by more words
/// ("Enero 2024", "Ene-24").
pub fn period_index(header: &str, locale: Locale) -> Option<usize> {
    let trimmed = header.trim();
    locale.month_index(trimmed).or_else(|| {
        trimmed
            .split(|c: char| c.is_whitespace() || c == '-' || c == '/')
            .find(|part| !part.is_empty())
            .and_then(|first| locale.month_index(first))
    })
}

/// Period headers in column order.
pub fn period_headers(headers: &[String], locale: Locale) -> Vec<String> {
    headers
        .iter()
        .filter(|h| period_index(h, locale).is_some())
        .cloned()
        .collect()
}

/// Default configuration for a detected matrix: first account column, first
/// descriptive column, every period column.
pub fn suggest_matrix_config(headers: &[String], locale: Locale, year: i32) -> Option<MatrixConfig> {
    let code = headers.iter().find(|h| is_account_header(h, locale))?;
    let periods = period_headers(headers, locale);
    if periods.is_empty() {
        return None;
    }

    let name = headers
        .iter()
        .filter(|h| *h != code && period_index(h, locale).is_none())
        .find(|h| is_name_header(h, locale))
        .cloned();

    Some(MatrixConfig {
        account_code_header: code.clone(),
        account_name_header: name,
        year,
        periods,
    })
}

/// Income or expense from the account code's leading character.
pub fn classify_account(code: &str) -> RecordKind {
    match code.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('4' | '7' | 'I') => RecordKind::Income,
        Some('5' | '6' | '8' | 'E' | 'G') => RecordKind::Expense,
        _ => RecordKind::Expense,
    }
}

/// Expands matrix sheets into per-period records.
pub struct MatrixExpander<'a> {
    locale: Locale,
    key_fn: Option<&'a RowKeyFn>,
}

struct PeriodColumn<'h> {
    header: &'h str,
    col: usize,
    date: String,
}

impl<'a> MatrixExpander<'a> {
    pub fn new(locale: Locale) -> Self {
        Self { locale, key_fn: None }
    }

    pub fn with_key_fn(mut self, key_fn: Option<&'a RowKeyFn>) -> Self {
        self.key_fn = key_fn;
        self
    }

    /// Expand every row below `header_row`.
    ///
    /// Fails only on configuration errors: a configured header that is not
    /// among `headers`, a period that is not a month, or no periods at all.
    pub fn expand(
        &self,
        grid: &RawGrid,
        header_row: usize,
        headers: &[String],
        config: &MatrixConfig,
    ) -> TransformResult<Vec<ParsedRow>> {
        if config.periods.is_empty() {
            return Err(TransformError::NoPeriods);
        }

        let code_col = column_of(headers, &config.account_code_header)?;
        let name_col = config
            .account_name_header
            .as_deref()
            .map(|h| column_of(headers, h).map(|col| (h, col)))
            .transpose()?;

        let periods = config
            .periods
            .iter()
            .map(|header| {
                let col = column_of(headers, header)?;
                let month = period_index(header, self.locale)
                    .ok_or_else(|| TransformError::UnknownPeriod(header.clone()))?;
                Ok(PeriodColumn {
                    header: header.as_str(),
                    col,
                    date: format!("{:04}-{:02}-01", config.year, month + 1),
                })
            })
            .collect::<TransformResult<Vec<_>>>()?;

        let mut rows = Vec::new();
        for idx in header_row + 1..grid.len() {
            let code = grid.cell(idx, code_col).display_text().trim().to_string();
            let name = name_col.map(|(_, col)| grid.cell(idx, col).display_text().trim().to_string());
            let kind = classify_account(&code);

            for period in &periods {
                let cell = grid.cell(idx, period.col);
                if cell.is_empty() {
                    continue;
                }
                let amount = coerce_integer(cell);
                if amount == 0 {
                    continue;
                }

                let mut data = Map::new();
                data.insert(config.account_code_header.clone(), Value::from(code.clone()));
                if let (Some((header, _)), Some(name)) = (name_col, &name) {
                    data.insert(header.to_string(), Value::from(name.clone()));
                    data.insert("account_name".to_string(), Value::from(name.clone()));
                }
                data.insert(period.header.to_string(), Value::from(amount));
                data.insert("date".to_string(), Value::from(period.date.clone()));
                data.insert("account_code".to_string(), Value::from(code.clone()));
                data.insert("amount".to_string(), Value::from(amount.unsigned_abs()));
                data.insert("kind".to_string(), Value::from(kind.as_str()));
                data.insert("period".to_string(), Value::from(period.header));

                rows.push(ParsedRow {
                    id: row_id(&data, self.key_fn),
                    structured_data: data,
                    raw_row_index: idx,
                    is_valid: true,
                    validation_errors: Vec::new(),
                    is_duplicate: false,
                    warnings: Vec::new(),
                });
            }
        }

        Ok(rows)
    }
}

fn column_of(headers: &[String], header: &str) -> TransformResult<usize> {
    headers
        .iter()
        .position(|h| h == header)
        .ok_or_else(|| TransformError::MissingColumn(header.to_string()))
}
