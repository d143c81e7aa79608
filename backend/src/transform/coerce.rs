//! Cell coercion into normalized values.
//!
//! [`coerce`] is total: every input yields a value, and bad input degrades to
//! a safe default instead of failing.
//!
//! | Type | Output | Fallback |
//! |------|--------|----------|
//! | `number` / `currency` | integer | `0` |
//! | `date` | `"YYYY-MM-DD"` string | original text |
//! | `boolean` | bool | `false` |
//! | `text` | trimmed string | `""` |
//!
//! Monetary values are integral in this domain: every character other than
//! digits and a leading minus is discarded.

use chrono::{Datelike, Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::locale::Locale;
use crate::models::{format_number, Cell, ColumnType};

/// Smallest number read as a spreadsheet serial date (1982-02-18).
pub const SERIAL_DATE_MIN: f64 = 30000.0;

/// Largest number read as a spreadsheet serial date (2064-04-08).
pub const SERIAL_DATE_MAX: f64 = 60000.0;

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ].*)?$").expect("valid iso regex")
});

static YEAR_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})[/.](\d{1,2})[/.](\d{1,2})(?:\s.*)?$").expect("valid year-first regex")
});

static NUMERIC_DMY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})(?:\s.*)?$").expect("valid numeric regex")
});

static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})[\s\-/.]*(?:(?:de|of)\s+)?(\p{L}+)\.?[\s\-/.,]*(?:(?:de|del|of)\s+)?(\d{4}|\d{2})$")
        .expect("valid day-month-year regex")
});

static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\p{L}+)\.?\s+(\d{1,2}),?\s+(\d{4})$").expect("valid month-day-year regex")
});

static MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\p{L}+)\.?[\s\-/]*(?:(?:de|del|of)\s+)?(\d{4}|\d{2})$")
        .expect("valid month-year regex")
});

/// Inputs that coercion needs beyond the cell itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoerceContext {
    pub locale: Locale,
    /// Year given to bare month names ("Marzo" → `{year}-03-01`).
    pub reference_year: i32,
}

impl CoerceContext {
    pub fn new(locale: Locale, reference_year: i32) -> Self {
        Self {
            locale,
            reference_year,
        }
    }
}

impl Default for CoerceContext {
    fn default() -> Self {
        Self::new(Locale::default(), chrono::Local::now().year())
    }
}

/// Coerce one cell to the normalized value for `column_type`.
pub fn coerce(cell: &Cell, column_type: ColumnType, ctx: &CoerceContext) -> Value {
    match column_type {
        ColumnType::Number | ColumnType::Currency => Value::from(coerce_integer(cell)),
        ColumnType::Date => coerce_date(cell, ctx),
        ColumnType::Boolean => Value::Bool(coerce_bool(cell, ctx.locale)),
        ColumnType::Text => Value::String(cell.display_text().trim().to_string()),
    }
}

/// Integer value of a cell; anything unparseable is `0`.
pub fn coerce_integer(cell: &Cell) -> i64 {
    match cell {
        // `as` saturates at the i64 bounds
        Cell::Number(n) if n.is_finite() => n.round() as i64,
        Cell::Text(s) => parse_integer_text(s),
        _ => 0,
    }
}

/// Keep the digits of `raw`, negated when the first sign-or-digit is `-`
/// or when the value is wrapped in accounting parentheses.
pub fn parse_integer_text(raw: &str) -> i64 {
    let trimmed = raw.trim();
    let parenthesized = trimmed.starts_with('(') && trimmed.ends_with(')');
    let leading_minus = trimmed
        .chars()
        .find(|c| *c == '-' || c.is_ascii_digit())
        .is_some_and(|c| c == '-');

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return 0;
    }

    let magnitude = digits.parse::<i64>().unwrap_or(0);
    if leading_minus || parenthesized {
        -magnitude
    } else {
        magnitude
    }
}

/// Boolean value of a cell: `true`, `1` and the locale's "yes" words.
pub fn coerce_bool(cell: &Cell, locale: Locale) -> bool {
    match cell {
        Cell::Bool(b) => *b,
        Cell::Empty | Cell::Date(_) => false,
        other => {
            let word = other.display_text().trim().to_uppercase();
            word == "TRUE" || word == "1" || locale.affirmatives().contains(&word.as_str())
        }
    }
}

/// ISO date string for a cell, or the original text when it is not a date.
pub fn coerce_date(cell: &Cell, ctx: &CoerceContext) -> Value {
    match cell {
        Cell::Date(d) => Value::String(format_iso(d)),
        Cell::Number(n) => match serial_to_date(*n) {
            Some(d) => Value::String(format_iso(&d)),
            None => Value::String(format_number(*n)),
        },
        Cell::Text(s) => match parse_date_text(s, ctx) {
            Some(d) => Value::String(format_iso(&d)),
            None => Value::String(s.clone()),
        },
        Cell::Bool(b) => Value::String(b.to_string()),
        Cell::Empty => Value::String(String::new()),
    }
}

/// Convert a spreadsheet serial day number (epoch `1899-12-30`).
///
/// Only values inside [`SERIAL_DATE_MIN`]..=[`SERIAL_DATE_MAX`] are taken
/// as dates; the fractional time of day is dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(SERIAL_DATE_MIN..=SERIAL_DATE_MAX).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.trunc() as u64))
}

/// Parse a textual date in the order: serial number, ISO, year-first,
/// numeric day/month/year, "day Month year", "Month day, year",
/// "Month year", bare month name.
pub fn parse_date_text(raw: &str, ctx: &CoerceContext) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(serial) = s.parse::<f64>() {
        return serial_to_date(serial);
    }

    if let Some(caps) = ISO_DATE.captures(s).or_else(|| YEAR_FIRST.captures(s)) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }

    if let Some(caps) = NUMERIC_DMY.captures(s) {
        let (first, second) = (&caps[1], &caps[2]);
        let year = &caps[3];
        let (day, month) = if ctx.locale.day_first() {
            (first, second)
        } else {
            (second, first)
        };
        // Fall back to the other order when the preferred one is impossible (13/01 in en)
        return ymd(year, month, day).or_else(|| ymd(year, day, month));
    }

    if let Some(caps) = DAY_MONTH_YEAR.captures(s) {
        if let Some(month) = ctx.locale.month_index(&caps[2]) {
            return ymd_parts(&caps[3], month + 1, &caps[1]);
        }
    }

    if let Some(caps) = MONTH_DAY_YEAR.captures(s) {
        if let Some(month) = ctx.locale.month_index(&caps[1]) {
            return ymd_parts(&caps[3], month + 1, &caps[2]);
        }
    }

    if let Some(caps) = MONTH_YEAR.captures(s) {
        if let Some(month) = ctx.locale.month_index(&caps[1]) {
            return ymd_parts(&caps[2], month + 1, "1");
        }
    }

    let month = ctx.locale.month_index(s)?;
    NaiveDate::from_ymd_opt(ctx.reference_year, month as u32 + 1, 1)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    let month: usize = month.parse().ok()?;
    ymd_parts(year, month, day)
}

fn ymd_parts(year: &str, month: usize, day: &str) -> Option<NaiveDate> {
    let year = expand_year(year.parse().ok()?, year.len());
    let day: u32 = day.parse().ok()?;
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, day)
}

/// Two-digit years are taken as 20xx.
fn expand_year(year: i32, digits: usize) -> i32 {
    if digits <= 2 {
        2000 + year
    } else {
        year
    }
}

fn format_iso(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
