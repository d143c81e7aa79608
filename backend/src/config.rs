//! Runtime configuration.
//!
//! [`Settings`] is read from the environment (a `.env` file is honoured)
//! and feeds the CLI and HTTP server. [`ImportOptions`] holds the knobs of
//! a single import session.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::locale::Locale;
use crate::transform::coerce::CoerceContext;
use crate::transform::header::DEFAULT_SEARCH_DEPTH;
use crate::transform::infer::DEFAULT_SAMPLE_SIZE;

/// Directory for saved mappings and committed records (relative to current dir)
const DEFAULT_DATA_DIR: &str = ".sheetload";

const DEFAULT_PORT: u16 = 3000;

/// What the default selection does with rows flagged as duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Duplicates stay selected; the destination decides whether to overwrite.
    #[default]
    Keep,
    /// Duplicates start deselected.
    Skip,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" | "overwrite" => Ok(DuplicatePolicy::Keep),
            "skip" => Ok(DuplicatePolicy::Skip),
            _ => Err(format!("Unknown duplicate policy '{}'. Use keep or skip", value)),
        }
    }
}

/// Options for one import session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportOptions {
    /// Leading rows inspected when locating the header row
    pub search_depth: usize,

    /// Non-empty values sampled per column for type inference
    pub sample_size: usize,

    /// Language of month names and yes/no words
    pub locale: Locale,

    /// Year given to bare month names; defaults to the current year
    pub reference_year: Option<i32>,

    /// Default selection of duplicate rows
    pub duplicate_policy: DuplicatePolicy,

    /// Force the header row instead of locating it
    pub header_row: Option<usize>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            search_depth: DEFAULT_SEARCH_DEPTH,
            sample_size: DEFAULT_SAMPLE_SIZE,
            locale: Locale::default(),
            reference_year: None,
            duplicate_policy: DuplicatePolicy::default(),
            header_row: None,
        }
    }
}

impl ImportOptions {
    /// Coercion context, resolving the reference year once.
    pub fn coerce_context(&self) -> CoerceContext {
        let year = self
            .reference_year
            .unwrap_or_else(|| chrono::Local::now().year());
        CoerceContext::new(self.locale, year)
    }
}

/// Process-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub locale: Locale,
    pub data_dir: PathBuf,
    pub port: u16,
    pub search_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            port: DEFAULT_PORT,
            search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }
}

impl Settings {
    /// Load settings from `SHEETLOAD_*` environment variables.
    ///
    /// Reads `.env` first if present. Unset variables keep their defaults;
    /// set but unparseable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();

        if let Some(value) = lookup("SHEETLOAD_LOCALE") {
            settings.locale = parse_var("SHEETLOAD_LOCALE", &value)?;
        }
        if let Some(value) = lookup("SHEETLOAD_DATA_DIR") {
            settings.data_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("SHEETLOAD_PORT") {
            settings.port = parse_var("SHEETLOAD_PORT", &value)?;
        }
        if let Some(value) = lookup("SHEETLOAD_SEARCH_DEPTH") {
            settings.search_depth = parse_var("SHEETLOAD_SEARCH_DEPTH", &value)?;
        }

        Ok(settings)
    }

    /// Where saved mappings live
    pub fn mapping_dir(&self) -> PathBuf {
        self.data_dir.join("mappings")
    }

    /// Where committed records are written
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    /// Session options derived from these settings
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            search_depth: self.search_depth,
            locale: self.locale,
            ..ImportOptions::default()
        }
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.locale, Locale::Es);
        assert_eq!(settings.mapping_dir(), PathBuf::from(".sheetload/mappings"));

        let opts = ImportOptions::default();
        assert_eq!(opts.search_depth, 15);
        assert_eq!(opts.sample_size, 10);
        assert_eq!(opts.duplicate_policy, DuplicatePolicy::Keep);
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("SHEETLOAD_LOCALE", "en"),
            ("SHEETLOAD_PORT", "8080"),
            ("SHEETLOAD_DATA_DIR", "/tmp/sl"),
        ]))
        .unwrap();

        assert_eq!(settings.locale, Locale::En);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.records_dir(), PathBuf::from("/tmp/sl/records"));
        assert_eq!(settings.import_options().locale, Locale::En);
    }

    #[test]
    fn test_invalid_value_is_error() {
        let err = Settings::from_lookup(lookup_from(&[("SHEETLOAD_PORT", "abc")])).unwrap_err();
        assert!(err.to_string().contains("SHEETLOAD_PORT"));
    }

    #[test]
    fn test_explicit_reference_year() {
        let opts = ImportOptions {
            reference_year: Some(2021),
            ..ImportOptions::default()
        };
        assert_eq!(opts.coerce_context().reference_year, 2021);
    }
}
