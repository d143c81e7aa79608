//! Language tables used by inference and coercion.
//!
//! Month names drive date parsing and wide-format period detection, the
//! yes/no vocabulary drives boolean coercion, and the account vocabulary
//! drives wide-format detection. All words are stored upper-cased so they
//! compare directly against normalized header and cell text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// Spanish, day-first dates.
    #[default]
    Es,
    /// English, month-first dates.
    En,
}

const MONTHS_ES: [&str; 12] = [
    "ENERO", "FEBRERO", "MARZO", "ABRIL", "MAYO", "JUNIO",
    "JULIO", "AGOSTO", "SEPTIEMBRE", "OCTUBRE", "NOVIEMBRE", "DICIEMBRE",
];

const MONTHS_ES_SHORT: [&str; 12] = [
    "ENE", "FEB", "MAR", "ABR", "MAY", "JUN", "JUL", "AGO", "SEP", "OCT", "NOV", "DIC",
];

const MONTHS_EN: [&str; 12] = [
    "JANUARY", "FEBRUARY", "MARCH", "APRIL", "MAY", "JUNE",
    "JULY", "AUGUST", "SEPTEMBER", "OCTOBER", "NOVEMBER", "DECEMBER",
];

const MONTHS_EN_SHORT: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

impl Locale {
    /// Full month names, January first.
    pub fn months(&self) -> &'static [&'static str; 12] {
        match self {
            Locale::Es => &MONTHS_ES,
            Locale::En => &MONTHS_EN,
        }
    }

    /// Three-letter month abbreviations, January first.
    pub fn month_abbreviations(&self) -> &'static [&'static str; 12] {
        match self {
            Locale::Es => &MONTHS_ES_SHORT,
            Locale::En => &MONTHS_EN_SHORT,
        }
    }

    /// Zero-based month index for a month word (full name or abbreviation).
    ///
    /// Case-insensitive; a trailing period is ignored ("Sept." / "ene.").
    pub fn month_index(&self, word: &str) -> Option<usize> {
        let word = word.trim().trim_end_matches('.').to_uppercase();
        if word.is_empty() {
            return None;
        }
        if let Some(idx) = self.months().iter().position(|m| *m == word) {
            return Some(idx);
        }
        if let Some(idx) = self.month_abbreviations().iter().position(|m| *m == word) {
            return Some(idx);
        }
        // Common variants not covered by the tables
        match (self, word.as_str()) {
            (Locale::Es, "SETIEMBRE") | (Locale::Es, "SET") => Some(8),
            (Locale::En, "SEPT") => Some(8),
            _ => None,
        }
    }

    /// Words meaning "yes", upper-cased.
    pub fn affirmatives(&self) -> &'static [&'static str] {
        match self {
            Locale::Es => &["SI", "SÍ", "S", "VERDADERO"],
            Locale::En => &["YES", "Y"],
        }
    }

    /// Words meaning "no", upper-cased.
    pub fn negatives(&self) -> &'static [&'static str] {
        match self {
            Locale::Es => &["NO", "N", "FALSO"],
            Locale::En => &["NO", "N"],
        }
    }

    /// Header words that mark an account or code column.
    pub fn account_vocabulary(&self) -> &'static [&'static str] {
        match self {
            Locale::Es => &["CUENTA", "CODIGO", "CÓDIGO", "COD."],
            Locale::En => &["ACCOUNT", "CODE"],
        }
    }

    /// Header words that mark a descriptive name column.
    pub fn name_vocabulary(&self) -> &'static [&'static str] {
        match self {
            Locale::Es => &["NOMBRE", "DESCRIPCION", "DESCRIPCIÓN", "GLOSA", "DETALLE"],
            Locale::En => &["NAME", "DESCRIPTION", "DETAIL"],
        }
    }

    /// Filler words allowed between day, month and year ("15 de marzo de 2024").
    pub fn date_connectors(&self) -> &'static [&'static str] {
        match self {
            Locale::Es => &["DE", "DEL"],
            Locale::En => &["OF"],
        }
    }

    /// Whether numeric dates are written day first (`15/03/2024`).
    pub fn day_first(&self) -> bool {
        matches!(self, Locale::Es)
    }

    /// Language code.
    pub fn code(&self) -> &'static str {
        match self {
            Locale::Es => "es",
            Locale::En => "en",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.trim().to_lowercase();
        match lower.split(['-', '_']).next().unwrap_or("") {
            "es" => Ok(Locale::Es),
            "en" => Ok(Locale::En),
            _ => Err(format!("Unknown locale '{}'. Supported: es, en", value)),
        }
    }
}
