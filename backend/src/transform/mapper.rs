//! Automatic header → system field assignment.
//!
//! Fields are visited in registry order and each takes the first header it
//! matches; a header consumed by an earlier field is skipped. Per field the
//! precedence is:
//!
//! 1. the saved mapping for this context, if its header still exists
//! 2. a header whose normalized text equals an alias
//! 3. a header whose normalized text contains an alias
//!
//! Exact matches are tried across all headers before containment so that
//! `TOTAL` wins over `GRAND TOTAL` for the alias `TOTAL`.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{normalize_label, FieldMapping, FieldRegistry};

/// How a field got its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Prior,
    Exact,
    Contains,
}

/// One automatic assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMatch {
    pub key: String,
    pub header: String,
    pub kind: MatchKind,
}

/// Suggest a mapping for `headers`.
pub fn auto_map(
    headers: &[String],
    registry: &FieldRegistry,
    prior: Option<&FieldMapping>,
) -> FieldMapping {
    auto_map_detailed(headers, registry, prior)
        .into_iter()
        .map(|m| (m.key, m.header))
        .collect()
}

/// Like [`auto_map`], reporting how each field was matched.
pub fn auto_map_detailed(
    headers: &[String],
    registry: &FieldRegistry,
    prior: Option<&FieldMapping>,
) -> Vec<FieldMatch> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_label(h)).collect();
    let mut used: HashSet<usize> = HashSet::new();
    let mut matches = Vec::new();

    for field in &registry.fields {
        let remembered = prior
            .and_then(|p| p.get(&field.key))
            .and_then(|header| headers.iter().position(|h| h == header))
            .filter(|idx| !used.contains(idx))
            .map(|idx| (idx, MatchKind::Prior));

        let found = remembered
            .or_else(|| {
                find_header(&normalized, &used, |text| {
                    field.aliases.iter().any(|alias| alias.as_str() == text)
                })
                .map(|idx| (idx, MatchKind::Exact))
            })
            .or_else(|| {
                find_header(&normalized, &used, |text| {
                    field.aliases.iter().any(|alias| text.contains(alias.as_str()))
                })
                .map(|idx| (idx, MatchKind::Contains))
            });

        if let Some((idx, kind)) = found {
            used.insert(idx);
            matches.push(FieldMatch {
                key: field.key.clone(),
                header: headers[idx].clone(),
                kind,
            });
        }
    }

    matches
}

fn find_header(
    normalized: &[String],
    used: &HashSet<usize>,
    predicate: impl Fn(&str) -> bool,
) -> Option<usize> {
    normalized
        .iter()
        .enumerate()
        .find(|(idx, text)| !used.contains(idx) && !text.is_empty() && predicate(text.as_str()))
        .map(|(idx, _)| idx)
}
