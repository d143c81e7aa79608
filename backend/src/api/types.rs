//! REST API types for import clients.
//!
//! Responses are camelCase JSON. Rows are returned as the session holds
//! them, plus their selection state.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{ServerError, SessionError};
use crate::models::{ColumnConfig, FieldMapping, ParsedRow};
use crate::parser::SourceInfo;
use crate::transform::pipeline::{ImportSession, ImportStep, Layout};

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<Value>);

/// State of one import session as seen by a client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub context: String,
    pub step: ImportStep,
    pub source: Option<SourceInfo>,
    pub header_row: usize,
    pub headers: Vec<String>,
    pub columns: Vec<ColumnConfig>,
    pub mapping: FieldMapping,
    pub matrix_detected: bool,
    pub layout: Layout,
    pub stats: RowStats,
}

/// Row counters of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowStats {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub selected: usize,
}

impl SessionView {
    pub fn new(id: Uuid, session: &ImportSession) -> Self {
        Self {
            id,
            context: session.registry().context.clone(),
            step: session.step(),
            source: session.source_info().cloned(),
            header_row: session.header_row(),
            headers: session.headers().to_vec(),
            columns: session.columns().to_vec(),
            mapping: session.mapping().clone(),
            matrix_detected: session.matrix_detected(),
            layout: session.layout().clone(),
            stats: RowStats {
                total: session.parsed_rows().len(),
                valid: session.valid_count(),
                invalid: session.error_count(),
                duplicates: session.duplicate_count(),
                selected: session.selection().len(),
            },
        }
    }
}

/// Which rows to list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowFilter {
    #[default]
    All,
    Valid,
    Invalid,
    Duplicate,
    Selected,
}

/// Query of `GET /api/sessions/{id}/rows`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RowsQuery {
    pub offset: usize,
    pub limit: usize,
    pub filter: RowFilter,
}

impl Default for RowsQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
            filter: RowFilter::All,
        }
    }
}

/// A parsed row with its position and selection state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowView {
    pub index: usize,
    pub selected: bool,
    #[serde(flatten)]
    pub row: ParsedRow,
}

/// One page of rows
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsResponse {
    /// Rows matching the filter, before paging
    pub total: usize,
    pub offset: usize,
    pub rows: Vec<RowView>,
}

impl RowsResponse {
    pub fn build(session: &ImportSession, query: &RowsQuery) -> Self {
        let selected = session.selection();
        let matching: Vec<(usize, &ParsedRow)> = session
            .parsed_rows()
            .iter()
            .enumerate()
            .filter(|(idx, row)| match query.filter {
                RowFilter::All => true,
                RowFilter::Valid => row.is_valid,
                RowFilter::Invalid => !row.is_valid,
                RowFilter::Duplicate => row.is_duplicate,
                RowFilter::Selected => selected.binary_search(idx).is_ok(),
            })
            .collect();

        let rows = matching
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(idx, row)| RowView {
                index: *idx,
                selected: selected.binary_search(idx).is_ok(),
                row: (*row).clone(),
            })
            .collect();

        Self {
            total: matching.len(),
            offset: query.offset,
            rows,
        }
    }
}

/// Body of `PUT /api/sessions/{id}/header-row`
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderRowRequest {
    pub row: usize,
}

/// Body of `PUT /api/sessions/{id}/columns`
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnsRequest {
    pub columns: Vec<ColumnConfig>,
}

/// Body of `PUT /api/sessions/{id}/mapping`: field key → header (`null` clears)
#[derive(Debug, Clone, Deserialize)]
pub struct MappingRequest {
    pub assignments: BTreeMap<String, Option<String>>,
}

/// Selection change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionAction {
    Select,
    Deselect,
    SelectAllValid,
    DeselectDuplicates,
}

/// Body of `POST /api/sessions/{id}/selection`
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionRequest {
    pub action: SelectionAction,
    #[serde(default)]
    pub indices: Vec<usize>,
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

/// Map a server error to its HTTP status and body.
pub fn api_error(err: ServerError) -> ApiError {
    let status = match &err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::NotFound(_) => StatusCode::NOT_FOUND,
        ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Session(session) => match session {
            SessionError::Source(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SessionError::Sink(_) => StatusCode::BAD_GATEWAY,
            SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::Transform(_)
            | SessionError::NoGrid
            | SessionError::InvalidHeaderRow { .. }
            | SessionError::UnknownHeader(_)
            | SessionError::UnknownField(_)
            | SessionError::NothingSelected => StatusCode::BAD_REQUEST,
        },
    };
    (status, Json(error_response(&err.to_string())))
}

impl From<SessionError> for (StatusCode, Json<Value>) {
    fn from(err: SessionError) -> Self {
        api_error(ServerError::Session(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryMappingStore;
    use crate::config::ImportOptions;
    use crate::error::SourceError;
    use crate::fields;

    fn reviewed_session() -> ImportSession {
        let store = MemoryMappingStore::new();
        let mut session = ImportSession::new(fields::purchase(), ImportOptions::default());
        session
            .load_bytes(b"Fecha;Total\n2024-01-01;10\n2024-01-02;\n2024-01-03;30\n", "a.csv", &store)
            .unwrap();
        session.normalize().unwrap();
        session
    }

    #[test]
    fn test_session_view_stats() {
        let session = reviewed_session();
        let view = SessionView::new(Uuid::nil(), &session);
        assert_eq!(view.stats.total, 3);
        assert_eq!(view.stats.invalid, 1);
        assert_eq!(view.stats.selected, 2);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["step"], "review");
        assert_eq!(json["layout"]["kind"], "flat");
        assert_eq!(json["mapping"]["amount"], "Total");
    }

    #[test]
    fn test_rows_filter_and_paging() {
        let session = reviewed_session();

        let invalid = RowsResponse::build(
            &session,
            &RowsQuery {
                filter: RowFilter::Invalid,
                ..RowsQuery::default()
            },
        );
        assert_eq!(invalid.total, 1);
        assert_eq!(invalid.rows[0].index, 1);
        assert!(!invalid.rows[0].selected);

        let page = RowsResponse::build(
            &session,
            &RowsQuery {
                offset: 1,
                limit: 1,
                filter: RowFilter::All,
            },
        );
        assert_eq!(page.total, 3);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].index, 1);

        let json = serde_json::to_value(&page.rows[0]).unwrap();
        assert_eq!(json["isValid"], false);
        assert!(json["structuredData"].is_object());
    }

    #[test]
    fn test_error_status_mapping() {
        let (status, body) = api_error(ServerError::Session(SessionError::Source(SourceError::EmptyFile)));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.0["status"], "error");

        let (status, _) = api_error(ServerError::NotFound("session".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _): ApiError = SessionError::NothingSelected.into();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_selection_request_parsing() {
        let req: SelectionRequest =
            serde_json::from_value(json!({ "action": "deselectDuplicates" })).unwrap();
        assert_eq!(req.action, SelectionAction::DeselectDuplicates);
        assert!(req.indices.is_empty());
    }
}
