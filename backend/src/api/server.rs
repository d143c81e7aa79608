//! HTTP server for sheetload import sessions.
//!
//! A client uploads a file, adjusts what the analysis guessed, reviews the
//! normalized rows and commits the selection. Sessions live in memory until
//! deleted; saved mappings and committed records go to the data directory.
//!
//! # API Endpoints
//!
//! | Method | Path                               | Description                       |
//! |--------|------------------------------------|-----------------------------------|
//! | GET    | `/health`                          | Health check                      |
//! | GET    | `/api/contexts`                    | Field registries                  |
//! | POST   | `/api/sessions`                    | Upload a file (multipart)         |
//! | GET    | `/api/sessions/{id}`               | Session state                     |
//! | DELETE | `/api/sessions/{id}`               | Drop a session                    |
//! | PUT    | `/api/sessions/{id}/header-row`    | Override the header row           |
//! | PUT    | `/api/sessions/{id}/columns`       | Override column types             |
//! | PUT    | `/api/sessions/{id}/mapping`       | Assign or clear fields            |
//! | PUT    | `/api/sessions/{id}/layout`        | Flat or matrix layout             |
//! | POST   | `/api/sessions/{id}/normalize`     | Produce parsed rows               |
//! | GET    | `/api/sessions/{id}/rows`          | Page through parsed rows          |
//! | POST   | `/api/sessions/{id}/selection`     | Change the selection              |
//! | POST   | `/api/sessions/{id}/commit`        | Insert the selected rows          |
//! | GET    | `/api/logs`                        | SSE stream for real-time logs     |

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post, put},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{
    api_error, error_response, ApiError, ColumnsRequest, HeaderRowRequest, MappingRequest, RowsQuery,
    RowsResponse, SelectionAction, SelectionRequest, SessionView,
};
use crate::cache::{FileMappingStore, MappingStore};
use crate::config::{DuplicatePolicy, ImportOptions, Settings};
use crate::error::{ServerError, ServerResult, SessionResult};
use crate::fields;
use crate::models::FieldRegistry;
use crate::sink::{JsonLinesSink, RecordSink};
use crate::transform::pipeline::{CommitSummary, ImportSession, Layout};

/// Shared server state
pub struct AppState {
    options: ImportOptions,
    sessions: Mutex<HashMap<Uuid, ImportSession>>,
    store: Mutex<Box<dyn MappingStore>>,
    sink: Mutex<Box<dyn RecordSink>>,
}

/// What an upload asks for besides the file itself
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file_name: String,
    pub context: Option<String>,
    pub header_row: Option<usize>,
    pub reference_year: Option<i32>,
    pub duplicate_policy: Option<DuplicatePolicy>,
}

impl AppState {
    /// State backed by the data directory of `settings`.
    pub fn new(settings: &Settings) -> Self {
        Self::with_backends(
            settings.import_options(),
            Box::new(FileMappingStore::with_dir(settings.mapping_dir())),
            Box::new(JsonLinesSink::new(settings.records_dir())),
        )
    }

    pub fn with_backends(
        options: ImportOptions,
        store: Box<dyn MappingStore>,
        sink: Box<dyn RecordSink>,
    ) -> Self {
        Self {
            options,
            sessions: Mutex::new(HashMap::new()),
            store: Mutex::new(store),
            sink: Mutex::new(sink),
        }
    }

    /// Load an uploaded file into a new session.
    pub async fn open_session(&self, bytes: &[u8], request: UploadRequest) -> ServerResult<SessionView> {
        let context = request.context.as_deref().unwrap_or(fields::DEFAULT_CONTEXT);
        let registry = fields::registry(context)
            .ok_or_else(|| ServerError::NotFound(format!("context '{}'", context)))?;

        let mut options = self.options.clone();
        options.header_row = request.header_row;
        if request.reference_year.is_some() {
            options.reference_year = request.reference_year;
        }
        if let Some(policy) = request.duplicate_policy {
            options.duplicate_policy = policy;
        }

        let mut session = ImportSession::new(registry, options);
        {
            let store = self.store.lock().await;
            session.load_bytes(bytes, &request.file_name, &**store)?;
        }
        {
            let sink = self.sink.lock().await;
            session.refresh_existing_ids(&**sink)?;
        }

        let id = Uuid::new_v4();
        let view = SessionView::new(id, &session);
        self.sessions.lock().await.insert(id, session);
        log_info(format!("📄 Session {} opened for '{}'", id, context));
        Ok(view)
    }

    /// Run `edit` against session `id` and return the resulting view.
    pub async fn edit_session(
        &self,
        id: Uuid,
        edit: impl FnOnce(&mut ImportSession) -> SessionResult<()>,
    ) -> ServerResult<SessionView> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(id))?;
        edit(session)?;
        Ok(SessionView::new(id, session))
    }

    pub async fn view(&self, id: Uuid) -> ServerResult<SessionView> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(&id).ok_or_else(|| session_not_found(id))?;
        Ok(SessionView::new(id, session))
    }

    pub async fn rows(&self, id: Uuid, query: &RowsQuery) -> ServerResult<RowsResponse> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(&id).ok_or_else(|| session_not_found(id))?;
        Ok(RowsResponse::build(session, query))
    }

    /// Re-read existing identifiers, then normalize.
    pub async fn normalize(&self, id: Uuid) -> ServerResult<SessionView> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(id))?;
        {
            let sink = self.sink.lock().await;
            session.refresh_existing_ids(&**sink)?;
        }
        session.normalize()?;
        Ok(SessionView::new(id, session))
    }

    pub async fn commit(&self, id: Uuid) -> ServerResult<CommitSummary> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(id))?;
        let mut store = self.store.lock().await;
        let mut sink = self.sink.lock().await;
        Ok(session.commit(&mut **sink, &mut **store)?)
    }

    pub async fn close(&self, id: Uuid) -> ServerResult<()> {
        self.sessions
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| session_not_found(id))
    }
}

fn session_not_found(id: Uuid) -> ServerError {
    ServerError::NotFound(format!("session {}", id))
}

/// Build the router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/contexts", get(list_contexts))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/header-row", put(set_header_row))
        .route("/api/sessions/{id}/columns", put(set_columns))
        .route("/api/sessions/{id}/mapping", put(set_mapping))
        .route("/api/sessions/{id}/layout", put(set_layout))
        .route("/api/sessions/{id}/normalize", post(normalize_session))
        .route("/api/sessions/{id}/rows", get(list_rows))
        .route("/api/sessions/{id}/selection", post(update_selection))
        .route("/api/sessions/{id}/commit", post(commit_session))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let port = settings.port;
    let app = router(Arc::new(AppState::new(&settings)));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    eprintln!("🚀 Sheetload server running on http://localhost:{}", port);
    eprintln!("   POST /api/sessions - Upload a spreadsheet");
    eprintln!("   GET  /api/logs     - SSE log stream");
    eprintln!("   GET  /health       - Health check");
    eprintln!("   Data directory: {}", settings.data_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sheetload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "sessions": "POST /api/sessions",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn list_contexts() -> Json<Vec<FieldRegistry>> {
    Json(fields::all())
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload endpoint: `file` plus optional `context`, `headerRow`, `year`, `duplicates`
async fn create_session(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(error_response(&format!("Multipart error: {}", e))))
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            request.file_name = field.file_name().unwrap_or("upload").to_string();
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, Json(error_response(&format!("Read error: {}", e)))))?
                    .to_vec(),
            );
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, Json(error_response(&format!("Read error: {}", e)))))?;
        match name.as_str() {
            "context" => request.context = Some(text),
            "headerRow" => request.header_row = Some(parse_field(&name, &text)?),
            "year" => request.reference_year = Some(parse_field(&name, &text)?),
            "duplicates" => request.duplicate_policy = Some(parse_field(&name, &text)?),
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| (StatusCode::BAD_REQUEST, Json(error_response("No file provided"))))?;

    log_info(format!("📄 NEW UPLOAD: {} ({} bytes)", request.file_name, bytes.len()));

    let view = state.open_session(&bytes, request).await.map_err(api_error)?;
    Ok(Json(view))
}

fn parse_field<T: std::str::FromStr>(name: &str, text: &str) -> Result<T, ApiError> {
    text.trim().parse().map_err(|_| {
        api_error(ServerError::BadRequest(format!("invalid value for '{}': '{}'", name, text)))
    })
}

async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<SessionView>, ApiError> {
    state.view(id).await.map(Json).map_err(api_error)
}

async fn delete_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state.close(id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_header_row(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<HeaderRowRequest>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .edit_session(id, |session| session.set_header_row(body.row))
        .await
        .map(Json)
        .map_err(api_error)
}

async fn set_columns(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ColumnsRequest>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .edit_session(id, |session| {
            for column in &body.columns {
                session.set_column_type(&column.header, column.column_type)?;
            }
            Ok(())
        })
        .await
        .map(Json)
        .map_err(api_error)
}

async fn set_mapping(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<MappingRequest>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .edit_session(id, |session| {
            for (key, header) in &body.assignments {
                session.set_mapping(key, header.as_deref())?;
            }
            Ok(())
        })
        .await
        .map(Json)
        .map_err(api_error)
}

async fn set_layout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(layout): Json<Layout>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .edit_session(id, |session| match layout {
            Layout::Flat => session.use_flat(),
            Layout::Matrix(config) => session.use_matrix(config),
        })
        .await
        .map(Json)
        .map_err(api_error)
}

async fn normalize_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    state.normalize(id).await.map(Json).map_err(api_error)
}

async fn list_rows(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RowsQuery>,
) -> Result<Json<RowsResponse>, ApiError> {
    state.rows(id, &query).await.map(Json).map_err(api_error)
}

async fn update_selection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectionRequest>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .edit_session(id, |session| {
            match body.action {
                SelectionAction::Select => {
                    for index in &body.indices {
                        session.select(*index);
                    }
                }
                SelectionAction::Deselect => {
                    for index in &body.indices {
                        session.deselect(*index);
                    }
                }
                SelectionAction::SelectAllValid => session.select_all_valid(),
                SelectionAction::DeselectDuplicates => {
                    session.deselect_duplicates();
                }
            }
            Ok(())
        })
        .await
        .map(Json)
        .map_err(api_error)
}

async fn commit_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommitSummary>, ApiError> {
    state.commit(id).await.map(Json).map_err(api_error)
}
