//! HTTP API server.
//!
//! Exposes registration, login, uploads, listings, search, and question
//! answering as a JSON API over axum. Every route except `/health` and
//! `/auth/*` requires `Authorization: Bearer <token>`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/auth/register` | Create an account |
//! | `POST` | `/auth/login` | Exchange credentials for a token |
//! | `GET`  | `/me` | Profile of the caller |
//! | `GET`  | `/datasets` | Caller's datasets with record counts |
//! | `GET`  | `/dataset/{id}/records` | Records of one dataset (`?verbose=true` adds content) |
//! | `GET`  | `/records/search?query=` | Pattern search over the caller's records |
//! | `POST` | `/queries` | Ask a question about one dataset |
//! | `POST` | `/datasets/upload` | Multipart upload of CSV/PDF files |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_failed", "message": "...",
//!              "errors": [{ "field": "email", "message": "Invalid email format" }] } }
//! ```
//!
//! `errors` and `field` are omitted when empty. Codes: `bad_request`,
//! `validation_failed`, `conflict`, `unsupported_format` (400),
//! `unauthorized` (401), `not_found` (404), `payload_too_large` (413),
//! `upstream_failed`, `search_failed`, `internal` (500). Internal detail is
//! logged, never returned.

use std::path::Path as FsPath;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        multipart::{Field, MultipartError},
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use recordsift_core::models::{FieldError, RecordSummary, UserProfile};
use recordsift_core::search::{search_records, SearchError};
use recordsift_core::store::Store;
use recordsift_core::validate::RecordNames;

use crate::auth::{self, AuthError, Claims, Registration, TokenService};
use crate::config::{Config, ServerConfig};
use crate::datasets::{self, DatasetError};
use crate::db;
use crate::inference::{HttpInferenceClient, InferenceClient};
use crate::ingest::{ingest_upload, IngestError, UploadRequest, UploadedFile};
use crate::migrate;
use crate::query::{self, QueryError};
use crate::sqlite_store::SqliteStore;

/// Upper bound on files per upload, used only to size the request body limit.
const MAX_FILES_PER_UPLOAD: usize = 20;

/// Transport-level upload checks, applied before the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_file_bytes: usize,
    /// Lowercase, without the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl From<&ServerConfig> for UploadLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl UploadLimits {
    fn allows(&self, file_name: &str) -> bool {
        FsPath::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.allowed_extensions.contains(&e))
    }

    fn body_limit(&self) -> usize {
        self.max_file_bytes
            .saturating_mul(MAX_FILES_PER_UPLOAD)
            .saturating_add(64 * 1024)
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub inference: Arc<dyn InferenceClient>,
    pub tokens: Arc<TokenService>,
    pub limits: Arc<UploadLimits>,
}

/// Build the full router. Separate from [`run_server`] so tests can drive
/// it with an in-memory store.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let upload_limit = DefaultBodyLimit::max(state.limits.body_limit());

    Router::new()
        .route("/health", get(handle_health))
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/me", get(handle_me))
        .route("/datasets", get(handle_list_datasets))
        .route("/dataset/{id}/records", get(handle_list_records))
        .route("/records/search", get(handle_search))
        .route("/queries", post(handle_query))
        .route("/datasets/upload", post(handle_upload).layer(upload_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open the database, wire the production collaborators, and serve until
/// Ctrl-C. The pool is closed after the last connection drains.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let state = AppState {
        store: store.clone(),
        inference: Arc::new(HttpInferenceClient::new(&config.inference)?),
        tokens: Arc::new(TokenService::from_config(&config.auth)?),
        limits: Arc::new(UploadLimits::from(&config.server)),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, "recordsift listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

/// Error type that converts into an HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    errors: Vec<FieldError>,
    field: Option<String>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            errors: Vec::new(),
            field: None,
        }
    }

    fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        self.errors = errors;
        self
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                errors: self.errors,
                field: self.field,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn validation_failed(message: impl Into<String>, errors: Vec<FieldError>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "validation_failed", message).with_errors(errors)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "Internal server error",
    )
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(errors) => validation_failed("Invalid account details", errors),
            AuthError::EmailTaken => AppError::new(
                StatusCode::BAD_REQUEST,
                "conflict",
                "Email is already registered",
            )
            .with_field("email"),
            AuthError::UnknownEmail => not_found("User not found").with_field("email"),
            AuthError::WrongPassword => unauthorized("Invalid password").with_field("password"),
            AuthError::InvalidToken => unauthorized("Invalid or expired token"),
            AuthError::Internal(e) => internal(e),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(errors) => validation_failed("Invalid upload request", errors),
            IngestError::Conflict(errors) => AppError::new(
                StatusCode::BAD_REQUEST,
                "conflict",
                "Record names already exist in this dataset",
            )
            .with_errors(errors),
            IngestError::UnsupportedFormat(content_type) => AppError::new(
                StatusCode::BAD_REQUEST,
                "unsupported_format",
                format!("Unsupported file format: {}", content_type),
            ),
            e @ IngestError::Parse { .. } => {
                error!(error = %e, "upload parsing failed");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Failed to process upload",
                )
            }
            IngestError::Store(e) => internal(e),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::MissingQuery => validation_failed(
                "Invalid search request",
                vec![FieldError::new(
                    "query",
                    "Query parameter is required and must be a string",
                )],
            ),
            SearchError::InvalidPattern(e) | SearchError::Evaluation(e) => {
                warn!(error = %e, "search pattern rejected");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "search_failed",
                    "Failed to process search",
                )
            }
            SearchError::Serialize(e) => internal(e.into()),
            SearchError::Store(e) => internal(e),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Validation(errors) => validation_failed("Invalid query request", errors),
            QueryError::NoDatasets => not_found("No datasets found for this user"),
            QueryError::DatasetNotFound(_) => not_found("Dataset not found"),
            QueryError::Inference(e) => {
                error!(error = %format!("{:#}", e), "inference failed");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream_failed",
                    "Failed to process question",
                )
            }
            QueryError::Store(e) => internal(e),
        }
    }
}

impl From<DatasetError> for AppError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::NotFound => not_found("Dataset not found"),
            DatasetError::Store(e) => internal(e),
        }
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(status, "payload_too_large", err.body_text())
    } else {
        bad_request(err.body_text())
    }
}

// ============ Authentication ============

/// The authenticated caller, taken from a valid bearer token.
pub struct AuthUser(pub Claims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthorized("Missing bearer token"))?;

        let claims = state.tokens.verify(token)?;
        Ok(AuthUser(claims))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /auth ============

async fn handle_register(
    State(state): State<AppState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(input) = payload.map_err(|e| bad_request(e.body_text()))?;
    let user = auth::register(state.store.as_ref(), &input).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": { "name": user.name, "email": user.email },
        })),
    ))
}

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn handle_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload.map_err(|e| bad_request(e.body_text()))?;
    let token = auth::login(
        state.store.as_ref(),
        &state.tokens,
        &body.email,
        &body.password,
    )
    .await?;
    Ok(Json(json!({ "token": token })))
}

// ============ GET /me ============

async fn handle_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .store
        .get_user(claims.id)
        .await?
        .ok_or_else(|| not_found("User not found"))?;
    Ok(Json(UserProfile::from(&user)))
}

// ============ Datasets ============

async fn handle_list_datasets(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Value>, AppError> {
    let datasets = datasets::list_datasets(state.store.as_ref(), claims.id).await?;
    Ok(Json(json!(datasets)))
}

#[derive(Deserialize)]
struct RecordsParams {
    verbose: Option<String>,
}

async fn handle_list_records(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    params: Result<Query<RecordsParams>, QueryRejection>,
) -> Result<Json<Vec<RecordSummary>>, AppError> {
    let id: i64 = id
        .parse()
        .map_err(|_| bad_request("Dataset id must be an integer"))?;
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let verbose = params.verbose.as_deref() == Some("true");

    let records = datasets::list_records(state.store.as_ref(), claims.id, id, verbose).await?;
    Ok(Json(records))
}

// ============ GET /records/search ============

#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let query = params.ok().and_then(|Query(p)| p.query);
    let matches = search_records(state.store.as_ref(), claims.id, query.as_deref()).await?;
    debug!(user_id = claims.id, hits = matches.len(), "search complete");
    Ok(Json(json!({ "matches": matches })))
}

// ============ POST /queries ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    #[serde(default)]
    question: Option<Value>,
    #[serde(default)]
    dataset_name: Option<Value>,
}

async fn handle_query(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<QueryBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(body) = payload.map_err(|e| bad_request(e.body_text()))?;
    let question = body.question.as_ref().and_then(Value::as_str);
    let dataset_name = body.dataset_name.as_ref().and_then(Value::as_str);

    let saved = query::ask(
        state.store.as_ref(),
        state.inference.as_ref(),
        claims.id,
        question,
        dataset_name,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Query processed successfully",
            "query": saved,
        })),
    ))
}

// ============ POST /datasets/upload ============

async fn read_capped(
    field: &mut Field<'_>,
    max_bytes: usize,
    field_name: &str,
) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > max_bytes {
            return Err(AppError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                format!("File too large; the limit is {} bytes", max_bytes),
            )
            .with_field(field_name));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn extension_error(limits: &UploadLimits) -> AppError {
    let allowed = limits
        .allowed_extensions
        .iter()
        .map(|e| format!(".{}", e))
        .collect::<Vec<_>>()
        .join(", ");
    AppError::new(
        StatusCode::BAD_REQUEST,
        "unsupported_format",
        format!("Only {} files are allowed", allowed),
    )
    .with_field("files")
}

async fn handle_upload(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut request = UploadRequest::default();
    let mut record_names = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                if !state.limits.allows(&file_name) {
                    return Err(extension_error(&state.limits));
                }
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = read_capped(&mut field, state.limits.max_file_bytes, &name).await?;
                request.files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            "datasetName" => {
                if request.dataset_name.is_some() {
                    return Err(validation_failed(
                        "Invalid upload request",
                        vec![FieldError::new(
                            "datasetName",
                            "Dataset name must be sent once",
                        )],
                    ));
                }
                request.dataset_name = Some(field.text().await.map_err(multipart_error)?);
            }
            "recordNames" | "recordNames[]" => {
                record_names.push(field.text().await.map_err(multipart_error)?);
            }
            other => debug!(field = %other, "ignoring unknown multipart field"),
        }
    }
    request.record_names = RecordNames::from_values(record_names);

    let (dataset, records) = ingest_upload(state.store.as_ref(), claims.id, request).await?;
    let records: Vec<RecordSummary> = records
        .iter()
        .map(|r| RecordSummary::from_record(r, false))
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Files uploaded successfully",
            "dataset": {
                "id": dataset.id,
                "name": dataset.name,
                "records": records,
            },
        })),
    ))
}
