//! HTTP surface for docsum.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Minimal upload form for browsers.
//! - `POST /summarize` – Multipart upload with a `file` field (PDF) and an optional `api_key`
//!   field. The key may also be sent as an `x-api-key` header; otherwise the server's configured
//!   key is used. Returns the final summary, its category, and pipeline counters.
//! - `POST /summarize/text` – JSON body `{ "text": "...", "api_key": "..." }` for text that has
//!   already been extracted.
//! - `GET /metrics` – Summarization counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Failures are returned as `{ "error": "...", "stage": "..." }` where `stage` names the
//! pipeline stage that failed.

use crate::completion::Credential;
use crate::metrics::MetricsSnapshot;
use crate::processing::{
    DocumentSource, PipelineError, RequestContext, SummarizerApi, SummaryReport,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Largest request body accepted by the upload route.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

const API_KEY_HEADER: &str = "x-api-key";

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>docsum</title></head>
<body>
  <h1>Summarize a PDF</h1>
  <form action="/summarize" method="post" enctype="multipart/form-data">
    <p><label>PDF <input type="file" name="file" accept="application/pdf" required></label></p>
    <p><label>API key <input type="password" name="api_key" autocomplete="off"></label></p>
    <p><button type="submit">Summarize</button></p>
  </form>
</body>
</html>
"#;

/// Build the HTTP router exposing the summarization API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: SummarizerApi + 'static,
{
    Router::new()
        .route("/", get(index_page))
        .route("/summarize", post(summarize_upload::<S>))
        .route("/summarize/text", post(summarize_text::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Request body for `POST /summarize/text`.
#[derive(Deserialize)]
struct TextRequest {
    /// Already-extracted document text.
    text: String,
    /// Optional API key; falls back to the header, then the server default.
    #[serde(default)]
    api_key: Option<String>,
}

/// Success response for both summarize routes.
#[derive(Serialize)]
struct SummaryResponse {
    request_id: String,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    chunk_count: usize,
    failed_chunks: Vec<usize>,
    reduction_passes: usize,
}

impl From<SummaryReport> for SummaryResponse {
    fn from(report: SummaryReport) -> Self {
        Self {
            request_id: report.request_id.to_string(),
            category: report.summary.category().map(str::to_string),
            summary: report.summary.into_text(),
            chunk_count: report.chunk_count,
            failed_chunks: report.failed_chunks,
            reduction_passes: report.reduction_passes,
        }
    }
}

/// Summarize an uploaded PDF.
async fn summarize_upload<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<SummaryResponse>, AppError>
where
    S: SummarizerApi,
{
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut form_key: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let bytes = field.bytes().await?;
                upload = Some((file_name, bytes.to_vec()));
            }
            Some("api_key") => form_key = Some(field.text().await?),
            _ => {}
        }
    }

    let Some((file_name, bytes)) = upload else {
        return Err(AppError::BadRequest(
            "multipart body must include a `file` field".to_string(),
        ));
    };
    let credential = resolve_credential(&*service, form_key, &headers);
    let mut context = RequestContext::new(DocumentSource::Upload { file_name, bytes }, credential);
    let report = service.summarize(&mut context).await?;
    Ok(Json(report.into()))
}

/// Summarize text supplied directly in the request body.
async fn summarize_text<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(request): Json<TextRequest>,
) -> Result<Json<SummaryResponse>, AppError>
where
    S: SummarizerApi,
{
    let credential = resolve_credential(&*service, request.api_key, &headers);
    let mut context = RequestContext::new(DocumentSource::Text(request.text), credential);
    let report = service.summarize(&mut context).await?;
    Ok(Json(report.into()))
}

/// Body field first, then header, then the server's configured key.
fn resolve_credential<S>(
    service: &S,
    supplied: Option<String>,
    headers: &HeaderMap,
) -> Option<Credential>
where
    S: SummarizerApi + ?Sized,
{
    supplied
        .and_then(Credential::new)
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(Credential::new)
        })
        .or_else(|| service.default_credential())
}

/// Return the summarization counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: SummarizerApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Upload a PDF as multipart field `file` (plus optional `api_key` field or `x-api-key` header). Returns { \"summary\", \"category\", \"chunk_count\", \"failed_chunks\", \"reduction_passes\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "summarize_text",
                method: "POST",
                path: "/summarize/text",
                description: "Summarize already-extracted text with the same chunk and map-reduce pipeline.",
                request_example: Some(json!({
                    "text": "Document contents",
                    "api_key": "optional-key"
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return summarization counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

/// Errors rendered as `{ "error", "stage" }`.
enum AppError {
    Pipeline(PipelineError),
    Multipart(MultipartError),
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Pipeline(error) => match error {
                PipelineError::MissingCredential => StatusCode::UNAUTHORIZED,
                PipelineError::ExtractionFailure(_) | PipelineError::EmptyDocument => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PipelineError::ChunkingFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::SummarizationFailure { .. } => StatusCode::BAD_GATEWAY,
                PipelineError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::Multipart(error) => error.status(),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, stage) = match &self {
            Self::Pipeline(error) => (error.to_string(), error.stage().as_str()),
            Self::Multipart(error) => (error.body_text(), "request"),
            Self::BadRequest(message) => (message.clone(), "request"),
        };
        (status, Json(json!({ "error": message, "stage": stage }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}
