//! Note Analyzer - multimodal capture analysis server.

mod collaborators;
mod config;
mod digest;
mod document;
mod error;
mod fields;
mod gateway;
mod media_store;
mod orchestrator;
mod prompts;
mod response;
mod session;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use collaborators::{
    HttpLinkFetcher, SidecarRecognizer, SpeechRecognizer, ThumbnailFrames, UnavailableRecognizer,
};
use config::{GatewayConfig, ServerConfig};
use digest::{ChatTurn, Consultation, DigestOutcome};
use document::{DocumentView, MediaKind, NoteEdits};
use error::{GatewayError, SessionError};
use gateway::{ChatClient, ChatGateway};
use media_store::MediaStore;
use orchestrator::{AnalysisOrchestrator, AnalysisReport};
use serde::{Deserialize, Serialize};
use session::SessionRegistry;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    sessions: Arc<SessionRegistry>,
    gateway: Arc<dyn ChatGateway>,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "note_analyzer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server_config = ServerConfig::from_env();
    let gateway_config = GatewayConfig::from_env();
    if gateway_config.api_key.is_none() {
        warn!("DASHSCOPE_API_KEY is not set; analysis will report unauthorized");
    }

    let chat = ChatClient::new(gateway_config)?;
    info!(
        "Chat gateway: model={}, endpoint={}",
        chat.config().model,
        chat.config().endpoint()
    );
    let gateway: Arc<dyn ChatGateway> = Arc::new(chat);

    // Collaborators share one plain HTTP client
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config::DEFAULT_TIMEOUT_SECS))
        .build()?;
    let speech: Arc<dyn SpeechRecognizer> = match &server_config.speech_url {
        Some(url) => {
            info!("Speech sidecar at {}", url);
            Arc::new(SidecarRecognizer::new(url.clone(), http.clone()))
        }
        None => {
            info!("SPEECH_URL not set; local transcription disabled");
            Arc::new(UnavailableRecognizer)
        }
    };

    let store = MediaStore::new();
    let orchestrator = AnalysisOrchestrator::new(
        gateway.clone(),
        store.clone(),
        speech,
        Arc::new(ThumbnailFrames::new(store.clone())),
    );
    let sessions = SessionRegistry::new(store, Arc::new(HttpLinkFetcher::new(http)?), orchestrator);

    let state = AppState {
        sessions: Arc::new(sessions),
        gateway,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/notes", post(create_note).get(list_notes))
        .route("/notes/:id", get(get_note).delete(cancel_note))
        .route("/notes/:id/media", post(upload_media))
        .route("/notes/:id/text", put(set_text))
        .route("/notes/:id/link", post(attach_link))
        .route("/notes/:id/submit", post(submit_note))
        .route("/notes/:id/finalize", post(finalize_note))
        .route("/digest/today", get(digest_today))
        .route("/search", post(search))
        .route("/consult", post(consult))
        .layer(DefaultBodyLimit::max(server_config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr).await?;
    info!("Server listening on http://{}", server_config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Start a new capture session.
async fn create_note(State(state): State<AppState>) -> (StatusCode, Json<DocumentView>) {
    let doc = state.sessions.create();
    (StatusCode::CREATED, Json(doc.into()))
}

/// Finalized notes, newest first.
async fn list_notes(State(state): State<AppState>) -> Json<Vec<DocumentView>> {
    Json(state.sessions.notes().into_iter().map(DocumentView::from).collect())
}

async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentView>, ApiError> {
    state
        .sessions
        .get(id)
        .map(|doc| Json(doc.into()))
        .map_err(session_error)
}

/// Attach a medium. Multipart fields: `kind`, `file`, optional `thumbnail`.
async fn upload_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<DocumentView>, ApiError> {
    let mut kind = None;
    let mut file_data = Vec::new();
    let mut thumbnail = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| {
            (StatusCode::BAD_REQUEST, format!("Failed to read field {}: {}", name, e))
        })?;
        match name.as_str() {
            "kind" => kind = MediaKind::parse(&String::from_utf8_lossy(&data)),
            "file" => file_data = data.to_vec(),
            "thumbnail" => thumbnail = Some(data.to_vec()),
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Missing or unknown kind (audio, image, video)".to_string(),
        )
    })?;
    info!("Received {:?} for {} ({} bytes)", kind, id, file_data.len());

    state
        .sessions
        .attach_media(id, kind, file_data, thumbnail)
        .map(|doc| Json(doc.into()))
        .map_err(session_error)
}

#[derive(Deserialize)]
struct TextBody {
    text: String,
}

async fn set_text(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TextBody>,
) -> Result<Json<DocumentView>, ApiError> {
    state
        .sessions
        .set_text(id, body.text)
        .map(|doc| Json(doc.into()))
        .map_err(session_error)
}

#[derive(Deserialize)]
struct LinkBody {
    url: String,
}

async fn attach_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<LinkBody>,
) -> Result<Json<DocumentView>, ApiError> {
    state
        .sessions
        .attach_link(id, &body.url)
        .await
        .map(|doc| Json(doc.into()))
        .map_err(session_error)
}

#[derive(Serialize)]
struct SubmitResponse {
    report: AnalysisReport,
    note: DocumentView,
}

/// Run AI analysis. Gateway failures show up in the note status, not as HTTP errors.
async fn submit_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let (report, doc) = state.sessions.submit(id).await.map_err(session_error)?;
    Ok(Json(SubmitResponse {
        report,
        note: doc.into(),
    }))
}

async fn finalize_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    edits: Option<Json<NoteEdits>>,
) -> Result<Json<DocumentView>, ApiError> {
    state
        .sessions
        .finalize(id, edits.map(|Json(e)| e))
        .map(|doc| Json(doc.into()))
        .map_err(session_error)
}

async fn cancel_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.sessions.cancel(id).map_err(session_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct DigestQuery {
    /// `YYYY-MM-DD`, defaults to today (UTC).
    date: Option<String>,
}

async fn digest_today(
    State(state): State<AppState>,
    Query(query): Query<DigestQuery>,
) -> Result<Json<DigestOutcome>, ApiError> {
    let date = query.date.unwrap_or_else(document::today_utc);
    let notes = state.sessions.notes();
    digest::summarize_today(state.gateway.as_ref(), &notes, &date)
        .await
        .map(Json)
        .map_err(gateway_error)
}

#[derive(Deserialize)]
struct SearchBody {
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    answer: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, ApiError> {
    let notes = state.sessions.notes();
    let answer = digest::search_notes(state.gateway.as_ref(), &body.query, &notes)
        .await
        .map_err(gateway_error)?;
    Ok(Json(SearchResponse { answer }))
}

#[derive(Deserialize)]
struct ConsultBody {
    query: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Serialize)]
struct ConsultResponse {
    reply: Option<Consultation>,
}

async fn consult(
    State(state): State<AppState>,
    Json(body): Json<ConsultBody>,
) -> Result<Json<ConsultResponse>, ApiError> {
    let notes = state.sessions.notes();
    let reply = digest::consult(state.gateway.as_ref(), &body.query, &body.history, &notes)
        .await
        .map_err(gateway_error)?;
    Ok(Json(ConsultResponse { reply }))
}

// ============================================================================
// Error mapping
// ============================================================================

fn session_error(e: SessionError) -> ApiError {
    let status = match e {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::AlreadySubmitted(_)
        | SessionError::NotAnalyzed(_)
        | SessionError::Finalized(_) => StatusCode::CONFLICT,
        SessionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

fn gateway_error(e: GatewayError) -> ApiError {
    let status = match e {
        GatewayError::MissingCredential
        | GatewayError::InvalidCredential
        | GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        GatewayError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
        _ => StatusCode::BAD_GATEWAY,
    };
    error!("Gateway call failed: {}", e);
    (status, e.to_string())
}
