//! HTTP surface: liveness, guide chat, translation, and security checks.
//! Services are constructed once at startup and shared read-only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gemini::client::GeminiClient;
use crate::pipeline::AnswerPipeline;
use crate::security::{self, RiskAssessment, SecurityAgent};
use crate::translate::TranslationService;

pub type Pipeline = AnswerPipeline<GeminiClient, GeminiClient>;
pub type Security = SecurityAgent<GeminiClient, GeminiClient>;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    translator: Arc<TranslationService>,
    security: Option<Arc<Security>>,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        translator: TranslationService,
        security: Option<Security>,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            translator: Arc::new(translator),
            security: security.map(Arc::new),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/chat", post(chat))
        .route("/api/translate", post(translate))
        .route("/api/security/{city}", get(security_check))
        .with_state(state)
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
}

async fn home() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Online",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// Always 200: the pipeline's terminal fallback guarantees an answer.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let answer = state.pipeline.answer(&request.query).await;
    debug!(tier = ?answer.tier, "chat request served");
    Json(ChatResponse {
        response: answer.text,
    })
}

#[derive(Deserialize)]
struct TranslationRequest {
    text: String,
}

#[derive(Serialize)]
struct TranslationResponse {
    translation: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Empty input is the one error surfaced to the caller; everything past
/// this check comes back as a displayable string.
async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslationRequest>,
) -> Result<Json<TranslationResponse>, (StatusCode, Json<ErrorBody>)> {
    if request.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                detail: "Text provided is empty".to_string(),
            }),
        ));
    }
    let translation = state.translator.translate(&request.text).await;
    Ok(Json(TranslationResponse { translation }))
}

async fn security_check(
    State(state): State<AppState>,
    Path(city): Path<String>,
) -> Json<RiskAssessment> {
    match &state.security {
        Some(agent) => Json(agent.analyze(&city).await),
        None => Json(security::unavailable(&city)),
    }
}
