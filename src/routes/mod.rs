//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::{load_prompt_config_from_env, Prompts};
use crate::store::QuestionStore;

pub mod http;

/// Shared application state: the question store and the prompt set.
/// Model credentials are NOT part of this — they arrive per request.
#[derive(Clone)]
pub struct AppState {
  pub store: QuestionStore,
  pub prompts: Prompts,
}

impl AppState {
  pub fn new() -> Self {
    let prompts = load_prompt_config_from_env()
      .map(|c| c.prompts)
      .unwrap_or_default();
    Self { store: QuestionStore::new(), prompts }
  }
}

impl Default for AppState {
  fn default() -> Self {
    Self::new()
  }
}

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/api/v1/health", get(http::http_health))
    .route("/api/v1/questions/generate", post(http::http_generate))
    .route("/api/v1/questions/:id", get(http::http_get_question))
    .route("/api/v1/questions/:id/approve", post(http::http_approve))
    .route("/api/v1/questions/:id/reject", post(http::http_reject))
    .route("/api/v1/questions/bulk-approve", post(http::http_bulk_approve))
    .route("/api/v1/questions/bulk-reject", post(http::http_bulk_reject))
    .with_state(state)
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}
