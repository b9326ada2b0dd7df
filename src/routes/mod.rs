//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use axum::{
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  services::{ServeDir, ServeFile},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: AppState) -> Router {
  // Static files with SPA fallback
  let static_service = ServeDir::new("./static")
    .append_index_html_on_directories(true)
    .not_found_service(ServeFile::new("./static/index.html"));

  Router::new()
    .route("/api/v1/health", get(http::http_health))
    // Session
    .route("/api/v1/session", get(http::http_get_session))
    .route("/api/v1/session/mode", post(http::http_post_mode))
    .route("/api/v1/session/grade", post(http::http_post_grade))
    .route(
      "/api/v1/session/:mode/transcript",
      get(http::http_get_transcript).delete(http::http_delete_transcript),
    )
    // Evaluation
    .route("/api/v1/evaluate", post(http::http_post_evaluate))
    // Content
    .route("/api/v1/content/passage", get(http::http_get_passage))
    .route("/api/v1/content/race", get(http::http_get_race_prompt))
    .route("/api/v1/content/writing-prompt", get(http::http_get_writing_prompt))
    // Submissions
    .route(
      "/api/v1/submissions",
      get(http::http_get_submissions).post(http::http_post_submit),
    )
    // Progress
    .route("/api/v1/progress", get(http::http_get_progress))
    .route("/api/v1/progress/activity", get(http::http_get_activity))
    .route("/api/v1/progress/summary", get(http::http_get_summary))
    // Diagnostics
    .route(
      "/api/v1/diagnostics",
      get(http::http_get_diagnostics).delete(http::http_delete_diagnostics),
    )
    // Settings
    .route("/api/v1/settings/api-key", post(http::http_post_api_key))
    // State + CORS + HTTP tracing
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
    // Frontend fallback
    .fallback_service(static_service)
}
