//! Writing Buddy · Literacy Tutor Backend
//!
//! - Axum HTTP API for the tutoring SPA
//! - Optional model integration (via environment variables or settings)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   OPENAI_API_KEY    : enables model integration if present (wins over the
//!                       user-entered key in settings)
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o-mini"
//!   AGENT_CONFIG_PATH : path to TOML config (prompt overrides)
//!   STORAGE_PATH      : progress ledger JSON (default ./data/writing-buddy-storage-v1.json)
//!   SETTINGS_PATH     : user settings TOML (default ./data/settings.toml)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod pool;
mod diag;
mod openai;
mod gateway;
mod ledger;
mod state;
mod protocol;
mod routes;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (session store, ledger, gateway).
  let state = AppState::new();

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "writing_buddy", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
