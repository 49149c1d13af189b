//! HTTP server assembly for Gatehouse.
//!
//! Wraps the `gatehouse-api` routers in device-token and admin Basic auth,
//! adds CORS and request tracing, and exposes the configuration the binary
//! reads from `config.toml`.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  http::{HeaderName, HeaderValue, Method, header},
  middleware,
  routing::get,
};
use gatehouse_core::store::AttendanceStore;
use gatehouse_pipeline::{Pipeline, notifier::DEFAULT_SUBSCRIBER_BUFFER};
use serde::Deserialize;
use tower_http::{
  cors::{AllowOrigin, CorsLayer},
  trace::TraceLayer,
};

use auth::{AuthConfig, DEVICE_TOKEN_HEADER};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  pub store_path:          PathBuf,
  pub admin_username:      String,
  pub admin_password_hash: String,
  /// Per-observer queue depth on the live channel.
  #[serde(default = "default_subscriber_buffer")]
  pub subscriber_buffer:   usize,
  #[serde(default = "default_cors_origins")]
  pub cors_origins:        Vec<String>,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_subscriber_buffer() -> usize { DEFAULT_SUBSCRIBER_BUFFER }

fn default_cors_origins() -> Vec<String> {
  vec!["http://localhost:3000".to_string()]
}

// ─── Application state ────────────────────────────────────────────────────────

/// State shared by the auth middleware.
pub struct AppState<S> {
  pub pipeline: Pipeline<S>,
  pub auth:     Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { pipeline: self.pipeline.clone(), auth: Arc::clone(&self.auth) }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router<S>(state: AppState<S>, cors: CorsLayer) -> Router
where
  S: AttendanceStore + 'static,
{
  let device = gatehouse_api::device_router(state.pipeline.clone()).layer(
    middleware::from_fn_with_state(state.clone(), auth::require_device::<S>),
  );
  let admin = gatehouse_api::admin_router(state.pipeline.clone()).layer(
    middleware::from_fn_with_state(state.clone(), auth::require_admin::<S>),
  );

  Router::new()
    .nest("/api/device", device)
    .nest("/api/admin", admin)
    .merge(gatehouse_api::live_router(state.pipeline))
    .route("/health", get(gatehouse_api::health))
    .layer(cors)
    .layer(TraceLayer::new_for_http())
}

/// CORS for browser dashboards on `origins`. Unparseable origins are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
  let allowed: Vec<HeaderValue> = origins
    .iter()
    .filter_map(|origin| match origin.parse() {
      Ok(value) => Some(value),
      Err(_) => {
        tracing::warn!(origin, "ignoring invalid CORS origin");
        None
      }
    })
    .collect();

  CorsLayer::new()
    .allow_origin(AllowOrigin::list(allowed))
    .allow_methods([Method::GET, Method::POST, Method::PUT])
    .allow_headers([
      header::AUTHORIZATION,
      header::CONTENT_TYPE,
      HeaderName::from_static(DEVICE_TOKEN_HEADER),
    ])
}

// ─── Integration tests ────────────────────────────────────────────────────────
