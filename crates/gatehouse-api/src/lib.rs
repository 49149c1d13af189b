//! JSON REST and WebSocket API for Gatehouse.
//!
//! Exposes axum [`Router`]s backed by a [`Pipeline`] over any
//! [`gatehouse_core::store::AttendanceStore`]. Authentication, TLS, and
//! transport concerns are the caller's responsibility: the server crate wraps
//! the device router in token auth and the admin router in Basic auth.
//!
//! # Mounting
//!
//! ```rust,ignore
//! Router::new()
//!   .nest("/api/device", gatehouse_api::device_router(pipeline.clone()))
//!   .nest("/api/admin", gatehouse_api::admin_router(pipeline.clone()))
//!   .merge(gatehouse_api::live_router(pipeline))
//!   .route("/health", get(gatehouse_api::health))
//! ```

pub mod admin;
pub mod device;
pub mod error;
pub mod live;

use axum::{
  Json, Router,
  routing::{get, post, put},
};
use gatehouse_core::store::AttendanceStore;
use gatehouse_pipeline::Pipeline;
use serde_json::{Value, json};

pub use device::AuthenticatedDevice;
pub use error::ApiError;

/// Routes used by readers and gateways.
pub fn device_router<S>(pipeline: Pipeline<S>) -> Router<()>
where
  S: AttendanceStore + 'static,
{
  Router::new()
    .route("/scans", post(device::scan::<S>))
    .route("/events", post(device::event::<S>))
    .route("/taps", post(device::tap::<S>))
    .with_state(pipeline)
}

/// Registry, ledger and history routes for operators.
pub fn admin_router<S>(pipeline: Pipeline<S>) -> Router<()>
where
  S: AttendanceStore + 'static,
{
  Router::new()
    // Identities
    .route(
      "/identities",
      get(admin::list_identities::<S>).post(admin::upsert_identity::<S>),
    )
    .route("/identities/{key}", get(admin::get_identity::<S>))
    .route("/identities/{key}/presence", get(admin::presence::<S>))
    .route("/identities/{key}/tag", put(admin::bind_tag::<S>))
    // Ledger
    .route("/tags/unassigned", get(admin::list_unassigned::<S>))
    // History
    .route("/attendance", get(admin::attendance::<S>))
    .with_state(pipeline)
}

/// The observer push channel at `/ws/events`.
pub fn live_router<S>(pipeline: Pipeline<S>) -> Router<()>
where
  S: AttendanceStore + 'static,
{
  Router::new()
    .route("/ws/events", get(live::events::<S>))
    .with_state(pipeline)
}

/// `GET /health`
pub async fn health() -> Json<Value> { Json(json!({ "status": "healthy" })) }

#[cfg(test)]
mod tests;
