//! Handlers for `/device` endpoints, called by readers and gateways.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/scans` | 200 with the identity, or 202 if unassigned |
//! | `POST` | `/events` | 201 if recorded, 200 on replay |
//! | `POST` | `/taps` | scan and record in one call; 201, 200 or 202 |
//!
//! Timestamps are sanitised before use. When the caller put an
//! [`AuthenticatedDevice`] in the request extensions, its id replaces any
//! `device_id` in the body.

use std::convert::Infallible;

use axum::{
  Json,
  extract::{FromRequestParts, OptionalFromRequestParts, State},
  http::{StatusCode, request::Parts},
};
use chrono::{DateTime, Utc};
use gatehouse_core::{
  event::{AttendanceEvent, EventId, EventKind, NewAttendanceEvent},
  identity::{Identity, IdentityKey},
  store::AttendanceStore,
  tag::{RawEvent, Sighting, TagCredential},
};
use gatehouse_pipeline::{
  Pipeline,
  ingest::{IngestOutcome, Tap, TapOutcome},
  resolver::Resolution,
  timestamp::sanitize_timestamp,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// ─── Device identity ──────────────────────────────────────────────────────────

/// The device a request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedDevice(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedDevice {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Self>()
      .cloned()
      .ok_or(ApiError::Unauthorized)
  }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthenticatedDevice {
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Option<Self>, Self::Rejection> {
    Ok(parts.extensions.get::<Self>().cloned())
  }
}

fn device_id(
  authenticated: Option<AuthenticatedDevice>,
  claimed: Option<String>,
) -> Result<String, ApiError> {
  if let Some(AuthenticatedDevice(id)) = authenticated {
    return Ok(id);
  }
  claimed
    .map(|id| id.trim().to_string())
    .filter(|id| !id.is_empty())
    .ok_or_else(|| ApiError::BadRequest("device_id is required".into()))
}

fn device_time(ts: Option<&str>) -> DateTime<Utc> {
  sanitize_timestamp(ts, Utc::now())
}

// ─── Scans ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScanBody {
  pub tag:       String,
  pub device_id: Option<String>,
  pub ts:        Option<String>,
  /// Passed through to the unassigned-tag ledger untouched.
  pub raw_event: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanResponse {
  Resolved {
    identity:  Identity,
    next_kind: EventKind,
  },
  Unassigned {
    tag:        TagCredential,
    seen_count: u64,
  },
}

/// `POST /scans`
pub async fn scan<S>(
  State(pipeline): State<Pipeline<S>>,
  authenticated: Option<AuthenticatedDevice>,
  Json(body): Json<ScanBody>,
) -> Result<(StatusCode, Json<ScanResponse>), ApiError>
where
  S: AttendanceStore + 'static,
{
  let sighting = Sighting {
    tag:       TagCredential::parse(&body.tag)?,
    device_id: device_id(authenticated, body.device_id)?,
    raw_event: body.raw_event.as_ref().map(RawEvent::from_json),
    seen_at:   device_time(body.ts.as_deref()),
  };

  let response = match pipeline.resolve(sighting).await? {
    Resolution::Identity { identity, next_kind } => (
      StatusCode::OK,
      Json(ScanResponse::Resolved { identity, next_kind }),
    ),
    Resolution::Unassigned(entry) => (
      StatusCode::ACCEPTED,
      Json(ScanResponse::Unassigned {
        tag:        entry.tag,
        seen_count: entry.seen_count,
      }),
    ),
  };
  Ok(response)
}

// ─── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventBody {
  /// Idempotency key chosen by the device.
  pub event_id:     String,
  pub identity_key: String,
  pub kind:         String,
  pub ts:           Option<String>,
  pub device_id:    Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
  pub recorded: bool,
  pub event:    AttendanceEvent,
}

impl EventResponse {
  fn status(outcome: &IngestOutcome) -> StatusCode {
    if outcome.recorded { StatusCode::CREATED } else { StatusCode::OK }
  }
}

impl From<IngestOutcome> for EventResponse {
  fn from(outcome: IngestOutcome) -> Self {
    Self { recorded: outcome.recorded, event: outcome.event }
  }
}

/// `POST /events`
pub async fn event<S>(
  State(pipeline): State<Pipeline<S>>,
  authenticated: Option<AuthenticatedDevice>,
  Json(body): Json<EventBody>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError>
where
  S: AttendanceStore + 'static,
{
  let input = NewAttendanceEvent {
    event_id:     EventId::parse(&body.event_id)?,
    identity_key: IdentityKey::parse(&body.identity_key)?,
    kind:         body.kind.parse::<EventKind>()?,
    ts:           device_time(body.ts.as_deref()),
    device_id:    device_id(authenticated, body.device_id)?,
  };

  let outcome = pipeline.ingest(input).await?;
  Ok((EventResponse::status(&outcome), Json(outcome.into())))
}

// ─── Taps ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TapBody {
  pub event_id:  String,
  pub tag:       String,
  pub ts:        Option<String>,
  pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TapResponse {
  Recorded {
    recorded: bool,
    name:     String,
    event:    AttendanceEvent,
  },
  Unassigned {
    tag:        TagCredential,
    seen_count: u64,
  },
}

/// `POST /taps`
pub async fn tap<S>(
  State(pipeline): State<Pipeline<S>>,
  authenticated: Option<AuthenticatedDevice>,
  Json(body): Json<TapBody>,
) -> Result<(StatusCode, Json<TapResponse>), ApiError>
where
  S: AttendanceStore + 'static,
{
  let tap = Tap {
    event_id:  EventId::parse(&body.event_id)?,
    tag:       TagCredential::parse(&body.tag)?,
    device_id: device_id(authenticated, body.device_id)?,
    ts:        device_time(body.ts.as_deref()),
  };

  let response = match pipeline.record_tap(tap).await? {
    TapOutcome::Ingested { identity, outcome } => (
      EventResponse::status(&outcome),
      Json(TapResponse::Recorded {
        recorded: outcome.recorded,
        name:     identity.name,
        event:    outcome.event,
      }),
    ),
    TapOutcome::Unassigned(entry) => (
      StatusCode::ACCEPTED,
      Json(TapResponse::Unassigned {
        tag:        entry.tag,
        seen_count: entry.seen_count,
      }),
    ),
  };
  Ok(response)
}
