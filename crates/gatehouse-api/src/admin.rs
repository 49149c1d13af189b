//! Handlers for `/admin` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/identities` | Optional `?search=` and `?limit=` |
//! | `POST` | `/identities` | Create or update; body is a `NewIdentity` |
//! | `GET`  | `/identities/{key}` | 404 if not found |
//! | `GET`  | `/identities/{key}/presence` | `{current, next}` |
//! | `PUT`  | `/identities/{key}/tag` | Body: `{"tag":"AB12CD"}`; 409 if held elsewhere |
//! | `GET`  | `/tags/unassigned` | Optional `?limit=` |
//! | `GET`  | `/attendance` | Optional `?identity_key=`, `?date=YYYY-MM-DD`, `?limit=` |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, NaiveDate, Utc};
use gatehouse_core::{
  identity::{Identity, IdentityKey, NewIdentity},
  presence::PresenceView,
  store::{AttendanceStore, EventQuery, EventRecord, IdentityQuery},
  tag::{TagCredential, UnassignedTag},
};
use gatehouse_pipeline::Pipeline;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// ─── Identities ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IdentityParams {
  pub search: Option<String>,
  pub limit:  Option<usize>,
}

/// `GET /identities[?search=<text>][&limit=<n>]`
pub async fn list_identities<S>(
  State(pipeline): State<Pipeline<S>>,
  Query(params): Query<IdentityParams>,
) -> Result<Json<Vec<Identity>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let identities = pipeline
    .list_identities(IdentityQuery {
      search: params.search.filter(|s| !s.trim().is_empty()),
      limit:  params.limit,
    })
    .await?;
  Ok(Json(identities))
}

/// `POST /identities`
pub async fn upsert_identity<S>(
  State(pipeline): State<Pipeline<S>>,
  Json(body): Json<NewIdentity>,
) -> Result<Json<Identity>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(pipeline.upsert_identity(body).await?))
}

/// `GET /identities/{key}`
pub async fn get_identity<S>(
  State(pipeline): State<Pipeline<S>>,
  Path(key): Path<String>,
) -> Result<Json<Identity>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let key = IdentityKey::parse(&key)?;
  Ok(Json(pipeline.get_identity(key).await?))
}

/// `GET /identities/{key}/presence`
pub async fn presence<S>(
  State(pipeline): State<Pipeline<S>>,
  Path(key): Path<String>,
) -> Result<Json<PresenceView>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let key = IdentityKey::parse(&key)?;
  Ok(Json(pipeline.presence(key).await?))
}

#[derive(Debug, Deserialize)]
pub struct BindBody {
  pub tag: String,
}

/// `PUT /identities/{key}/tag`
pub async fn bind_tag<S>(
  State(pipeline): State<Pipeline<S>>,
  Path(key): Path<String>,
  Json(body): Json<BindBody>,
) -> Result<Json<Identity>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let key = IdentityKey::parse(&key)?;
  let tag = TagCredential::parse(&body.tag)?;
  Ok(Json(pipeline.bind_tag(key, tag).await?))
}

// ─── Unassigned tags ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LimitParams {
  pub limit: Option<usize>,
}

/// A ledger entry with its raw payload decoded for display.
#[derive(Debug, Serialize)]
pub struct UnassignedTagView {
  pub tag:         TagCredential,
  pub first_seen:  DateTime<Utc>,
  pub last_seen:   DateTime<Utc>,
  pub seen_count:  u64,
  pub last_device: String,
  pub last_event:  Option<serde_json::Value>,
}

impl From<UnassignedTag> for UnassignedTagView {
  fn from(entry: UnassignedTag) -> Self {
    let last_event = entry.last_event.as_ref().and_then(|raw| {
      // Non-JSON payloads are shown as the text they arrived as.
      raw
        .decode()
        .or_else(|| Some(serde_json::Value::String(raw.as_str().to_owned())))
    });
    Self {
      tag: entry.tag,
      first_seen: entry.first_seen,
      last_seen: entry.last_seen,
      seen_count: entry.seen_count,
      last_device: entry.last_device,
      last_event,
    }
  }
}

/// `GET /tags/unassigned[?limit=<n>]`
pub async fn list_unassigned<S>(
  State(pipeline): State<Pipeline<S>>,
  Query(params): Query<LimitParams>,
) -> Result<Json<Vec<UnassignedTagView>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let entries = pipeline.list_unassigned(params.limit).await?;
  Ok(Json(entries.into_iter().map(Into::into).collect()))
}

// ─── Attendance history ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AttendanceParams {
  pub identity_key: Option<String>,
  pub date:         Option<NaiveDate>,
  pub limit:        Option<usize>,
}

/// `GET /attendance[?identity_key=<key>][&date=<YYYY-MM-DD>][&limit=<n>]`
pub async fn attendance<S>(
  State(pipeline): State<Pipeline<S>>,
  Query(params): Query<AttendanceParams>,
) -> Result<Json<Vec<EventRecord>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let identity_key = params
    .identity_key
    .as_deref()
    .map(IdentityKey::parse)
    .transpose()?;
  let records = pipeline
    .list_events(EventQuery {
      identity_key,
      date: params.date,
      limit: params.limit,
    })
    .await?;
  Ok(Json(records))
}
