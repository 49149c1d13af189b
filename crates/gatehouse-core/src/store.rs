//! The `AttendanceStore` trait, its query types and operation outcomes.
//!
//! The trait is implemented by storage backends (e.g. `gatehouse-store-sqlite`).
//! Higher layers (`gatehouse-pipeline`, `gatehouse-api`) depend on this
//! abstraction, not on any concrete backend.
//!
//! Expected outcomes that are not faults (a conflicting bind, a replayed
//! event, a tag that got bound mid-sighting) are returned as `Ok` variants so
//! that `Self::Error` only ever means "the store is unavailable".

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  event::{AttendanceEvent, EventKind, NewAttendanceEvent, NextAttendanceEvent},
  identity::{Identity, IdentityKey, NewIdentity},
  tag::{Sighting, TagCredential, UnassignedTag},
};

// ─── Limits ──────────────────────────────────────────────────────────────────

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 500;

/// Clamp a caller-supplied listing limit into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<usize>) -> usize {
  limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`AttendanceStore::list_identities`].
#[derive(Debug, Clone, Default)]
pub struct IdentityQuery {
  /// Case-insensitive substring match on key or name.
  pub search: Option<String>,
  pub limit:  Option<usize>,
}

/// Parameters for [`AttendanceStore::list_events`].
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
  pub identity_key: Option<IdentityKey>,
  /// Restrict to events whose timestamp falls on this UTC calendar date.
  pub date:         Option<NaiveDate>,
  pub limit:        Option<usize>,
}

/// A history row: the event plus the identity's display name, if known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
  #[serde(flatten)]
  pub event: AttendanceEvent,
  pub name:  Option<String>,
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of [`AttendanceStore::bind_tag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
  /// The tag is now bound to the identity and its ledger entry is gone.
  Bound(Identity),
  /// The tag is already bound to a different identity. Nothing changed.
  Conflict { bound_to: IdentityKey },
  IdentityNotFound,
}

/// Result of [`AttendanceStore::record_sighting`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SightingOutcome {
  /// The ledger entry after this sighting was counted.
  Quarantined(UnassignedTag),
  /// The tag was bound before the sighting landed; the ledger is untouched.
  AlreadyBound(Identity),
}

/// Result of [`AttendanceStore::append_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
  /// Newly appended; presence now reflects this event.
  Recorded(AttendanceEvent),
  /// An event with the same id already existed; this is it.
  Duplicate(AttendanceEvent),
  IdentityNotFound,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a durable Gatehouse store.
///
/// Every method is atomic with respect to every other method on the same
/// store: a bind cannot interleave with a sighting of the same tag, and two
/// appends with the same event id cannot both succeed.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait AttendanceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Identity registry ─────────────────────────────────────────────────

  /// Create the identity, or overwrite the mutable fields of an existing one.
  fn upsert_identity(
    &self,
    input: NewIdentity,
  ) -> impl Future<Output = Result<Identity, Self::Error>> + Send + '_;

  fn get_identity(
    &self,
    key: IdentityKey,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_identities(
    &self,
    query: IdentityQuery,
  ) -> impl Future<Output = Result<Vec<Identity>, Self::Error>> + Send + '_;

  fn identity_by_tag(
    &self,
    tag: TagCredential,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

  /// Bind `tag` to `key` and drop the tag's ledger entry in one transaction.
  /// Re-binding a tag to the identity that already holds it succeeds.
  fn bind_tag(
    &self,
    key: IdentityKey,
    tag: TagCredential,
  ) -> impl Future<Output = Result<BindOutcome, Self::Error>> + Send + '_;

  // ── Unassigned-tag ledger ─────────────────────────────────────────────

  /// Create or bump the ledger entry for an unbound tag. Refuses (with
  /// [`SightingOutcome::AlreadyBound`]) if the tag is bound by the time the
  /// write happens.
  fn record_sighting(
    &self,
    sighting: Sighting,
  ) -> impl Future<Output = Result<SightingOutcome, Self::Error>> + Send + '_;

  /// Most recently seen first; `limit` is already clamped by the caller.
  fn list_unassigned(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<UnassignedTag>, Self::Error>> + Send + '_;

  // ── Attendance log ────────────────────────────────────────────────────

  /// Append an event unless its id was already recorded. The presence read
  /// that follows a `Recorded` outcome observes the new event.
  fn append_event(
    &self,
    input: NewAttendanceEvent,
  ) -> impl Future<Output = Result<AppendOutcome, Self::Error>> + Send + '_;

  /// Append an event whose kind is the identity's next expected kind. The
  /// presence read, the insert and the presence update share one
  /// transaction, so concurrent calls for one identity still alternate.
  /// A replayed id returns the stored event whatever its kind.
  fn append_next_event(
    &self,
    input: NextAttendanceEvent,
  ) -> impl Future<Output = Result<AppendOutcome, Self::Error>> + Send + '_;

  /// Kind of the most recently accepted event for `key`, if any.
  fn current_kind(
    &self,
    key: IdentityKey,
  ) -> impl Future<Output = Result<Option<EventKind>, Self::Error>> + Send + '_;

  /// Newest first by event timestamp.
  fn list_events(
    &self,
    query: EventQuery,
  ) -> impl Future<Output = Result<Vec<EventRecord>, Self::Error>> + Send + '_;

  /// Recompute any cached presence from the event log. Returns the number of
  /// identities with at least one event.
  fn rebuild_presence(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Devices ───────────────────────────────────────────────────────────

  /// Register (or re-key) a device by the hex SHA-256 digest of its token.
  fn register_device(
    &self,
    device_id: String,
    token_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn device_for_token(
    &self,
    token_hash: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;
}
