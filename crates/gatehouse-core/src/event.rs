//! Attendance events, the append-only history presence is derived from.
//!
//! Events are never updated. The event id is assigned by the originating
//! device and doubles as the idempotency key: recording the same id twice
//! leaves exactly one event in the log.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, identity::IdentityKey};

// ─── EventKind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
  Entry,
  Exit,
}

impl EventKind {
  /// The string stored in the `kind` column and sent on the wire.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Entry => "entry",
      Self::Exit => "exit",
    }
  }

  pub fn opposite(self) -> Self {
    match self {
      Self::Entry => Self::Exit,
      Self::Exit => Self::Entry,
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EventKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "entry" => Ok(Self::Entry),
      "exit" => Ok(Self::Exit),
      other => Err(Error::UnknownEventKind(other.to_owned())),
    }
  }
}

// ─── EventId ─────────────────────────────────────────────────────────────────

/// Device-assigned event identifier, used as the idempotency key.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct EventId(String);

impl EventId {
  pub fn parse(raw: &str) -> Result<Self> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(Error::EmptyEventId);
    }
    Ok(Self(trimmed.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for EventId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<EventId> for String {
  fn from(id: EventId) -> Self { id.0 }
}

// ─── AttendanceEvent ─────────────────────────────────────────────────────────

/// An accepted entry or exit. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
  pub event_id:     EventId,
  pub identity_key: IdentityKey,
  pub kind:         EventKind,
  /// When the device observed the scan (after sanitisation).
  pub ts:           DateTime<Utc>,
  pub device_id:    String,
  /// Server-assigned; set by the store on append.
  pub recorded_at:  DateTime<Utc>,
}

/// Input to [`crate::store::AttendanceStore::append_event`].
/// `recorded_at` is always set by the store; it is not accepted from callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttendanceEvent {
  pub event_id:     EventId,
  pub identity_key: IdentityKey,
  pub kind:         EventKind,
  pub ts:           DateTime<Utc>,
  pub device_id:    String,
}

/// Input to [`crate::store::AttendanceStore::append_next_event`]. The kind is
/// left for the store to pick from the identity's presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextAttendanceEvent {
  pub event_id:     EventId,
  pub identity_key: IdentityKey,
  pub ts:           DateTime<Utc>,
  pub device_id:    String,
}
