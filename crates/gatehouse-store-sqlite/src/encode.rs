//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that lexical order in SQL equals time order.

use chrono::{DateTime, SecondsFormat, Utc};
use gatehouse_core::{
  event::{AttendanceEvent, EventId, EventKind},
  identity::{Identity, IdentityKey},
  store::EventRecord,
  tag::{RawEvent, TagCredential, UnassignedTag},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const IDENTITY_COLUMNS: &str =
  "identity_key, name, grp, cohort, tag, created_at";

pub const UNASSIGNED_COLUMNS: &str =
  "tag, first_seen, last_seen, seen_count, last_device, last_event";

pub const EVENT_COLUMNS: &str =
  "event_id, identity_key, kind, ts, device_id, recorded_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `identities` row.
pub struct RawIdentity {
  pub identity_key: String,
  pub name:         String,
  pub grp:          Option<String>,
  pub cohort:       Option<i32>,
  pub tag:          Option<String>,
  pub created_at:   String,
}

impl RawIdentity {
  /// Map a row selected with [`IDENTITY_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      identity_key: row.get(0)?,
      name:         row.get(1)?,
      grp:          row.get(2)?,
      cohort:       row.get(3)?,
      tag:          row.get(4)?,
      created_at:   row.get(5)?,
    })
  }

  pub fn into_identity(self) -> Result<Identity> {
    Ok(Identity {
      key:        IdentityKey::parse(&self.identity_key)?,
      name:       self.name,
      group:      self.grp,
      cohort:     self.cohort,
      tag:        self.tag.as_deref().map(TagCredential::parse).transpose()?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `unassigned_tags` row.
pub struct RawUnassignedTag {
  pub tag:         String,
  pub first_seen:  String,
  pub last_seen:   String,
  pub seen_count:  i64,
  pub last_device: String,
  pub last_event:  Option<String>,
}

impl RawUnassignedTag {
  /// Map a row selected with [`UNASSIGNED_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      tag:         row.get(0)?,
      first_seen:  row.get(1)?,
      last_seen:   row.get(2)?,
      seen_count:  row.get(3)?,
      last_device: row.get(4)?,
      last_event:  row.get(5)?,
    })
  }

  pub fn into_unassigned(self) -> Result<UnassignedTag> {
    let seen_count = u64::try_from(self.seen_count).map_err(|_| {
      Error::Corrupt(format!(
        "negative seen_count {} for tag {:?}",
        self.seen_count, self.tag
      ))
    })?;

    Ok(UnassignedTag {
      tag: TagCredential::parse(&self.tag)?,
      first_seen: decode_dt(&self.first_seen)?,
      last_seen: decode_dt(&self.last_seen)?,
      seen_count,
      last_device: self.last_device,
      last_event: self.last_event.map(RawEvent::from_text),
    })
  }
}

/// Raw values read directly from an `attendance` row.
pub struct RawAttendance {
  pub event_id:     String,
  pub identity_key: String,
  pub kind:         String,
  pub ts:           String,
  pub device_id:    String,
  pub recorded_at:  String,
}

impl RawAttendance {
  /// Map a row selected with [`EVENT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:     row.get(0)?,
      identity_key: row.get(1)?,
      kind:         row.get(2)?,
      ts:           row.get(3)?,
      device_id:    row.get(4)?,
      recorded_at:  row.get(5)?,
    })
  }

  pub fn into_event(self) -> Result<AttendanceEvent> {
    Ok(AttendanceEvent {
      event_id:     EventId::parse(&self.event_id)?,
      identity_key: IdentityKey::parse(&self.identity_key)?,
      kind:         self.kind.parse::<EventKind>()?,
      ts:           decode_dt(&self.ts)?,
      device_id:    self.device_id,
      recorded_at:  decode_dt(&self.recorded_at)?,
    })
  }
}

/// An attendance row joined with the owning identity's name.
pub struct RawEventRecord {
  pub event: RawAttendance,
  pub name:  Option<String>,
}

impl RawEventRecord {
  /// Map a row selected with [`EVENT_COLUMNS`] followed by the name column.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { event: RawAttendance::from_row(row)?, name: row.get(6)? })
  }

  pub fn into_record(self) -> Result<EventRecord> {
    Ok(EventRecord { event: self.event.into_event()?, name: self.name })
  }
}
