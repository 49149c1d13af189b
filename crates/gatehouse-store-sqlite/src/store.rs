//! [`SqliteStore`], the SQLite implementation of [`AttendanceStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use gatehouse_core::{
  event::{
    AttendanceEvent, EventId, EventKind, NewAttendanceEvent, NextAttendanceEvent,
  },
  identity::{Identity, IdentityKey, NewIdentity},
  presence::next_expected_kind,
  store::{
    AppendOutcome, AttendanceStore, BindOutcome, EventQuery, EventRecord,
    IdentityQuery, SightingOutcome, clamp_limit,
  },
  tag::{Sighting, TagCredential, UnassignedTag},
};

use crate::{
  Result,
  encode::{
    EVENT_COLUMNS, IDENTITY_COLUMNS, RawAttendance, RawEventRecord, RawIdentity,
    RawUnassignedTag, UNASSIGNED_COLUMNS, encode_dt,
  },
  schema::SCHEMA,
};

// ─── Raw outcomes ────────────────────────────────────────────────────────────
//
// What a connection closure hands back before decoding. Decoding happens
// outside the database thread, as for every other read.

enum RawBind {
  Bound(RawIdentity),
  Conflict(String),
  Missing,
}

enum RawSighting {
  Quarantined(RawUnassignedTag),
  AlreadyBound(RawIdentity),
}

enum RawAppend {
  Recorded(EventKind),
  Duplicate(RawAttendance),
  Missing,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Gatehouse store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All clones
/// share one database thread, so operations never interleave.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Shared body of both appends. With `kind` unset, the kind is derived
  /// from the presence row inside the insert transaction.
  async fn append(
    &self,
    event_id: EventId,
    identity_key: IdentityKey,
    kind: Option<EventKind>,
    ts: DateTime<Utc>,
    device_id: String,
  ) -> Result<AppendOutcome> {
    let recorded_at = Utc::now();

    let event_id_str = event_id.as_str().to_owned();
    let key_str      = identity_key.as_str().to_owned();
    let ts_str       = encode_dt(ts);
    let device       = device_id.clone();
    let at_str       = encode_dt(recorded_at);

    let raw: RawAppend = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let prior = tx
          .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM attendance WHERE event_id = ?1"),
            rusqlite::params![event_id_str],
            RawAttendance::from_row,
          )
          .optional()?;
        if let Some(prior) = prior {
          return Ok(RawAppend::Duplicate(prior));
        }

        let known: bool = tx
          .query_row(
            "SELECT 1 FROM identities WHERE identity_key = ?1",
            rusqlite::params![key_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !known {
          return Ok(RawAppend::Missing);
        }

        let kind = match kind {
          Some(kind) => kind,
          None => {
            let last: Option<String> = tx
              .query_row(
                "SELECT last_kind FROM presence WHERE identity_key = ?1",
                rusqlite::params![key_str],
                |r| r.get(0),
              )
              .optional()?;
            next_expected_kind(last.as_deref().and_then(|k| k.parse().ok()))
          }
        };

        tx.execute(
          "INSERT INTO attendance
             (event_id, identity_key, kind, ts, device_id, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![event_id_str, key_str, kind.as_str(), ts_str, device, at_str],
        )?;
        let seq = tx.last_insert_rowid();

        tx.execute(
          "INSERT INTO presence (identity_key, last_kind, last_seq)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (identity_key) DO UPDATE
             SET last_kind = excluded.last_kind,
                 last_seq  = excluded.last_seq",
          rusqlite::params![key_str, kind.as_str(), seq],
        )?;

        tx.commit()?;
        Ok(RawAppend::Recorded(kind))
      })
      .await?;

    Ok(match raw {
      RawAppend::Recorded(kind) => AppendOutcome::Recorded(AttendanceEvent {
        event_id,
        identity_key,
        kind,
        ts,
        device_id,
        recorded_at,
      }),
      RawAppend::Duplicate(prior) => AppendOutcome::Duplicate(prior.into_event()?),
      RawAppend::Missing => AppendOutcome::IdentityNotFound,
    })
  }
}

fn select_identity(
  conn: &rusqlite::Connection,
  key: &str,
) -> rusqlite::Result<Option<RawIdentity>> {
  conn
    .query_row(
      &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE identity_key = ?1"),
      rusqlite::params![key],
      RawIdentity::from_row,
    )
    .optional()
}

fn select_identity_by_tag(
  conn: &rusqlite::Connection,
  tag: &str,
) -> rusqlite::Result<Option<RawIdentity>> {
  conn
    .query_row(
      &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE tag = ?1"),
      rusqlite::params![tag],
      RawIdentity::from_row,
    )
    .optional()
}

// ─── AttendanceStore impl ────────────────────────────────────────────────────

impl AttendanceStore for SqliteStore {
  type Error = crate::Error;

  // ── Identity registry ─────────────────────────────────────────────────────

  async fn upsert_identity(&self, input: NewIdentity) -> Result<Identity> {
    let key_str = input.key.as_str().to_owned();
    let at_str  = encode_dt(Utc::now());

    let raw: RawIdentity = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO identities (identity_key, name, grp, cohort, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (identity_key) DO UPDATE
             SET name   = excluded.name,
                 grp    = excluded.grp,
                 cohort = excluded.cohort",
          rusqlite::params![key_str, input.name, input.group, input.cohort, at_str],
        )?;
        let row = select_identity(&tx, &key_str)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(row)
      })
      .await?;

    raw.into_identity()
  }

  async fn get_identity(&self, key: IdentityKey) -> Result<Option<Identity>> {
    let key_str = key.as_str().to_owned();

    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| Ok(select_identity(conn, &key_str)?))
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }

  async fn list_identities(&self, query: IdentityQuery) -> Result<Vec<Identity>> {
    let pattern = query
      .search
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| format!("%{s}%"));
    let limit = clamp_limit(query.limit) as i64;

    let raws: Vec<RawIdentity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {IDENTITY_COLUMNS} FROM identities
           WHERE ?1 IS NULL OR identity_key LIKE ?1 OR name LIKE ?1
           ORDER BY created_at DESC, identity_key
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![pattern, limit], RawIdentity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIdentity::into_identity).collect()
  }

  async fn identity_by_tag(&self, tag: TagCredential) -> Result<Option<Identity>> {
    let tag_str = tag.as_str().to_owned();

    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| Ok(select_identity_by_tag(conn, &tag_str)?))
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }

  async fn bind_tag(&self, key: IdentityKey, tag: TagCredential) -> Result<BindOutcome> {
    let key_str = key.as_str().to_owned();
    let tag_str = tag.as_str().to_owned();

    let raw: RawBind = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let holder: Option<String> = tx
          .query_row(
            "SELECT identity_key FROM identities WHERE tag = ?1",
            rusqlite::params![tag_str],
            |r| r.get(0),
          )
          .optional()?;
        if let Some(holder) = holder
          && holder != key_str
        {
          return Ok(RawBind::Conflict(holder));
        }

        let updated = tx.execute(
          "UPDATE identities SET tag = ?1 WHERE identity_key = ?2",
          rusqlite::params![tag_str, key_str],
        )?;
        if updated == 0 {
          return Ok(RawBind::Missing);
        }

        tx.execute(
          "DELETE FROM unassigned_tags WHERE tag = ?1",
          rusqlite::params![tag_str],
        )?;

        let row = select_identity(&tx, &key_str)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(RawBind::Bound(row))
      })
      .await?;

    Ok(match raw {
      RawBind::Bound(row) => BindOutcome::Bound(row.into_identity()?),
      RawBind::Conflict(holder) => BindOutcome::Conflict {
        bound_to: IdentityKey::parse(&holder)?,
      },
      RawBind::Missing => BindOutcome::IdentityNotFound,
    })
  }

  // ── Unassigned-tag ledger ─────────────────────────────────────────────────

  async fn record_sighting(&self, sighting: Sighting) -> Result<SightingOutcome> {
    let tag_str   = sighting.tag.as_str().to_owned();
    let seen_str  = encode_dt(sighting.seen_at);
    let device    = sighting.device_id;
    let raw_event = sighting.raw_event.map(|e| e.as_str().to_owned());

    let raw: RawSighting = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some(holder) = select_identity_by_tag(&tx, &tag_str)? {
          return Ok(RawSighting::AlreadyBound(holder));
        }

        tx.execute(
          "INSERT INTO unassigned_tags
             (tag, first_seen, last_seen, seen_count, last_device, last_event)
           VALUES (?1, ?2, ?2, 1, ?3, ?4)
           ON CONFLICT (tag) DO UPDATE
             SET last_seen   = excluded.last_seen,
                 seen_count  = unassigned_tags.seen_count + 1,
                 last_device = excluded.last_device,
                 last_event  = excluded.last_event",
          rusqlite::params![tag_str, seen_str, device, raw_event],
        )?;

        let row = tx.query_row(
          &format!("SELECT {UNASSIGNED_COLUMNS} FROM unassigned_tags WHERE tag = ?1"),
          rusqlite::params![tag_str],
          RawUnassignedTag::from_row,
        )?;
        tx.commit()?;
        Ok(RawSighting::Quarantined(row))
      })
      .await?;

    Ok(match raw {
      RawSighting::Quarantined(row) => {
        SightingOutcome::Quarantined(row.into_unassigned()?)
      }
      RawSighting::AlreadyBound(row) => {
        SightingOutcome::AlreadyBound(row.into_identity()?)
      }
    })
  }

  async fn list_unassigned(&self, limit: usize) -> Result<Vec<UnassignedTag>> {
    let limit = limit as i64;

    let raws: Vec<RawUnassignedTag> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {UNASSIGNED_COLUMNS} FROM unassigned_tags
           ORDER BY last_seen DESC, tag
           LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawUnassignedTag::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUnassignedTag::into_unassigned).collect()
  }

  // ── Attendance log ────────────────────────────────────────────────────────

  async fn append_event(&self, input: NewAttendanceEvent) -> Result<AppendOutcome> {
    self
      .append(
        input.event_id,
        input.identity_key,
        Some(input.kind),
        input.ts,
        input.device_id,
      )
      .await
  }

  async fn append_next_event(&self, input: NextAttendanceEvent) -> Result<AppendOutcome> {
    self
      .append(input.event_id, input.identity_key, None, input.ts, input.device_id)
      .await
  }

  async fn current_kind(&self, key: IdentityKey) -> Result<Option<EventKind>> {
    let key_str = key.as_str().to_owned();

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT last_kind FROM presence WHERE identity_key = ?1",
              rusqlite::params![key_str],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(raw.as_deref().map(str::parse::<EventKind>).transpose()?)
  }

  async fn list_events(&self, query: EventQuery) -> Result<Vec<EventRecord>> {
    let key_str  = query.identity_key.map(|k| k.as_str().to_owned());
    let date_str = query.date.map(|d| d.format("%Y-%m-%d").to_string());
    let limit    = clamp_limit(query.limit) as i64;

    let raws: Vec<RawEventRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT a.event_id, a.identity_key, a.kind, a.ts, a.device_id,
                  a.recorded_at, i.name
           FROM attendance a
           LEFT JOIN identities i ON i.identity_key = a.identity_key
           WHERE (?1 IS NULL OR a.identity_key = ?1)
             AND (?2 IS NULL OR substr(a.ts, 1, 10) = ?2)
           ORDER BY a.ts DESC, a.seq DESC
           LIMIT ?3",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![key_str, date_str, limit],
            RawEventRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEventRecord::into_record).collect()
  }

  async fn rebuild_presence(&self) -> Result<usize> {
    let rebuilt = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM presence", [])?;
        let n = tx.execute(
          "INSERT INTO presence (identity_key, last_kind, last_seq)
           SELECT a.identity_key, a.kind, a.seq
           FROM attendance a
           WHERE a.seq = (
             SELECT MAX(b.seq) FROM attendance b
             WHERE b.identity_key = a.identity_key
           )",
          [],
        )?;
        tx.commit()?;
        Ok(n)
      })
      .await?;

    tracing::debug!(identities = rebuilt, "rebuilt presence cache");
    Ok(rebuilt)
  }

  // ── Devices ───────────────────────────────────────────────────────────────

  async fn register_device(&self, device_id: String, token_hash: String) -> Result<()> {
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO devices (device_id, token_hash, registered_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (device_id) DO UPDATE
             SET token_hash    = excluded.token_hash,
                 registered_at = excluded.registered_at",
          rusqlite::params![device_id, token_hash, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn device_for_token(&self, token_hash: String) -> Result<Option<String>> {
    let device: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT device_id FROM devices WHERE token_hash = ?1",
              rusqlite::params![token_hash],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(device)
  }
}
