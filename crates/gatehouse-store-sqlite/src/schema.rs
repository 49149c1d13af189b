//! SQL schema for the Gatehouse SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS identities (
    identity_key TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    grp          TEXT,
    cohort       INTEGER,
    tag          TEXT UNIQUE,      -- normalised tag credential, NULL if unbound
    created_at   TEXT NOT NULL
);

-- Tags scanned while bound to nobody. A row is deleted in the same
-- transaction that binds its tag.
CREATE TABLE IF NOT EXISTS unassigned_tags (
    tag          TEXT PRIMARY KEY,
    first_seen   TEXT NOT NULL,
    last_seen    TEXT NOT NULL,
    seen_count   INTEGER NOT NULL DEFAULT 1,
    last_device  TEXT NOT NULL,
    last_event   TEXT              -- opaque device payload
);

-- Attendance is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS attendance (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id     TEXT NOT NULL UNIQUE,
    identity_key TEXT NOT NULL REFERENCES identities(identity_key),
    kind         TEXT NOT NULL CHECK (kind IN ('entry', 'exit')),
    ts           TEXT NOT NULL,
    device_id    TEXT NOT NULL,
    recorded_at  TEXT NOT NULL
);

-- Presence cache: the latest attendance row per identity.
-- Always rebuildable from `attendance`.
CREATE TABLE IF NOT EXISTS presence (
    identity_key TEXT PRIMARY KEY REFERENCES identities(identity_key),
    last_kind    TEXT NOT NULL,
    last_seq     INTEGER NOT NULL REFERENCES attendance(seq)
);

CREATE TABLE IF NOT EXISTS devices (
    device_id     TEXT PRIMARY KEY,
    token_hash    TEXT NOT NULL UNIQUE,  -- hex SHA-256 of the device token
    registered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS attendance_identity_idx ON attendance(identity_key, seq);
CREATE INDEX IF NOT EXISTS attendance_ts_idx       ON attendance(ts);
CREATE INDEX IF NOT EXISTS unassigned_seen_idx     ON unassigned_tags(last_seen);

PRAGMA user_version = 1;
";
