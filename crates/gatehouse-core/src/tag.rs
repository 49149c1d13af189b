//! Tag credentials and the unassigned-tag quarantine record.
//!
//! A tag credential is the opaque code read from a physical badge. It is
//! normalised (trimmed, uppercased) at the boundary, so every lookup, binding
//! and ledger entry agrees on one spelling.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── TagCredential ───────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct TagCredential(String);

impl TagCredential {
  /// Normalise a raw scan: trim whitespace, uppercase. Blank input is an
  /// error.
  pub fn parse(raw: &str) -> Result<Self> {
    let normalized = raw.trim().to_uppercase();
    if normalized.is_empty() {
      return Err(Error::EmptyTag);
    }
    Ok(Self(normalized))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TagCredential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for TagCredential {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for TagCredential {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<TagCredential> for String {
  fn from(tag: TagCredential) -> Self { tag.0 }
}

// ─── RawEvent ────────────────────────────────────────────────────────────────

/// A device-defined payload carried through quarantine untouched.
///
/// The core never inspects it. It is decoded only when a ledger entry is
/// listed for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(String);

impl RawEvent {
  pub fn from_json(value: &serde_json::Value) -> Self { Self(value.to_string()) }

  pub fn from_text(text: impl Into<String>) -> Self { Self(text.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Decode for display. Text that is not valid JSON decodes to `None`.
  pub fn decode(&self) -> Option<serde_json::Value> {
    serde_json::from_str(&self.0).ok()
  }
}

// ─── Quarantine ──────────────────────────────────────────────────────────────

/// One scan of a tag that did not resolve to an identity.
#[derive(Debug, Clone)]
pub struct Sighting {
  pub tag:       TagCredential,
  pub device_id: String,
  pub raw_event: Option<RawEvent>,
  pub seen_at:   DateTime<Utc>,
}

/// Ledger entry for a tag that has been scanned but is bound to nobody.
///
/// Exists only while the tag is unbound; binding the tag removes it in the
/// same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedTag {
  pub tag:         TagCredential,
  pub first_seen:  DateTime<Utc>,
  pub last_seen:   DateTime<Utc>,
  pub seen_count:  u64,
  pub last_device: String,
  pub last_event:  Option<RawEvent>,
}
