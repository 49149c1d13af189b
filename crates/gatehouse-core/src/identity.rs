//! Identities: the registered person tracked by the service.
//!
//! An identity is keyed by a stable external identifier (e.g. an admission
//! number). The key never changes once created; every other attribute may be
//! overwritten by a later upsert. A tag credential is bound separately.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, tag::TagCredential};

// ─── IdentityKey ─────────────────────────────────────────────────────────────

/// The immutable external key of an identity. Surrounding whitespace is
/// stripped; case is preserved.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityKey(String);

impl IdentityKey {
  pub fn parse(raw: &str) -> Result<Self> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(Error::EmptyIdentityKey);
    }
    Ok(Self(trimmed.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for IdentityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for IdentityKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for IdentityKey {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<IdentityKey> for String {
  fn from(key: IdentityKey) -> Self { key.0 }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// A registered person and, optionally, the badge currently bound to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub key:        IdentityKey,
  pub name:       String,
  /// Free-form classification, e.g. a department or branch.
  pub group:      Option<String>,
  /// Intake year or similar numeric cohort.
  pub cohort:     Option<i32>,
  /// Unique across all identities when present.
  pub tag:        Option<TagCredential>,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::AttendanceStore::upsert_identity`].
///
/// Re-upserting an existing key overwrites `name`, `group` and `cohort`; the
/// bound tag and `created_at` are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewIdentity {
  pub key:    IdentityKey,
  pub name:   String,
  #[serde(default)]
  pub group:  Option<String>,
  #[serde(default)]
  pub cohort: Option<i32>,
}

impl NewIdentity {
  /// Convenience constructor with the classification fields unset.
  pub fn new(key: IdentityKey, name: impl Into<String>) -> Self {
    Self { key, name: name.into(), group: None, cohort: None }
  }
}
