//! Presence derivation.
//!
//! Presence is never an independent fact: it is the kind of the most recently
//! accepted event for an identity, recomputable from the log at any time.
//! Stores may cache it, but the rules live here.

use serde::{Deserialize, Serialize};

use crate::{
  event::{AttendanceEvent, EventKind},
  identity::IdentityKey,
};

/// The kind of the last event in `history`, or `None` for an empty history.
///
/// `history` must be in acceptance order. No alternation check is applied: a
/// second `entry` in a row simply leaves the identity entered.
pub fn current_kind<'a>(
  history: impl IntoIterator<Item = &'a AttendanceEvent>,
) -> Option<EventKind> {
  history.into_iter().last().map(|e| e.kind)
}

/// The transition a device should expect next: `exit` after an `entry`,
/// `entry` otherwise.
pub fn next_expected_kind(current: Option<EventKind>) -> EventKind {
  match current {
    Some(EventKind::Entry) => EventKind::Exit,
    Some(EventKind::Exit) | None => EventKind::Entry,
  }
}

/// Read model returned by presence lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceView {
  pub identity_key: IdentityKey,
  pub current:      Option<EventKind>,
  pub next:         EventKind,
}

impl PresenceView {
  pub fn new(identity_key: IdentityKey, current: Option<EventKind>) -> Self {
    Self { identity_key, current, next: next_expected_kind(current) }
  }
}
