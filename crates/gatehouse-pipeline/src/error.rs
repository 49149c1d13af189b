//! Error type for `gatehouse-pipeline`.

use gatehouse_core::{identity::IdentityKey, tag::TagCredential};
use thiserror::Error;

/// Failures surfaced by pipeline operations, generic over the store's error.
///
/// Replayed events and unassigned tags are not errors; they come back as
/// ordinary outcomes. Observer delivery failures never reach this type.
#[derive(Debug, Error)]
pub enum PipelineError<E>
where
  E: std::error::Error + 'static,
{
  #[error("identity not found: {0}")]
  NotFound(IdentityKey),

  #[error("tag {tag} is already bound to {bound_to}")]
  Conflict {
    tag:      TagCredential,
    bound_to: IdentityKey,
  },

  #[error("invalid input: {0}")]
  Invalid(#[from] gatehouse_core::Error),

  /// The store could not complete the call. Not retried here; callers at the
  /// device layer are expected to retry.
  #[error("store unavailable: {0}")]
  Store(#[source] E),
}
