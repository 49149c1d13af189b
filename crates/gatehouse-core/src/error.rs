//! Error types for `gatehouse-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("tag credential is empty")]
  EmptyTag,

  #[error("identity key is empty")]
  EmptyIdentityKey,

  #[error("event id is empty")]
  EmptyEventId,

  #[error("unknown event kind: {0:?}")]
  UnknownEventKind(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
