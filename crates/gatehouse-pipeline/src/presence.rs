//! Presence queries over the attendance log.

use gatehouse_core::{
  event::EventKind,
  identity::IdentityKey,
  presence::{PresenceView, next_expected_kind},
  store::{AttendanceStore, EventQuery, EventRecord},
};

use crate::{Pipeline, PipelineError, PipelineResult};

impl<S: AttendanceStore> Pipeline<S> {
  /// Kind of the last accepted event for `key`. Unknown keys read as `None`.
  pub async fn current_kind(
    &self,
    key: IdentityKey,
  ) -> PipelineResult<Option<EventKind>, S> {
    self.store.current_kind(key).await.map_err(PipelineError::Store)
  }

  pub async fn next_expected_kind(
    &self,
    key: IdentityKey,
  ) -> PipelineResult<EventKind, S> {
    Ok(next_expected_kind(self.current_kind(key).await?))
  }

  /// Presence of a registered identity.
  pub async fn presence(
    &self,
    key: IdentityKey,
  ) -> PipelineResult<PresenceView, S> {
    let identity = self.get_identity(key).await?;
    let current = self.current_kind(identity.key.clone()).await?;
    Ok(PresenceView::new(identity.key, current))
  }

  pub async fn list_events(
    &self,
    query: EventQuery,
  ) -> PipelineResult<Vec<EventRecord>, S> {
    self.store.list_events(query).await.map_err(PipelineError::Store)
  }

  /// Recompute cached presence from the log.
  pub async fn rebuild_presence(&self) -> PipelineResult<usize, S> {
    let count =
      self.store.rebuild_presence().await.map_err(PipelineError::Store)?;
    tracing::info!(identities = count, "presence rebuilt from log");
    Ok(count)
  }
}
