//! Identity registry operations.

use gatehouse_core::{
  identity::{Identity, IdentityKey, NewIdentity},
  store::{AttendanceStore, BindOutcome, IdentityQuery},
  tag::TagCredential,
};

use crate::{Pipeline, PipelineError, PipelineResult};

impl<S: AttendanceStore> Pipeline<S> {
  pub async fn upsert_identity(
    &self,
    input: NewIdentity,
  ) -> PipelineResult<Identity, S> {
    let identity = self
      .store
      .upsert_identity(input)
      .await
      .map_err(PipelineError::Store)?;
    tracing::info!(identity = %identity.key, "identity upserted");
    Ok(identity)
  }

  pub async fn get_identity(
    &self,
    key: IdentityKey,
  ) -> PipelineResult<Identity, S> {
    self
      .store
      .get_identity(key.clone())
      .await
      .map_err(PipelineError::Store)?
      .ok_or(PipelineError::NotFound(key))
  }

  pub async fn list_identities(
    &self,
    query: IdentityQuery,
  ) -> PipelineResult<Vec<Identity>, S> {
    self.store.list_identities(query).await.map_err(PipelineError::Store)
  }

  /// The identity holding `tag`, if any.
  pub async fn lookup_by_tag(
    &self,
    tag: TagCredential,
  ) -> PipelineResult<Option<Identity>, S> {
    self.store.identity_by_tag(tag).await.map_err(PipelineError::Store)
  }

  /// Bind `tag` to the identity at `key`, clearing the tag's ledger entry.
  ///
  /// Fails with [`PipelineError::Conflict`] if another identity holds the
  /// tag; nothing changes in that case.
  pub async fn bind_tag(
    &self,
    key: IdentityKey,
    tag: TagCredential,
  ) -> PipelineResult<Identity, S> {
    let outcome = self
      .store
      .bind_tag(key.clone(), tag.clone())
      .await
      .map_err(PipelineError::Store)?;

    match outcome {
      BindOutcome::Bound(identity) => {
        tracing::info!(identity = %key, %tag, "tag bound");
        Ok(identity)
      }
      BindOutcome::Conflict { bound_to } => {
        tracing::warn!(identity = %key, %tag, %bound_to, "tag bind refused");
        Err(PipelineError::Conflict { tag, bound_to })
      }
      BindOutcome::IdentityNotFound => Err(PipelineError::NotFound(key)),
    }
  }
}
