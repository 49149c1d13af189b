//! Unassigned-tag ledger operations.

use gatehouse_core::{
  store::{AttendanceStore, SightingOutcome, clamp_limit},
  tag::{Sighting, UnassignedTag},
};

use crate::{Pipeline, PipelineError, PipelineResult};

impl<S: AttendanceStore> Pipeline<S> {
  /// Count a sighting of a tag that resolved to no identity.
  ///
  /// Most callers want [`Pipeline::resolve`], which only lands here after a
  /// failed lookup.
  pub async fn record_sighting(
    &self,
    sighting: Sighting,
  ) -> PipelineResult<SightingOutcome, S> {
    self.store.record_sighting(sighting).await.map_err(PipelineError::Store)
  }

  /// Most recently seen first.
  pub async fn list_unassigned(
    &self,
    limit: Option<usize>,
  ) -> PipelineResult<Vec<UnassignedTag>, S> {
    self
      .store
      .list_unassigned(clamp_limit(limit))
      .await
      .map_err(PipelineError::Store)
  }
}
