//! Tag resolution: scanned credential to identity, or quarantine.

use gatehouse_core::{
  event::EventKind,
  identity::Identity,
  store::{AttendanceStore, SightingOutcome},
  tag::{Sighting, UnassignedTag},
};

use crate::{Pipeline, PipelineError, PipelineResult};

/// What a scanned tag resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  /// The tag is bound. `next_kind` is the transition a device should record.
  Identity {
    identity:  Identity,
    next_kind: EventKind,
  },
  /// The tag is unbound and has been counted in the ledger.
  Unassigned(UnassignedTag),
}

impl<S: AttendanceStore> Pipeline<S> {
  /// Resolve a scan. A miss is not an error: the tag is quarantined and
  /// [`Resolution::Unassigned`] is returned with the updated ledger entry.
  pub async fn resolve(&self, scan: Sighting) -> PipelineResult<Resolution, S> {
    if let Some(identity) = self.lookup_by_tag(scan.tag.clone()).await? {
      return self.resolved(identity).await;
    }

    let tag = scan.tag.clone();
    let device = scan.device_id.clone();
    let outcome = self
      .store
      .record_sighting(scan)
      .await
      .map_err(PipelineError::Store)?;

    match outcome {
      SightingOutcome::Quarantined(entry) => {
        tracing::warn!(
          %tag,
          device = %device,
          seen_count = entry.seen_count,
          "unassigned tag scanned"
        );
        Ok(Resolution::Unassigned(entry))
      }
      // Bound between the lookup and the sighting.
      SightingOutcome::AlreadyBound(identity) => self.resolved(identity).await,
    }
  }

  async fn resolved(&self, identity: Identity) -> PipelineResult<Resolution, S> {
    let next_kind = self.next_expected_kind(identity.key.clone()).await?;
    tracing::debug!(identity = %identity.key, next = %next_kind, "tag resolved");
    Ok(Resolution::Identity { identity, next_kind })
  }
}
