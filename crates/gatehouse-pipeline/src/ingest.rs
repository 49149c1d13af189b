//! Event ingestion: idempotent append, then fanout.
//!
//! Appends and their publishes happen under one pipeline-wide lock, so every
//! subscriber receives events in the order the log accepted them and the last
//! event an observer saw for an identity matches its stored presence.

use chrono::{DateTime, Utc};
use gatehouse_core::{
  event::{AttendanceEvent, EventId, NewAttendanceEvent, NextAttendanceEvent},
  identity::{Identity, IdentityKey},
  store::{AppendOutcome, AttendanceStore},
  tag::{RawEvent, Sighting, TagCredential, UnassignedTag},
};

use crate::{Pipeline, PipelineError, PipelineResult, resolver::Resolution};

/// Result of [`Pipeline::ingest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
  /// `false` when the event id had already been recorded; `event` is then the
  /// first recording and no notification was sent.
  pub recorded: bool,
  pub event:    AttendanceEvent,
}

/// A scan to be resolved and recorded in one step.
#[derive(Debug, Clone)]
pub struct Tap {
  pub event_id:  EventId,
  pub tag:       TagCredential,
  pub device_id: String,
  pub ts:        DateTime<Utc>,
}

/// Result of [`Pipeline::record_tap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapOutcome {
  Ingested {
    identity: Identity,
    outcome:  IngestOutcome,
  },
  Unassigned(UnassignedTag),
}

impl<S: AttendanceStore> Pipeline<S> {
  /// Record an event exactly once and notify observers of new events.
  ///
  /// The kind is taken as given. Replays return the stored event with
  /// `recorded: false`; an unregistered identity is
  /// [`PipelineError::NotFound`].
  pub async fn ingest(
    &self,
    input: NewAttendanceEvent,
  ) -> PipelineResult<IngestOutcome, S> {
    let key = input.identity_key.clone();
    let _order = self.append_lock.lock().await;
    let outcome =
      self.store.append_event(input).await.map_err(PipelineError::Store)?;
    self.settle(key, outcome)
  }

  /// Resolve a tap and, if the tag is bound, record the identity's next
  /// transition. The store picks the kind in the same transaction as the
  /// append, so concurrent taps for one identity still alternate. Unbound
  /// taps are quarantined with the tap itself as the raw payload.
  pub async fn record_tap(&self, tap: Tap) -> PipelineResult<TapOutcome, S> {
    let raw_event = RawEvent::from_json(&serde_json::json!({
      "event_id": tap.event_id,
      "device_id": tap.device_id,
      "ts": tap.ts,
    }));
    let scan = Sighting {
      tag:       tap.tag,
      device_id: tap.device_id.clone(),
      raw_event: Some(raw_event),
      seen_at:   tap.ts,
    };

    let identity = match self.resolve(scan).await? {
      Resolution::Identity { identity, .. } => identity,
      Resolution::Unassigned(entry) => return Ok(TapOutcome::Unassigned(entry)),
    };

    let input = NextAttendanceEvent {
      event_id:     tap.event_id,
      identity_key: identity.key.clone(),
      ts:           tap.ts,
      device_id:    tap.device_id,
    };
    let _order = self.append_lock.lock().await;
    let outcome = self
      .store
      .append_next_event(input)
      .await
      .map_err(PipelineError::Store)?;
    let outcome = self.settle(identity.key.clone(), outcome)?;
    Ok(TapOutcome::Ingested { identity, outcome })
  }

  /// Publish a fresh append and map the store outcome. Called with the
  /// append lock held.
  fn settle(
    &self,
    key: IdentityKey,
    outcome: AppendOutcome,
  ) -> PipelineResult<IngestOutcome, S> {
    match outcome {
      AppendOutcome::Recorded(event) => {
        tracing::info!(
          event_id = %event.event_id,
          identity = %event.identity_key,
          kind = %event.kind,
          device = %event.device_id,
          "attendance recorded"
        );
        let delivered = self.notifier.publish(&event);
        tracing::debug!(event_id = %event.event_id, delivered, "event published");
        Ok(IngestOutcome { recorded: true, event })
      }
      AppendOutcome::Duplicate(event) => {
        tracing::debug!(event_id = %event.event_id, "replayed event ignored");
        Ok(IngestOutcome { recorded: false, event })
      }
      AppendOutcome::IdentityNotFound => Err(PipelineError::NotFound(key)),
    }
  }
}
