//! Live fanout of newly recorded attendance events.
//!
//! Each subscriber owns a bounded queue. [`Notifier::publish`] never waits on
//! a subscriber: a queue that is closed or full gets its subscriber evicted,
//! and every other subscriber still receives the event. Delivery is
//! at-most-once and best-effort; the attendance log is the durable record.

use std::{
  collections::BTreeMap,
  fmt,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use gatehouse_core::event::AttendanceEvent;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Queue depth used when none is configured.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "sub-{}", self.0)
  }
}

/// The receiving half handed to an observer.
///
/// Dropping it is equivalent to disconnecting; the next publish evicts it.
#[derive(Debug)]
pub struct Subscription {
  id:       SubscriberId,
  receiver: mpsc::Receiver<AttendanceEvent>,
}

impl Subscription {
  pub fn id(&self) -> SubscriberId { self.id }

  /// Wait for the next event. `None` once the subscriber has been evicted.
  pub async fn recv(&mut self) -> Option<AttendanceEvent> {
    self.receiver.recv().await
  }

  pub fn try_recv(&mut self) -> Option<AttendanceEvent> {
    self.receiver.try_recv().ok()
  }
}

#[derive(Default)]
struct Registry {
  next_id: u64,
  senders: BTreeMap<SubscriberId, mpsc::Sender<AttendanceEvent>>,
}

/// Broadcast bus for recorded events. Clones share one subscriber set.
#[derive(Clone)]
pub struct Notifier {
  registry: Arc<Mutex<Registry>>,
  buffer:   usize,
}

impl Default for Notifier {
  fn default() -> Self { Self::new(DEFAULT_SUBSCRIBER_BUFFER) }
}

impl Notifier {
  /// `buffer` is the per-subscriber queue depth (at least one).
  pub fn new(buffer: usize) -> Self {
    Self { registry: Arc::default(), buffer: buffer.max(1) }
  }

  pub fn subscribe(&self) -> Subscription {
    let (sender, receiver) = mpsc::channel(self.buffer);
    let mut registry = self.lock();
    let id = SubscriberId(registry.next_id);
    registry.next_id += 1;
    registry.senders.insert(id, sender);
    tracing::debug!(subscriber = %id, "subscriber attached");
    Subscription { id, receiver }
  }

  /// Returns whether the subscriber was still registered.
  pub fn unsubscribe(&self, id: SubscriberId) -> bool {
    let removed = self.lock().senders.remove(&id).is_some();
    if removed {
      tracing::debug!(subscriber = %id, "subscriber detached");
    }
    removed
  }

  /// Offer `event` to every subscriber. Returns how many accepted it.
  pub fn publish(&self, event: &AttendanceEvent) -> usize {
    let mut registry = self.lock();
    let mut delivered = 0;
    registry.senders.retain(|id, sender| {
      match sender.try_send(event.clone()) {
        Ok(()) => {
          delivered += 1;
          true
        }
        Err(TrySendError::Full(_)) => {
          tracing::warn!(subscriber = %id, "subscriber queue full; evicting");
          false
        }
        Err(TrySendError::Closed(_)) => {
          tracing::debug!(subscriber = %id, "subscriber gone; evicting");
          false
        }
      }
    });
    delivered
  }

  pub fn subscriber_count(&self) -> usize { self.lock().senders.len() }

  // A panic while holding the lock cannot leave the map half-updated, so a
  // poisoned lock is still usable.
  fn lock(&self) -> MutexGuard<'_, Registry> {
    self.registry.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
