//! The identity-resolution, presence and fanout pipeline.
//!
//! [`Pipeline`] ties a store to a [`Notifier`]. Its operations are split by
//! concern across this crate's modules:
//!
//! | Module | Operations |
//! |--------|------------|
//! | [`registry`] | upsert, lookup by tag, bind tag |
//! | [`ledger`] | record sighting, list unassigned tags |
//! | [`presence`] | current kind, next expected kind |
//! | [`resolver`] | resolve a scanned tag |
//! | [`ingest`] | record an event and fan it out; record a tap |
//!
//! Transport and authentication are the caller's responsibility.

pub mod error;
pub mod ingest;
pub mod ledger;
pub mod notifier;
pub mod presence;
pub mod registry;
pub mod resolver;
pub mod timestamp;

use std::sync::Arc;

use gatehouse_core::store::AttendanceStore;
use tokio::sync::Mutex;

pub use error::PipelineError;
pub use notifier::{Notifier, SubscriberId, Subscription};

/// Result of a pipeline operation over store `S`.
pub type PipelineResult<T, S> =
  Result<T, PipelineError<<S as AttendanceStore>::Error>>;

/// Shared handle to the store and the live fanout bus.
///
/// Cloning is cheap; clones share the store, the subscriber set and the
/// append lock.
pub struct Pipeline<S> {
  store:       Arc<S>,
  notifier:    Notifier,
  /// Held from append to publish, so observers see events in log order.
  append_lock: Arc<Mutex<()>>,
}

impl<S> Clone for Pipeline<S> {
  fn clone(&self) -> Self {
    Self {
      store:       Arc::clone(&self.store),
      notifier:    self.notifier.clone(),
      append_lock: Arc::clone(&self.append_lock),
    }
  }
}

impl<S: AttendanceStore> Pipeline<S> {
  pub fn new(store: Arc<S>, notifier: Notifier) -> Self {
    Self { store, notifier, append_lock: Arc::default() }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn notifier(&self) -> &Notifier { &self.notifier }
}
