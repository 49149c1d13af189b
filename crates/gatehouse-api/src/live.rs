//! `GET /ws/events`: live push of newly recorded attendance events.
//!
//! Each connection holds one notifier subscription until the client closes
//! the socket, a send fails, or the notifier evicts it.

use axum::{
  extract::{
    State,
    ws::{Message, WebSocket, WebSocketUpgrade},
  },
  response::Response,
};
use chrono::{DateTime, Utc};
use gatehouse_core::{
  event::{AttendanceEvent, EventId, EventKind},
  identity::IdentityKey,
  store::AttendanceStore,
};
use gatehouse_pipeline::{Notifier, Pipeline};
use serde::Serialize;

/// Wire shape of one pushed event.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "attendance_event")]
pub struct LiveEvent<'a> {
  pub event_id:     &'a EventId,
  pub identity_key: &'a IdentityKey,
  pub kind:         EventKind,
  pub ts:           DateTime<Utc>,
  pub device_id:    &'a str,
}

impl<'a> From<&'a AttendanceEvent> for LiveEvent<'a> {
  fn from(event: &'a AttendanceEvent) -> Self {
    Self {
      event_id:     &event.event_id,
      identity_key: &event.identity_key,
      kind:         event.kind,
      ts:           event.ts,
      device_id:    &event.device_id,
    }
  }
}

/// `GET /ws/events`
pub async fn events<S>(
  State(pipeline): State<Pipeline<S>>,
  upgrade: WebSocketUpgrade,
) -> Response
where
  S: AttendanceStore + 'static,
{
  let notifier = pipeline.notifier().clone();
  upgrade.on_upgrade(move |socket| stream(socket, notifier))
}

async fn stream(mut socket: WebSocket, notifier: Notifier) {
  let mut subscription = notifier.subscribe();
  let id = subscription.id();
  tracing::info!(subscriber = %id, "live observer connected");

  loop {
    tokio::select! {
      next = subscription.recv() => {
        let Some(event) = next else { break };
        let frame = match serde_json::to_string(&LiveEvent::from(&event)) {
          Ok(frame) => frame,
          Err(e) => {
            tracing::error!(error = %e, "failed to encode live event");
            continue;
          }
        };
        if socket.send(Message::Text(frame.into())).await.is_err() {
          break;
        }
      }
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Close(_)) | Err(_)) | None => break,
        Some(Ok(_)) => {}
      },
    }
  }

  notifier.unsubscribe(id);
  tracing::info!(subscriber = %id, "live observer disconnected");
}
