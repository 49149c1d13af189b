//! Router tests driven with `tower::ServiceExt::oneshot`, plus one live
//! socket test against a real listener.

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  body::Body,
  http::{Method, Request, StatusCode, header},
  response::Response,
  routing::get,
};
use futures_util::StreamExt as _;
use gatehouse_core::{
  event::{AttendanceEvent, EventId, EventKind, NewAttendanceEvent},
  identity::{IdentityKey, NewIdentity},
};
use gatehouse_pipeline::{Notifier, Pipeline};
use gatehouse_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tower::ServiceExt as _;

use crate::{
  AuthenticatedDevice, admin_router, device_router, health, live::LiveEvent,
  live_router,
};

async fn pipeline() -> Pipeline<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  Pipeline::new(Arc::new(store), Notifier::default())
}

fn app(pipeline: Pipeline<SqliteStore>) -> Router {
  Router::new()
    .nest("/api/device", device_router(pipeline.clone()))
    .nest("/api/admin", admin_router(pipeline))
    .route("/health", get(health))
}

async fn send(
  app: &Router,
  method: Method,
  uri: &str,
  body: Option<Value>,
  device: Option<&str>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  if body.is_some() {
    builder = builder.header(header::CONTENT_TYPE, "application/json");
  }
  let payload = body.map(|b| b.to_string()).unwrap_or_default();
  let mut req = builder.body(Body::from(payload)).unwrap();
  if let Some(id) = device {
    req.extensions_mut().insert(AuthenticatedDevice(id.to_string()));
  }
  let resp: Response = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
  (status, value)
}

async fn enrol(app: &Router, key: &str, tag: &str) {
  let (status, _) = send(
    app,
    Method::POST,
    "/api/admin/identities",
    Some(json!({ "key": key, "name": format!("Student {key}"), "group": "CSE" })),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = send(
    app,
    Method::PUT,
    &format!("/api/admin/identities/{key}/tag"),
    Some(json!({ "tag": tag })),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
}

// ── Health ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_healthy() {
  let app = app(pipeline().await);
  let (status, body) = send(&app, Method::GET, "/health", None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "status": "healthy" }));
}

// ── Scans ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scan_of_bound_tag_returns_identity_and_next_kind() {
  let app = app(pipeline().await);
  enrol(&app, "S1", "AB12CD").await;

  let (status, body) = send(
    &app,
    Method::POST,
    "/api/device/scans",
    Some(json!({ "tag": " ab12cd ", "device_id": "D1" })),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "resolved");
  assert_eq!(body["identity"]["key"], "S1");
  assert_eq!(body["next_kind"], "entry");
}

#[tokio::test]
async fn scan_of_unbound_tag_is_accepted_and_listed() {
  let app = app(pipeline().await);

  for _ in 0..2 {
    let (status, body) = send(
      &app,
      Method::POST,
      "/api/device/scans",
      Some(json!({ "tag": "FEED", "raw_event": { "rssi": -40 } })),
      Some("GATE-1"),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "unassigned");
  }

  let (status, body) =
    send(&app, Method::GET, "/api/admin/tags/unassigned?limit=5", None, None)
      .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body[0]["tag"], "FEED");
  assert_eq!(body[0]["seen_count"], 2);
  assert_eq!(body[0]["last_device"], "GATE-1");
  assert_eq!(body[0]["last_event"], json!({ "rssi": -40 }));
}

#[tokio::test]
async fn scan_without_any_device_id_is_rejected() {
  let app = app(pipeline().await);
  let (status, _) = send(
    &app,
    Method::POST,
    "/api/device/scans",
    Some(json!({ "tag": "FEED" })),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Events ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn event_is_created_once_and_replay_is_ok() {
  let app = app(pipeline().await);
  enrol(&app, "S1", "T1").await;
  let event = json!({
    "event_id": "6c1b7a52",
    "identity_key": "S1",
    "kind": "entry",
    "ts": "2024-09-02T08:00:00Z",
    "device_id": "claimed",
  });

  let (status, body) = send(
    &app,
    Method::POST,
    "/api/device/events",
    Some(event.clone()),
    Some("GATE-1"),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["recorded"], true);
  assert_eq!(body["event"]["device_id"], "GATE-1");

  let (status, body) =
    send(&app, Method::POST, "/api/device/events", Some(event), Some("GATE-1"))
      .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["recorded"], false);

  let (_, presence) =
    send(&app, Method::GET, "/api/admin/identities/S1/presence", None, None)
      .await;
  assert_eq!(presence["current"], "entry");
  assert_eq!(presence["next"], "exit");
}

#[tokio::test]
async fn event_errors_map_to_status_codes() {
  let app = app(pipeline().await);

  let (status, _) = send(
    &app,
    Method::POST,
    "/api/device/events",
    Some(json!({ "event_id": "e1", "identity_key": "GHOST", "kind": "entry" })),
    Some("GATE-1"),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) = send(
    &app,
    Method::POST,
    "/api/device/events",
    Some(json!({ "event_id": "e1", "identity_key": "S1", "kind": "sideways" })),
    Some("GATE-1"),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Taps ───────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn taps_alternate_and_unbound_taps_are_quarantined() {
  let app = app(pipeline().await);
  enrol(&app, "S1", "T1").await;

  let mut kinds = Vec::new();
  for id in ["t1", "t2"] {
    let (status, body) = send(
      &app,
      Method::POST,
      "/api/device/taps",
      Some(json!({ "event_id": id, "tag": "t1" })),
      Some("GATE-1"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Student S1");
    kinds.push(body["event"]["kind"].clone());
  }
  assert_eq!(kinds, [json!("entry"), json!("exit")]);

  let (status, body) = send(
    &app,
    Method::POST,
    "/api/device/taps",
    Some(json!({ "event_id": "t3", "tag": "NOPE" })),
    Some("GATE-1"),
  )
  .await;
  assert_eq!(status, StatusCode::ACCEPTED);
  assert_eq!(body["status"], "unassigned");
}

// ── Admin ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn binding_a_held_tag_conflicts() {
  let app = app(pipeline().await);
  enrol(&app, "S1", "T1").await;
  send(
    &app,
    Method::POST,
    "/api/admin/identities",
    Some(json!({ "key": "S2", "name": "Other" })),
    None,
  )
  .await;

  let (status, body) = send(
    &app,
    Method::PUT,
    "/api/admin/identities/S2/tag",
    Some(json!({ "tag": "T1" })),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("S1"));
}

#[tokio::test]
async fn unknown_identity_is_404() {
  let app = app(pipeline().await);
  for uri in ["/api/admin/identities/NOPE", "/api/admin/identities/NOPE/presence"]
  {
    let (status, _) = send(&app, Method::GET, uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
  }
}

#[tokio::test]
async fn identities_can_be_searched() {
  let app = app(pipeline().await);
  enrol(&app, "S1", "T1").await;
  enrol(&app, "X9", "T2").await;

  let (status, body) = send(
    &app,
    Method::GET,
    "/api/admin/identities?search=s1&limit=10",
    None,
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let keys: Vec<&str> = body
    .as_array()
    .unwrap()
    .iter()
    .filter_map(|i| i["key"].as_str())
    .collect();
  assert_eq!(keys, ["S1"]);
}

#[tokio::test]
async fn attendance_history_filters_by_date() {
  let app = app(pipeline().await);
  enrol(&app, "S1", "T1").await;
  for (id, ts) in [("e1", "2024-09-02T08:00:00Z"), ("e2", "2024-09-03T08:00:00Z")]
  {
    send(
      &app,
      Method::POST,
      "/api/device/events",
      Some(json!({ "event_id": id, "identity_key": "S1", "kind": "entry", "ts": ts })),
      Some("GATE-1"),
    )
    .await;
  }

  let (status, body) = send(
    &app,
    Method::GET,
    "/api/admin/attendance?identity_key=S1&date=2024-09-03",
    None,
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let rows = body.as_array().unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0]["event_id"], "e2");
  assert_eq!(rows[0]["name"], "Student S1");
}

// ── Live ───────────────────────────────────────────────────────────────────────

#[test]
fn live_event_wire_shape() {
  let event = AttendanceEvent {
    event_id:     EventId::parse("e1").unwrap(),
    identity_key: IdentityKey::parse("S1").unwrap(),
    kind:         EventKind::Exit,
    ts:           "2024-09-02T16:00:00Z".parse().unwrap(),
    device_id:    "GATE-1".into(),
    recorded_at:  "2024-09-02T16:00:01Z".parse().unwrap(),
  };
  let value = serde_json::to_value(LiveEvent::from(&event)).unwrap();
  assert_eq!(
    value,
    json!({
      "type": "attendance_event",
      "event_id": "e1",
      "identity_key": "S1",
      "kind": "exit",
      "ts": "2024-09-02T16:00:00Z",
      "device_id": "GATE-1",
    })
  );
}

async fn wait_for_subscribers(pipeline: &Pipeline<SqliteStore>, expected: usize) {
  for _ in 0..200 {
    if pipeline.notifier().subscriber_count() == expected {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!(
    "expected {expected} subscribers, have {}",
    pipeline.notifier().subscriber_count()
  );
}

#[tokio::test]
async fn websocket_receives_ingested_events_and_unsubscribes_on_close() {
  let p = pipeline().await;
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let router = live_router(p.clone());
  tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

  let (mut ws, _) = connect_async(format!("ws://{addr}/ws/events"))
    .await
    .unwrap();
  wait_for_subscribers(&p, 1).await;

  p.upsert_identity(NewIdentity::new(IdentityKey::parse("S1").unwrap(), "Ada"))
    .await
    .unwrap();
  p.ingest(NewAttendanceEvent {
    event_id:     EventId::parse("e1").unwrap(),
    identity_key: IdentityKey::parse("S1").unwrap(),
    kind:         EventKind::Entry,
    ts:           "2024-09-02T08:00:00Z".parse().unwrap(),
    device_id:    "GATE-1".into(),
  })
  .await
  .unwrap();

  let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
    .await
    .expect("no frame within 5s")
    .unwrap()
    .unwrap();
  let value: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
  assert_eq!(value["type"], "attendance_event");
  assert_eq!(value["event_id"], "e1");
  assert_eq!(value["identity_key"], "S1");
  assert_eq!(value["kind"], "entry");

  ws.close(None).await.unwrap();
  wait_for_subscribers(&p, 0).await;
}
