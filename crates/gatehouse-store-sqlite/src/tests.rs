//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Duration, NaiveDate, TimeZone as _, Utc};
use gatehouse_core::{
  event::{EventId, EventKind, NewAttendanceEvent, NextAttendanceEvent},
  identity::{IdentityKey, NewIdentity},
  store::{
    AppendOutcome, AttendanceStore, BindOutcome, EventQuery, IdentityQuery,
    SightingOutcome,
  },
  tag::{RawEvent, Sighting, TagCredential},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn key(s: &str) -> IdentityKey { IdentityKey::parse(s).unwrap() }

fn tag(s: &str) -> TagCredential { TagCredential::parse(s).unwrap() }

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}

fn sighting(t: &str, device: &str, seen_at: DateTime<Utc>) -> Sighting {
  Sighting {
    tag:       tag(t),
    device_id: device.into(),
    raw_event: Some(RawEvent::from_json(&serde_json::json!({ "device_id": device }))),
    seen_at,
  }
}

fn event(id: &str, who: &str, kind: EventKind, ts: DateTime<Utc>) -> NewAttendanceEvent {
  NewAttendanceEvent {
    event_id:     EventId::parse(id).unwrap(),
    identity_key: key(who),
    kind,
    ts,
    device_id:    "D1".into(),
  }
}

async fn with_identity(s: &SqliteStore, k: &str, name: &str) {
  s.upsert_identity(NewIdentity::new(key(k), name)).await.unwrap();
}

// ─── Identities ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_and_get_identity() {
  let s = store().await;

  let mut input = NewIdentity::new(key("S1"), "Ada Lovelace");
  input.group = Some("CSE".into());
  input.cohort = Some(2024);
  let created = s.upsert_identity(input).await.unwrap();
  assert_eq!(created.key, key("S1"));
  assert_eq!(created.group.as_deref(), Some("CSE"));
  assert!(created.tag.is_none());

  let fetched = s.get_identity(key("S1")).await.unwrap().unwrap();
  assert_eq!(fetched, created);
}

#[tokio::test]
async fn get_identity_missing_returns_none() {
  let s = store().await;
  assert!(s.get_identity(key("nobody")).await.unwrap().is_none());
}

#[tokio::test]
async fn re_upsert_overwrites_fields_but_keeps_tag_and_creation() {
  let s = store().await;
  let first = s.upsert_identity(NewIdentity::new(key("S1"), "Ada")).await.unwrap();
  s.bind_tag(key("S1"), tag("ab12cd")).await.unwrap();

  let mut again = NewIdentity::new(key("S1"), "Ada King");
  again.cohort = Some(1815);
  let updated = s.upsert_identity(again).await.unwrap();

  assert_eq!(updated.name, "Ada King");
  assert_eq!(updated.cohort, Some(1815));
  assert_eq!(updated.tag, Some(tag("AB12CD")));
  assert_eq!(updated.created_at, first.created_at);
}

#[tokio::test]
async fn list_identities_searches_key_and_name() {
  let s = store().await;
  with_identity(&s, "S1", "Ada Lovelace").await;
  with_identity(&s, "S2", "Alan Turing").await;
  with_identity(&s, "T9", "Grace Hopper").await;

  let all = s.list_identities(IdentityQuery::default()).await.unwrap();
  assert_eq!(all.len(), 3);

  let by_name = s
    .list_identities(IdentityQuery { search: Some("turing".into()), limit: None })
    .await
    .unwrap();
  assert_eq!(by_name.len(), 1);
  assert_eq!(by_name[0].key, key("S2"));

  let by_key = s
    .list_identities(IdentityQuery { search: Some("s".into()), limit: Some(1) })
    .await
    .unwrap();
  assert_eq!(by_key.len(), 1);
}

// ─── Tag binding ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn bind_then_lookup_by_tag() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;

  let outcome = s.bind_tag(key("S1"), tag("AB12CD")).await.unwrap();
  assert!(matches!(outcome, BindOutcome::Bound(ref i) if i.tag == Some(tag("AB12CD"))));

  let found = s.identity_by_tag(tag("ab12cd")).await.unwrap().unwrap();
  assert_eq!(found.key, key("S1"));
}

#[tokio::test]
async fn bind_to_other_identity_conflicts() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;
  with_identity(&s, "S2", "Alan").await;
  s.bind_tag(key("S1"), tag("AB12CD")).await.unwrap();

  let outcome = s.bind_tag(key("S2"), tag("AB12CD")).await.unwrap();
  assert_eq!(outcome, BindOutcome::Conflict { bound_to: key("S1") });

  let s2 = s.get_identity(key("S2")).await.unwrap().unwrap();
  assert!(s2.tag.is_none());
}

#[tokio::test]
async fn rebinding_same_identity_is_allowed() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;
  s.bind_tag(key("S1"), tag("AB12CD")).await.unwrap();

  let outcome = s.bind_tag(key("S1"), tag("AB12CD")).await.unwrap();
  assert!(matches!(outcome, BindOutcome::Bound(_)));
}

#[tokio::test]
async fn bind_unknown_identity() {
  let s = store().await;
  let outcome = s.bind_tag(key("ghost"), tag("AB12CD")).await.unwrap();
  assert_eq!(outcome, BindOutcome::IdentityNotFound);
}

#[tokio::test]
async fn bind_removes_ledger_entry() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;
  s.record_sighting(sighting("AB12CD", "D1", at(8, 0))).await.unwrap();
  assert_eq!(s.list_unassigned(10).await.unwrap().len(), 1);

  s.bind_tag(key("S1"), tag("AB12CD")).await.unwrap();
  assert!(s.list_unassigned(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_binds_exactly_one_wins() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;
  with_identity(&s, "S2", "Alan").await;
  s.record_sighting(sighting("AB12CD", "D1", at(8, 0))).await.unwrap();

  let (a, b) = tokio::join!(
    s.bind_tag(key("S1"), tag("AB12CD")),
    s.bind_tag(key("S2"), tag("AB12CD")),
  );
  let outcomes = [a.unwrap(), b.unwrap()];

  let bound = outcomes.iter().filter(|o| matches!(o, BindOutcome::Bound(_))).count();
  let conflicts = outcomes
    .iter()
    .filter(|o| matches!(o, BindOutcome::Conflict { .. }))
    .count();
  assert_eq!((bound, conflicts), (1, 1));
  assert!(s.list_unassigned(10).await.unwrap().is_empty());
}

// ─── Unassigned-tag ledger ───────────────────────────────────────────────────

#[tokio::test]
async fn sightings_accumulate() {
  let s = store().await;
  s.record_sighting(sighting("ab12cd", "D1", at(8, 0))).await.unwrap();
  s.record_sighting(sighting("AB12CD", "D2", at(8, 5))).await.unwrap();
  let outcome = s.record_sighting(sighting(" ab12cd ", "D1", at(8, 10))).await.unwrap();

  let SightingOutcome::Quarantined(entry) = outcome else {
    panic!("expected the sighting to be quarantined");
  };
  assert_eq!(entry.tag, tag("AB12CD"));
  assert_eq!(entry.seen_count, 3);
  assert_eq!(entry.last_device, "D1");
  assert_eq!(entry.first_seen, at(8, 0));
  assert_eq!(entry.last_seen, at(8, 10));
  assert_eq!(
    entry.last_event.and_then(|e| e.decode()),
    Some(serde_json::json!({ "device_id": "D1" }))
  );
}

#[tokio::test]
async fn sighting_of_bound_tag_is_refused() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;
  s.bind_tag(key("S1"), tag("AB12CD")).await.unwrap();

  let outcome = s.record_sighting(sighting("AB12CD", "D1", at(9, 0))).await.unwrap();
  assert!(matches!(outcome, SightingOutcome::AlreadyBound(ref i) if i.key == key("S1")));
  assert!(s.list_unassigned(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unassigned_listed_most_recent_first() {
  let s = store().await;
  s.record_sighting(sighting("AAAA", "D1", at(8, 0))).await.unwrap();
  s.record_sighting(sighting("BBBB", "D1", at(9, 0))).await.unwrap();
  s.record_sighting(sighting("CCCC", "D1", at(7, 0))).await.unwrap();

  let listed = s.list_unassigned(2).await.unwrap();
  let tags: Vec<_> = listed.iter().map(|u| u.tag.as_str()).collect();
  assert_eq!(tags, ["BBBB", "AAAA"]);
}

// ─── Attendance ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_updates_presence() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;
  assert_eq!(s.current_kind(key("S1")).await.unwrap(), None);

  let outcome = s
    .append_event(event("e1", "S1", EventKind::Entry, at(8, 0)))
    .await
    .unwrap();
  assert!(matches!(outcome, AppendOutcome::Recorded(ref e) if e.kind == EventKind::Entry));
  assert_eq!(s.current_kind(key("S1")).await.unwrap(), Some(EventKind::Entry));

  s.append_event(event("e2", "S1", EventKind::Exit, at(17, 0))).await.unwrap();
  assert_eq!(s.current_kind(key("S1")).await.unwrap(), Some(EventKind::Exit));
}

#[tokio::test]
async fn replayed_event_id_is_a_duplicate() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;

  let first = s
    .append_event(event("e1", "S1", EventKind::Entry, at(8, 0)))
    .await
    .unwrap();
  let AppendOutcome::Recorded(original) = first else {
    panic!("expected first append to record");
  };

  // Same id, different payload: the original stands.
  let again = s
    .append_event(event("e1", "S1", EventKind::Exit, at(9, 0)))
    .await
    .unwrap();
  assert_eq!(again, AppendOutcome::Duplicate(original));
  assert_eq!(s.current_kind(key("S1")).await.unwrap(), Some(EventKind::Entry));

  let history = s.list_events(EventQuery::default()).await.unwrap();
  assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn concurrent_duplicates_record_once() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;

  let (a, b) = tokio::join!(
    s.append_event(event("e1", "S1", EventKind::Entry, at(8, 0))),
    s.append_event(event("e1", "S1", EventKind::Entry, at(8, 0))),
  );
  let outcomes = [a.unwrap(), b.unwrap()];
  let recorded = outcomes
    .iter()
    .filter(|o| matches!(o, AppendOutcome::Recorded(_)))
    .count();
  let duplicates = outcomes
    .iter()
    .filter(|o| matches!(o, AppendOutcome::Duplicate(_)))
    .count();
  assert_eq!((recorded, duplicates), (1, 1));
}

fn next_event(id: &str, who: &str, ts: DateTime<Utc>) -> NextAttendanceEvent {
  NextAttendanceEvent {
    event_id:     EventId::parse(id).unwrap(),
    identity_key: key(who),
    ts,
    device_id:    "D1".into(),
  }
}

fn recorded_kind(outcome: AppendOutcome) -> EventKind {
  match outcome {
    AppendOutcome::Recorded(event) => event.kind,
    other => panic!("expected a recorded event, got {other:?}"),
  }
}

#[tokio::test]
async fn append_next_alternates_from_presence() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;

  let first = s.append_next_event(next_event("t1", "S1", at(8, 0))).await.unwrap();
  assert_eq!(recorded_kind(first), EventKind::Entry);

  // A caller-chosen kind in between is respected by the next pick.
  s.append_event(event("e2", "S1", EventKind::Entry, at(9, 0))).await.unwrap();
  let third = s.append_next_event(next_event("t3", "S1", at(10, 0))).await.unwrap();
  assert_eq!(recorded_kind(third), EventKind::Exit);

  let replay = s.append_next_event(next_event("t1", "S1", at(11, 0))).await.unwrap();
  assert!(matches!(
    replay,
    AppendOutcome::Duplicate(ev) if ev.kind == EventKind::Entry
  ));
  assert_eq!(s.current_kind(key("S1")).await.unwrap(), Some(EventKind::Exit));
}

#[tokio::test]
async fn append_next_for_unknown_identity() {
  let s = store().await;
  let outcome = s.append_next_event(next_event("t1", "GHOST", at(8, 0))).await.unwrap();
  assert_eq!(outcome, AppendOutcome::IdentityNotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_append_next_never_repeats_a_kind() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;

  for n in 0..25 {
    let (a, b) = tokio::join!(
      s.append_next_event(next_event(&format!("a{n}"), "S1", at(8, 0))),
      s.append_next_event(next_event(&format!("b{n}"), "S1", at(8, 0))),
    );
    let (a, b) = (recorded_kind(a.unwrap()), recorded_kind(b.unwrap()));
    assert_ne!(a, b, "pair {n} recorded the same kind twice");
  }
  assert_eq!(s.current_kind(key("S1")).await.unwrap(), Some(EventKind::Exit));
}

#[tokio::test]
async fn append_for_unknown_identity() {
  let s = store().await;
  let outcome = s
    .append_event(event("e1", "ghost", EventKind::Entry, at(8, 0)))
    .await
    .unwrap();
  assert_eq!(outcome, AppendOutcome::IdentityNotFound);
}

#[tokio::test]
async fn list_events_filters_and_orders() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;
  with_identity(&s, "S2", "Alan").await;

  s.append_event(event("e1", "S1", EventKind::Entry, at(8, 0))).await.unwrap();
  s.append_event(event("e2", "S2", EventKind::Entry, at(8, 30))).await.unwrap();
  s.append_event(event("e3", "S1", EventKind::Exit, at(17, 0))).await.unwrap();
  s.append_event(event("e4", "S1", EventKind::Entry, at(8, 0) + Duration::days(1)))
    .await
    .unwrap();

  let s1 = s
    .list_events(EventQuery { identity_key: Some(key("S1")), ..Default::default() })
    .await
    .unwrap();
  let ids: Vec<_> = s1.iter().map(|r| r.event.event_id.as_str()).collect();
  assert_eq!(ids, ["e4", "e3", "e1"]);
  assert!(s1.iter().all(|r| r.name.as_deref() == Some("Ada")));

  let on_day = s
    .list_events(EventQuery {
      date: NaiveDate::from_ymd_opt(2024, 3, 4),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(on_day.len(), 3);

  let limited = s
    .list_events(EventQuery { limit: Some(1), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(limited[0].event.event_id.as_str(), "e4");
}

#[tokio::test]
async fn rebuild_presence_matches_log() {
  let s = store().await;
  with_identity(&s, "S1", "Ada").await;
  with_identity(&s, "S2", "Alan").await;
  with_identity(&s, "S3", "Grace").await;

  s.append_event(event("e1", "S1", EventKind::Entry, at(8, 0))).await.unwrap();
  s.append_event(event("e2", "S1", EventKind::Exit, at(9, 0))).await.unwrap();
  s.append_event(event("e3", "S2", EventKind::Entry, at(9, 0))).await.unwrap();

  assert_eq!(s.rebuild_presence().await.unwrap(), 2);
  assert_eq!(s.current_kind(key("S1")).await.unwrap(), Some(EventKind::Exit));
  assert_eq!(s.current_kind(key("S2")).await.unwrap(), Some(EventKind::Entry));
  assert_eq!(s.current_kind(key("S3")).await.unwrap(), None);
}

// ─── Devices ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn device_tokens_resolve_and_rekey() {
  let s = store().await;
  s.register_device("gate-1".into(), "aa".repeat(32)).await.unwrap();
  assert_eq!(
    s.device_for_token("aa".repeat(32)).await.unwrap().as_deref(),
    Some("gate-1")
  );

  s.register_device("gate-1".into(), "bb".repeat(32)).await.unwrap();
  assert!(s.device_for_token("aa".repeat(32)).await.unwrap().is_none());
  assert!(s.device_for_token("bb".repeat(32)).await.unwrap().is_some());
}
