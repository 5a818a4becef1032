//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, TimeZone, Utc};
use portaria_core::{
  event::{Direction, NewEvent, VisitContext},
  gate::Gate,
  role::{Principal, Role},
  store::{AccessStore, Appended, Change, DeletePolicy, EventQuery},
  subject::{
    EmployeeProfile, NewSubject, Profile, SubjectKey, SubjectKind, VisitorProfile,
  },
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn employee(name: &str) -> NewSubject {
  NewSubject {
    profile: Profile::Employee(EmployeeProfile {
      name:      name.into(),
      sector:    "TI".into(),
      extension: Some("2010".into()),
    }),
  }
}

fn visitor(document: &str) -> NewSubject {
  NewSubject {
    profile: Profile::Visitor(VisitorProfile {
      name:     "Maria".into(),
      document: document.into(),
      company:  None,
    }),
  }
}

fn event(key: &SubjectKey, direction: Direction, minute: i64) -> NewEvent {
  NewEvent {
    subject_key:  key.clone(),
    kind:         SubjectKind::Employee,
    direction,
    recorded_at:  Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()
      + Duration::minutes(minute),
    visit_id:     None,
    display_name: "Ana".into(),
    context:      VisitContext::default(),
  }
}

async fn append(s: &SqliteStore, e: NewEvent) -> portaria_core::event::VisitEvent {
  let latest = s.latest_event(e.subject_key.clone()).await.unwrap();
  match s
    .append_if_latest(e, latest.map(|l| l.event_id))
    .await
    .unwrap()
  {
    Appended::Recorded(event) => event,
    Appended::Stale { .. } => panic!("unexpected stale append"),
  }
}

// ─── Subjects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_subject() {
  let s = store().await;

  let subject = s.add_subject(employee("Ana")).await.unwrap();
  assert_eq!(subject.kind, SubjectKind::Employee);
  assert_eq!(subject.key.as_str(), "Ana (TI)");

  let by_id = s.get_subject(subject.subject_id).await.unwrap();
  assert_eq!(by_id.as_ref(), Some(&subject));

  let by_key = s.get_subject_by_key(subject.key.clone()).await.unwrap();
  assert_eq!(by_key, Some(subject));
}

#[tokio::test]
async fn get_subject_missing_returns_none() {
  let s = store().await;
  assert!(s.get_subject(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_key_is_rejected() {
  let s = store().await;
  s.add_subject(employee("Ana")).await.unwrap();
  let err = s.add_subject(employee("Ana")).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateSubject(_)));
}

#[tokio::test]
async fn list_subjects_filters_kind_and_inactive() {
  let s = store().await;
  let ana = s.add_subject(employee("Ana")).await.unwrap();
  s.add_subject(employee("Bruno")).await.unwrap();
  s.add_subject(visitor("123")).await.unwrap();

  let mut disabled = ana.clone();
  disabled.active = false;
  s.update_subject(disabled).await.unwrap();

  let employees = s
    .list_subjects(Some(SubjectKind::Employee), false)
    .await
    .unwrap();
  assert_eq!(employees.len(), 1);
  assert_eq!(employees[0].key.as_str(), "Bruno (TI)");

  let everyone = s.list_subjects(None, true).await.unwrap();
  assert_eq!(everyone.len(), 3);
}

#[tokio::test]
async fn update_missing_subject_fails() {
  let s = store().await;
  let mut ghost = s.add_subject(employee("Ana")).await.unwrap();
  ghost.subject_id = Uuid::new_v4();
  let err = s.update_subject(ghost).await.unwrap_err();
  assert!(matches!(err, Error::SubjectNotFound(_)));
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn latest_event_orders_by_time_then_id() {
  let s = store().await;
  let key = SubjectKey::employee("Ana", "TI");
  append(&s, event(&key, Direction::Entry, 0)).await;
  let exit = append(&s, event(&key, Direction::Exit, 10)).await;

  let latest = s.latest_event(key.clone()).await.unwrap().unwrap();
  assert_eq!(latest, exit);

  let history = s.list_events(EventQuery::for_subject(key)).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].direction, Direction::Entry);
}

#[tokio::test]
async fn stale_append_writes_nothing() {
  let s = store().await;
  let key = SubjectKey::employee("Ana", "TI");
  let first = append(&s, event(&key, Direction::Entry, 0)).await;

  let outcome = s
    .append_if_latest(event(&key, Direction::Entry, 1), None)
    .await
    .unwrap();
  assert!(matches!(
    outcome,
    Appended::Stale { latest: Some(ref e) } if e.event_id == first.event_id
  ));
  let all = s.list_events(EventQuery::default()).await.unwrap();
  assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn event_query_filters_and_limits() {
  let s = store().await;
  let ana = SubjectKey::employee("Ana", "TI");
  let bruno = SubjectKey::employee("Bruno", "TI");
  append(&s, event(&ana, Direction::Entry, 0)).await;
  append(&s, event(&bruno, Direction::Entry, 1)).await;
  append(&s, event(&ana, Direction::Exit, 2)).await;

  let entries = s
    .list_events(EventQuery { direction: Some(Direction::Entry), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(entries.len(), 2);

  let newest = s
    .list_events(EventQuery { limit: Some(1), newest_first: true, ..Default::default() })
    .await
    .unwrap();
  assert_eq!(newest.len(), 1);
  assert_eq!(newest[0].subject_key, ana);
  assert_eq!(newest[0].direction, Direction::Exit);

  let window = s
    .list_events(EventQuery {
      since: Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 1, 0).unwrap()),
      until: Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 2, 0).unwrap()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(window.len(), 1);
  assert_eq!(window[0].subject_key, bruno);
}

#[tokio::test]
async fn delete_events_for_keys_in_one_batch() {
  let s = store().await;
  let ana = SubjectKey::employee("Ana", "TI");
  let bruno = SubjectKey::employee("Bruno", "TI");
  append(&s, event(&ana, Direction::Entry, 0)).await;
  append(&s, event(&ana, Direction::Exit, 1)).await;
  let kept = append(&s, event(&bruno, Direction::Entry, 2)).await;

  let removed = s.delete_events_for(vec![ana]).await.unwrap();
  assert_eq!(removed, 2);
  let left = s.list_events(EventQuery::default()).await.unwrap();
  assert_eq!(left, vec![kept.clone()]);

  assert_eq!(s.delete_events(vec![kept.event_id, Uuid::new_v4()]).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_policy_controls_history() {
  let s = store().await;
  let ana = s.add_subject(employee("Ana")).await.unwrap();
  append(&s, event(&ana.key, Direction::Entry, 0)).await;

  s.delete_subjects(vec![ana.subject_id], DeletePolicy::KeepHistory)
    .await
    .unwrap();
  assert_eq!(s.list_events(EventQuery::default()).await.unwrap().len(), 1);

  let ana = s.add_subject(employee("Ana")).await.unwrap();
  let removed = s
    .delete_subjects(vec![ana.subject_id], DeletePolicy::Cascade)
    .await
    .unwrap();
  assert_eq!(removed, 1);
  assert!(s.list_events(EventQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn import_skips_existing_rows() {
  let source = store().await;
  let ana = source.add_subject(employee("Ana")).await.unwrap();
  append(&source, event(&ana.key, Direction::Entry, 0)).await;
  let subjects = source.list_subjects(None, true).await.unwrap();
  let events = source.list_events(EventQuery::default()).await.unwrap();

  let target = store().await;
  let first = target.import(subjects.clone(), events.clone()).await.unwrap();
  assert_eq!((first.subjects, first.events), (1, 1));
  let again = target.import(subjects, events.clone()).await.unwrap();
  assert_eq!((again.subjects, again.events), (0, 0));
  assert_eq!(target.list_events(EventQuery::default()).await.unwrap(), events);
}

#[tokio::test]
async fn subscribers_see_committed_writes() {
  let s = store().await;
  let mut feed = s.subscribe();
  let ana = s.add_subject(employee("Ana")).await.unwrap();
  append(&s, event(&ana.key, Direction::Entry, 0)).await;

  assert!(matches!(feed.recv().await.unwrap(), Change::SubjectAdded { .. }));
  assert!(matches!(feed.recv().await.unwrap(), Change::EventAppended { .. }));
}

// ─── Through the gate ────────────────────────────────────────────────────────

#[tokio::test]
async fn gate_round_trip_over_sqlite() {
  let gate = Gate::new(std::sync::Arc::new(store().await));
  let adm = Principal::new("root", Role::Adm);

  let ana = gate.register_subject(&adm, employee("Ana")).await.unwrap();
  let entry = gate.toggle(&adm, &ana.key, VisitContext::default()).await.unwrap();
  let exit = gate.toggle(&adm, &ana.key, VisitContext::default()).await.unwrap();
  assert_eq!(entry.direction, Direction::Entry);
  assert_eq!(exit.direction, Direction::Exit);
  assert_eq!(exit.visit_id, entry.visit_id);

  let history = gate.history(&adm, &ana.key).await.unwrap();
  assert_eq!(history, vec![entry, exit]);
}
