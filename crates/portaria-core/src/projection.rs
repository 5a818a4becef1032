//! Read models derived from the event log: the "current list" shown at the
//! gate, and visit records pairing each entry with its exit.
//!
//! Both are pure folds over an internally sorted copy of the input, so the
//! result does not depend on the order events arrived in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  event::{Direction, VisitContext, VisitEvent},
  subject::{SubjectKey, SubjectKind},
};

// ─── Current list ────────────────────────────────────────────────────────────

/// One row of the current list: a subject and its latest event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentEntry {
  /// Subject key, or the event id for legacy rows without one.
  pub key:    String,
  pub inside: bool,
  pub latest: VisitEvent,
}

/// Last-write-wins per subject over the event stream.
///
/// Rows are ordered for display: subjects inside first, then most recent
/// activity first.
pub fn current_view(events: &[VisitEvent]) -> Vec<CurrentEntry> {
  let mut sorted: Vec<&VisitEvent> = events.iter().collect();
  sorted.sort_by_key(|e| e.ordering());

  let mut latest: HashMap<String, &VisitEvent> = HashMap::new();
  for event in sorted {
    latest.insert(event.fold_key(), event);
  }

  let mut rows: Vec<CurrentEntry> = latest
    .into_iter()
    .map(|(key, event)| CurrentEntry {
      key,
      inside: event.direction == Direction::Entry,
      latest: event.clone(),
    })
    .collect();
  rows.sort_by(|a, b| {
    b.inside
      .cmp(&a.inside)
      .then_with(|| b.latest.ordering().cmp(&a.latest.ordering()))
  });
  rows
}

// ─── Visits ──────────────────────────────────────────────────────────────────

/// Whether a visit is still open. Serialised with the labels the gate shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum VisitState {
  #[serde(rename = "inside")]
  Open,
  #[serde(rename = "exited")]
  Closed {
    exit_time:     DateTime<Utc>,
    exit_event_id: Uuid,
  },
}

impl VisitState {
  pub fn is_open(&self) -> bool { matches!(self, Self::Open) }

  pub fn exit_time(&self) -> Option<DateTime<Utc>> {
    match self {
      Self::Open => None,
      Self::Closed { exit_time, .. } => Some(*exit_time),
    }
  }
}

/// An entry paired with its exit, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
  pub visit_id:     Uuid,
  pub subject_key:  SubjectKey,
  pub kind:         SubjectKind,
  pub display_name: String,
  pub entry_time:   DateTime<Utc>,
  pub context:      VisitContext,
  #[serde(flatten)]
  pub state:        VisitState,
}

/// Pair entries with exits through `visit_id`, oldest visit first.
///
/// An exit whose entry is missing (deleted, or recorded before visit ids
/// existed) is skipped, as is a second exit for an already closed visit.
pub fn visits(events: &[VisitEvent]) -> Vec<VisitRecord> {
  let mut sorted: Vec<&VisitEvent> = events.iter().collect();
  sorted.sort_by_key(|e| e.ordering());

  let mut records: Vec<VisitRecord> = Vec::new();
  let mut open: HashMap<Uuid, usize> = HashMap::new();

  for event in sorted {
    match event.direction {
      Direction::Entry => {
        open.insert(event.visit_id, records.len());
        records.push(VisitRecord {
          visit_id:     event.visit_id,
          subject_key:  event.subject_key.clone(),
          kind:         event.kind,
          display_name: event.display_name.clone(),
          entry_time:   event.recorded_at,
          context:      event.context.clone(),
          state:        VisitState::Open,
        });
      }
      Direction::Exit => {
        if let Some(at) = open.remove(&event.visit_id) {
          records[at].state = VisitState::Closed {
            exit_time:     event.recorded_at,
            exit_event_id: event.event_id,
          };
        }
      }
    }
  }
  records
}

/// The latest visit per subject, open visits first, then most recent entry
/// first.
pub fn current_visits(events: &[VisitEvent]) -> Vec<VisitRecord> {
  let mut latest: HashMap<SubjectKey, VisitRecord> = HashMap::new();
  for record in visits(events) {
    latest.insert(record.subject_key.clone(), record);
  }

  let mut rows: Vec<VisitRecord> = latest.into_values().collect();
  rows.sort_by(|a, b| {
    b.state
      .is_open()
      .cmp(&a.state.is_open())
      .then_with(|| b.entry_time.cmp(&a.entry_time))
      .then_with(|| b.visit_id.cmp(&a.visit_id))
  });
  rows
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;
  use crate::event::NewEvent;

  fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap() + Duration::minutes(minutes)
  }

  fn entry(key: &SubjectKey, minutes: i64) -> VisitEvent {
    VisitEvent::from_new(NewEvent {
      subject_key:  key.clone(),
      kind:         SubjectKind::Visitor,
      direction:    Direction::Entry,
      recorded_at:  at(minutes),
      visit_id:     None,
      display_name: key.to_string(),
      context:      VisitContext::default(),
    })
  }

  fn exit(of: &VisitEvent, minutes: i64) -> VisitEvent {
    VisitEvent::from_new(NewEvent {
      subject_key:  of.subject_key.clone(),
      kind:         of.kind,
      direction:    Direction::Exit,
      recorded_at:  at(minutes),
      visit_id:     Some(of.visit_id),
      display_name: of.display_name.clone(),
      context:      of.context.clone(),
    })
  }

  fn sample() -> Vec<VisitEvent> {
    let maria = SubjectKey::visitor("123");
    let joao = SubjectKey::visitor("456");
    let first = entry(&maria, 0);
    let first_exit = exit(&first, 30);
    let second = entry(&maria, 60);
    let joao_in = entry(&joao, 10);
    let joao_out = exit(&joao_in, 20);
    vec![first, first_exit, second, joao_in, joao_out]
  }

  #[test]
  fn one_row_per_subject_inside_first() {
    let rows = current_view(&sample());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key, "person_123");
    assert!(rows[0].inside);
    assert_eq!(rows[0].latest.recorded_at, at(60));
    assert!(!rows[1].inside);
  }

  #[test]
  fn current_view_ignores_input_order() {
    let events = sample();
    let expected = current_view(&events);

    let mut reversed = events.clone();
    reversed.reverse();
    assert_eq!(current_view(&reversed), expected);

    let mut rotated = events;
    rotated.rotate_left(2);
    assert_eq!(current_view(&rotated), expected);
  }

  #[test]
  fn legacy_rows_without_key_stay_separate() {
    let blank = SubjectKey::from_raw("");
    let events = vec![entry(&blank, 0), entry(&blank, 5)];
    assert_eq!(current_view(&events).len(), 2);
  }

  #[test]
  fn visits_pair_entries_with_exits() {
    let records = visits(&sample());
    assert_eq!(records.len(), 3);

    let maria: Vec<_> = records
      .iter()
      .filter(|r| r.subject_key.as_str() == "person_123")
      .collect();
    assert_eq!(maria.len(), 2);
    assert_eq!(maria[0].state.exit_time(), Some(at(30)));
    assert!(maria[1].state.is_open());
    assert_ne!(maria[0].visit_id, maria[1].visit_id);
  }

  #[test]
  fn orphan_exit_is_skipped() {
    let key = SubjectKey::visitor("789");
    let lost_entry = entry(&key, 0);
    let events = vec![exit(&lost_entry, 5)];
    assert!(visits(&events).is_empty());
  }

  #[test]
  fn current_visits_keeps_latest_visit() {
    let rows = current_visits(&sample());
    assert_eq!(rows.len(), 2);
    assert!(rows[0].state.is_open());
    assert_eq!(rows[0].entry_time, at(60));
    assert!(!rows[1].state.is_open());
  }

  #[test]
  fn visit_state_serialises_with_gate_labels() {
    let json = serde_json::to_value(VisitState::Open).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "inside" }));
  }
}
