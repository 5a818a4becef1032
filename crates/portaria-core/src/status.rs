//! Status derivation: who is inside right now.
//!
//! Status is never stored. It is the direction of the latest event for a
//! subject, with "outside" as the answer when there is no event at all.
//! [`derive_status`] answers that for a slice in one pass; [`EventLog`] keeps
//! the answer current as events stream in, so a view does not rescan the
//! whole log for every subject on every change.

use std::{collections::HashMap, hash::Hash};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  event::{Direction, VisitEvent},
  subject::SubjectKey,
};

// ─── One-shot derivation ─────────────────────────────────────────────────────

/// The latest event recorded for `key`, by [`VisitEvent::ordering`].
pub fn latest_event<'a>(
  key: &SubjectKey,
  events: &'a [VisitEvent],
) -> Option<&'a VisitEvent> {
  events
    .iter()
    .filter(|e| &e.subject_key == key)
    .max_by_key(|e| e.ordering())
}

/// Current direction for `key`; [`Direction::Exit`] when it has no events.
pub fn derive_status(key: &SubjectKey, events: &[VisitEvent]) -> Direction {
  latest_event(key, events).map_or(Direction::Exit, |e| e.direction)
}

// ─── Incremental log ─────────────────────────────────────────────────────────

/// What [`EventLog`] needs to know about an event.
pub trait LogEvent: Clone {
  type Key: Eq + Hash + Clone;

  fn key(&self) -> &Self::Key;
  fn id(&self) -> Uuid;
  /// Sort stamp; must be a total order consistent across clients.
  fn stamp(&self) -> (DateTime<Utc>, Uuid);
  fn direction(&self) -> Direction;
}

impl LogEvent for VisitEvent {
  type Key = SubjectKey;

  fn key(&self) -> &SubjectKey { &self.subject_key }

  fn id(&self) -> Uuid { self.event_id }

  fn stamp(&self) -> (DateTime<Utc>, Uuid) { self.ordering() }

  fn direction(&self) -> Direction { self.direction }
}

/// An in-memory event log indexed by subject.
///
/// Each subject's history is kept sorted by stamp, so the latest event is
/// always the last element. Inserting an event id that is already present
/// is a no-op, which lets a local write and the change feed echo of the same
/// write arrive in either order without duplicating rows.
#[derive(Debug, Clone)]
pub struct EventLog<E: LogEvent> {
  by_key: HashMap<E::Key, Vec<E>>,
  index:  HashMap<Uuid, E::Key>,
}

impl<E: LogEvent> Default for EventLog<E> {
  fn default() -> Self {
    Self { by_key: HashMap::new(), index: HashMap::new() }
  }
}

impl<E: LogEvent> EventLog<E> {
  pub fn new() -> Self { Self::default() }

  pub fn from_events(events: impl IntoIterator<Item = E>) -> Self {
    let mut log = Self::new();
    log.extend(events);
    log
  }

  /// Insert one event. Returns `false` if its id was already present.
  pub fn insert(&mut self, event: E) -> bool {
    let id = event.id();
    if self.index.contains_key(&id) {
      return false;
    }
    self.index.insert(id, event.key().clone());

    let history = self.by_key.entry(event.key().clone()).or_default();
    let stamp = event.stamp();
    let at = history.partition_point(|e| e.stamp() <= stamp);
    history.insert(at, event);
    true
  }

  /// Insert many events; returns how many were new.
  pub fn extend(&mut self, events: impl IntoIterator<Item = E>) -> usize {
    events.into_iter().filter(|e| self.insert(e.clone())).count()
  }

  /// Remove one event by id, e.g. after a batch delete.
  pub fn remove(&mut self, id: Uuid) -> Option<E> {
    let key = self.index.remove(&id)?;
    let history = self.by_key.get_mut(&key)?;
    let at = history.iter().position(|e| e.id() == id)?;
    let removed = history.remove(at);
    if history.is_empty() {
      self.by_key.remove(&key);
    }
    Some(removed)
  }

  /// Drop a subject's whole history.
  pub fn remove_key(&mut self, key: &E::Key) -> Vec<E> {
    let removed = self.by_key.remove(key).unwrap_or_default();
    for e in &removed {
      self.index.remove(&e.id());
    }
    removed
  }

  pub fn get(&self, id: Uuid) -> Option<&E> {
    let key = self.index.get(&id)?;
    self.history(key).iter().find(|e| e.id() == id)
  }

  pub fn latest(&self, key: &E::Key) -> Option<&E> {
    self.by_key.get(key).and_then(|h| h.last())
  }

  /// Same contract as [`derive_status`], in O(1).
  pub fn status(&self, key: &E::Key) -> Direction {
    self.latest(key).map_or(Direction::Exit, LogEvent::direction)
  }

  /// A subject's events, oldest first.
  pub fn history(&self, key: &E::Key) -> &[E] {
    self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
  }

  /// The latest event of every subject, in no particular order.
  pub fn latest_events(&self) -> impl Iterator<Item = &E> + '_ {
    self.by_key.values().filter_map(|h| h.last())
  }

  /// Every event held, grouped by subject, each group oldest first.
  pub fn iter(&self) -> impl Iterator<Item = &E> + '_ {
    self.by_key.values().flatten()
  }

  pub fn contains(&self, id: Uuid) -> bool { self.index.contains_key(&id) }

  /// Number of events held.
  pub fn len(&self) -> usize { self.index.len() }

  pub fn is_empty(&self) -> bool { self.index.is_empty() }

  /// Number of distinct subjects with at least one event.
  pub fn subject_count(&self) -> usize { self.by_key.len() }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;
  use crate::{
    event::{NewEvent, VisitContext},
    subject::SubjectKind,
  };

  fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap() + Duration::minutes(minutes)
  }

  fn event(key: &SubjectKey, direction: Direction, minutes: i64) -> VisitEvent {
    VisitEvent::from_new(NewEvent {
      subject_key: key.clone(),
      kind: SubjectKind::Employee,
      direction,
      recorded_at: at(minutes),
      visit_id: None,
      display_name: key.to_string(),
      context: VisitContext::default(),
    })
  }

  #[test]
  fn no_events_means_outside() {
    let ana = SubjectKey::employee("Ana", "TI");
    assert_eq!(derive_status(&ana, &[]), Direction::Exit);

    let other = SubjectKey::employee("Bia", "RH");
    let events = vec![event(&other, Direction::Entry, 0)];
    assert_eq!(derive_status(&ana, &events), Direction::Exit);
    assert_eq!(EventLog::from_events(events).status(&ana), Direction::Exit);
  }

  #[test]
  fn latest_timestamp_wins_regardless_of_input_order() {
    let ana = SubjectKey::employee("Ana", "TI");
    let events = vec![
      event(&ana, Direction::Exit, 30),
      event(&ana, Direction::Entry, 0),
      event(&ana, Direction::Entry, 45),
    ];
    assert_eq!(derive_status(&ana, &events), Direction::Entry);
    assert_eq!(latest_event(&ana, &events).unwrap().recorded_at, at(45));
  }

  #[test]
  fn older_event_never_changes_status() {
    let ana = SubjectKey::employee("Ana", "TI");
    let mut events = vec![
      event(&ana, Direction::Entry, 0),
      event(&ana, Direction::Exit, 10),
    ];
    let before = derive_status(&ana, &events);

    events.push(event(&ana, Direction::Entry, 5));
    assert_eq!(derive_status(&ana, &events), before);

    let mut log = EventLog::from_events(events.clone());
    log.insert(event(&ana, Direction::Entry, -60));
    assert_eq!(log.status(&ana), before);
  }

  #[test]
  fn log_agrees_with_one_shot_derivation() {
    let ana = SubjectKey::employee("Ana", "TI");
    let bia = SubjectKey::employee("Bia", "RH");
    let events = vec![
      event(&ana, Direction::Entry, 1),
      event(&bia, Direction::Entry, 2),
      event(&ana, Direction::Exit, 3),
      event(&bia, Direction::Exit, 4),
      event(&bia, Direction::Entry, 5),
    ];
    let log = EventLog::from_events(events.clone());
    for key in [&ana, &bia] {
      assert_eq!(log.status(key), derive_status(key, &events));
    }
    assert_eq!(log.subject_count(), 2);
    assert_eq!(log.history(&bia).len(), 3);
  }

  #[test]
  fn duplicate_ids_are_ignored() {
    let ana = SubjectKey::employee("Ana", "TI");
    let e = event(&ana, Direction::Entry, 0);
    let mut log = EventLog::new();
    assert!(log.insert(e.clone()));
    assert!(!log.insert(e));
    assert_eq!(log.len(), 1);
  }

  #[test]
  fn removing_latest_falls_back_to_previous() {
    let ana = SubjectKey::employee("Ana", "TI");
    let entry = event(&ana, Direction::Entry, 0);
    let exit = event(&ana, Direction::Exit, 10);
    let mut log = EventLog::from_events([entry, exit.clone()]);

    assert_eq!(log.status(&ana), Direction::Exit);
    log.remove(exit.event_id).unwrap();
    assert_eq!(log.status(&ana), Direction::Entry);

    log.remove_key(&ana);
    assert!(log.is_empty());
    assert_eq!(log.status(&ana), Direction::Exit);
  }
}
