//! [`MemoryStore`]: an in-process [`AccessStore`] for tests and for
//! single-terminal deployments that persist through snapshots.
//!
//! Events live in an [`EventLog`], so the latest-event check behind every
//! conditional append is a map lookup rather than a scan of the whole log.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{NewEvent, VisitEvent},
  status::EventLog,
  store::{
    AccessStore, Appended, CHANGE_FEED_CAPACITY, Change, DeletePolicy,
    EventQuery, ImportSummary,
  },
  subject::{NewSubject, Subject, SubjectKey, SubjectKind},
};

#[derive(Default)]
struct Inner {
  subjects: Vec<Subject>,
  events:   EventLog<VisitEvent>,
}

/// Cloning is cheap; clones share the same data and change feed.
#[derive(Clone)]
pub struct MemoryStore {
  inner:   Arc<Mutex<Inner>>,
  changes: broadcast::Sender<Change>,
}

impl Default for MemoryStore {
  fn default() -> Self { Self::new() }
}

impl MemoryStore {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
    Self { inner: Arc::new(Mutex::new(Inner::default())), changes }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    // Poisoning only means another caller panicked mid-call.
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn publish(&self, change: Change) {
    // No subscribers is not an error.
    let _ = self.changes.send(change);
  }
}

impl AccessStore for MemoryStore {
  type Error = Error;

  async fn add_subject(&self, input: NewSubject) -> Result<Subject> {
    let subject = Subject::from_new(input)?;
    {
      let mut inner = self.lock();
      if inner.subjects.iter().any(|s| s.key == subject.key) {
        return Err(Error::DuplicateSubject(subject.key));
      }
      inner.subjects.push(subject.clone());
    }
    self.publish(Change::SubjectAdded { subject: subject.clone() });
    Ok(subject)
  }

  async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
    Ok(self.lock().subjects.iter().find(|s| s.subject_id == id).cloned())
  }

  async fn get_subject_by_key(&self, key: SubjectKey) -> Result<Option<Subject>> {
    Ok(self.lock().subjects.iter().find(|s| s.key == key).cloned())
  }

  async fn list_subjects(
    &self,
    kind: Option<SubjectKind>,
    include_inactive: bool,
  ) -> Result<Vec<Subject>> {
    let mut subjects: Vec<Subject> = self
      .lock()
      .subjects
      .iter()
      .filter(|s| kind.is_none_or(|k| s.kind == k))
      .filter(|s| include_inactive || s.active)
      .cloned()
      .collect();
    subjects.sort_by_key(|s| (s.created_at, s.subject_id));
    Ok(subjects)
  }

  async fn update_subject(&self, subject: Subject) -> Result<Subject> {
    {
      let mut inner = self.lock();
      let slot = inner
        .subjects
        .iter_mut()
        .find(|s| s.subject_id == subject.subject_id)
        .ok_or(Error::SubjectNotFound(subject.subject_id))?;
      *slot = subject.clone();
    }
    self.publish(Change::SubjectUpdated { subject: subject.clone() });
    Ok(subject)
  }

  async fn delete_subjects(
    &self,
    ids: Vec<Uuid>,
    policy: DeletePolicy,
  ) -> Result<usize> {
    let (removed, dropped_events) = {
      let mut inner = self.lock();
      let keys: Vec<SubjectKey> = inner
        .subjects
        .iter()
        .filter(|s| ids.contains(&s.subject_id))
        .map(|s| s.key.clone())
        .collect();
      inner.subjects.retain(|s| !ids.contains(&s.subject_id));

      let mut dropped = Vec::new();
      if policy == DeletePolicy::Cascade {
        for key in &keys {
          dropped.extend(inner.events.remove_key(key).iter().map(|e| e.event_id));
        }
      }
      (keys.len(), dropped)
    };

    if removed > 0 {
      self.publish(Change::SubjectsDeleted { ids });
    }
    if !dropped_events.is_empty() {
      self.publish(Change::EventsDeleted { ids: dropped_events });
    }
    Ok(removed)
  }

  async fn append_if_latest(
    &self,
    input: NewEvent,
    expected: Option<Uuid>,
  ) -> Result<Appended> {
    let event = {
      let mut inner = self.lock();
      let latest = inner.events.latest(&input.subject_key);
      if latest.map(|e| e.event_id) != expected {
        return Ok(Appended::Stale { latest: latest.cloned() });
      }
      let event = VisitEvent::from_new(input);
      inner.events.insert(event.clone());
      event
    };
    self.publish(Change::EventAppended { event: event.clone() });
    Ok(Appended::Recorded(event))
  }

  async fn get_event(&self, id: Uuid) -> Result<Option<VisitEvent>> {
    Ok(self.lock().events.get(id).cloned())
  }

  async fn latest_event(&self, key: SubjectKey) -> Result<Option<VisitEvent>> {
    Ok(self.lock().events.latest(&key).cloned())
  }

  async fn list_events(&self, query: EventQuery) -> Result<Vec<VisitEvent>> {
    let mut events: Vec<VisitEvent> = self
      .lock()
      .events
      .iter()
      .filter(|e| query.matches(e))
      .cloned()
      .collect();
    events.sort_by_key(|e| e.ordering());
    if query.newest_first {
      events.reverse();
    }
    if let Some(limit) = query.limit {
      events.truncate(limit);
    }
    Ok(events)
  }

  async fn delete_events(&self, ids: Vec<Uuid>) -> Result<usize> {
    let removed: Vec<Uuid> = {
      let mut inner = self.lock();
      ids
        .into_iter()
        .filter_map(|id| inner.events.remove(id))
        .map(|e| e.event_id)
        .collect()
    };
    let count = removed.len();
    if count > 0 {
      self.publish(Change::EventsDeleted { ids: removed });
    }
    Ok(count)
  }

  async fn delete_events_for(&self, keys: Vec<SubjectKey>) -> Result<usize> {
    let removed: Vec<Uuid> = {
      let mut inner = self.lock();
      keys
        .iter()
        .flat_map(|key| inner.events.remove_key(key))
        .map(|e| e.event_id)
        .collect()
    };
    let count = removed.len();
    if count > 0 {
      self.publish(Change::EventsDeleted { ids: removed });
    }
    Ok(count)
  }

  async fn import(
    &self,
    subjects: Vec<Subject>,
    events: Vec<VisitEvent>,
  ) -> Result<ImportSummary> {
    let summary = {
      let mut inner = self.lock();
      let mut summary = ImportSummary::default();
      for subject in subjects {
        let taken = inner
          .subjects
          .iter()
          .any(|s| s.subject_id == subject.subject_id || s.key == subject.key);
        if !taken {
          inner.subjects.push(subject);
          summary.subjects += 1;
        }
      }
      summary.events = inner.events.extend(events);
      summary
    };
    self.publish(Change::Imported { summary });
    Ok(summary)
  }

  fn subscribe(&self) -> broadcast::Receiver<Change> { self.changes.subscribe() }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::{
    event::{Direction, VisitContext},
    subject::{Profile, VehicleProfile},
  };

  fn truck() -> NewSubject {
    NewSubject {
      profile: Profile::Vehicle(VehicleProfile {
        plate:   "abc-1234".into(),
        driver:  Some("Carlos".into()),
        company: None,
      }),
    }
  }

  fn entry(key: &SubjectKey) -> NewEvent {
    NewEvent {
      subject_key:  key.clone(),
      kind:         SubjectKind::Vehicle,
      direction:    Direction::Entry,
      recorded_at:  Utc::now(),
      visit_id:     None,
      display_name: "ABC1234".into(),
      context:      VisitContext::default(),
    }
  }

  #[tokio::test]
  async fn duplicate_keys_are_rejected() {
    let store = MemoryStore::new();
    store.add_subject(truck()).await.unwrap();
    let err = store.add_subject(truck()).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateSubject(_)));
  }

  #[tokio::test]
  async fn stale_append_writes_nothing() {
    let store = MemoryStore::new();
    let subject = store.add_subject(truck()).await.unwrap();

    let Appended::Recorded(first) =
      store.append_if_latest(entry(&subject.key), None).await.unwrap()
    else {
      panic!("first append should succeed");
    };

    // A second terminal that still believes there is no history loses.
    let outcome = store.append_if_latest(entry(&subject.key), None).await.unwrap();
    assert!(matches!(
      outcome,
      Appended::Stale { latest: Some(ref e) } if e.event_id == first.event_id
    ));
    let all = store.list_events(EventQuery::default()).await.unwrap();
    assert_eq!(all.len(), 1);
  }

  #[tokio::test]
  async fn cascade_delete_drops_history() {
    let store = MemoryStore::new();
    let subject = store.add_subject(truck()).await.unwrap();
    store.append_if_latest(entry(&subject.key), None).await.unwrap();

    let kept = store.clone();
    let removed = kept
      .delete_subjects(vec![subject.subject_id], DeletePolicy::KeepHistory)
      .await
      .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.list_events(EventQuery::default()).await.unwrap().len(), 1);

    let subject = store.add_subject(truck()).await.unwrap();
    store
      .delete_subjects(vec![subject.subject_id], DeletePolicy::Cascade)
      .await
      .unwrap();
    assert!(store.list_events(EventQuery::default()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn imported_history_is_indexed_by_key() {
    let store = MemoryStore::new();
    let subject = store.add_subject(truck()).await.unwrap();

    let mut exit = entry(&subject.key);
    exit.direction = Direction::Exit;
    exit.recorded_at = Utc::now() + chrono::Duration::minutes(5);
    let older = VisitEvent::from_new(entry(&subject.key));
    let newer = VisitEvent::from_new(exit);

    // Out of order on purpose; the latest is still the later timestamp.
    let summary = store.import(vec![], vec![newer.clone(), older.clone()]).await.unwrap();
    assert_eq!(summary.events, 2);
    let again = store.import(vec![], vec![older.clone()]).await.unwrap();
    assert_eq!(again.events, 0);

    let latest = store.latest_event(subject.key.clone()).await.unwrap();
    assert_eq!(latest, Some(newer.clone()));
    assert_eq!(store.get_event(older.event_id).await.unwrap(), Some(older.clone()));

    // The append guard follows the indexed latest event.
    let stale = store.append_if_latest(entry(&subject.key), Some(older.event_id)).await.unwrap();
    assert!(matches!(stale, Appended::Stale { .. }));

    let removed = store.delete_events_for(vec![subject.key.clone()]).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.latest_event(subject.key).await.unwrap(), None);
    assert_eq!(store.get_event(older.event_id).await.unwrap(), None);
  }

  #[tokio::test]
  async fn subscribers_see_appends() {
    let store = MemoryStore::new();
    let mut feed = store.subscribe();
    let subject = store.add_subject(truck()).await.unwrap();
    store.append_if_latest(entry(&subject.key), None).await.unwrap();

    assert!(matches!(feed.recv().await.unwrap(), Change::SubjectAdded { .. }));
    assert!(matches!(feed.recv().await.unwrap(), Change::EventAppended { .. }));
  }
}
