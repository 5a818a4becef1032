//! The `AccessStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends ([`crate::memory`] and
//! `portaria-store-sqlite`). [`crate::gate::Gate`] and the HTTP layer depend
//! on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  event::{Direction, NewEvent, VisitEvent},
  subject::{NewSubject, Subject, SubjectKey, SubjectKind},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`AccessStore::list_events`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
  pub kind:         Option<SubjectKind>,
  pub subject_key:  Option<SubjectKey>,
  pub direction:    Option<Direction>,
  /// Inclusive lower bound on `recorded_at`.
  pub since:        Option<DateTime<Utc>>,
  /// Exclusive upper bound on `recorded_at`.
  pub until:        Option<DateTime<Utc>>,
  pub limit:        Option<usize>,
  /// Return the newest events first; oldest first otherwise.
  #[serde(default)]
  pub newest_first: bool,
}

impl EventQuery {
  pub fn for_subject(key: SubjectKey) -> Self {
    Self { subject_key: Some(key), ..Default::default() }
  }

  /// Whether `event` passes every filter (limit and order aside).
  pub fn matches(&self, event: &VisitEvent) -> bool {
    self.kind.is_none_or(|k| event.kind == k)
      && self.subject_key.as_ref().is_none_or(|k| &event.subject_key == k)
      && self.direction.is_none_or(|d| event.direction == d)
      && self.since.is_none_or(|t| event.recorded_at >= t)
      && self.until.is_none_or(|t| event.recorded_at < t)
  }
}

/// What happens to a subject's events when the subject is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
  /// Remove the profile, keep the visit history.
  #[default]
  KeepHistory,
  /// Remove the profile and every event recorded under its key.
  Cascade,
}

/// Result of a conditional append.
#[derive(Debug, Clone)]
pub enum Appended {
  Recorded(VisitEvent),
  /// Another writer appended first; nothing was written.
  Stale { latest: Option<VisitEvent> },
}

/// Rows actually inserted by [`AccessStore::import`]; existing ids are
/// skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
  pub subjects: usize,
  pub events:   usize,
}

/// A committed write, published to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
  SubjectAdded { subject: Subject },
  SubjectUpdated { subject: Subject },
  SubjectsDeleted { ids: Vec<Uuid> },
  EventAppended { event: VisitEvent },
  EventsDeleted { ids: Vec<Uuid> },
  Imported { summary: ImportSummary },
}

/// Capacity of the change feed; slow subscribers skip ahead past this.
pub const CHANGE_FEED_CAPACITY: usize = 256;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Portaria storage backend.
///
/// Events are append-only apart from explicit batch deletion. Appends are
/// conditional on the caller's view of the subject's latest event so two
/// terminals scanning the same badge cannot both record an entry.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AccessStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Subjects ──────────────────────────────────────────────────────────

  /// Persist a new subject. Fails if its key is already registered.
  fn add_subject(
    &self,
    input: NewSubject,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  fn get_subject(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  fn get_subject_by_key(
    &self,
    key: SubjectKey,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  /// List subjects, optionally of one kind, oldest registration first.
  fn list_subjects(
    &self,
    kind: Option<SubjectKind>,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + '_;

  /// Overwrite the stored subject with the same `subject_id`.
  fn update_subject(
    &self,
    subject: Subject,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  /// Delete subjects in one batch; returns how many profiles were removed.
  fn delete_subjects(
    &self,
    ids: Vec<Uuid>,
    policy: DeletePolicy,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Events ────────────────────────────────────────────────────────────

  /// Append `input` only if the subject's latest event id still equals
  /// `expected` (`None` meaning "no events yet"). Check and insert happen
  /// atomically.
  fn append_if_latest(
    &self,
    input: NewEvent,
    expected: Option<Uuid>,
  ) -> impl Future<Output = Result<Appended, Self::Error>> + Send + '_;

  fn get_event(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<VisitEvent>, Self::Error>> + Send + '_;

  /// The subject's latest event by [`VisitEvent::ordering`].
  fn latest_event(
    &self,
    key: SubjectKey,
  ) -> impl Future<Output = Result<Option<VisitEvent>, Self::Error>> + Send + '_;

  fn list_events(
    &self,
    query: EventQuery,
  ) -> impl Future<Output = Result<Vec<VisitEvent>, Self::Error>> + Send + '_;

  /// Delete events by id in one batch; returns how many were removed.
  fn delete_events(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Delete every event recorded under any of `keys`.
  fn delete_events_for(
    &self,
    keys: Vec<SubjectKey>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Bulk ──────────────────────────────────────────────────────────────

  /// Insert rows that are not already present (matched by id).
  fn import(
    &self,
    subjects: Vec<Subject>,
    events: Vec<VisitEvent>,
  ) -> impl Future<Output = Result<ImportSummary, Self::Error>> + Send + '_;

  // ── Change feed ───────────────────────────────────────────────────────

  /// Receive every change committed after this call.
  fn subscribe(&self) -> broadcast::Receiver<Change>;
}
