//! [`Gate`]: every action an operator can take, applied against a store.
//!
//! Each method checks the caller's [`Principal`] first, then reads what it
//! needs, plans the transition with [`crate::workflow`] and appends with
//! [`AccessStore::append_if_latest`]. Nothing is returned to the caller until
//! the store has acknowledged the write, and a lost race surfaces as
//! [`Error::Conflict`] rather than a silent double entry.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  Error, Result,
  anomaly::{AnomalyDetector, AnomalyReport},
  event::{NewEvent, VisitContext, VisitEvent},
  projection::{CurrentEntry, VisitRecord, current_view, current_visits, visits},
  role::{Operation, Principal},
  selection::Selection,
  snapshot::Snapshot,
  store::{AccessStore, Appended, Change, DeletePolicy, EventQuery, ImportSummary},
  subject::{NewSubject, Subject, SubjectKey, SubjectKind, SubjectPatch},
  workflow::{self, Activation, Presence},
};

/// Outcome of [`Gate::activate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActivationOutcome {
  /// The subject was inside; its visit is now closed.
  ExitRecorded { event: VisitEvent },
  /// The subject is outside; ask for fresh visit details and call
  /// [`Gate::re_enter`].
  ReEntryRequired { subject: Subject },
  /// The subject has never entered; ask for the registration form.
  RegistrationRequired { subject: Subject },
}

/// What a [`Gate::bulk_delete`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteSummary {
  pub events:   usize,
  pub subjects: usize,
}

/// The gatehouse service. Cheap to clone.
pub struct Gate<S> {
  store: Arc<S>,
}

impl<S> Clone for Gate<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: AccessStore> Gate<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ── Subjects ──────────────────────────────────────────────────────────────

  pub async fn register_subject(
    &self,
    who: &Principal,
    input: NewSubject,
  ) -> Result<Subject> {
    who.require(Operation::manage(input.profile.kind()))?;
    input.profile.validate()?;

    let key = input.profile.key();
    if self.find_by_key(&key).await?.is_some() {
      return Err(Error::DuplicateSubject(key));
    }
    let subject = match self.store.add_subject(input).await {
      Ok(subject) => subject,
      // Another terminal registered the same key since the check above.
      Err(e) => match self.find_by_key(&key).await? {
        Some(_) => return Err(Error::DuplicateSubject(key)),
        None => return Err(Error::store(e)),
      },
    };
    tracing::info!(
      user = %who.username,
      key = %subject.key,
      kind = %subject.kind,
      "subject registered"
    );
    Ok(subject)
  }

  pub async fn subject(&self, who: &Principal, id: Uuid) -> Result<Subject> {
    who.require(Operation::ViewActivity)?;
    self.require_subject(id).await
  }

  pub async fn subjects(
    &self,
    who: &Principal,
    kind: Option<SubjectKind>,
    include_inactive: bool,
  ) -> Result<Vec<Subject>> {
    who.require(Operation::ViewActivity)?;
    self
      .store
      .list_subjects(kind, include_inactive)
      .await
      .map_err(Error::store)
  }

  pub async fn update_subject(
    &self,
    who: &Principal,
    id: Uuid,
    patch: SubjectPatch,
  ) -> Result<Subject> {
    let mut subject = self.require_subject(id).await?;
    who.require(Operation::manage(subject.kind))?;
    subject.apply(patch)?;
    let subject = self.store.update_subject(subject).await.map_err(Error::store)?;
    tracing::info!(user = %who.username, key = %subject.key, "subject updated");
    Ok(subject)
  }

  /// Enable or disable a subject. Disabled employees cannot be scanned.
  pub async fn set_active(
    &self,
    who: &Principal,
    id: Uuid,
    active: bool,
  ) -> Result<Subject> {
    let mut subject = self.require_subject(id).await?;
    who.require(Operation::manage(subject.kind))?;
    subject.active = active;
    let subject = self.store.update_subject(subject).await.map_err(Error::store)?;
    tracing::info!(user = %who.username, key = %subject.key, active, "subject toggled");
    Ok(subject)
  }

  /// Remove a subject profile. Erasing its history as well
  /// ([`DeletePolicy::Cascade`]) additionally needs
  /// [`Operation::DeleteRecords`].
  pub async fn delete_subject(
    &self,
    who: &Principal,
    id: Uuid,
    policy: DeletePolicy,
  ) -> Result<()> {
    let subject = self.require_subject(id).await?;
    who.require(Operation::manage(subject.kind))?;
    if policy == DeletePolicy::Cascade {
      who.require(Operation::DeleteRecords)?;
    }
    self
      .store
      .delete_subjects(vec![id], policy)
      .await
      .map_err(Error::store)?;
    tracing::info!(user = %who.username, key = %subject.key, ?policy, "subject deleted");
    Ok(())
  }

  // ── Passages ──────────────────────────────────────────────────────────────

  /// Flip an employee or vehicle between inside and outside.
  pub async fn toggle(
    &self,
    who: &Principal,
    key: &SubjectKey,
    context: VisitContext,
  ) -> Result<VisitEvent> {
    who.require(Operation::RecordPassage)?;
    let subject = self.require_key(key).await?;
    if subject.kind == SubjectKind::Visitor {
      return Err(Error::RequiresVisitWorkflow(subject.kind));
    }
    if !subject.active {
      return Err(Error::SubjectInactive(subject.key));
    }
    let latest = self.latest(key).await?;
    let planned =
      workflow::plan_toggle(&subject, latest.as_ref(), context, Utc::now());
    self.commit(who, planned, latest.as_ref()).await
  }

  /// First visit of a visitor or vehicle: creates the profile if needed and
  /// records the entry.
  pub async fn register_visit(
    &self,
    who: &Principal,
    input: NewSubject,
    context: VisitContext,
  ) -> Result<(Subject, VisitEvent)> {
    who.require(Operation::RecordPassage)?;
    who.require(Operation::manage(input.profile.kind()))?;
    input.profile.validate()?;

    let key = input.profile.key();
    let latest = self.latest(&key).await?;
    if latest.is_some() {
      return Err(Error::InvalidTransition {
        from:   Presence::of(latest.as_ref()),
        action: workflow::Action::Register,
      });
    }

    let subject = match self.find_by_key(&key).await? {
      Some(existing) => existing,
      None => match self.store.add_subject(input).await {
        Ok(subject) => subject,
        // Lost the race to create the profile; the visit itself is still
        // guarded by the conditional append below.
        Err(e) => self.find_by_key(&key).await?.ok_or_else(|| Error::store(e))?,
      },
    };
    if !subject.active {
      return Err(Error::SubjectInactive(subject.key));
    }
    let planned =
      workflow::plan_registration(&subject, None, context, Utc::now())?;
    let event = self.commit(who, planned, None).await?;
    Ok((subject, event))
  }

  /// What clicking a subject's row does: close an open visit, or report
  /// which form the operator has to fill in.
  pub async fn activate(
    &self,
    who: &Principal,
    key: &SubjectKey,
  ) -> Result<ActivationOutcome> {
    who.require(Operation::RecordPassage)?;
    let subject = self.require_key(key).await?;
    let latest = self.latest(key).await?;

    match Presence::of(latest.as_ref()).on_activate() {
      Activation::RecordExit => {
        let planned =
          workflow::plan_exit(&subject, latest.as_ref(), Utc::now())?;
        let event = self.commit(who, planned, latest.as_ref()).await?;
        Ok(ActivationOutcome::ExitRecorded { event })
      }
      Activation::PromptReEntry => Ok(ActivationOutcome::ReEntryRequired { subject }),
      Activation::PromptRegistration => {
        Ok(ActivationOutcome::RegistrationRequired { subject })
      }
    }
  }

  /// Open a new visit for a subject that has left, with fresh details.
  pub async fn re_enter(
    &self,
    who: &Principal,
    key: &SubjectKey,
    context: VisitContext,
  ) -> Result<VisitEvent> {
    who.require(Operation::RecordPassage)?;
    let subject = self.require_key(key).await?;
    if !subject.active {
      return Err(Error::SubjectInactive(subject.key));
    }
    let latest = self.latest(key).await?;
    let planned =
      workflow::plan_re_entry(&subject, latest.as_ref(), context, Utc::now())?;
    self.commit(who, planned, latest.as_ref()).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn event(&self, who: &Principal, id: Uuid) -> Result<VisitEvent> {
    who.require(Operation::ViewActivity)?;
    self
      .store
      .get_event(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EventNotFound(id))
  }

  pub async fn events(
    &self,
    who: &Principal,
    query: EventQuery,
  ) -> Result<Vec<VisitEvent>> {
    who.require(Operation::ViewActivity)?;
    self.store.list_events(query).await.map_err(Error::store)
  }

  /// A subject's events, oldest first.
  pub async fn history(
    &self,
    who: &Principal,
    key: &SubjectKey,
  ) -> Result<Vec<VisitEvent>> {
    self.events(who, EventQuery::for_subject(key.clone())).await
  }

  pub async fn current_view(
    &self,
    who: &Principal,
    kind: Option<SubjectKind>,
  ) -> Result<Vec<CurrentEntry>> {
    let events = self
      .events(who, EventQuery { kind, ..Default::default() })
      .await?;
    Ok(current_view(&events))
  }

  /// Visit records; with `current_only`, the latest visit per subject.
  pub async fn visits(
    &self,
    who: &Principal,
    kind: Option<SubjectKind>,
    current_only: bool,
  ) -> Result<Vec<VisitRecord>> {
    let events = self
      .events(who, EventQuery { kind, ..Default::default() })
      .await?;
    Ok(if current_only { current_visits(&events) } else { visits(&events) })
  }

  /// Follow every committed change from now on.
  pub fn subscribe(&self, who: &Principal) -> Result<broadcast::Receiver<Change>> {
    who.require(Operation::ViewActivity)?;
    Ok(self.store.subscribe())
  }

  // ── Deletion ──────────────────────────────────────────────────────────────

  /// Delete the history of every selected subject in one batch and, with
  /// `remove_profiles`, their profiles too.
  pub async fn bulk_delete(
    &self,
    who: &Principal,
    selection: &Selection,
    remove_profiles: bool,
  ) -> Result<BulkDeleteSummary> {
    who.require(Operation::DeleteRecords)?;
    if selection.is_empty() {
      return Ok(BulkDeleteSummary::default());
    }

    let keys: Vec<SubjectKey> = selection.keys().cloned().collect();
    let events = self
      .store
      .delete_events_for(keys.clone())
      .await
      .map_err(Error::store)?;

    let mut subjects = 0;
    if remove_profiles {
      let mut ids = Vec::new();
      for key in keys {
        if let Some(subject) = self.find_by_key(&key).await? {
          ids.push(subject.subject_id);
        }
      }
      // The events are already gone; only the profiles remain.
      subjects = self
        .store
        .delete_subjects(ids, DeletePolicy::KeepHistory)
        .await
        .map_err(Error::store)?;
    }

    tracing::info!(
      user = %who.username,
      selected = selection.len(),
      events,
      subjects,
      "bulk delete"
    );
    Ok(BulkDeleteSummary { events, subjects })
  }

  /// Delete individual events, e.g. legacy rows without a subject key.
  pub async fn delete_events(&self, who: &Principal, ids: Vec<Uuid>) -> Result<usize> {
    who.require(Operation::DeleteRecords)?;
    let removed = self.store.delete_events(ids).await.map_err(Error::store)?;
    tracing::info!(user = %who.username, removed, "events deleted");
    Ok(removed)
  }

  // ── Anomalies ─────────────────────────────────────────────────────────────

  /// Send the latest `limit` scans (of one subject, or of everyone) to the
  /// classifier, oldest first.
  pub async fn detect_anomalies<D: AnomalyDetector>(
    &self,
    who: &Principal,
    detector: &D,
    key: Option<SubjectKey>,
    limit: usize,
  ) -> Result<AnomalyReport> {
    who.require(Operation::DetectAnomalies)?;
    let mut events = self
      .store
      .list_events(EventQuery {
        subject_key: key,
        limit: Some(limit),
        newest_first: true,
        ..Default::default()
      })
      .await
      .map_err(Error::store)?;
    events.reverse();

    let report = detector
      .detect(&events)
      .await
      .map_err(|e| Error::Anomaly(Box::new(e)))?;
    if report.anomaly_detected {
      tracing::warn!(
        user = %who.username,
        description = %report.anomaly_description,
        "anomaly detected"
      );
    }
    Ok(report)
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  pub async fn export_snapshot(&self, who: &Principal) -> Result<Snapshot> {
    who.require(Operation::ManageSnapshots)?;
    let subjects = self
      .store
      .list_subjects(None, true)
      .await
      .map_err(Error::store)?;
    let events = self
      .store
      .list_events(EventQuery::default())
      .await
      .map_err(Error::store)?;
    Ok(Snapshot::new(subjects, events))
  }

  /// Merge a snapshot into the store; rows already present are skipped, so
  /// importing the same snapshot twice changes nothing.
  pub async fn import_snapshot(
    &self,
    who: &Principal,
    snapshot: Snapshot,
  ) -> Result<ImportSummary> {
    who.require(Operation::ManageSnapshots)?;
    snapshot.check_version()?;
    let summary = self
      .store
      .import(snapshot.subjects, snapshot.events)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      user = %who.username,
      subjects = summary.subjects,
      events = summary.events,
      "snapshot imported"
    );
    Ok(summary)
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn require_subject(&self, id: Uuid) -> Result<Subject> {
    self
      .store
      .get_subject(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SubjectNotFound(id))
  }

  async fn find_by_key(&self, key: &SubjectKey) -> Result<Option<Subject>> {
    self
      .store
      .get_subject_by_key(key.clone())
      .await
      .map_err(Error::store)
  }

  async fn require_key(&self, key: &SubjectKey) -> Result<Subject> {
    self
      .find_by_key(key)
      .await?
      .ok_or_else(|| Error::UnknownSubjectKey(key.clone()))
  }

  async fn latest(&self, key: &SubjectKey) -> Result<Option<VisitEvent>> {
    self
      .store
      .latest_event(key.clone())
      .await
      .map_err(Error::store)
  }

  async fn commit(
    &self,
    who: &Principal,
    planned: NewEvent,
    seen: Option<&VisitEvent>,
  ) -> Result<VisitEvent> {
    let key = planned.subject_key.clone();
    let expected = seen.map(|e| e.event_id);
    match self
      .store
      .append_if_latest(planned, expected)
      .await
      .map_err(Error::store)?
    {
      Appended::Recorded(event) => {
        tracing::info!(
          user = %who.username,
          key = %event.subject_key,
          direction = %event.direction,
          event_id = %event.event_id,
          "passage recorded"
        );
        Ok(event)
      }
      Appended::Stale { latest } => {
        tracing::warn!(
          user = %who.username,
          %key,
          latest = ?latest.map(|e| e.event_id),
          "passage rejected: subject changed concurrently"
        );
        Err(Error::Conflict(key))
      }
    }
  }
}
