//! Visit events: the append-only log every status is derived from.
//!
//! An event is never updated once written. A visit that has ended is not a
//! mutated entry row; it is an entry followed by an exit that shares its
//! `visit_id` (see [`crate::projection::visits`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subject::{SubjectKey, SubjectKind};

/// Which way a subject crossed the gate.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
  Entry,
  Exit,
}

impl Direction {
  pub fn opposite(self) -> Self {
    match self {
      Self::Entry => Self::Exit,
      Self::Exit => Self::Entry,
    }
  }
}

/// Snapshot of the visit circumstances, copied onto the event at the moment
/// it is recorded so later profile edits do not rewrite history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitContext {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plate:       Option<String>,
  /// Phone extension (`ramal`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extension:   Option<String>,
  /// Gate or parking lot the visit was logged at (`portaria`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parking_lot: Option<String>,
  /// Employee responsible for the visitor (`responsavel`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub responsible: Option<String>,
  /// Reason for the visit (`motivo`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reason:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub driver:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub company:     Option<String>,
}

/// One crossing of the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitEvent {
  pub event_id:     Uuid,
  pub subject_key:  SubjectKey,
  pub kind:         SubjectKind,
  pub direction:    Direction,
  pub recorded_at:  DateTime<Utc>,
  /// Event id of the entry that opened this visit. Entries carry their own
  /// id; exits carry the id of the entry they close.
  pub visit_id:     Uuid,
  pub display_name: String,
  #[serde(default)]
  pub context:      VisitContext,
}

impl VisitEvent {
  pub fn from_new(input: NewEvent) -> Self {
    let event_id = Uuid::new_v4();
    Self {
      event_id,
      subject_key: input.subject_key,
      kind: input.kind,
      direction: input.direction,
      recorded_at: input.recorded_at,
      visit_id: input.visit_id.unwrap_or(event_id),
      display_name: input.display_name,
      context: input.context,
    }
  }

  /// Total order over events: timestamp first, event id as the tie-break so
  /// that equal timestamps still sort the same way on every client.
  pub fn ordering(&self) -> (DateTime<Utc>, Uuid) {
    (self.recorded_at, self.event_id)
  }

  /// Key the current-list projection folds on. Legacy rows without a subject
  /// key fall back to their own id so they stay visible.
  pub fn fold_key(&self) -> String {
    if self.subject_key.is_blank() {
      self.event_id.to_string()
    } else {
      self.subject_key.as_str().to_owned()
    }
  }
}

/// Input to [`crate::store::AccessStore::append_if_latest`]. Built by the
/// planners in [`crate::workflow`]; callers rarely assemble one by hand.
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub subject_key:  SubjectKey,
  pub kind:         SubjectKind,
  pub direction:    Direction,
  pub recorded_at:  DateTime<Utc>,
  /// `None` opens a new visit.
  pub visit_id:     Option<Uuid>,
  pub display_name: String,
  pub context:      VisitContext,
}
