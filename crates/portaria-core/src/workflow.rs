//! The passage state machine.
//!
//! ```text
//!   NoHistory --register--> Inside --exit--> Outside --re-enter--> Inside ...
//! ```
//!
//! Employees and simple vehicles skip the forms and just [`plan_toggle`]
//! between the two directions. Visitors and registered vehicles go through
//! [`plan_registration`], [`plan_exit`] and [`plan_re_entry`]: each re-entry
//! opens a new visit with fresh context while keeping the subject's key, so
//! the history keeps every visit and the current list shows only the last.
//!
//! The planners are pure; [`crate::gate::Gate`] runs them against a store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  event::{Direction, NewEvent, VisitContext, VisitEvent},
  subject::{Profile, Subject},
};

/// Where a subject stands, from its latest event.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
  #[strum(to_string = "new")]
  NoHistory,
  #[strum(to_string = "inside")]
  Inside,
  #[strum(to_string = "outside")]
  Outside,
}

impl Presence {
  pub fn of(latest: Option<&VisitEvent>) -> Self {
    match latest.map(|e| e.direction) {
      None => Self::NoHistory,
      Some(Direction::Entry) => Self::Inside,
      Some(Direction::Exit) => Self::Outside,
    }
  }

  /// What clicking the subject's row means in this state.
  pub fn on_activate(self) -> Activation {
    match self {
      Self::NoHistory => Activation::PromptRegistration,
      Self::Inside => Activation::RecordExit,
      Self::Outside => Activation::PromptReEntry,
    }
  }
}

/// A transition requested by the gate operator.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  #[strum(to_string = "register")]
  Register,
  #[strum(to_string = "record an exit for")]
  Exit,
  #[strum(to_string = "re-enter")]
  ReEnter,
}

/// Outcome of activating a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
  RecordExit,
  PromptReEntry,
  PromptRegistration,
}

/// `now`, nudged forward if needed so a new event never sorts before the
/// subject's latest one (clock skew between gate terminals).
pub fn next_timestamp(
  now: DateTime<Utc>,
  latest: Option<&VisitEvent>,
) -> DateTime<Utc> {
  match latest {
    Some(prev) if now <= prev.recorded_at => {
      prev.recorded_at + Duration::milliseconds(1)
    }
    _ => now,
  }
}

/// Record the opposite of the latest direction; an unseen subject enters.
pub fn plan_toggle(
  subject: &Subject,
  latest: Option<&VisitEvent>,
  context: VisitContext,
  now: DateTime<Utc>,
) -> NewEvent {
  let direction =
    latest.map_or(Direction::Entry, |e| e.direction.opposite());
  let visit_id = match direction {
    Direction::Entry => None,
    Direction::Exit => latest.map(|e| e.visit_id),
  };
  NewEvent {
    subject_key: subject.key.clone(),
    kind: subject.kind,
    direction,
    recorded_at: next_timestamp(now, latest),
    visit_id,
    display_name: subject.display_name(),
    context,
  }
}

/// First entry of a subject that has never passed the gate.
pub fn plan_registration(
  subject: &Subject,
  latest: Option<&VisitEvent>,
  context: VisitContext,
  now: DateTime<Utc>,
) -> Result<NewEvent> {
  expect(latest, Presence::NoHistory, Action::Register)?;
  Ok(entry(subject, latest, context, now))
}

/// Close the open visit, keeping the context it was opened with.
pub fn plan_exit(
  subject: &Subject,
  latest: Option<&VisitEvent>,
  now: DateTime<Utc>,
) -> Result<NewEvent> {
  let open = expect(latest, Presence::Inside, Action::Exit)?
    .ok_or(Error::InvalidTransition {
      from:   Presence::NoHistory,
      action: Action::Exit,
    })?;
  Ok(NewEvent {
    subject_key:  subject.key.clone(),
    kind:         subject.kind,
    direction:    Direction::Exit,
    recorded_at:  next_timestamp(now, latest),
    visit_id:     Some(open.visit_id),
    display_name: subject.display_name(),
    context:      open.context.clone(),
  })
}

/// Open a new visit for a subject that has left, with fresh context.
pub fn plan_re_entry(
  subject: &Subject,
  latest: Option<&VisitEvent>,
  context: VisitContext,
  now: DateTime<Utc>,
) -> Result<NewEvent> {
  expect(latest, Presence::Outside, Action::ReEnter)?;
  Ok(entry(subject, latest, context, now))
}

fn expect<'a>(
  latest: Option<&'a VisitEvent>,
  wanted: Presence,
  action: Action,
) -> Result<Option<&'a VisitEvent>> {
  let from = Presence::of(latest);
  if from == wanted {
    Ok(latest)
  } else {
    Err(Error::InvalidTransition { from, action })
  }
}

fn entry(
  subject: &Subject,
  latest: Option<&VisitEvent>,
  mut context: VisitContext,
  now: DateTime<Utc>,
) -> NewEvent {
  // Identity fields come from the profile, not from whatever the form held.
  match &subject.profile {
    Profile::Vehicle(v) => {
      context.plate = Some(v.plate.trim().to_owned());
      if context.driver.is_none() {
        context.driver.clone_from(&v.driver);
      }
      if context.company.is_none() {
        context.company.clone_from(&v.company);
      }
    }
    Profile::Visitor(v) => {
      if context.company.is_none() {
        context.company.clone_from(&v.company);
      }
    }
    Profile::Employee(e) => {
      if context.extension.is_none() {
        context.extension.clone_from(&e.extension);
      }
    }
  }
  NewEvent {
    subject_key: subject.key.clone(),
    kind: subject.kind,
    direction: Direction::Entry,
    recorded_at: next_timestamp(now, latest),
    visit_id: None,
    display_name: subject.display_name(),
    context,
  }
}
