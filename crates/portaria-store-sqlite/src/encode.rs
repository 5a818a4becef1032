//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order in SQL equals chronological order. UUIDs are
//! hyphenated lowercase, which sorts the same way as [`Uuid`]'s `Ord`.
//! Profiles and visit contexts are compact JSON.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use portaria_core::{
  event::{Direction, VisitContext, VisitEvent},
  subject::{Profile, Subject, SubjectKey, SubjectKind},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Drop precision the column cannot hold, so a value handed back to the
/// caller equals what a later read returns.
pub fn storable(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<SubjectKind> {
  s.parse().map_err(|_| Error::Decode { column: "kind", value: s.to_owned() })
}

pub fn decode_direction(s: &str) -> Result<Direction> {
  s.parse()
    .map_err(|_| Error::Decode { column: "direction", value: s.to_owned() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const SUBJECT_COLUMNS: &str =
  "subject_id, subject_key, kind, profile_json, active, created_at";

/// Raw values read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id:   String,
  pub subject_key:  String,
  pub kind:         String,
  pub profile_json: String,
  pub active:       bool,
  pub created_at:   String,
}

impl RawSubject {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id:   row.get(0)?,
      subject_key:  row.get(1)?,
      kind:         row.get(2)?,
      profile_json: row.get(3)?,
      active:       row.get(4)?,
      created_at:   row.get(5)?,
    })
  }

  pub fn encode(subject: &Subject) -> Result<Self> {
    Ok(Self {
      subject_id:   encode_uuid(subject.subject_id),
      subject_key:  subject.key.as_str().to_owned(),
      kind:         subject.kind.as_ref().to_owned(),
      profile_json: serde_json::to_string(&subject.profile)?,
      active:       subject.active,
      created_at:   encode_dt(subject.created_at),
    })
  }

  pub fn into_subject(self) -> Result<Subject> {
    let profile: Profile = serde_json::from_str(&self.profile_json)?;
    Ok(Subject {
      subject_id: decode_uuid(&self.subject_id)?,
      key: SubjectKey::from_raw(self.subject_key),
      kind: decode_kind(&self.kind)?,
      profile,
      active: self.active,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const EVENT_COLUMNS: &str = "event_id, subject_key, kind, direction, \
                                 recorded_at, visit_id, display_name, \
                                 context_json";

/// Raw strings read directly from an `events` row.
pub struct RawEvent {
  pub event_id:     String,
  pub subject_key:  String,
  pub kind:         String,
  pub direction:    String,
  pub recorded_at:  String,
  pub visit_id:     String,
  pub display_name: String,
  pub context_json: String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:     row.get(0)?,
      subject_key:  row.get(1)?,
      kind:         row.get(2)?,
      direction:    row.get(3)?,
      recorded_at:  row.get(4)?,
      visit_id:     row.get(5)?,
      display_name: row.get(6)?,
      context_json: row.get(7)?,
    })
  }

  pub fn encode(event: &VisitEvent) -> Result<Self> {
    Ok(Self {
      event_id:     encode_uuid(event.event_id),
      subject_key:  event.subject_key.as_str().to_owned(),
      kind:         event.kind.as_ref().to_owned(),
      direction:    event.direction.as_ref().to_owned(),
      recorded_at:  encode_dt(event.recorded_at),
      visit_id:     encode_uuid(event.visit_id),
      display_name: event.display_name.clone(),
      context_json: serde_json::to_string(&event.context)?,
    })
  }

  pub fn insert(&self, conn: &rusqlite::Connection, or_ignore: bool) -> rusqlite::Result<usize> {
    let verb = if or_ignore { "INSERT OR IGNORE" } else { "INSERT" };
    conn.execute(
      &format!(
        "{verb} INTO events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
      ),
      rusqlite::params![
        self.event_id,
        self.subject_key,
        self.kind,
        self.direction,
        self.recorded_at,
        self.visit_id,
        self.display_name,
        self.context_json,
      ],
    )
  }

  pub fn into_event(self) -> Result<VisitEvent> {
    let context: VisitContext = serde_json::from_str(&self.context_json)?;
    Ok(VisitEvent {
      event_id: decode_uuid(&self.event_id)?,
      subject_key: SubjectKey::from_raw(self.subject_key),
      kind: decode_kind(&self.kind)?,
      direction: decode_direction(&self.direction)?,
      recorded_at: decode_dt(&self.recorded_at)?,
      visit_id: decode_uuid(&self.visit_id)?,
      display_name: self.display_name,
      context,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_sort_lexically() {
    let early = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
    let late = early + chrono::Duration::microseconds(1);
    let (a, b) = (encode_dt(early), encode_dt(late));
    assert_eq!(a, "2024-05-02T08:00:00.000000Z");
    assert_eq!(a.len(), b.len());
    assert!(a < b);
    assert_eq!(decode_dt(&b).unwrap(), late);
  }

  #[test]
  fn unknown_enum_text_is_a_decode_error() {
    assert!(matches!(
      decode_direction("sideways"),
      Err(Error::Decode { column: "direction", .. })
    ));
    assert_eq!(decode_kind("visitor").unwrap(), SubjectKind::Visitor);
  }
}
