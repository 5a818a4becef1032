//! Subjects: the employees, vehicles and visitors that pass the gate.
//!
//! A subject carries identity only. Whether it is inside or outside is never
//! stored on the subject; it is derived from the event log (see
//! [`crate::status`]).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The kind of entity a subject represents.
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
pub enum SubjectKind {
  Employee,
  Vehicle,
  Visitor,
}

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The stable natural key that events reference.
///
/// Unlike `subject_id`, the key can be recomputed from what is printed on a
/// badge or typed at the gate, so a scan or a returning visitor finds the
/// same history without a lookup table.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
  /// `"<name> (<sector>)"`, the employee id embedded in attendance scans.
  pub fn employee(name: &str, sector: &str) -> Self {
    Self(format!("{} ({})", name.trim(), sector.trim()))
  }

  /// Upper-cased plate with separators removed, so `abc-1234` and
  /// `ABC 1234` are the same vehicle.
  pub fn vehicle(plate: &str) -> Self {
    Self(
      plate
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect(),
    )
  }

  /// `person_<document>` keeping only the alphanumerics of the document, so
  /// punctuation differences between visits do not split a visitor.
  pub fn visitor(document: &str) -> Self {
    let digits: String =
      document.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    Self(format!("person_{digits}"))
  }

  /// Wrap an already-derived key verbatim.
  pub fn from_raw(raw: impl Into<String>) -> Self { Self(raw.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Legacy rows imported from older snapshots may lack a key.
  pub fn is_blank(&self) -> bool { self.0.trim().is_empty() }
}

impl fmt::Display for SubjectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Badge holder registered by HR or an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
  pub name:      String,
  pub sector:    String,
  /// Phone extension (`ramal`).
  pub extension: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleProfile {
  pub plate:   String,
  pub driver:  Option<String>,
  pub company: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorProfile {
  pub name:     String,
  /// Identity document number; the visitor's key is derived from it.
  pub document: String,
  pub company:  Option<String>,
}

/// Display fields for a subject, one variant per [`SubjectKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Profile {
  Employee(EmployeeProfile),
  Vehicle(VehicleProfile),
  Visitor(VisitorProfile),
}

impl Profile {
  pub fn kind(&self) -> SubjectKind {
    match self {
      Self::Employee(_) => SubjectKind::Employee,
      Self::Vehicle(_) => SubjectKind::Vehicle,
      Self::Visitor(_) => SubjectKind::Visitor,
    }
  }

  pub fn key(&self) -> SubjectKey {
    match self {
      Self::Employee(e) => SubjectKey::employee(&e.name, &e.sector),
      Self::Vehicle(v) => SubjectKey::vehicle(&v.plate),
      Self::Visitor(v) => SubjectKey::visitor(&v.document),
    }
  }

  /// The label shown in lists and copied onto every event.
  pub fn display_name(&self) -> String {
    match self {
      Self::Employee(e) => e.name.trim().to_owned(),
      Self::Vehicle(v) => match &v.driver {
        Some(driver) => format!("{} ({})", v.plate.trim(), driver.trim()),
        None => v.plate.trim().to_owned(),
      },
      Self::Visitor(v) => v.name.trim().to_owned(),
    }
  }

  /// Reject profiles whose identity fields are blank.
  pub fn validate(&self) -> Result<()> {
    let required: Vec<(&'static str, &str)> = match self {
      Self::Employee(e) => {
        vec![("name", e.name.as_str()), ("sector", e.sector.as_str())]
      }
      Self::Vehicle(v) => vec![("plate", v.plate.as_str())],
      Self::Visitor(v) => {
        vec![("name", v.name.as_str()), ("document", v.document.as_str())]
      }
    };
    for (field, value) in required {
      if value.trim().is_empty() {
        return Err(Error::BlankField { field });
      }
    }
    Ok(())
  }
}

// ─── Subject ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id: Uuid,
  pub key:        SubjectKey,
  pub kind:       SubjectKind,
  pub profile:    Profile,
  /// Only employees are ever disabled; other kinds stay `true`.
  pub active:     bool,
  pub created_at: DateTime<Utc>,
}

impl Subject {
  /// Build a subject from validated input. Ids and timestamps are assigned
  /// here so every backend produces identical records.
  pub fn from_new(input: NewSubject) -> Result<Self> {
    input.profile.validate()?;
    Ok(Self {
      subject_id: Uuid::new_v4(),
      key:        input.profile.key(),
      kind:       input.profile.kind(),
      profile:    input.profile,
      active:     true,
      created_at: Utc::now(),
    })
  }

  /// Apply a profile edit. The key is identity and must survive the edit.
  pub fn apply(&mut self, patch: SubjectPatch) -> Result<()> {
    patch.profile.validate()?;
    if patch.profile.kind() != self.kind {
      return Err(Error::KindMismatch(self.kind));
    }
    let new_key = patch.profile.key();
    if new_key != self.key {
      return Err(Error::KeyChanged { from: self.key.clone(), to: new_key });
    }
    self.profile = patch.profile;
    Ok(())
  }

  pub fn display_name(&self) -> String { self.profile.display_name() }
}

/// Input to [`crate::store::AccessStore::add_subject`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubject {
  pub profile: Profile,
}

/// Replacement display fields for an existing subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectPatch {
  pub profile: Profile,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn employee_key_matches_badge_format() {
    assert_eq!(SubjectKey::employee(" Ana ", "TI").as_str(), "Ana (TI)");
  }

  #[test]
  fn vehicle_key_ignores_case_and_separators() {
    assert_eq!(SubjectKey::vehicle("abc-1234"), SubjectKey::vehicle("ABC 1234"));
    assert_eq!(SubjectKey::vehicle("abc-1234").as_str(), "ABC1234");
  }

  #[test]
  fn visitor_key_uses_document_alphanumerics() {
    assert_eq!(SubjectKey::visitor("123").as_str(), "person_123");
    assert_eq!(
      SubjectKey::visitor("12.345.678-9"),
      SubjectKey::visitor("123456789")
    );
  }

  #[test]
  fn blank_identity_is_rejected() {
    let profile = Profile::Visitor(VisitorProfile {
      name:     "Maria".into(),
      document: "  ".into(),
      company:  None,
    });
    let err = Subject::from_new(NewSubject { profile }).unwrap_err();
    assert!(matches!(err, Error::BlankField { field: "document" }));
  }

  #[test]
  fn apply_refuses_key_change() {
    let mut subject = Subject::from_new(NewSubject {
      profile: Profile::Employee(EmployeeProfile {
        name:      "Ana".into(),
        sector:    "TI".into(),
        extension: None,
      }),
    })
    .unwrap();

    subject
      .apply(SubjectPatch {
        profile: Profile::Employee(EmployeeProfile {
          name:      "Ana".into(),
          sector:    "TI".into(),
          extension: Some("2201".into()),
        }),
      })
      .unwrap();

    let err = subject
      .apply(SubjectPatch {
        profile: Profile::Employee(EmployeeProfile {
          name:      "Ana".into(),
          sector:    "RH".into(),
          extension: None,
        }),
      })
      .unwrap_err();
    assert!(matches!(err, Error::KeyChanged { .. }));
  }

  #[test]
  fn kind_round_trips_through_strings() {
    assert_eq!(SubjectKind::Visitor.to_string(), "visitor");
    assert_eq!("vehicle".parse::<SubjectKind>().unwrap(), SubjectKind::Vehicle);
  }
}
