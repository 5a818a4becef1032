//! Roles and the principal every action is performed on behalf of.
//!
//! There is no ambient "current role". Callers construct a [`Principal`]
//! after authentication and pass it to each [`crate::gate::Gate`] method,
//! which checks it before touching the store.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, subject::SubjectKind};

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
  strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  /// Administrator; may do everything.
  Adm,
  /// Human resources; owns the employee roster.
  Rh,
  /// Gatehouse staff; records passages, visitors and vehicles.
  Portaria,
  /// Supervision; reads activity and audits it.
  Supervisao,
}

/// Something a role may or may not be allowed to do.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
  ManageEmployees,
  ManageVisitors,
  ManageVehicles,
  RecordPassage,
  ViewActivity,
  DeleteRecords,
  DetectAnomalies,
  ManageSnapshots,
}

impl Operation {
  /// The operation that guards creating or editing a subject of `kind`.
  pub fn manage(kind: SubjectKind) -> Self {
    match kind {
      SubjectKind::Employee => Self::ManageEmployees,
      SubjectKind::Vehicle => Self::ManageVehicles,
      SubjectKind::Visitor => Self::ManageVisitors,
    }
  }
}

impl Role {
  pub fn permits(self, operation: Operation) -> bool {
    use Operation::*;
    match self {
      Self::Adm => true,
      Self::Rh => matches!(operation, ManageEmployees | ViewActivity | DetectAnomalies),
      Self::Portaria => matches!(
        operation,
        ManageVisitors | ManageVehicles | RecordPassage | ViewActivity
      ),
      Self::Supervisao => {
        matches!(operation, ViewActivity | DetectAnomalies | DeleteRecords)
      }
    }
  }
}

/// An authenticated user together with the role that gates their actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub username: String,
  pub role:     Role,
}

impl Principal {
  pub fn new(username: impl Into<String>, role: Role) -> Self {
    Self { username: username.into(), role }
  }

  /// Fail with [`Error::PermissionDenied`] unless the role permits
  /// `operation`.
  pub fn require(&self, operation: Operation) -> Result<()> {
    if self.role.permits(operation) {
      Ok(())
    } else {
      tracing::warn!(
        user = %self.username,
        role = %self.role,
        %operation,
        "permission denied"
      );
      Err(Error::PermissionDenied { role: self.role, operation })
    }
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn adm_permits_everything() {
    for op in [
      Operation::ManageEmployees,
      Operation::DeleteRecords,
      Operation::ManageSnapshots,
    ] {
      assert!(Role::Adm.permits(op));
    }
  }

  #[test]
  fn every_role_can_view_activity() {
    assert!(Role::iter().all(|r| r.permits(Operation::ViewActivity)));
  }

  #[test]
  fn gatehouse_cannot_touch_the_roster() {
    let guard = Principal::new("guard", Role::Portaria);
    assert!(guard.require(Operation::RecordPassage).is_ok());
    let err = guard.require(Operation::ManageEmployees).unwrap_err();
    assert!(matches!(
      err,
      Error::PermissionDenied { role: Role::Portaria, operation: Operation::ManageEmployees }
    ));
  }

  #[test]
  fn roles_parse_from_profile_strings() {
    assert_eq!("supervisao".parse::<Role>().unwrap(), Role::Supervisao);
    assert!("guest".parse::<Role>().is_err());
  }
}
