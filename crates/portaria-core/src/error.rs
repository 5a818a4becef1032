//! Error types for `portaria-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  role::{Operation, Role},
  subject::SubjectKey,
  workflow::{Action, Presence},
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("subject not found: {0}")]
  SubjectNotFound(Uuid),

  #[error("no subject registered under key {0}")]
  UnknownSubjectKey(SubjectKey),

  #[error("a subject is already registered under key {0}")]
  DuplicateSubject(SubjectKey),

  #[error("subject {0} is disabled")]
  SubjectInactive(SubjectKey),

  #[error("event not found: {0}")]
  EventNotFound(Uuid),

  #[error("role {role} may not {operation}")]
  PermissionDenied { role: Role, operation: Operation },

  #[error("cannot {action} a subject that is {from}")]
  InvalidTransition { from: Presence, action: Action },

  #[error("{0} passages go through the visit workflow")]
  RequiresVisitWorkflow(crate::subject::SubjectKind),

  #[error("subject {0} changed concurrently; reload and try again")]
  Conflict(SubjectKey),

  #[error("{field} must not be blank")]
  BlankField { field: &'static str },

  #[error("update would change subject key from {from} to {to}")]
  KeyChanged { from: SubjectKey, to: SubjectKey },

  #[error("profile kind does not match subject kind {0}")]
  KindMismatch(crate::subject::SubjectKind),

  #[error("snapshot version {found} is newer than supported version {supported}")]
  UnsupportedSnapshot { found: u32, supported: u32 },

  #[error("anomaly detection failed: {0}")]
  Anomaly(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error; used with `map_err` at every store call site.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
