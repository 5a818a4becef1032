//! Error type for `portaria-store-sqlite`.

use portaria_core::subject::SubjectKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] portaria_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A text column held a value no enum variant maps to.
  #[error("unknown {column} value: {value:?}")]
  Decode { column: &'static str, value: String },

  #[error("subject already registered: {0}")]
  DuplicateSubject(SubjectKey),

  #[error("subject not found: {0}")]
  SubjectNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
