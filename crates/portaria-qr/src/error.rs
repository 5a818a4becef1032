//! Error types for the portaria-qr codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid QR payload: {0}")]
  InvalidPayload(String),

  #[error("QR payload is missing `{0}`")]
  MissingField(&'static str),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
