//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use portaria_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    let message = e.to_string();
    match e {
      CoreError::SubjectNotFound(_)
      | CoreError::UnknownSubjectKey(_)
      | CoreError::EventNotFound(_) => Self::NotFound(message),
      CoreError::PermissionDenied { .. } => Self::Forbidden(message),
      CoreError::DuplicateSubject(_)
      | CoreError::SubjectInactive(_)
      | CoreError::InvalidTransition { .. }
      | CoreError::Conflict(_)
      | CoreError::KeyChanged { .. } => Self::Conflict(message),
      CoreError::BlankField { .. }
      | CoreError::KindMismatch(_)
      | CoreError::RequiresVisitWorkflow(_)
      | CoreError::UnsupportedSnapshot { .. } => Self::BadRequest(message),
      CoreError::Anomaly(_) => Self::Unavailable(message),
      CoreError::Store(e) => Self::Store(e),
    }
  }
}

impl From<portaria_qr::Error> for ApiError {
  fn from(e: portaria_qr::Error) -> Self { Self::BadRequest(e.to_string()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
