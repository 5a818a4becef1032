//! Error types and axum `IntoResponse` implementation.

use axum::{
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,

  #[error("anomaly detection is not configured")]
  AnomalyDisabled,

  #[error("anomaly service request failed: {0}")]
  AnomalyHttp(#[from] reqwest::Error),

  #[error("anomaly service answered {0}")]
  AnomalyStatus(reqwest::StatusCode),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res =
          (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"portaria\""),
        );
        res
      }
      other => {
        (StatusCode::SERVICE_UNAVAILABLE, other.to_string()).into_response()
      }
    }
  }
}
