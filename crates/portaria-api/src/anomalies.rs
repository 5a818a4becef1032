//! `POST /anomalies`: run the configured classifier over recent scans.
//!
//! Body: `{"key":"Ana (TI)","limit":20}`; both optional. Without a key the
//! latest scans of everyone are sent.

use axum::{Extension, Json, extract::State};
use portaria_core::{
  anomaly::{AnomalyDetector, AnomalyReport},
  role::Principal,
  store::AccessStore,
  subject::SubjectKey,
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct DetectBody {
  pub key:   Option<SubjectKey>,
  pub limit: Option<usize>,
}

pub async fn detect<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Json(body): Json<DetectBody>,
) -> Result<Json<AnomalyReport>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let report = state
    .gate
    .detect_anomalies(
      &who,
      state.detector.as_ref(),
      body.key,
      body.limit.unwrap_or(DEFAULT_LIMIT),
    )
    .await?;
  Ok(Json(report))
}
