//! `GET /snapshot` exports everything; `POST /snapshot` merges a snapshot in.

use axum::{Extension, Json, extract::State};
use portaria_core::{
  anomaly::AnomalyDetector,
  role::Principal,
  snapshot::Snapshot,
  store::{AccessStore, ImportSummary},
};

use crate::{ApiState, error::ApiError};

pub async fn export<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
) -> Result<Json<Snapshot>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(state.gate.export_snapshot(&who).await?))
}

pub async fn import<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Json(snapshot): Json<Snapshot>,
) -> Result<Json<ImportSummary>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(state.gate.import_snapshot(&who, snapshot).await?))
}
