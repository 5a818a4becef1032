//! Read models over the event log, and batch deletion.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/events` | Filters: `kind`, `subject_key`, `direction`, `since`, `until`, `limit`, `newest_first` |
//! | `GET`  | `/events/{id}` | 404 if not found |
//! | `GET`  | `/current` | One row per subject; optional `?kind=` |
//! | `GET`  | `/visits` | Entry/exit pairs; `?current=true` keeps the latest per subject |
//! | `POST` | `/bulk-delete` | Body: `{"keys":["person_123"],"remove_profiles":false}` |

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
};
use portaria_core::{
  anomaly::AnomalyDetector,
  event::VisitEvent,
  gate::BulkDeleteSummary,
  projection::{CurrentEntry, VisitRecord},
  role::Principal,
  selection::Selection,
  store::{AccessStore, EventQuery},
  subject::SubjectKind,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

/// `GET /events`
pub async fn events<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Query(query): Query<EventQuery>,
) -> Result<Json<Vec<VisitEvent>>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(state.gate.events(&who, query).await?))
}

/// `GET /events/{id}`
pub async fn event<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Path(id): Path<Uuid>,
) -> Result<Json<VisitEvent>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(state.gate.event(&who, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct KindParams {
  pub kind: Option<SubjectKind>,
}

/// `GET /current[?kind=<kind>]`
pub async fn current<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Query(params): Query<KindParams>,
) -> Result<Json<Vec<CurrentEntry>>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(state.gate.current_view(&who, params.kind).await?))
}

#[derive(Debug, Deserialize)]
pub struct VisitParams {
  pub kind:    Option<SubjectKind>,
  #[serde(default)]
  pub current: bool,
}

/// `GET /visits[?kind=<kind>][&current=true]`
pub async fn visits<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Query(params): Query<VisitParams>,
) -> Result<Json<Vec<VisitRecord>>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(
    state
      .gate
      .visits(&who, params.kind, params.current)
      .await?,
  ))
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteBody {
  pub keys:            Selection,
  /// Also remove the selected subjects' profiles.
  #[serde(default)]
  pub remove_profiles: bool,
}

/// `POST /bulk-delete`
pub async fn bulk_delete<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Json(body): Json<BulkDeleteBody>,
) -> Result<Json<BulkDeleteSummary>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(
    state
      .gate
      .bulk_delete(&who, &body.keys, body.remove_profiles)
      .await?,
  ))
}
