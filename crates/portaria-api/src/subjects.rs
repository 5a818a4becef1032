//! Handlers for `/subjects` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/subjects` | Optional `?kind=employee\|vehicle\|visitor`, `?include_inactive=true` |
//! | `POST`   | `/subjects` | Body: `{"profile":{"kind":"employee","name":…,"sector":…}}` |
//! | `GET`    | `/subjects/{id}` | 404 if not found |
//! | `PATCH`  | `/subjects/{id}` | Body: `{"profile":{…}}`; the key must not change |
//! | `DELETE` | `/subjects/{id}` | `?cascade=true` also erases the history |
//! | `POST`   | `/subjects/{id}/active` | Body: `{"active":false}` |

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use portaria_core::{
  anomaly::AnomalyDetector,
  role::Principal,
  store::{AccessStore, DeletePolicy},
  subject::{NewSubject, Subject, SubjectKind, SubjectPatch},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub kind:             Option<SubjectKind>,
  #[serde(default)]
  pub include_inactive: bool,
}

/// `GET /subjects[?kind=<kind>][&include_inactive=true]`
pub async fn list<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Subject>>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let subjects = state
    .gate
    .subjects(&who, params.kind, params.include_inactive)
    .await?;
  Ok(Json(subjects))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /subjects`
pub async fn create<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Json(body): Json<NewSubject>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let subject = state.gate.register_subject(&who, body).await?;
  Ok((StatusCode::CREATED, Json(subject)))
}

// ─── Get / update / delete ───────────────────────────────────────────────────

/// `GET /subjects/{id}`
pub async fn get_one<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Path(id): Path<Uuid>,
) -> Result<Json<Subject>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(state.gate.subject(&who, id).await?))
}

/// `PATCH /subjects/{id}`
pub async fn update<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Path(id): Path<Uuid>,
  Json(body): Json<SubjectPatch>,
) -> Result<Json<Subject>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(state.gate.update_subject(&who, id, body).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
  #[serde(default)]
  pub cascade: bool,
}

/// `DELETE /subjects/{id}[?cascade=true]`
pub async fn delete_one<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Path(id): Path<Uuid>,
  Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let policy = if params.cascade {
    DeletePolicy::Cascade
  } else {
    DeletePolicy::KeepHistory
  };
  state.gate.delete_subject(&who, id, policy).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub active: bool,
}

/// `POST /subjects/{id}/active`
pub async fn set_active<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Path(id): Path<Uuid>,
  Json(body): Json<ActiveBody>,
) -> Result<Json<Subject>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  Ok(Json(state.gate.set_active(&who, id, body.active).await?))
}
