//! Handlers that record passages through the gate.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/scan` | Body: `{"code":"<qr text>"}`; toggles the badge holder |
//! | `POST` | `/toggle` | Body: `{"key":"Ana (TI)"}` |
//! | `POST` | `/visits` | Body: `{"profile":{…},"context":{…}}`; first entry |
//! | `POST` | `/subjects/{id}/activate` | Exit, or which form to show next |
//! | `POST` | `/subjects/{id}/reenter` | Body: `{"context":{…}}` |

use axum::{
  Extension, Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use portaria_core::{
  anomaly::AnomalyDetector,
  event::{VisitContext, VisitEvent},
  gate::ActivationOutcome,
  role::Principal,
  store::AccessStore,
  subject::{NewSubject, Profile, Subject, SubjectKey},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Scan ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScanBody {
  /// Text read from the QR code.
  pub code:    String,
  /// Extra details typed at the gate; badge fields win over these.
  #[serde(default)]
  pub context: VisitContext,
}

/// `POST /scan`
pub async fn scan<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Json(body): Json<ScanBody>,
) -> Result<(StatusCode, Json<VisitEvent>), ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let payload = portaria_qr::decode(&body.code).inspect_err(|e| {
    tracing::warn!(user = %who.username, error = %e, "unreadable badge");
  })?;

  let badge = payload.context();
  let context = VisitContext {
    plate: badge.plate.or(body.context.plate),
    extension: badge.extension.or(body.context.extension),
    ..body.context
  };
  let event = state
    .gate
    .toggle(&who, &payload.subject_key(), context)
    .await?;
  Ok((StatusCode::CREATED, Json(event)))
}

// ─── Toggle ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
  pub key:     SubjectKey,
  #[serde(default)]
  pub context: VisitContext,
}

/// `POST /toggle`
pub async fn toggle<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Json(body): Json<ToggleBody>,
) -> Result<(StatusCode, Json<VisitEvent>), ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let event = state.gate.toggle(&who, &body.key, body.context).await?;
  Ok((StatusCode::CREATED, Json(event)))
}

// ─── Visits ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterVisitBody {
  pub profile: Profile,
  #[serde(default)]
  pub context: VisitContext,
}

#[derive(Debug, Serialize)]
pub struct RegisteredVisit {
  pub subject: Subject,
  pub event:   VisitEvent,
}

/// `POST /visits`
pub async fn register_visit<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Json(body): Json<RegisterVisitBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let (subject, event) = state
    .gate
    .register_visit(&who, NewSubject { profile: body.profile }, body.context)
    .await?;
  Ok((StatusCode::CREATED, Json(RegisteredVisit { subject, event })))
}

/// `POST /subjects/{id}/activate`
pub async fn activate<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Path(id): Path<Uuid>,
) -> Result<Json<ActivationOutcome>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let subject = state.gate.subject(&who, id).await?;
  Ok(Json(state.gate.activate(&who, &subject.key).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReEnterBody {
  #[serde(default)]
  pub context: VisitContext,
}

/// `POST /subjects/{id}/reenter`
pub async fn re_enter<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
  Path(id): Path<Uuid>,
  Json(body): Json<ReEnterBody>,
) -> Result<(StatusCode, Json<VisitEvent>), ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let subject = state.gate.subject(&who, id).await?;
  let event = state.gate.re_enter(&who, &subject.key, body.context).await?;
  Ok((StatusCode::CREATED, Json(event)))
}
