//! JSON REST API for Portaria.
//!
//! Exposes an axum [`Router`] backed by any [`AccessStore`] and
//! [`AnomalyDetector`]. Every handler acts on behalf of the [`Principal`]
//! found in the request extensions; authentication, TLS and transport are
//! the caller's responsibility.
//!
//! [`Principal`]: portaria_core::role::Principal
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", portaria_api::api_router(gate, detector))
//! ```

pub mod activity;
pub mod anomalies;
pub mod error;
pub mod passages;
pub mod snapshot;
pub mod stream;
pub mod subjects;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use portaria_core::{anomaly::AnomalyDetector, gate::Gate, store::AccessStore};

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct ApiState<S, D> {
  pub gate:     Gate<S>,
  pub detector: Arc<D>,
}

impl<S, D> Clone for ApiState<S, D> {
  fn clone(&self) -> Self {
    Self { gate: self.gate.clone(), detector: Arc::clone(&self.detector) }
  }
}

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, D>(gate: Gate<S>, detector: Arc<D>) -> Router<()>
where
  S: AccessStore + 'static,
  D: AnomalyDetector + 'static,
{
  Router::new()
    // Subjects
    .route(
      "/subjects",
      get(subjects::list::<S, D>).post(subjects::create::<S, D>),
    )
    .route(
      "/subjects/{id}",
      get(subjects::get_one::<S, D>)
        .patch(subjects::update::<S, D>)
        .delete(subjects::delete_one::<S, D>),
    )
    .route("/subjects/{id}/active", post(subjects::set_active::<S, D>))
    .route("/subjects/{id}/activate", post(passages::activate::<S, D>))
    .route("/subjects/{id}/reenter", post(passages::re_enter::<S, D>))
    // Passages
    .route("/scan", post(passages::scan::<S, D>))
    .route("/toggle", post(passages::toggle::<S, D>))
    .route(
      "/visits",
      get(activity::visits::<S, D>).post(passages::register_visit::<S, D>),
    )
    // Activity
    .route("/events", get(activity::events::<S, D>))
    .route("/events/{id}", get(activity::event::<S, D>))
    .route("/current", get(activity::current::<S, D>))
    .route("/bulk-delete", post(activity::bulk_delete::<S, D>))
    .route("/anomalies", post(anomalies::detect::<S, D>))
    .route(
      "/snapshot",
      get(snapshot::export::<S, D>).post(snapshot::import::<S, D>),
    )
    .route("/stream", get(stream::handler::<S, D>))
    .with_state(ApiState { gate, detector })
}
