//! `GET /stream`: committed changes as server-sent events.
//!
//! Each event is named `change` and carries the JSON of a
//! [`portaria_core::store::Change`]. A client that falls too far behind gets
//! a `resync` event and should reload its lists.

use std::{convert::Infallible, time::Duration};

use axum::{
  Extension,
  extract::State,
  response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, stream};
use portaria_core::{anomaly::AnomalyDetector, role::Principal, store::AccessStore};
use tokio::sync::broadcast::error::RecvError;

use crate::{ApiState, error::ApiError};

pub async fn handler<S, D>(
  State(state): State<ApiState<S, D>>,
  Extension(who): Extension<Principal>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
  S: AccessStore,
  D: AnomalyDetector,
{
  let receiver = state.gate.subscribe(&who)?;
  tracing::debug!(user = %who.username, "change stream opened");

  let events = stream::unfold(receiver, |mut receiver| async move {
    let event = match receiver.recv().await {
      Ok(change) => match serde_json::to_string(&change) {
        Ok(json) => Event::default().event("change").data(json),
        Err(e) => Event::default().event("error").data(e.to_string()),
      },
      Err(RecvError::Lagged(skipped)) => {
        Event::default().event("resync").data(skipped.to_string())
      }
      Err(RecvError::Closed) => return None,
    };
    Some((Ok(event), receiver))
  });

  Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
