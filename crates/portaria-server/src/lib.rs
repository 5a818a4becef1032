//! HTTP server for Portaria.
//!
//! Wires the JSON API of [`portaria_api`] to a store, puts HTTP Basic auth
//! in front of it and maps each configured user to a [`Role`].

pub mod anomaly;
pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, middleware, routing::get};
use portaria_core::{gate::Gate, role::Role, store::AccessStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use anomaly::ConfiguredDetector;
use auth::AuthConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PORTARIA_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  pub store_path: PathBuf,
  #[serde(default)]
  pub users:      Vec<UserConfig>,
  #[serde(default)]
  pub anomaly:    AnomalyConfig,
}

/// A login. Users whose `role` is missing can authenticate but are refused.
#[derive(Deserialize, Clone)]
pub struct UserConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  pub role:          Option<Role>,
}

#[derive(Deserialize, Clone)]
pub struct AnomalyConfig {
  /// Classifier URL; detection is disabled when absent.
  pub endpoint:     Option<String>,
  /// Sent as a bearer token.
  pub api_key:      Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for AnomalyConfig {
  fn default() -> Self {
    Self { endpoint: None, api_key: None, timeout_secs: default_timeout_secs() }
  }
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_timeout_secs() -> u64 { 30 }

// ─── Application state ───────────────────────────────────────────────────────

/// Everything the router needs.
pub struct AppState<S> {
  pub gate:     Gate<S>,
  pub detector: Arc<ConfiguredDetector>,
  pub auth:     Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      gate:     self.gate.clone(),
      detector: Arc::clone(&self.detector),
      auth:     Arc::clone(&self.auth),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the server router: `/health` is open, everything under `/api`
/// requires credentials.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: AccessStore + 'static,
{
  let api = portaria_api::api_router(state.gate, state.detector).layer(
    middleware::from_fn_with_state(state.auth, auth::authenticate),
  );

  Router::new()
    .route("/health", get(health))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str { "ok" }

#[cfg(test)]
mod tests {
  use super::*;

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use portaria_store_sqlite::SqliteStore;
  use rand_core::OsRng;
  use tower::ServiceExt as _;

  async fn make_state() -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt  = SaltString::generate(&mut OsRng);
    let hash  = Argon2::default()
      .hash_password(b"secret", &salt)
      .unwrap()
      .to_string();

    AppState {
      gate:     Gate::new(Arc::new(store)),
      detector: Arc::new(ConfiguredDetector::Disabled),
      auth:     Arc::new(AuthConfig {
        users: vec![
          UserConfig {
            username:      "guard".into(),
            password_hash: hash.clone(),
            role:          Some(Role::Portaria),
          },
          UserConfig {
            username:      "boss".into(),
            password_hash: hash,
            role:          Some(Role::Supervisao),
          },
        ],
      }),
    }
  }

  async fn request(
    state: AppState<SqliteStore>,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: &str,
  ) -> axum::response::Response {
    let mut builder = Request::builder()
      .method(method)
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
      builder = builder.header(
        header::AUTHORIZATION,
        format!("Basic {}", B64.encode(format!("{user}:secret"))),
      );
    }
    router(state)
      .oneshot(builder.body(Body::from(body.to_string())).unwrap())
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn health_needs_no_credentials() {
    let resp = request(make_state().await, "GET", "/health", None, "").await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn api_requires_credentials() {
    let resp = request(make_state().await, "GET", "/api/current", None, "").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn role_comes_from_the_login() {
    let state = make_state().await;
    let visit = r#"{"profile":{"kind":"visitor","name":"Maria","document":"123","company":null}}"#;

    let resp = request(state.clone(), "POST", "/api/visits", Some("boss"), visit).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = request(state.clone(), "POST", "/api/visits", Some("guard"), visit).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = request(state, "GET", "/api/current", Some("boss"), "").await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn unconfigured_detector_is_unavailable() {
    let resp =
      request(make_state().await, "POST", "/api/anomalies", Some("boss"), "{}").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
  }
}
