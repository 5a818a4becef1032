//! HTTP Basic-auth middleware mapping configured users to roles.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::HeaderMap,
  middleware::Next,
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use portaria_core::role::Principal;

use crate::{UserConfig, error::Error};

/// Credentials accepted by this server instance.
#[derive(Clone, Default)]
pub struct AuthConfig {
  pub users: Vec<UserConfig>,
}

/// Verify credentials directly from headers and resolve the caller's role.
///
/// A user without a role is refused exactly like a wrong password.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<Principal, Error> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;

  let user = config
    .users
    .iter()
    .find(|u| u.username == username)
    .ok_or(Error::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&user.password_hash)
    .map_err(|_| Error::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)?;

  let Some(role) = user.role else {
    tracing::warn!(user = %username, "authenticated user has no role");
    return Err(Error::Unauthorized);
  };
  Ok(Principal::new(username, role))
}

/// Middleware: reject unauthenticated requests, otherwise attach the
/// [`Principal`] for the API handlers.
pub async fn authenticate(
  State(config): State<Arc<AuthConfig>>,
  mut req: Request,
  next: Next,
) -> Result<Response, Error> {
  let principal = verify_auth(req.headers(), &config)?;
  req.extensions_mut().insert(principal);
  Ok(next.run(req).await)
}
