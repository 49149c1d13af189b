//! Admin Basic auth, device token auth, and the helpers that mint both.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::{
  extract::{Request, State},
  http::HeaderMap,
  middleware::Next,
  response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use gatehouse_api::{ApiError, AuthenticatedDevice};
use gatehouse_core::store::AttendanceStore;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::{AppState, error::Error};

/// Header carrying a device's bearer token.
pub const DEVICE_TOKEN_HEADER: &str = "x-device-token";

/// Credentials accepted for the admin routes.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

// ─── Admin ────────────────────────────────────────────────────────────────────

/// Verify HTTP Basic credentials against `config`.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Error> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;

  if username != config.username {
    return Err(Error::Unauthorized);
  }

  let parsed_hash =
    PasswordHash::new(&config.password_hash).map_err(|_| Error::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)
}

/// Middleware guarding the admin router.
pub async fn require_admin<S>(
  State(state): State<AppState<S>>,
  req: Request,
  next: Next,
) -> Result<Response, Error>
where
  S: AttendanceStore + 'static,
{
  if let Err(e) = verify_auth(req.headers(), &state.auth) {
    tracing::warn!(path = %req.uri().path(), "admin request rejected");
    return Err(e);
  }
  Ok(next.run(req).await)
}

/// Argon2 PHC string for `password`, with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, Error> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

// ─── Devices ──────────────────────────────────────────────────────────────────

/// Hex SHA-256 of a device token. Only this digest is ever stored.
pub fn hash_token(token: &str) -> String {
  hex::encode(Sha256::digest(token.trim().as_bytes()))
}

/// A fresh 256-bit token, hex encoded.
pub fn generate_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// Register (or re-key) `device_id` and return its new plaintext token.
pub async fn register_device<S>(
  store: &S,
  device_id: &str,
) -> Result<String, S::Error>
where
  S: AttendanceStore,
{
  let token = generate_token();
  store
    .register_device(device_id.trim().to_string(), hash_token(&token))
    .await?;
  tracing::info!(device = device_id, "device registered");
  Ok(token)
}

/// Middleware guarding the device router. Marks the request with the
/// [`AuthenticatedDevice`] its token belongs to.
pub async fn require_device<S>(
  State(state): State<AppState<S>>,
  mut req: Request,
  next: Next,
) -> Result<Response, ApiError>
where
  S: AttendanceStore + 'static,
{
  let token = req
    .headers()
    .get(DEVICE_TOKEN_HEADER)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let device = state
    .pipeline
    .store()
    .device_for_token(hash_token(token))
    .await
    .map_err(|e| ApiError::Unavailable(Box::new(e)))?;

  let Some(device) = device else {
    tracing::warn!(path = %req.uri().path(), "device token rejected");
    return Err(ApiError::Unauthorized);
  };

  req.extensions_mut().insert(AuthenticatedDevice(device));
  Ok(next.run(req).await)
}
