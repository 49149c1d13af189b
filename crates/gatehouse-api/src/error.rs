//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use gatehouse_pipeline::PipelineError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized")]
  Unauthorized,

  #[error("store unavailable: {0}")]
  Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl<E> From<PipelineError<E>> for ApiError
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn from(err: PipelineError<E>) -> Self {
    match err {
      PipelineError::NotFound(key) => {
        ApiError::NotFound(format!("identity {key} not found"))
      }
      e @ PipelineError::Conflict { .. } => ApiError::Conflict(e.to_string()),
      PipelineError::Invalid(e) => ApiError::BadRequest(e.to_string()),
      PipelineError::Store(e) => ApiError::Unavailable(Box::new(e)),
    }
  }
}

impl From<gatehouse_core::Error> for ApiError {
  fn from(err: gatehouse_core::Error) -> Self {
    ApiError::BadRequest(err.to_string())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unauthorized => {
        (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
      }
      ApiError::Unavailable(e) => {
        tracing::error!(error = %e, "store unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, "store unavailable".to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
