use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),
  #[error("Invalid URL: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("{0}")]
  Unauthorized(String),
  #[error("{0}")]
  Forbidden(String),
  #[error("{message}")]
  Rejected { status: u16, message: String },
  #[error("Unexpected response: {0}")]
  Decode(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct ErrorBody {
  message: Option<String>,
}

impl ApiError {
  /// Build an error from a non-OK response, preferring the backend's `message`.
  pub async fn from_response(response: Response, fallback: &str) -> Self {
    let status = response.status();
    let message = response
      .text()
      .await
      .ok()
      .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
      .and_then(|body| body.message)
      .filter(|m| !m.trim().is_empty())
      .unwrap_or_else(|| fallback.to_string());

    Self::from_status(status, message)
  }

  pub fn from_status(status: StatusCode, message: String) -> Self {
    match status {
      StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
      StatusCode::FORBIDDEN => ApiError::Forbidden(message),
      _ => ApiError::Rejected {
        status: status.as_u16(),
        message,
      },
    }
  }

  /// HTTP status of a rejected call, if the server answered at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Unauthorized(_) => Some(401),
      ApiError::Forbidden(_) => Some(403),
      ApiError::Rejected { status, .. } => Some(*status),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_maps_auth_codes() {
    assert!(matches!(
      ApiError::from_status(StatusCode::UNAUTHORIZED, "nope".into()),
      ApiError::Unauthorized(_)
    ));
    assert!(matches!(
      ApiError::from_status(StatusCode::FORBIDDEN, "nope".into()),
      ApiError::Forbidden(_)
    ));
    let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad title".into());
    assert_eq!(err.status(), Some(422));
    assert_eq!(err.to_string(), "bad title");
  }
}
