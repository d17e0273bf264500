//! Classified failures surfaced to callers of the API client.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
  /// The request never got an HTTP answer (connect, DNS, timeout)
  #[error("Transport failure: {0}")]
  Transport(String),

  /// The service answered with a non-2xx status
  #[error("Upstream returned status {status}: {body}")]
  UpstreamStatus { status: u16, body: String },

  /// The body did not match the expected structure
  #[error("Failed to decode response: {0}")]
  Decode(#[from] serde_json::Error),

  /// The request could not be built
  #[error("Invalid request: {0}")]
  InvalidRequest(String),
}

impl ClientError {
  /// Only transport failures may succeed on a later attempt.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Transport(_))
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      Self::UpstreamStatus { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for ClientError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_builder() {
      Self::InvalidRequest(e.to_string())
    } else {
      Self::Transport(e.to_string())
    }
  }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_only_transport_is_retryable() {
    assert!(ClientError::Transport("timeout".into()).is_retryable());
    assert!(!ClientError::UpstreamStatus {
      status: 401,
      body: String::new()
    }
    .is_retryable());
    assert!(!ClientError::InvalidRequest("bad".into()).is_retryable());

    let decode = serde_json::from_str::<u32>("nope").unwrap_err();
    assert!(!ClientError::from(decode).is_retryable());
  }

  #[test]
  fn test_status_only_for_upstream() {
    let err = ClientError::UpstreamStatus {
      status: 404,
      body: "not found".into(),
    };
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "Upstream returned status 404: not found");
    assert_eq!(ClientError::Transport("x".into()).status(), None);
  }
}
