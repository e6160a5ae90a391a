use thiserror::Error;

/// Construction-time configuration failures.
///
/// These are the only errors a tracker surfaces synchronously; everything
/// that happens to an individual expectation is reported through its own
/// [`Completion`](crate::Completion) handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("missing configuration")]
  Missing,

  #[error("required config field `{0}` is not set")]
  MissingField(&'static str),
}

/// Why a pending expectation failed to resolve.
///
/// `Rejected` and `Expired` carry caller-chosen reasons: the value the
/// filter rejected with, or the `expiry_reason` supplied at registration.
/// `Closed` means the tracker was shut down (or dropped) while the
/// expectation was still pending.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection<E> {
  #[error("rejected by filter")]
  Rejected(E),

  #[error("expired before any message matched")]
  Expired(E),

  #[error("tracker closed while the expectation was pending")]
  Closed,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn config_error_messages() {
    assert_eq!(ConfigError::Missing.to_string(), "missing configuration");
    assert_eq!(
      ConfigError::MissingField("timeout_ms").to_string(),
      "required config field `timeout_ms` is not set"
    );
  }

  #[test]
  fn rejection_carries_reason() {
    let rejection: Rejection<&str> = Rejection::Expired("TIMEOUT");
    assert_eq!(rejection, Rejection::Expired("TIMEOUT"));
    assert_ne!(rejection, Rejection::Rejected("TIMEOUT"));
  }
}
