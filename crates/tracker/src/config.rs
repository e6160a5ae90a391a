//! Tracker configuration.
//!
//! Durations are carried as plain millisecond integers so the struct
//! deserializes cleanly from TOML/JSON config files; conversion to
//! `Duration` happens once, at tracker construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Tracker`](crate::Tracker).
///
/// `timeout_ms` has no default and is required: a config without it is
/// rejected at construction with
/// [`ConfigError::MissingField`](crate::ConfigError::MissingField).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
  /// Default per-registration expiry in milliseconds. Required.
  pub timeout_ms: Option<u64>,

  /// Sweeper wake period in milliseconds.
  /// Default: 1000
  #[serde(default = "default_check_interval_ms")]
  pub check_interval_ms: u64,
}

fn default_check_interval_ms() -> u64 {
  1000
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      timeout_ms: None,
      check_interval_ms: default_check_interval_ms(),
    }
  }
}

impl TrackerConfig {
  /// Config with the required default timeout set and the default check interval.
  pub fn new(timeout: Duration) -> Self {
    Self {
      timeout_ms: Some(timeout.as_millis() as u64),
      check_interval_ms: default_check_interval_ms(),
    }
  }

  /// Override the sweeper wake period.
  pub fn with_check_interval(mut self, interval: Duration) -> Self {
    self.check_interval_ms = interval.as_millis() as u64;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn default_has_no_timeout() {
    let config = TrackerConfig::default();
    assert_eq!(config.timeout_ms, None);
    assert_eq!(config.check_interval_ms, 1000);
  }

  #[test]
  fn struct_update_keeps_interval_default() {
    let config = TrackerConfig {
      timeout_ms: Some(5000),
      ..Default::default()
    };
    assert_eq!(config.check_interval_ms, 1000);
  }

  #[test]
  fn new_sets_timeout_and_default_interval() {
    let config = TrackerConfig::new(Duration::from_secs(10));
    assert_eq!(config.timeout_ms, Some(10_000));
    assert_eq!(config.check_interval_ms, 1000);
  }

  #[test]
  fn with_check_interval_overrides() {
    let config = TrackerConfig::new(Duration::from_secs(1)).with_check_interval(Duration::from_millis(250));
    assert_eq!(config.check_interval_ms, 250);
  }

  #[test]
  fn deserializes_with_interval_default() {
    let config: TrackerConfig = toml::from_str("timeout_ms = 5000").unwrap();
    assert_eq!(config.timeout_ms, Some(5000));
    assert_eq!(config.check_interval_ms, 1000);
  }

  #[test]
  fn deserializes_empty_document() {
    let config: TrackerConfig = toml::from_str("").unwrap();
    assert_eq!(config.timeout_ms, None);
    assert_eq!(config.check_interval_ms, 1000);
  }

  #[test]
  fn deserializes_full_document() {
    let config: TrackerConfig = toml::from_str("timeout_ms = 30000\ncheck_interval_ms = 500").unwrap();
    assert_eq!(config.timeout_ms, Some(30_000));
    assert_eq!(config.check_interval_ms, 500);
  }
}
