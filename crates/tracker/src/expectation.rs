//! Registration surface: the expectation spec handed to
//! [`Tracker::register`](crate::Tracker::register), the filter calling
//! convention, and the completion handle the caller awaits.

use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
  time::Duration,
};

use tokio::sync::oneshot;

use crate::error::Rejection;

/// Opaque per-registration parameters, passed to the filter untouched.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Boxed filter predicate. Invoked once per pending expectation on every
/// [`match_message`](crate::Tracker::match_message) call.
pub type FilterFn<M, V, E> = Box<dyn Fn(MatchContext<'_, M>) -> Decision<V, E> + Send>;

/// Everything a filter sees for one candidate expectation.
#[derive(Debug)]
pub struct MatchContext<'a, M> {
  /// The incoming message being matched.
  pub message: &'a M,
  /// The message stored when the expectation was registered.
  pub current: &'a M,
  /// Parameters supplied at registration.
  pub params: &'a Params,
}

/// A filter's verdict for one candidate expectation.
///
/// Returning a value (instead of invoking resolve/reject callbacks) makes
/// "decided twice" and "resolved and rejected" unrepresentable: a filter
/// produces exactly one decision per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<V, E> {
  /// The message satisfies this expectation; settle it with this value.
  Resolve(V),
  /// The message corresponds to this expectation but is unacceptable;
  /// settle it with this reason.
  Reject(E),
  /// Not a match; leave the expectation pending.
  Skip,
}

/// Spec for one registration: the stored message, the filter that decides
/// whether an incoming message satisfies it, and what to reject with when
/// it expires unmatched.
pub struct Expectation<M, V, E> {
  pub(crate) message: M,
  pub(crate) filter: FilterFn<M, V, E>,
  pub(crate) expiry_reason: E,
  pub(crate) timeout: Option<Duration>,
  pub(crate) params: Params,
}

impl<M, V, E> Expectation<M, V, E> {
  /// New expectation using the tracker's default timeout and empty params.
  pub fn new<F>(message: M, expiry_reason: E, filter: F) -> Self
  where
    F: Fn(MatchContext<'_, M>) -> Decision<V, E> + Send + 'static,
  {
    Self {
      message,
      filter: Box::new(filter),
      expiry_reason,
      timeout: None,
      params: Params::new(),
    }
  }

  /// Individual timeout for this expectation, overriding the tracker default.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Replace the params map wholesale.
  pub fn params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  /// Insert a single param entry.
  pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }
}

impl<M: std::fmt::Debug, V, E: std::fmt::Debug> std::fmt::Debug for Expectation<M, V, E> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Expectation")
      .field("message", &self.message)
      .field("expiry_reason", &self.expiry_reason)
      .field("timeout", &self.timeout)
      .field("params", &self.params)
      .finish_non_exhaustive()
  }
}

/// Deferred outcome of one registration.
///
/// Settles exactly once, with `Ok(value)` when a filter resolved it, or
/// `Err(Rejection)` when a filter rejected it, it expired, or the tracker
/// shut down. Await it, or probe without blocking via [`try_wait`](Self::try_wait).
#[derive(Debug)]
pub struct Completion<V, E> {
  pub(crate) rx: oneshot::Receiver<Result<V, Rejection<E>>>,
}

impl<V, E> Completion<V, E> {
  /// Non-blocking probe. `None` while the expectation is still pending.
  ///
  /// The settled outcome is consumed by the first call that returns `Some`;
  /// later calls report `Err(Rejection::Closed)`.
  pub fn try_wait(&mut self) -> Option<Result<V, Rejection<E>>> {
    match self.rx.try_recv() {
      Ok(outcome) => Some(outcome),
      Err(oneshot::error::TryRecvError::Empty) => None,
      Err(oneshot::error::TryRecvError::Closed) => Some(Err(Rejection::Closed)),
    }
  }
}

impl<V, E> Future for Completion<V, E> {
  type Output = Result<V, Rejection<E>>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match Pin::new(&mut self.get_mut().rx).poll(cx) {
      Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
      Poll::Ready(Err(_)) => Poll::Ready(Err(Rejection::Closed)),
      Poll::Pending => Poll::Pending,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  fn skip_all(_: MatchContext<'_, i32>) -> Decision<i32, String> {
    Decision::Skip
  }

  #[test]
  fn builder_defaults() {
    let exp = Expectation::new(1, "TIMEOUT".to_string(), skip_all);
    assert_eq!(exp.timeout, None);
    assert!(exp.params.is_empty());
  }

  #[test]
  fn builder_sets_timeout_and_params() {
    let exp = Expectation::new(1, "TIMEOUT".to_string(), skip_all)
      .timeout(Duration::from_secs(5))
      .param("channel", "control")
      .param("attempt", 2);

    assert_eq!(exp.timeout, Some(Duration::from_secs(5)));
    assert_eq!(exp.params.get("channel"), Some(&json!("control")));
    assert_eq!(exp.params.get("attempt"), Some(&json!(2)));
  }

  #[test]
  fn completion_reports_closed_when_sender_dropped() {
    let (tx, rx) = oneshot::channel::<Result<i32, Rejection<String>>>();
    let mut completion = Completion { rx };
    drop(tx);
    assert_eq!(completion.try_wait(), Some(Err(Rejection::Closed)));
  }

  #[test]
  fn completion_try_wait_yields_outcome() {
    let (tx, rx) = oneshot::channel::<Result<i32, Rejection<String>>>();
    let mut completion = Completion { rx };
    assert_eq!(completion.try_wait(), None);
    tx.send(Ok(7)).unwrap();
    assert_eq!(completion.try_wait(), Some(Ok(7)));
  }
}
