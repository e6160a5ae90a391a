//! The tracker: registration store, matcher, and expiry sweeper.
//!
//! All store access goes through one mutex so `register`, `match_message`,
//! and the sweep never observe each other mid-mutation, and an expectation
//! can only ever be settled by whichever of them removes it first.

use std::{
  panic::{AssertUnwindSafe, catch_unwind},
  sync::{
    Arc, Mutex, MutexGuard, PoisonError, Weak,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use tokio::{sync::oneshot, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
  config::TrackerConfig,
  error::{ConfigError, Rejection},
  expectation::{Completion, Decision, Expectation, FilterFn, MatchContext, Params},
};

/// One registered, not-yet-settled expectation.
struct Pending<M, V, E> {
  message: M,
  filter: FilterFn<M, V, E>,
  reply: oneshot::Sender<Result<V, Rejection<E>>>,
  registered_at: Instant,
  timeout: Duration,
  expiry_reason: E,
  params: Params,
}

/// Store contents, in insertion order, plus the sweeper flag.
///
/// The flag lives under the same lock as the store so a sweep deciding to
/// stop and a `register` deciding to start cannot both conclude the sweeper
/// needs spawning.
struct State<M, V, E> {
  pending: Vec<Pending<M, V, E>>,
  sweeper_active: bool,
}

struct Inner<M, V, E> {
  state: Mutex<State<M, V, E>>,
  default_timeout_ms: AtomicU64,
  check_interval: Duration,
  cancel: CancellationToken,
}

/// Correlates asynchronously arriving messages with expectations registered
/// earlier, using caller-supplied filters instead of protocol-level
/// correlation ids.
///
/// The handle is cheap to clone and can be shared across tasks; all clones
/// see the same store. Register an [`Expectation`], hold on to the returned
/// [`Completion`], and feed every incoming message to
/// [`match_message`](Self::match_message); expectations nothing ever matches
/// are expired by a background sweep that runs only while the store is
/// non-empty.
pub struct Tracker<M, V, E> {
  inner: Arc<Inner<M, V, E>>,
}

impl<M, V, E> Clone for Tracker<M, V, E> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<M, V, E> std::fmt::Debug for Tracker<M, V, E> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Tracker")
      .field("pending", &self.pending_count())
      .field("default_timeout", &self.default_timeout())
      .field("check_interval", &self.inner.check_interval)
      .finish()
  }
}

impl<M, V, E> Tracker<M, V, E> {
  /// Create a tracker from a validated configuration.
  ///
  /// Accepts `TrackerConfig` directly or `Option<TrackerConfig>` (handy when
  /// the config comes from an optional file/section). Fails with
  /// [`ConfigError::Missing`] on `None` and
  /// [`ConfigError::MissingField`] when `timeout_ms` is unset.
  pub fn new(config: impl Into<Option<TrackerConfig>>) -> Result<Self, ConfigError> {
    let config = config.into().ok_or(ConfigError::Missing)?;
    let timeout_ms = config.timeout_ms.ok_or(ConfigError::MissingField("timeout_ms"))?;

    Ok(Self {
      inner: Arc::new(Inner {
        state: Mutex::new(State {
          pending: Vec::new(),
          sweeper_active: false,
        }),
        default_timeout_ms: AtomicU64::new(timeout_ms),
        check_interval: Duration::from_millis(config.check_interval_ms),
        cancel: CancellationToken::new(),
      }),
    })
  }

  /// Register an expectation and get its completion handle.
  ///
  /// Returns immediately; the handle is unsettled until a later
  /// [`match_message`](Self::match_message) call or the expiry sweep settles
  /// it. The effective timeout is the expectation's own value if set, else
  /// the tracker's default *at registration time*; later
  /// [`set_default_timeout`](Self::set_default_timeout) calls do not touch
  /// expectations already registered.
  ///
  /// Must be called from within a Tokio runtime: the first registration into
  /// an empty store spawns the sweep task.
  ///
  /// Registering on a tracker that was already [`close`](Self::close)d does
  /// not leave a pending expectation behind; the returned handle settles
  /// immediately with [`Rejection::Closed`].
  pub fn register(&self, expectation: Expectation<M, V, E>) -> Completion<V, E>
  where
    M: Send + 'static,
    V: Send + 'static,
    E: Send + 'static,
  {
    let (reply_tx, reply_rx) = oneshot::channel();
    let timeout = expectation.timeout.unwrap_or_else(|| self.default_timeout());

    let pending = Pending {
      message: expectation.message,
      filter: expectation.filter,
      reply: reply_tx,
      registered_at: Instant::now(),
      timeout,
      expiry_reason: expectation.expiry_reason,
      params: expectation.params,
    };

    let mut state = self.inner.state();

    // Token is cancelled under this lock by close(), so a registration
    // either lands before the drain or observes the closed state here.
    if self.inner.cancel.is_cancelled() {
      drop(state);
      debug!("registration on closed tracker settled as closed");
      let _ = pending.reply.send(Err(Rejection::Closed));
      return Completion { rx: reply_rx };
    }

    state.pending.push(pending);
    trace!(
      pending = state.pending.len(),
      timeout_ms = timeout.as_millis() as u64,
      "expectation registered"
    );

    if !state.sweeper_active {
      state.sweeper_active = true;
      drop(state);
      Inner::spawn_sweeper(&self.inner);
    }

    Completion { rx: reply_rx }
  }

  /// Match an incoming message against the pending expectations.
  ///
  /// Walks the store in registration order and invokes each filter with the
  /// incoming message, the expectation's stored message, and its params. The
  /// first filter returning [`Decision::Resolve`] or [`Decision::Reject`]
  /// wins: that expectation is removed and settled, the scan stops, and this
  /// returns `true`. Returns `false` when every filter skipped.
  ///
  /// A filter that panics is caught, logged, and treated as
  /// [`Decision::Skip`]; its expectation stays pending.
  ///
  /// Filters run with the tracker's internal lock held: a filter must not
  /// call back into the tracker it is registered with (`register`,
  /// `match_message`, `pending_count`, ...) or it will deadlock.
  pub fn match_message(&self, message: &M) -> bool {
    let mut state = self.inner.state();

    for i in 0..state.pending.len() {
      let decision = {
        let pending = &state.pending[i];
        let cx = MatchContext {
          message,
          current: &pending.message,
          params: &pending.params,
        };
        match catch_unwind(AssertUnwindSafe(|| (pending.filter)(cx))) {
          Ok(decision) => decision,
          Err(_) => {
            warn!("filter panicked; treating as no match");
            Decision::Skip
          }
        }
      };

      match decision {
        Decision::Skip => continue,
        Decision::Resolve(value) => {
          let pending = state.pending.remove(i);
          drop(state);
          debug!("expectation resolved by incoming message");
          let _ = pending.reply.send(Ok(value));
          return true;
        }
        Decision::Reject(reason) => {
          let pending = state.pending.remove(i);
          drop(state);
          debug!("expectation rejected by filter");
          let _ = pending.reply.send(Err(Rejection::Rejected(reason)));
          return true;
        }
      }
    }

    trace!("no pending expectation matched");
    false
  }

  /// The default timeout applied to registrations that don't set their own.
  pub fn default_timeout(&self) -> Duration {
    Duration::from_millis(self.inner.default_timeout_ms.load(Ordering::Relaxed))
  }

  /// Change the default timeout. Affects only future registrations.
  pub fn set_default_timeout(&self, timeout: Duration) {
    self
      .inner
      .default_timeout_ms
      .store(timeout.as_millis() as u64, Ordering::Relaxed);
  }

  /// The sweeper wake period.
  pub fn check_interval(&self) -> Duration {
    self.inner.check_interval
  }

  /// Number of expectations currently pending.
  pub fn pending_count(&self) -> usize {
    self.inner.state().pending.len()
  }

  /// Shut the tracker down.
  ///
  /// Drops every pending expectation (their completion handles settle with
  /// [`Rejection::Closed`]) and stops the sweep task. Dropping the last
  /// `Tracker` clone has the same effect.
  pub fn close(&self) {
    let dropped = {
      let mut state = self.inner.state();
      self.inner.cancel.cancel();
      state.sweeper_active = false;
      std::mem::take(&mut state.pending)
    };
    if !dropped.is_empty() {
      debug!(dropped = dropped.len(), "tracker closed with expectations pending");
    }
    drop(dropped);
  }
}

impl<M, V, E> Inner<M, V, E> {
  fn state(&self) -> MutexGuard<'_, State<M, V, E>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Spawn the sweep task. Caller must have set `sweeper_active` first.
  ///
  /// The task holds only a weak reference so it never keeps a dropped
  /// tracker alive; it exits when cancelled, when the tracker is gone, or
  /// when a sweep leaves the store empty.
  fn spawn_sweeper(inner: &Arc<Self>)
  where
    M: Send + 'static,
    V: Send + 'static,
    E: Send + 'static,
  {
    let weak = Arc::downgrade(inner);
    let cancel = inner.cancel.clone();
    let check_interval = inner.check_interval;

    tokio::spawn(async move {
      trace!(check_interval_ms = check_interval.as_millis() as u64, "sweeper started");
      loop {
        tokio::select! {
          biased;

          _ = cancel.cancelled() => {
            trace!("sweeper cancelled");
            break;
          }

          _ = tokio::time::sleep(check_interval) => {}
        }

        let Some(inner) = Weak::upgrade(&weak) else {
          break;
        };
        if inner.sweep() {
          trace!("store empty, sweeper stopped");
          break;
        }
      }
    });
  }

  /// Expire overdue expectations. Returns true when the store is empty
  /// afterwards and the sweeper should stop.
  fn sweep(&self) -> bool {
    let (expired, stop) = {
      let mut state = self.state();
      let now = Instant::now();

      let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
        .into_iter()
        .partition(|p| now.duration_since(p.registered_at) > p.timeout);
      state.pending = kept;

      let stop = state.pending.is_empty();
      if stop {
        state.sweeper_active = false;
      }
      (expired, stop)
    };

    if !expired.is_empty() {
      debug!(expired = expired.len(), "expired unmatched expectations");
    }
    for pending in expired {
      let _ = pending.reply.send(Err(Rejection::Expired(pending.expiry_reason)));
    }

    stop
  }
}

impl<M, V, E> Drop for Inner<M, V, E> {
  fn drop(&mut self) {
    // Pending reply senders are dropped with the state; receivers see Closed.
    self.cancel.cancel();
  }
}
