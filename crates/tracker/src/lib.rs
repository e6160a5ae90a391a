//! Correlate asynchronously arriving messages with registered expectations.
//!
//! For protocols without correlation ids: callers register an expectation
//! together with a filter that recognizes the reply they are waiting for,
//! then feed every incoming message to the tracker. The first registered
//! expectation whose filter claims a message is settled with it; anything
//! nothing ever claims is expired by a periodic sweep.
//!
//! ```no_run
//! use std::time::Duration;
//! use message_tracker::{Decision, Expectation, Tracker, TrackerConfig};
//! use serde_json::{Value, json};
//!
//! # async fn demo() {
//! let tracker: Tracker<Value, Value, String> =
//!     Tracker::new(TrackerConfig::new(Duration::from_secs(10))).unwrap();
//!
//! let reply = tracker.register(Expectation::new(
//!     json!({"id": 2}),
//!     "TIMEOUT".to_string(),
//!     |cx| {
//!         if cx.message["id"] == cx.current["id"] {
//!             Decision::Resolve(cx.message.clone())
//!         } else {
//!             Decision::Skip
//!         }
//!     },
//! ));
//!
//! // Later, on the receive path:
//! tracker.match_message(&json!({"id": 2}));
//!
//! assert_eq!(reply.await.unwrap(), json!({"id": 2}));
//! # }
//! ```

mod config;
mod error;
mod expectation;
mod tracker;

pub use config::TrackerConfig;
pub use error::{ConfigError, Rejection};
pub use expectation::{Completion, Decision, Expectation, FilterFn, MatchContext, Params};
pub use tracker::Tracker;
