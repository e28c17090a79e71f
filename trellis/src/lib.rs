#![cfg_attr(docsrs, feature(doc_cfg))]
//! # Trellis
//!
//! A hierarchical topic publish/subscribe engine.
//!
//! Listeners subscribe to delimiter-separated patterns with `*` and `**`
//! wildcards. Publishers emit payloads on concrete topics and every matching
//! listener runs synchronously, in a deterministic order, before `emit`
//! returns. Topics can keep a retained message that is replayed to late
//! subscribers, and [`Scope`]s give components a namespaced view of a shared
//! emitter.
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis::{Emitter, Result};
//!
//! fn main() -> Result {
//!     let emitter = Emitter::<f64, String>::default();
//!
//!     emitter.on("sensor.*.temp", |msg| Ok(format!("{} = {}", msg.topic(), msg.payload())))?;
//!     emitter.on("sensor.**", |msg| Ok(format!("any sensor: {}", msg.topic())))?;
//!
//!     let results = emitter.emit("sensor.kitchen.temp", 21.5)?;
//!     assert_eq!(results.len(), 2);
//!     assert_eq!(results[0].as_deref().ok(), Some("sensor.kitchen.temp = 21.5"));
//!     Ok(())
//! }
//! ```
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Emitter`] | Owns the subscription tree, dispatches messages |
//! | [`Scope`] | Prefixed view over an emitter |
//! | [`Message`] | Payload plus topic, id, timestamp and [`Meta`] |
//! | [`Emission`] | Everything `emit_with` accepts: topic, payload, retain flag, meta |
//! | [`Subscription`] | Handle returned by every registration |
//! | [`Config`] | Delimiter, error policy and static meta |
//! | [`Error`] | The one error type of the crate |
//!
//! ## Patterns
//!
//! With the default `.` delimiter:
//!
//! | Pattern | Matches | Does not match |
//! |---------|---------|----------------|
//! | `a.b` | `a.b` | `a.b.c` |
//! | `a.*.c` | `a.x.c` | `a.c`, `a.x.y.c` |
//! | `a.**` | `a.b`, `a.b.c` | `a` |
//!
//! `**` is only valid as the last segment. Emitted topics never contain
//! wildcards.
//!
//! ## Listener failures
//!
//! A listener fails by returning `Err` or by panicking. By default the
//! failure is stored in that listener's [`Outcome`] slot and dispatch goes on.
//! With [`Config::with_ignore_errors(false)`](Config::with_ignore_errors) the
//! first failure aborts dispatch and comes back from `emit` as
//! [`Error::Listener`]. Every failure is also handed to the
//! `on_listener_error` hook of [`EmitterBuilder`] and logged with `tracing`.
//!
//! ## Features
//!
//! - **`serde`** - `Serialize`/`Deserialize` for [`Message`], [`Meta`], [`MessageId`] and [`Config`]
//! - **`test-harness`** - [`testing::Spy`], a recording listener for tests

mod config;
mod emission;
mod emitter;
mod emitter_builder;
mod error;
mod listener;
mod message;
mod meta;
mod scope;
mod subscription;

pub mod executor;
pub mod topic;

mod internal;

#[cfg(any(test, feature = "test-harness"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-harness")))]
pub mod testing;

pub use config::Config;
pub use emission::Emission;
pub use emitter::Emitter;
pub use emitter_builder::EmitterBuilder;
pub use error::{BoxError, Error, ListenerError, ListenerPanic};
pub use listener::{ListenerId, ListenerResult, Outcome};
pub use message::{Message, MessageId};
pub use meta::Meta;
pub use scope::Scope;
pub use subscription::Subscription;
pub use topic::{Pattern, Topic};

/// Convenience alias for `Result<T, trellis::Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;
