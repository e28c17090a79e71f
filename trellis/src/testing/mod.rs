//! Test helpers for observing message flow.
//!
//! Enable with the `test-harness` feature:
//!
//! ```toml
//! [dev-dependencies]
//! trellis = { version = "0.1", features = ["test-harness"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use trellis::{Emitter, testing::Spy};
//!
//! let emitter = Emitter::<u32>::default();
//! let spy = Spy::new();
//! emitter.on("orders.**", spy.listener())?;
//!
//! emitter.emit("orders.eu.created", 7)?;
//!
//! assert!(spy.was_called());
//! assert_eq!(spy.topics(), ["orders.eu.created"]);
//! assert_eq!(spy.matching(|m| *m.payload() > 5).len(), 1);
//! ```
//!
//! # Note
//!
//! Spies use `Rc` internally and are `!Send`, like the emitter they observe.

mod spy;

pub use spy::Spy;
