//! Keyed debouncing for side-effecting tasks
//!
//! Given a burst of calls sharing a key, at most one action runs per
//! quiescence window: execution is deferred until no new call has arrived
//! for the task's delay.
//!
//! - Per-key isolation: calls with different keys never interact
//! - Two modes: [`DebounceMode::Delay`] (every call resets the timer, the
//!   last call in a burst wins) and [`DebounceMode::Cancel`] (only the first
//!   call of a burst schedules; a second call before firing suppresses the
//!   burst entirely)
//! - One dedicated worker thread per key; actions for a key serialize onto
//!   it and never run on the caller's thread
//!
//! ```no_run
//! use debounce::{DebounceRegistry, DebounceTask};
//! use std::time::Duration;
//!
//! let registry = DebounceRegistry::new();
//! let handle = registry
//!     .submit(DebounceTask::with_key("save", Duration::from_millis(100), || {
//!         println!("saved");
//!     }))
//!     .unwrap();
//!
//! // The handle is shared across all calls for the key
//! handle.wait_idle(Duration::from_millis(500));
//! ```

pub mod debouncer;
pub mod error;
pub mod registry;
pub mod task;

mod worker;

pub use debouncer::Debouncer;
pub use error::{DebounceError, Result};
pub use registry::DebounceRegistry;
pub use task::{DebounceMode, DebounceTask};
