//! Error types for debounce submission and registry lifecycle

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DebounceError>;

/// Errors reported synchronously to the caller of `submit`
///
/// Action-body failures are never part of this taxonomy: they are isolated
/// to the worker thread and logged there.
#[derive(Debug, Error)]
pub enum DebounceError {
    /// An explicit key was given but is empty
    #[error("debounce key must not be empty")]
    EmptyKey,

    /// A task carrying an explicit key was submitted to a debouncer serving
    /// a different key
    #[error("task key `{found}` does not match debouncer key `{expected}`")]
    KeyMismatch { expected: String, found: String },

    /// The registry has been shut down and rejects new work
    #[error("debounce registry has been shut down")]
    RegistryClosed,

    /// The worker thread for a key could not be created
    #[error("failed to spawn debounce worker for key `{key}`")]
    WorkerSpawn {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The worker for this key was disposed; the handle is stale
    #[error("debounce worker for key `{key}` has been terminated")]
    WorkerTerminated { key: String },
}
