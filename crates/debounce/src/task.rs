//! Task descriptor for a debounced call

use std::fmt;
use std::time::Duration;

/// Re-scheduling policy for a debounced task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebounceMode {
    /// Postpone execution by the delay on every call; the last call in a
    /// burst is the one that runs
    #[default]
    Delay,

    /// Only the first call of a burst schedules an execution. A second call
    /// made before the action fires cancels it and suppresses the burst
    /// entirely.
    Cancel,
}

/// Boxed zero-argument action; any result is discarded
pub(crate) type Action = Box<dyn FnOnce() + Send + 'static>;

/// One debounced call: key, quiescence window, mode and the action to run
///
/// The key is optional; the registry assigns a generated key on submit when
/// none is given.
pub struct DebounceTask {
    key: Option<String>,
    delay: Duration,
    mode: DebounceMode,
    action: Action,
}

impl DebounceTask {
    /// Create a keyless task with the default [`DebounceMode::Delay`]
    pub fn new(delay: Duration, action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            key: None,
            delay,
            mode: DebounceMode::Delay,
            action: Box::new(action),
        }
    }

    /// Create a task bound to an explicit key
    pub fn with_key(
        key: impl Into<String>,
        delay: Duration,
        action: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            key: Some(key.into()),
            delay,
            mode: DebounceMode::Delay,
            action: Box::new(action),
        }
    }

    /// Override the re-scheduling mode
    pub fn with_mode(mut self, mode: DebounceMode) -> Self {
        self.mode = mode;
        self
    }

    /// The key this task debounces under, if one was given
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The quiescence window
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The re-scheduling mode
    pub fn mode(&self) -> DebounceMode {
        self.mode
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Duration, DebounceMode, Action) {
        (self.key, self.delay, self.mode, self.action)
    }
}

impl fmt::Debug for DebounceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceTask")
            .field("key", &self.key)
            .field("delay", &self.delay)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
