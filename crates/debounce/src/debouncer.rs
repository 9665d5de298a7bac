//! Per-key scheduling unit
//!
//! A [`Debouncer`] owns one dedicated worker thread and tracks at most one
//! scheduled-but-not-yet-fired execution. Handles are cheap to clone and all
//! clones drive the same underlying unit; the registry hands out clones so
//! exactly one unit exists per key.

use crate::error::{DebounceError, Result};
use crate::task::{Action, DebounceMode, DebounceTask};
use crate::worker::{self, Command, Phase, ScheduledRun, Shared};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Handle to the scheduling unit for one key
#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<Inner>,
}

struct Inner {
    shared: Arc<Shared>,
    tx: Sender<Command>,
    /// Join handle for the worker; taken on disposal
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Spawn the worker thread and return the handle for `key`
    pub(crate) fn spawn(key: String) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::new(key));
        let worker_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name(format!("debounce-{}", shared.key))
            .spawn(move || worker::run(rx, worker_shared))
            .map_err(|source| DebounceError::WorkerSpawn {
                key: shared.key.clone(),
                source,
            })?;

        info!(key = %shared.key, "spawned debounce worker");

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                tx,
                worker: Mutex::new(Some(handle)),
            }),
        })
    }

    /// The key this debouncer serves
    pub fn key(&self) -> &str {
        &self.inner.shared.key
    }

    /// Run the cancel-then-maybe-schedule protocol for `task`
    ///
    /// Returns as soon as the scheduling decision is made. The action, if
    /// scheduled, runs on the worker thread after the task's delay elapses
    /// without a superseding call; it never runs on the caller's thread.
    ///
    /// A task carrying an explicit key must match this handle's key.
    pub fn submit(&self, task: DebounceTask) -> Result<()> {
        if let Some(key) = task.key() {
            if key != self.key() {
                return Err(DebounceError::KeyMismatch {
                    expected: self.key().to_owned(),
                    found: key.to_owned(),
                });
            }
        }
        let (_, delay, mode, action) = task.into_parts();
        self.submit_parts(delay, mode, action)
    }

    /// Protocol body, shared with the registry path (which has already
    /// resolved the key)
    ///
    /// Holds the state lock across the whole cancel-then-maybe-schedule
    /// sequence: concurrent submits cannot both observe an idle phase, nor
    /// race the cancellation of the same pending run.
    pub(crate) fn submit_parts(
        &self,
        delay: Duration,
        mode: DebounceMode,
        action: Action,
    ) -> Result<()> {
        let shared = &self.inner.shared;
        let mut state = shared.state.lock();

        let schedule = match mode {
            DebounceMode::Delay => true,
            DebounceMode::Cancel => state.phase == Phase::Idle,
        };

        if schedule {
            // Bumping the sequence number cancels any scheduled run that has
            // not started yet; a run already mid-flight is past cancelling
            // and is left alone.
            state.seq += 1;
            state.phase = Phase::Scheduled;
            let run = ScheduledRun {
                seq: state.seq,
                deadline: Instant::now() + delay,
                action,
            };
            debug!(key = %shared.key, seq = state.seq, ?delay, ?mode, "scheduling debounced action");
            if self.inner.tx.send(Command::Schedule(run)).is_err() {
                state.phase = Phase::Idle;
                shared.idle.notify_all();
                return Err(DebounceError::WorkerTerminated {
                    key: shared.key.clone(),
                });
            }
        } else if state.phase == Phase::Scheduled {
            // Cancel mode with a pending run: cancel it and drop this call,
            // suppressing the burst entirely
            state.seq += 1;
            state.phase = Phase::Idle;
            shared.idle.notify_all();
            debug!(key = %shared.key, "cancel mode suppressed the burst");
        } else {
            // Cancel mode while the previous action is mid-run: the call is
            // dropped and the running action finishes undisturbed
            debug!(key = %shared.key, "cancel mode dropped call during run");
        }

        Ok(())
    }

    /// True when no execution is scheduled or running for this key
    pub fn is_idle(&self) -> bool {
        self.inner.shared.state.lock().phase == Phase::Idle
    }

    /// Block until this debouncer is idle, up to `timeout`
    ///
    /// Returns `true` if idle was observed before the timeout expired.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let shared = &self.inner.shared;
        let deadline = Instant::now() + timeout;
        let mut state = shared.state.lock();
        while state.phase != Phase::Idle {
            if shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.phase == Phase::Idle;
            }
        }
        true
    }

    /// Stop the worker and join it; later submits through any clone of this
    /// handle fail with [`DebounceError::WorkerTerminated`]
    pub(crate) fn shutdown(&self) {
        // The worker may already be gone; a failed send is fine
        let _ = self.inner.tx.send(Command::Shutdown);

        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            // An action disposing its own debouncer cannot join itself
            if thread::current().id() != handle.thread().id() {
                let _ = handle.join();
            }
        }

        // A run dropped by the shutdown must not leave idle waiters hanging
        let mut state = self.inner.shared.state.lock();
        state.seq += 1;
        state.phase = Phase::Idle;
        self.inner.shared.idle.notify_all();

        info!(key = %self.key(), "debounce worker shut down");
    }
}

impl PartialEq for Debouncer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Debouncer {}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("key", &self.key())
            .field("idle", &self.is_idle())
            .finish_non_exhaustive()
    }
}
