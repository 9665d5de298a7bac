//! Dedicated per-key worker thread
//!
//! Each debouncer owns exactly one worker. The worker's command channel
//! doubles as the debounce timer: the loop waits for the next command with a
//! deadline taken from the pending run, so a newer `Schedule` command wakes
//! the worker and supersedes the run it was sent to replace.

use crate::task::Action;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Commands accepted by a worker thread
pub(crate) enum Command {
    Schedule(ScheduledRun),
    Shutdown,
}

/// One scheduled-but-not-yet-fired execution
pub(crate) struct ScheduledRun {
    pub seq: u64,
    pub deadline: Instant,
    pub action: Action,
}

/// Where a debouncer currently is in its burst lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// No execution scheduled or running
    Idle,
    /// An execution is scheduled but has not started
    Scheduled,
    /// An execution is running on the worker
    Running,
}

/// Submit-protocol state guarded by the debouncer lock
pub(crate) struct State {
    /// Sequence number of the most recent scheduling decision. A scheduled
    /// run fires only while its number is still current; bumping the number
    /// is how a pending run gets cancelled.
    pub seq: u64,
    pub phase: Phase,
}

/// State shared between the debouncer handles and the worker thread
pub(crate) struct Shared {
    pub key: String,
    pub state: Mutex<State>,
    /// Notified whenever `phase` returns to `Idle`
    pub idle: Condvar,
}

impl Shared {
    pub fn new(key: String) -> Self {
        Self {
            key,
            state: Mutex::new(State {
                seq: 0,
                phase: Phase::Idle,
            }),
            idle: Condvar::new(),
        }
    }
}

/// Worker loop: fire the pending run once its deadline passes without a
/// superseding command, exit on shutdown or channel disconnect
pub(crate) fn run(rx: Receiver<Command>, shared: Arc<Shared>) {
    let mut pending: Option<ScheduledRun> = None;

    loop {
        let received = match &pending {
            Some(run) => rx.recv_deadline(run.deadline),
            None => match rx.recv() {
                Ok(command) => Ok(command),
                Err(_) => Err(RecvTimeoutError::Disconnected),
            },
        };

        match received {
            Ok(Command::Schedule(run)) => {
                // Replaces any pending run; the old one was already
                // invalidated by its stale sequence number
                pending = Some(run);
            }
            Ok(Command::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(run) = pending.take() {
                    fire(run, &shared);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(key = %shared.key, "debounce worker stopped");
}

/// Run a due execution unless it was cancelled or superseded after queueing
fn fire(run: ScheduledRun, shared: &Shared) {
    {
        let mut state = shared.state.lock();
        if state.seq != run.seq {
            debug!(key = %shared.key, seq = run.seq, "discarding stale run");
            return;
        }
        state.phase = Phase::Running;
    }

    // The action runs without the state lock so submits stay non-blocking
    let outcome = panic::catch_unwind(AssertUnwindSafe(run.action));
    if outcome.is_err() {
        // One failing action must not take the worker down with it
        error!(key = %shared.key, seq = run.seq, "debounced action panicked");
    }

    let mut state = shared.state.lock();
    if state.seq == run.seq {
        state.phase = Phase::Idle;
        shared.idle.notify_all();
    }
}
