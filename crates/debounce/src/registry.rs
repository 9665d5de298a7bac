//! Keyed registry of debouncers
//!
//! Explicitly constructed and injectable rather than process-global: hosts
//! create one registry per scope (process, service, test) and tear it down
//! when done. The registry guarantees that exactly one debouncer instance is
//! ever observable per key.

use crate::debouncer::Debouncer;
use crate::error::{DebounceError, Result};
use crate::task::DebounceTask;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

/// Concurrency-safe mapping from key to its single [`Debouncer`]
pub struct DebounceRegistry {
    debouncers: DashMap<String, Debouncer>,
    /// Monotonic counter backing generated keys
    next_key: AtomicU64,
    closed: AtomicBool,
}

impl DebounceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            debouncers: DashMap::new(),
            next_key: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Resolve the task's debouncer (creating it on first sight of the key)
    /// and run the submit protocol
    ///
    /// A keyless task gets a generated key first. Returns the per-key handle
    /// shared by every call for that key, so a caller may await idleness.
    pub fn submit(&self, task: DebounceTask) -> Result<Debouncer> {
        self.ensure_open()?;

        let debouncer = match task.key() {
            Some("") => return Err(DebounceError::EmptyKey),
            Some(key) => self.resolve(key)?,
            None => self.resolve_generated()?,
        };

        let (_, delay, mode, action) = task.into_parts();
        debouncer.submit_parts(delay, mode, action)?;
        Ok(debouncer)
    }

    /// Get or create the debouncer for `key` without submitting anything
    pub fn debouncer(&self, key: &str) -> Result<Debouncer> {
        self.ensure_open()?;
        if key.is_empty() {
            return Err(DebounceError::EmptyKey);
        }
        self.resolve(key)
    }

    fn resolve(&self, key: &str) -> Result<Debouncer> {
        if let Some(existing) = self.debouncers.get(key) {
            return Ok(existing.clone());
        }

        // The entry API makes the insert atomic: a caller losing the race
        // above still lands on the winner's instance here
        let debouncer = match self.debouncers.entry(key.to_owned()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let debouncer = Debouncer::spawn(key.to_owned())?;
                entry.insert(debouncer.clone());
                debug!(key, "registered debouncer");
                debouncer
            }
        };

        self.reject_if_closed(key)?;
        Ok(debouncer)
    }

    /// Claim a generated key and create its debouncer in one atomic step,
    /// so an explicit registration can never end up sharing a keyless
    /// task's debouncer
    fn resolve_generated(&self) -> Result<Debouncer> {
        loop {
            let id = self.next_key.fetch_add(1, Ordering::Relaxed);
            let key = id.to_string();

            let debouncer = match self.debouncers.entry(key) {
                // Taken by an explicit registration; advance to the next id
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    let debouncer = Debouncer::spawn(entry.key().clone())?;
                    entry.insert(debouncer.clone());
                    debouncer
                }
            };

            debug!(key = %debouncer.key(), "registered debouncer");
            self.reject_if_closed(debouncer.key())?;
            return Ok(debouncer);
        }
    }

    /// Shutdown may drain the map between the `ensure_open` check and an
    /// insert; dispose the straggler so no worker survives into a closed
    /// registry. Must be called with no entry guard held for `key`.
    fn reject_if_closed(&self, key: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            if let Some((_, straggler)) = self.debouncers.remove(key) {
                straggler.shutdown();
            }
            return Err(DebounceError::RegistryClosed);
        }
        Ok(())
    }

    /// Whether a debouncer exists for `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.debouncers.contains_key(key)
    }

    /// Produce a fresh key for a keyless task
    ///
    /// The decimal counter advances atomically, so concurrent generators can
    /// never hand out the same key; values already taken by explicit keys
    /// are skipped. The returned key is not reserved: an explicit
    /// registration racing between generation and use can still claim it.
    /// Keyless submits do not go through here; they claim their generated
    /// key atomically instead.
    pub fn generate_key(&self) -> String {
        loop {
            let id = self.next_key.fetch_add(1, Ordering::Relaxed);
            let key = id.to_string();
            if !self.debouncers.contains_key(&key) {
                return key;
            }
        }
    }

    /// Dispose of the debouncer for `key`: stop its worker, join it, drop
    /// the registry entry
    ///
    /// Returns `false` when no such key exists. Outstanding handles for the
    /// key stay valid as references, but their submits fail with
    /// [`DebounceError::WorkerTerminated`].
    pub fn remove(&self, key: &str) -> bool {
        match self.debouncers.remove(key) {
            Some((_, debouncer)) => {
                debouncer.shutdown();
                true
            }
            None => false,
        }
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        self.debouncers.len()
    }

    /// True when no key has been registered
    pub fn is_empty(&self) -> bool {
        self.debouncers.is_empty()
    }

    /// Tear the registry down: stop every worker and reject further submits
    ///
    /// Idempotent; also invoked on drop.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let keys: Vec<String> = self.debouncers.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, debouncer)) = self.debouncers.remove(&key) {
                debouncer.shutdown();
            }
        }

        info!("debounce registry shut down");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DebounceError::RegistryClosed);
        }
        Ok(())
    }
}

impl Default for DebounceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DebounceRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    const DELAY: Duration = Duration::from_millis(100);

    #[test]
    fn test_one_instance_per_key() {
        let registry = DebounceRegistry::new();

        let a1 = registry.debouncer("a").unwrap();
        let a2 = registry.debouncer("a").unwrap();
        let b = registry.debouncer("b").unwrap();

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_submit_returns_shared_handle() {
        let registry = DebounceRegistry::new();

        let h1 = registry
            .submit(DebounceTask::with_key("k", DELAY, || {}))
            .unwrap();
        let h2 = registry
            .submit(DebounceTask::with_key("k", DELAY, || {}))
            .unwrap();

        assert_eq!(h1, h2);
        assert_eq!(h1.key(), "k");
    }

    #[test]
    fn test_keyless_submits_get_distinct_keys() {
        let registry = DebounceRegistry::new();
        let mut keys = std::collections::HashSet::new();

        for _ in 0..8 {
            let handle = registry.submit(DebounceTask::new(DELAY, || {})).unwrap();
            keys.insert(handle.key().to_owned());
        }

        assert_eq!(keys.len(), 8);
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_generated_keys_skip_explicit_ones() {
        let registry = DebounceRegistry::new();

        // Take the first counter value as an explicit key
        registry.debouncer("0").unwrap();

        let key = registry.generate_key();
        assert_ne!(key, "0");
        assert!(!registry.contains_key(&key));
    }

    #[test]
    fn test_generate_key_is_race_free() {
        let registry = Arc::new(DebounceRegistry::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                (0..50).map(|_| registry.generate_key()).collect::<Vec<_>>()
            }));
        }

        let mut all = std::collections::HashSet::new();
        for handle in handles {
            for key in handle.join().unwrap() {
                assert!(all.insert(key), "duplicate generated key");
            }
        }
        assert_eq!(all.len(), 200);
    }

    #[test]
    fn test_empty_key_rejected() {
        let registry = DebounceRegistry::new();

        assert!(matches!(
            registry.debouncer(""),
            Err(DebounceError::EmptyKey)
        ));
        assert!(matches!(
            registry.submit(DebounceTask::with_key("", DELAY, || {})),
            Err(DebounceError::EmptyKey)
        ));
    }

    #[test]
    fn test_remove_disposes_worker() {
        let registry = DebounceRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&counter);
        let handle = registry
            .submit(DebounceTask::with_key("k", DELAY, move || {
                flag.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(registry.remove("k"));
        assert!(!registry.contains_key("k"));
        assert!(!registry.remove("k"));

        // The stale handle rejects further submits and its pending run died
        // with the worker
        assert!(matches!(
            handle.submit(DebounceTask::with_key("k", DELAY, || {})),
            Err(DebounceError::WorkerTerminated { .. })
        ));
        std::thread::sleep(DELAY * 2);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_keyless_submit_claims_unused_key() {
        let registry = DebounceRegistry::new();

        // Occupy the first counter values with explicit keys
        registry.debouncer("0").unwrap();
        registry.debouncer("1").unwrap();

        let handle = registry.submit(DebounceTask::new(DELAY, || {})).unwrap();
        assert_ne!(handle.key(), "0");
        assert_ne!(handle.key(), "1");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_shutdown_racing_submit_leaves_no_workers() {
        use std::sync::Barrier;
        use std::thread;

        for _ in 0..200 {
            let registry = Arc::new(DebounceRegistry::new());
            let barrier = Arc::new(Barrier::new(2));

            let submitter = {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.submit(DebounceTask::with_key("k", DELAY, || {}))
                })
            };
            let closer = {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.shutdown();
                })
            };

            let submitted = submitter.join().unwrap();
            closer.join().unwrap();

            // Whichever side won, no debouncer may survive into the closed
            // registry
            assert_eq!(registry.len(), 0, "debouncer survived shutdown");
            assert!(matches!(
                submitted,
                Ok(_)
                    | Err(DebounceError::RegistryClosed)
                    | Err(DebounceError::WorkerTerminated { .. })
            ));
        }
    }

    #[test]
    fn test_shutdown_closes_registry() {
        let registry = DebounceRegistry::new();
        registry.debouncer("a").unwrap();

        registry.shutdown();
        registry.shutdown(); // idempotent

        assert!(registry.is_empty());
        assert!(matches!(
            registry.submit(DebounceTask::new(DELAY, || {})),
            Err(DebounceError::RegistryClosed)
        ));
        assert!(matches!(
            registry.debouncer("a"),
            Err(DebounceError::RegistryClosed)
        ));
    }
}
