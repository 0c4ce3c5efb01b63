//! Failure injection for the in-memory stores.
//!
//! Lets tests simulate an unreachable backend, a scripted sequence of
//! failures, or a store that rejects specific row keys, and records every
//! call for later assertions.
//!
//! ```rust
//! use postbridge_core::Backend;
//! use postbridge_storage::memory::{FaultInjector, MockFailure};
//!
//! let faults = FaultInjector::new(Backend::Cassandra);
//! faults.push_failures([MockFailure::Unavailable("connection refused"), MockFailure::Ok]);
//! assert!(faults.check("upsert", "a").is_err());
//! assert!(faults.check("upsert", "b").is_ok());
//! assert_eq!(faults.failed_calls("upsert"), 1);
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use postbridge_core::{Backend, CoreError, CoreResult};

/// Scripted outcome for one store call.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Connectivity failure, surfaced as `BackendUnavailable`.
    Unavailable(&'static str),

    /// Server-side rejection, surfaced as `Storage`.
    Rejected(&'static str),

    /// Success (no error).
    Ok,
}

impl MockFailure {
    fn to_error(&self, backend: Backend) -> Option<CoreError> {
        match self {
            MockFailure::Unavailable(msg) => Some(CoreError::unavailable(backend, *msg)),
            MockFailure::Rejected(msg) => Some(CoreError::Storage(format!("rejected: {msg}"))),
            MockFailure::Ok => None,
        }
    }
}

/// One recorded store call.
#[derive(Debug, Clone)]
pub struct CallHistoryEntry {
    /// Operation name, e.g. `"insert"`, `"upsert_batch"`, `"find_all"`.
    pub operation: String,

    /// Collection, table or row key the call targeted.
    pub key: String,

    /// Whether the call succeeded.
    pub success: bool,

    /// When the call happened.
    pub timestamp: Instant,
}

/// Shared failure state for one in-memory store.
#[derive(Debug)]
pub struct FaultInjector {
    backend: Backend,
    failure_queue: RwLock<VecDeque<MockFailure>>,
    offline: AtomicBool,
    rejected_keys: RwLock<HashSet<String>>,
    call_history: RwLock<Vec<CallHistoryEntry>>,
    latency: RwLock<Duration>,
}

impl FaultInjector {
    /// Creates an injector that never fails.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            failure_queue: RwLock::new(VecDeque::new()),
            offline: AtomicBool::new(false),
            rejected_keys: RwLock::new(HashSet::new()),
            call_history: RwLock::new(Vec::new()),
            latency: RwLock::new(Duration::ZERO),
        }
    }

    /// Backend this injector impersonates.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Appends scripted outcomes. They are consumed one per call, in order;
    /// once the queue is empty every call succeeds.
    pub fn push_failures(&self, pattern: impl IntoIterator<Item = MockFailure>) {
        self.failure_queue.write().extend(pattern);
    }

    /// Marks the store as unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Returns true while the store is marked unreachable.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Makes every write of `key` fail with a `Storage` error.
    pub fn reject_key(&self, key: impl Into<String>) {
        self.rejected_keys.write().insert(key.into());
    }

    /// Simulated per-call latency.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    pub(crate) fn latency(&self) -> Duration {
        *self.latency.read()
    }

    /// Checks the offline flag and the failure queue for one call.
    ///
    /// # Errors
    ///
    /// Returns the injected error, recording the failed call.
    pub fn check(&self, operation: &str, key: &str) -> CoreResult<()> {
        if self.is_offline() {
            self.record_call(operation, key, false);
            return Err(CoreError::unavailable(self.backend, "connection refused"));
        }
        let scripted = self.failure_queue.write().pop_front();
        if let Some(error) = scripted.and_then(|f| f.to_error(self.backend)) {
            self.record_call(operation, key, false);
            return Err(error);
        }
        Ok(())
    }

    /// Returns the first rejected key among `keys`, if any.
    pub(crate) fn first_rejected<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Option<String> {
        let rejected = self.rejected_keys.read();
        if rejected.is_empty() {
            return None;
        }
        keys.into_iter()
            .find(|k| rejected.contains(*k))
            .map(str::to_string)
    }

    /// Records a call in the history.
    pub fn record_call(&self, operation: &str, key: &str, success: bool) {
        self.call_history.write().push(CallHistoryEntry {
            operation: operation.to_string(),
            key: key.to_string(),
            success,
            timestamp: Instant::now(),
        });
    }

    /// Returns a copy of the call history.
    #[must_use]
    pub fn call_history(&self) -> Vec<CallHistoryEntry> {
        self.call_history.read().clone()
    }

    /// Number of successful calls of `operation`.
    #[must_use]
    pub fn successful_calls(&self, operation: &str) -> usize {
        self.count_calls(operation, true)
    }

    /// Number of failed calls of `operation`.
    #[must_use]
    pub fn failed_calls(&self, operation: &str) -> usize {
        self.count_calls(operation, false)
    }

    /// Number of calls whose operation name starts with `prefix`.
    #[must_use]
    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation.starts_with(prefix))
            .count()
    }

    fn count_calls(&self, operation: &str, success: bool) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == operation && entry.success == success)
            .count()
    }

    /// Clears the history, the queue, rejected keys and the offline flag.
    pub fn reset(&self) {
        self.call_history.write().clear();
        self.failure_queue.write().clear();
        self.rejected_keys.write().clear();
        self.set_offline(false);
    }
}
