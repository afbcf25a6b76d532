// SPDX-License-Identifier: MIT OR Apache-2.0
//! Optional metrics capability handles with no-op defaults.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ── Capability traits ───────────────────────────────────────────────

/// Monotonically increasing event counter.
pub trait Counter: Send + Sync {
    /// Add one to the counter.
    fn increment(&self);
}

/// Records a discrete per-invocation count (e.g. retries consumed).
pub trait CountRecorder: Send + Sync {
    /// Record one observation.
    fn record(&self, count: u32);
}

/// Records a per-invocation latency.
pub trait LatencyTimer: Send + Sync {
    /// Record one observed duration.
    fn record(&self, elapsed: Duration);
}

// ── In-memory implementations ───────────────────────────────────────

/// Atomic in-memory [`Counter`], handy for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    value: AtomicU64,
}

impl InMemoryCounter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

impl Counter for InMemoryCounter {
    fn increment(&self) {
        self.value.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory [`CountRecorder`] keeping every observation.
#[derive(Debug, Default)]
pub struct InMemoryCountRecorder {
    observations: Mutex<Vec<u32>>,
}

impl InMemoryCountRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded counts.
    #[must_use]
    pub fn observations(&self) -> Vec<u32> {
        self.observations.lock().expect("recorder lock poisoned").clone()
    }
}

impl CountRecorder for InMemoryCountRecorder {
    fn record(&self, count: u32) {
        self.observations
            .lock()
            .expect("recorder lock poisoned")
            .push(count);
    }
}

/// In-memory [`LatencyTimer`] keeping every observation.
#[derive(Debug, Default)]
pub struct InMemoryLatencyTimer {
    observations: Mutex<Vec<Duration>>,
}

impl InMemoryLatencyTimer {
    /// Create an empty timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded latencies.
    #[must_use]
    pub fn observations(&self) -> Vec<Duration> {
        self.observations.lock().expect("timer lock poisoned").clone()
    }
}

impl LatencyTimer for InMemoryLatencyTimer {
    fn record(&self, elapsed: Duration) {
        self.observations
            .lock()
            .expect("timer lock poisoned")
            .push(elapsed);
    }
}

// ── MetricsHandles ──────────────────────────────────────────────────

/// The invocation's optional metrics handles.
///
/// Every handle is independently optional; recording through an absent
/// handle is a silent no-op, so call sites never branch.
#[derive(Clone, Default)]
pub struct MetricsHandles {
    /// Incremented once per attempt that terminates in success.
    pub success: Option<Arc<dyn Counter>>,
    /// Incremented once per attempt that terminates in a 4xx-category error.
    pub client_error_4xx: Option<Arc<dyn Counter>>,
    /// Incremented once per attempt that terminates in a 5xx-category error.
    pub server_error_5xx: Option<Arc<dyn Counter>>,
    /// Records the number of retries an invocation consumed.
    pub retry_count: Option<Arc<dyn CountRecorder>>,
    /// Records the invocation's overall wall-clock latency.
    pub latency: Option<Arc<dyn LatencyTimer>>,
}

impl std::fmt::Debug for MetricsHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsHandles")
            .field("success", &self.success.is_some())
            .field("client_error_4xx", &self.client_error_4xx.is_some())
            .field("server_error_5xx", &self.server_error_5xx.is_some())
            .field("retry_count", &self.retry_count.is_some())
            .field("latency", &self.latency.is_some())
            .finish()
    }
}

impl MetricsHandles {
    /// Handles with every slot absent.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Increment the success counter, if present.
    pub fn record_success(&self) {
        if let Some(c) = &self.success {
            c.increment();
        }
    }

    /// Increment the 4xx counter, if present.
    pub fn record_client_error(&self) {
        if let Some(c) = &self.client_error_4xx {
            c.increment();
        }
    }

    /// Increment the 5xx counter, if present.
    pub fn record_server_error(&self) {
        if let Some(c) = &self.server_error_5xx {
            c.increment();
        }
    }

    /// Record the consumed retry count, if a recorder is present.
    pub fn record_retry_count(&self, count: u32) {
        if let Some(r) = &self.retry_count {
            r.record(count);
        }
    }

    /// Record the overall invocation latency, if a timer is present.
    pub fn record_latency(&self, elapsed: Duration) {
        if let Some(t) = &self.latency {
            t.record(elapsed);
        }
    }
}
