// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! courier-aggregator
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Per-attempt latency records and their per-invocation roll-up.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Serde helper — `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        (val.as_millis() as u64).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Latency of one physical HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRequestRecord {
    /// Wall-clock latency of the attempt.
    #[serde(with = "duration_millis")]
    pub request_latency: Duration,
}

impl OutputRequestRecord {
    /// Record an attempt latency.
    #[must_use]
    pub fn new(request_latency: Duration) -> Self {
        Self { request_latency }
    }
}

/// Backoff wait that preceded a retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttemptRecord {
    /// Duration slept before the attempt was started.
    #[serde(with = "duration_millis")]
    pub retry_wait: Duration,
}

impl RetryAttemptRecord {
    /// Record a backoff wait.
    #[must_use]
    pub fn new(retry_wait: Duration) -> Self {
        Self { retry_wait }
    }
}

/// One entry of a roll-up: the wait that preceded an attempt (`None` for the
/// invocation's first attempt) paired with the attempt itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptEntry {
    /// Wait preceding the attempt, absent for attempt 0.
    pub retry_wait: Option<RetryAttemptRecord>,
    /// The attempt's latency record.
    pub output_request: OutputRequestRecord,
}

/// Per-invocation roll-up: one [`AttemptEntry`] per attempt, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetriableOutputRequestRecord {
    /// Attempts in the order they were made.
    pub output_requests: Vec<AttemptEntry>,
}

impl RetriableOutputRequestRecord {
    /// Number of attempts the invocation made.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.output_requests.len()
    }

    /// Sum of all backoff waits in the roll-up.
    #[must_use]
    pub fn total_retry_wait(&self) -> Duration {
        self.output_requests
            .iter()
            .filter_map(|e| e.retry_wait)
            .map(|w| w.retry_wait)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// OutwardsRequestAggregator
// ---------------------------------------------------------------------------

/// Observer that accumulates outwards-request timing records.
///
/// All operations take `&self` and must be safe to call from concurrent
/// invocations; implementations serialize internally.
pub trait OutwardsRequestAggregator: Send + Sync {
    /// Append one attempt's latency record.
    fn record_outwards_request(&self, record: OutputRequestRecord);

    /// Append one backoff-wait record.
    fn record_retry_attempt(&self, record: RetryAttemptRecord);

    /// Append a whole invocation's roll-up.
    fn record_retriable_outwards_request(&self, rollup: RetriableOutputRequestRecord);

    /// Snapshot of all attempt latency records seen so far.
    fn records(&self) -> Vec<OutputRequestRecord>;
}

// ---------------------------------------------------------------------------
// StandardOutwardsRequestAggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StandardInner {
    requests: Vec<OutputRequestRecord>,
    retry_attempts: Vec<RetryAttemptRecord>,
    retriable: Vec<RetriableOutputRequestRecord>,
}

/// Mutex-guarded aggregator suitable for sharing across invocations.
///
/// Wrap in an `Arc` to share; reads return consistent snapshots.
#[derive(Debug, Default)]
pub struct StandardOutwardsRequestAggregator {
    inner: Mutex<StandardInner>,
}

impl StandardOutwardsRequestAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all backoff-wait records.
    #[must_use]
    pub fn retry_attempts(&self) -> Vec<RetryAttemptRecord> {
        let inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.retry_attempts.clone()
    }

    /// Snapshot of all published invocation roll-ups.
    #[must_use]
    pub fn retriable_records(&self) -> Vec<RetriableOutputRequestRecord> {
        let inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.retriable.clone()
    }
}

impl OutwardsRequestAggregator for StandardOutwardsRequestAggregator {
    fn record_outwards_request(&self, record: OutputRequestRecord) {
        let mut inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.requests.push(record);
    }

    fn record_retry_attempt(&self, record: RetryAttemptRecord) {
        let mut inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.retry_attempts.push(record);
    }

    fn record_retriable_outwards_request(&self, rollup: RetriableOutputRequestRecord) {
        let mut inner = self.inner.lock().expect("aggregator lock poisoned");
        for entry in &rollup.output_requests {
            inner.requests.push(entry.output_request);
            if let Some(wait) = entry.retry_wait {
                inner.retry_attempts.push(wait);
            }
        }
        inner.retriable.push(rollup);
    }

    fn records(&self) -> Vec<OutputRequestRecord> {
        let inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.requests.clone()
    }
}

// ---------------------------------------------------------------------------
// InvocationAggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InvocationInner {
    pending_wait: Option<RetryAttemptRecord>,
    entries: Vec<AttemptEntry>,
}

/// The orchestrator's private per-invocation collector.
///
/// Waits and attempt latencies arrive interleaved (`wait, attempt, wait,
/// attempt, ...`); each recorded wait attaches to the next attempt. The
/// collected entries are folded into the caller-shared aggregator exactly
/// once, at invocation terminal.
#[derive(Debug, Default)]
pub struct InvocationAggregator {
    inner: Mutex<InvocationInner>,
}

impl InvocationAggregator {
    /// Create an empty per-invocation collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the roll-up from everything recorded so far.
    #[must_use]
    pub fn rollup(&self) -> RetriableOutputRequestRecord {
        let inner = self.inner.lock().expect("aggregator lock poisoned");
        RetriableOutputRequestRecord {
            output_requests: inner.entries.clone(),
        }
    }

    /// Publish this invocation's roll-up into `outer`.
    pub fn fold_into(&self, outer: &dyn OutwardsRequestAggregator) {
        outer.record_retriable_outwards_request(self.rollup());
    }
}

impl OutwardsRequestAggregator for InvocationAggregator {
    fn record_outwards_request(&self, record: OutputRequestRecord) {
        let mut inner = self.inner.lock().expect("aggregator lock poisoned");
        let retry_wait = inner.pending_wait.take();
        inner.entries.push(AttemptEntry {
            retry_wait,
            output_request: record,
        });
    }

    fn record_retry_attempt(&self, record: RetryAttemptRecord) {
        let mut inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.pending_wait = Some(record);
    }

    fn record_retriable_outwards_request(&self, rollup: RetriableOutputRequestRecord) {
        let mut inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.entries.extend(rollup.output_requests);
    }

    fn records(&self) -> Vec<OutputRequestRecord> {
        let inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.entries.iter().map(|e| e.output_request).collect()
    }
}
