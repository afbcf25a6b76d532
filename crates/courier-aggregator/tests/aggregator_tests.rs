// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for outwards-request aggregation.

use courier_aggregator::{
    InvocationAggregator, OutputRequestRecord, OutwardsRequestAggregator, RetryAttemptRecord,
    RetriableOutputRequestRecord, StandardOutwardsRequestAggregator,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn latency(ms: u64) -> OutputRequestRecord {
    OutputRequestRecord::new(Duration::from_millis(ms))
}

fn wait(ms: u64) -> RetryAttemptRecord {
    RetryAttemptRecord::new(Duration::from_millis(ms))
}

// ── Standard aggregator ─────────────────────────────────────────────────────

#[test]
fn standard_appends_in_order() {
    let agg = StandardOutwardsRequestAggregator::new();
    agg.record_outwards_request(latency(10));
    agg.record_retry_attempt(wait(500));
    agg.record_outwards_request(latency(20));

    assert_eq!(agg.records(), vec![latency(10), latency(20)]);
    assert_eq!(agg.retry_attempts(), vec![wait(500)]);
}

#[test]
fn standard_unfolds_a_rollup() {
    let agg = StandardOutwardsRequestAggregator::new();
    let rollup = RetriableOutputRequestRecord {
        output_requests: vec![
            courier_aggregator::AttemptEntry {
                retry_wait: None,
                output_request: latency(5),
            },
            courier_aggregator::AttemptEntry {
                retry_wait: Some(wait(500)),
                output_request: latency(7),
            },
        ],
    };
    agg.record_retriable_outwards_request(rollup.clone());

    assert_eq!(agg.records(), vec![latency(5), latency(7)]);
    assert_eq!(agg.retry_attempts(), vec![wait(500)]);
    assert_eq!(agg.retriable_records(), vec![rollup]);
}

#[test]
fn standard_is_safe_under_concurrent_writers() {
    let agg = Arc::new(StandardOutwardsRequestAggregator::new());
    let mut handles = Vec::new();
    for t in 0..8u64 {
        let agg = Arc::clone(&agg);
        handles.push(thread::spawn(move || {
            for i in 0..100u64 {
                agg.record_outwards_request(latency(t * 1000 + i));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(agg.records().len(), 800);
}

// ── Invocation aggregator ───────────────────────────────────────────────────

#[test]
fn invocation_pairs_each_wait_with_the_following_attempt() {
    let agg = InvocationAggregator::new();
    agg.record_outwards_request(latency(10));
    agg.record_retry_attempt(wait(500));
    agg.record_outwards_request(latency(11));
    agg.record_retry_attempt(wait(1000));
    agg.record_outwards_request(latency(12));

    let rollup = agg.rollup();
    assert_eq!(rollup.attempt_count(), 3);
    assert_eq!(rollup.output_requests[0].retry_wait, None);
    assert_eq!(rollup.output_requests[1].retry_wait, Some(wait(500)));
    assert_eq!(rollup.output_requests[2].retry_wait, Some(wait(1000)));
    assert_eq!(rollup.total_retry_wait(), Duration::from_millis(1500));
}

#[test]
fn invocation_first_attempt_has_no_wait() {
    let agg = InvocationAggregator::new();
    agg.record_outwards_request(latency(3));
    let rollup = agg.rollup();
    assert_eq!(rollup.attempt_count(), 1);
    assert!(rollup.output_requests[0].retry_wait.is_none());
}

#[test]
fn fold_into_publishes_exactly_one_rollup() {
    let outer = StandardOutwardsRequestAggregator::new();
    let inner = InvocationAggregator::new();
    inner.record_outwards_request(latency(10));
    inner.record_retry_attempt(wait(2));
    inner.record_outwards_request(latency(20));

    inner.fold_into(&outer);

    let published = outer.retriable_records();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].attempt_count(), 2);
    // The unfolded views match the per-attempt data.
    assert_eq!(outer.records(), vec![latency(10), latency(20)]);
    assert_eq!(outer.retry_attempts(), vec![wait(2)]);
}

#[test]
fn rollup_is_a_snapshot_not_a_drain() {
    let agg = InvocationAggregator::new();
    agg.record_outwards_request(latency(1));
    assert_eq!(agg.rollup().attempt_count(), 1);
    assert_eq!(agg.rollup().attempt_count(), 1);
}

// ── Serde ───────────────────────────────────────────────────────────────────

#[test]
fn records_serialize_durations_as_milliseconds() {
    let json = serde_json::to_string(&latency(250)).unwrap();
    assert_eq!(json, r#"{"request_latency":250}"#);

    let rollup = RetriableOutputRequestRecord {
        output_requests: vec![courier_aggregator::AttemptEntry {
            retry_wait: Some(wait(500)),
            output_request: latency(42),
        }],
    };
    let json = serde_json::to_string(&rollup).unwrap();
    let back: RetriableOutputRequestRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rollup);
}
