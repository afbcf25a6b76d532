// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scenario tests for the retry orchestrator, driven by scripted attempts
//! under a paused clock so backoff timing is asserted deterministically.

use courier_aggregator::StandardOutwardsRequestAggregator;
use courier_client::{CancellationToken, OutwardsCall, RetriableExecution};
use courier_codec::{DefaultInvocationDelegate, RequestComponents};
use courier_error::{ClientError, is_retryable};
use courier_reporting::{
    Counter, CountRecorder, InMemoryCountRecorder, InMemoryCounter, InMemoryLatencyTimer,
    InvocationContext, InvocationReporting, LatencyTimer, MetricsHandles, RecordingTraceContext,
    TraceEvent,
};
use courier_retry::RetryConfig;
use http::Method;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ───────────────────────────────────────────────────────────────────
// Harness
// ───────────────────────────────────────────────────────────────────

struct Harness {
    success: Arc<InMemoryCounter>,
    client_errors: Arc<InMemoryCounter>,
    server_errors: Arc<InMemoryCounter>,
    retries: Arc<InMemoryCountRecorder>,
    latency: Arc<InMemoryLatencyTimer>,
    aggregator: Arc<StandardOutwardsRequestAggregator>,
    trace: Arc<RecordingTraceContext>,
    context: InvocationContext<DefaultInvocationDelegate>,
}

fn harness() -> Harness {
    let success = Arc::new(InMemoryCounter::new());
    let client_errors = Arc::new(InMemoryCounter::new());
    let server_errors = Arc::new(InMemoryCounter::new());
    let retries = Arc::new(InMemoryCountRecorder::new());
    let latency = Arc::new(InMemoryLatencyTimer::new());
    let aggregator = Arc::new(StandardOutwardsRequestAggregator::new());
    let trace = Arc::new(RecordingTraceContext::new());

    let reporting = InvocationReporting::new()
        .with_trace_context(trace.clone())
        .with_metrics(MetricsHandles {
            success: Some(success.clone() as Arc<dyn Counter>),
            client_error_4xx: Some(client_errors.clone() as Arc<dyn Counter>),
            server_error_5xx: Some(server_errors.clone() as Arc<dyn Counter>),
            retry_count: Some(retries.clone() as Arc<dyn CountRecorder>),
            latency: Some(latency.clone() as Arc<dyn LatencyTimer>),
        })
        .with_aggregator(aggregator.clone());

    Harness {
        success,
        client_errors,
        server_errors,
        retries,
        latency,
        aggregator,
        trace,
        context: InvocationContext::new(reporting, DefaultInvocationDelegate),
    }
}

fn no_jitter(num_retries: u32, base_ms: u64, max_ms: u64) -> RetryConfig {
    RetryConfig::builder()
        .num_retries(num_retries)
        .base_interval(Duration::from_millis(base_ms))
        .max_interval(Duration::from_millis(max_ms))
        .exponential_base(2.0)
        .jitter(false)
        .build()
        .unwrap()
}

fn call() -> OutwardsCall {
    OutwardsCall::new(Method::GET, RequestComponents::new("/test", vec![], vec![]))
}

type Script = Arc<Mutex<VecDeque<Result<u32, ClientError>>>>;

/// Scripted attempt: pops the next outcome per call.
fn scripted(
    outcomes: Vec<Result<u32, ClientError>>,
) -> (
    Script,
    impl FnMut(RequestComponents, InvocationReporting) -> std::pin::Pin<Box<dyn Future<Output = Result<u32, ClientError>> + Send>>,
) {
    let script: Script = Arc::new(Mutex::new(VecDeque::from(outcomes)));
    let handle = script.clone();
    let attempt = move |_components: RequestComponents, _reporting: InvocationReporting| {
        let outcome = handle
            .lock()
            .unwrap()
            .pop_front()
            .expect("attempt script exhausted");
        Box::pin(async move { outcome })
            as std::pin::Pin<Box<dyn Future<Output = Result<u32, ClientError>> + Send>>
    };
    (script, attempt)
}

fn server_500() -> ClientError {
    ClientError::http_status(500)
}

fn rollup_waits(h: &Harness) -> Vec<Option<u64>> {
    let rollups = h.aggregator.retriable_records();
    assert_eq!(rollups.len(), 1, "exactly one roll-up published");
    rollups[0]
        .output_requests
        .iter()
        .map(|e| e.retry_wait.map(|w| w.retry_wait.as_millis() as u64))
        .collect()
}

// ───────────────────────────────────────────────────────────────────
// 1. Success on first try
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn success_on_first_try() {
    let h = harness();
    let config = no_jitter(3, 500, 10_000);
    let (_, attempt) = scripted(vec![Ok(1)]);

    let result = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(h.success.value(), 1);
    assert_eq!(h.client_errors.value(), 0);
    assert_eq!(h.server_errors.value(), 0);
    assert_eq!(h.retries.observations(), vec![0]);
    assert_eq!(h.latency.observations().len(), 1);
    assert_eq!(rollup_waits(&h), vec![None]);
    assert_eq!(
        h.trace.events(),
        vec![
            TraceEvent::Start {
                method: "GET".into(),
                uri: "/test".into()
            },
            TraceEvent::Success { status: 200 },
        ]
    );
}

// ───────────────────────────────────────────────────────────────────
// 2. Retry then success
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn retry_twice_then_success() {
    let h = harness();
    let config = no_jitter(3, 500, 10_000);
    let (_, attempt) = scripted(vec![Err(server_500()), Err(server_500()), Ok(7)]);

    let virtual_start = tokio::time::Instant::now();
    let result = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await;

    assert_eq!(result.unwrap(), 7);
    // The two backoff sleeps are 500 ms and 1000 ms of virtual time.
    assert_eq!(virtual_start.elapsed(), Duration::from_millis(1500));
    assert_eq!(h.server_errors.value(), 2);
    assert_eq!(h.success.value(), 1);
    assert_eq!(h.retries.observations(), vec![2]);
    assert_eq!(rollup_waits(&h), vec![None, Some(500), Some(1000)]);
}

// ───────────────────────────────────────────────────────────────────
// 3. Exhaustion
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn exhaustion_surfaces_the_last_error() {
    let h = harness();
    let config = no_jitter(2, 100, 1000);
    let (script, attempt) = scripted(vec![Err(server_500()), Err(server_500()), Err(server_500())]);

    let virtual_start = tokio::time::Instant::now();
    let result: Result<u32, ClientError> = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.response_code(), 500);
    assert!(script.lock().unwrap().is_empty(), "all 3 attempts ran");
    assert_eq!(virtual_start.elapsed(), Duration::from_millis(300));
    assert_eq!(h.server_errors.value(), 3);
    assert_eq!(h.success.value(), 0);
    assert_eq!(h.retries.observations(), vec![2]);
    assert_eq!(rollup_waits(&h), vec![None, Some(100), Some(200)]);
    assert_eq!(
        h.trace.events().last().unwrap(),
        &TraceEvent::Failure {
            status: Some(500),
            response_code: 500
        }
    );
}

// ───────────────────────────────────────────────────────────────────
// 4. Client errors are never retried
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn client_error_is_not_retried() {
    let h = harness();
    let config = no_jitter(5, 500, 10_000);
    let (_, attempt) = scripted(vec![Err(ClientError::http_status(400))]);

    let result: Result<u32, ClientError> = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await;

    assert_eq!(result.unwrap_err().response_code(), 400);
    assert_eq!(h.client_errors.value(), 1);
    assert_eq!(h.server_errors.value(), 0);
    assert_eq!(h.retries.observations(), vec![0]);
    assert_eq!(rollup_waits(&h), vec![None]);
}

#[tokio::test(start_paused = true)]
async fn client_error_is_not_retried_even_if_the_policy_says_yes() {
    let h = harness();
    let config = RetryConfig::builder()
        .num_retries(5)
        .base_interval(Duration::from_millis(10))
        .max_interval(Duration::from_millis(100))
        .jitter(false)
        .retry_on_error(|_: &ClientError| true)
        .build()
        .unwrap();
    let (_, attempt) = scripted(vec![Err(ClientError::http_status(404))]);

    let result: Result<u32, ClientError> = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await;

    assert_eq!(result.unwrap_err().response_code(), 404);
    assert_eq!(h.client_errors.value(), 1);
    assert_eq!(h.retries.observations(), vec![0]);
}

// ───────────────────────────────────────────────────────────────────
// 5. Transient aborts spend their own budget
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_closures_do_not_consume_retries() {
    let h = harness();
    let config = no_jitter(3, 500, 10_000);
    let (_, attempt) = scripted(vec![
        Err(ClientError::remote_connection_closed()),
        Err(ClientError::remote_connection_closed()),
        Err(ClientError::remote_connection_closed()),
        Ok(9),
    ]);

    let virtual_start = tokio::time::Instant::now();
    let result = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await;

    assert_eq!(result.unwrap(), 9);
    // Three fixed 2 ms waits, no backoff sleeps.
    assert_eq!(virtual_start.elapsed(), Duration::from_millis(6));
    assert_eq!(h.success.value(), 1);
    assert_eq!(h.server_errors.value(), 0, "aborted attempts are not counted");
    assert_eq!(h.retries.observations(), vec![0]);
    assert_eq!(rollup_waits(&h), vec![None, Some(2), Some(2), Some(2)]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_abort_budget_falls_back_to_retry_slots() {
    let h = harness();
    let config = no_jitter(3, 500, 10_000);
    // Six transient closures: five spend the budget, the sixth is treated
    // as an ordinary retriable server failure.
    let mut outcomes: Vec<Result<u32, ClientError>> = (0..6)
        .map(|_| Err(ClientError::stream_closed()))
        .collect();
    outcomes.push(Ok(3));
    let (_, attempt) = scripted(outcomes);

    let result = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(h.server_errors.value(), 1, "only the sixth closure counts");
    assert_eq!(h.success.value(), 1);
    assert_eq!(h.retries.observations(), vec![1]);
    assert_eq!(
        rollup_waits(&h),
        vec![
            None,
            Some(2),
            Some(2),
            Some(2),
            Some(2),
            Some(2),
            Some(500)
        ]
    );
}

// ───────────────────────────────────────────────────────────────────
// 6. Jitter bounds
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn jittered_waits_stay_below_the_computed_interval() {
    let h = harness();
    let config = RetryConfig::builder()
        .num_retries(4)
        .base_interval(Duration::from_millis(100))
        .max_interval(Duration::from_millis(800))
        .exponential_base(2.0)
        .jitter(true)
        .build()
        .unwrap();
    let (_, attempt) = scripted(vec![
        Err(server_500()),
        Err(server_500()),
        Err(server_500()),
        Err(server_500()),
        Ok(0),
    ]);

    RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await
        .unwrap();

    let waits = rollup_waits(&h);
    assert_eq!(waits[0], None);
    for (k, wait) in waits.iter().skip(1).enumerate() {
        let bound = (100u64 << k).min(800);
        let wait = wait.expect("retried attempt has a wait");
        assert!(wait < bound, "wait {wait}ms not below bound {bound}ms (k={k})");
    }
}

// ───────────────────────────────────────────────────────────────────
// Predicates
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn config_predicate_overrides_the_caller_predicate() {
    let h = harness();
    let config = RetryConfig::builder()
        .num_retries(3)
        .base_interval(Duration::from_millis(10))
        .max_interval(Duration::from_millis(100))
        .jitter(false)
        .retry_on_error(|_: &ClientError| false)
        .build()
        .unwrap();
    let (_, attempt) = scripted(vec![Err(server_500())]);

    // The caller predicate would retry; the config's override refuses.
    let result: Result<u32, ClientError> = RetriableExecution::new(&h.context, &config)
        .run(call(), |_| true, attempt)
        .await;

    assert_eq!(result.unwrap_err().response_code(), 500);
    assert_eq!(h.server_errors.value(), 1);
    assert_eq!(h.retries.observations(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn caller_predicate_can_refuse_server_errors() {
    let h = harness();
    let config = no_jitter(3, 10, 100);
    let (_, attempt) = scripted(vec![Err(ClientError::http_status(503))]);

    let result: Result<u32, ClientError> = RetriableExecution::new(&h.context, &config)
        .run(call(), |e| e.response_code() != 503, attempt)
        .await;

    assert_eq!(result.unwrap_err().response_code(), 503);
    assert_eq!(h.retries.observations(), vec![0]);
}

// ───────────────────────────────────────────────────────────────────
// Cancellation
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_finalizes_once() {
    let h = harness();
    let config = no_jitter(3, 500, 10_000);
    let (_, attempt) = scripted(vec![Err(server_500())]);
    let token = CancellationToken::new();

    let context = h.context.clone();
    let waiter = token.clone();
    let task = tokio::spawn(async move {
        RetriableExecution::new(&context, &config)
            .with_cancellation(&waiter)
            .run(call(), is_retryable, attempt)
            .await
    });

    // Let attempt 1 fail and the 500 ms backoff begin, then cancel.
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    let result: Result<u32, ClientError> = task.await.unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(h.server_errors.value(), 1);
    // Finalization ran exactly once with last-known state.
    assert_eq!(h.retries.observations().len(), 1);
    assert_eq!(h.latency.observations().len(), 1);
    assert_eq!(h.aggregator.retriable_records().len(), 1);
    assert_eq!(
        h.trace.events().last().unwrap(),
        &TraceEvent::Failure {
            status: Some(500),
            response_code: 500
        }
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_before_the_first_attempt() {
    let h = harness();
    let config = no_jitter(3, 500, 10_000);
    let (script, attempt) = scripted(vec![Ok(1)]);
    let token = CancellationToken::new();
    token.cancel();

    let result: Result<u32, ClientError> = RetriableExecution::new(&h.context, &config)
        .with_cancellation(&token)
        .run(call(), is_retryable, attempt)
        .await;

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(script.lock().unwrap().len(), 1, "no attempt was started");
    assert_eq!(h.success.value(), 0);
    assert_eq!(h.retries.observations(), vec![0]);
    let rollups = h.aggregator.retriable_records();
    assert_eq!(rollups.len(), 1);
    assert!(rollups[0].output_requests.is_empty());
}

// ───────────────────────────────────────────────────────────────────
// Reporting plumbing
// ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn attempts_see_trace_decorated_headers_and_inner_reporting() {
    let h = harness();
    let config = no_jitter(1, 10, 100);
    let seen: Arc<Mutex<Vec<RequestComponents>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_handle = seen.clone();

    let result = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, move |components, reporting| {
            seen_handle.lock().unwrap().push(components);
            // The inner reporting must not double-count.
            reporting.metrics().record_success();
            async move { Ok(11) }
        })
        .await;

    assert_eq!(result.unwrap(), 11);
    assert_eq!(h.success.value(), 1, "only the orchestrator counts");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(
        seen[0]
            .additional_headers
            .iter()
            .any(|(k, _)| k == RecordingTraceContext::TRACE_HEADER),
        "trace start hook decorated the reused headers"
    );
}

#[tokio::test(start_paused = true)]
async fn runs_without_metrics_or_aggregator() {
    let context = InvocationContext::new(InvocationReporting::new(), DefaultInvocationDelegate);
    let config = no_jitter(2, 10, 100);
    let (_, attempt) = scripted(vec![Err(server_500()), Ok(5)]);

    let result = RetriableExecution::new(&context, &config)
        .run(call(), is_retryable, attempt)
        .await;
    assert_eq!(result.unwrap(), 5);
}

#[tokio::test(start_paused = true)]
async fn attempt_bound_holds_under_mixed_failures() {
    let h = harness();
    let config = no_jitter(2, 1, 10);
    // 5 transient + enough server errors to exhaust 2 retries: the
    // orchestrator must stop at num_retries + 1 + budget attempts.
    let outcomes: Vec<Result<u32, ClientError>> = (0..5)
        .map(|_| Err(ClientError::remote_connection_closed()))
        .chain((0..3).map(|_| Err(server_500())))
        .collect();
    let (script, attempt) = scripted(outcomes);

    let result: Result<u32, ClientError> = RetriableExecution::new(&h.context, &config)
        .run(call(), is_retryable, attempt)
        .await;

    assert_eq!(result.unwrap_err().response_code(), 500);
    assert!(script.lock().unwrap().is_empty(), "exactly 8 attempts ran");
    assert_eq!(h.server_errors.value(), 3);
    assert_eq!(h.retries.observations(), vec![2]);
}
