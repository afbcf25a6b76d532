// SPDX-License-Identifier: MIT OR Apache-2.0
//! The retry orchestrator: one logical request, a managed sequence of
//! physical attempts.

use crate::cancel::CancellationToken;
use courier_aggregator::{
    InvocationAggregator, OutputRequestRecord, OutwardsRequestAggregator, RetryAttemptRecord,
};
use courier_codec::RequestComponents;
use courier_error::{ClientError, ErrorCategory};
use courier_reporting::{InvocationContext, InvocationReporting};
use courier_retry::{ABORTED_ATTEMPT_WAIT, ABORTED_ATTEMPTS_BUDGET, RetryConfig};
use http::Method;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// OutwardsCall
// ---------------------------------------------------------------------------

/// The outwards request an invocation executes: a method plus the
/// components encoded once and reused across every attempt.
#[derive(Debug, Clone)]
pub struct OutwardsCall {
    /// HTTP method of the request.
    pub method: Method,
    /// Encoded request components.
    pub components: RequestComponents,
}

impl OutwardsCall {
    /// Pair a method with encoded components.
    #[must_use]
    pub fn new(method: Method, components: RequestComponents) -> Self {
        Self { method, components }
    }
}

// ---------------------------------------------------------------------------
// RetriableExecution
// ---------------------------------------------------------------------------

/// Orchestrates up to `num_retries + 1` attempts of one logical request.
///
/// Between failed attempts it sleeps the configured backoff; transient
/// connection closures instead spend a separate aborted-attempt budget with
/// a short fixed wait. Client-category (4xx) errors are never retried.
///
/// Per invocation, exactly once: the trace start hook (mutating the
/// outbound headers), the terminal success-or-failure hook, the retry-count
/// and latency metrics, and (when the caller attached an aggregator) one
/// published roll-up pairing each attempt with the wait that preceded it.
#[derive(Debug)]
pub struct RetriableExecution<'a, D> {
    context: &'a InvocationContext<D>,
    config: &'a RetryConfig,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a, D> RetriableExecution<'a, D> {
    /// Bind an invocation context to a retry config.
    #[must_use]
    pub fn new(context: &'a InvocationContext<D>, config: &'a RetryConfig) -> Self {
        Self {
            context,
            config,
            cancellation: None,
        }
    }

    /// Attach a caller-provided cancellation token. Cancellation aborts the
    /// current sleep or attempt; finalization still runs exactly once.
    #[must_use]
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Run the call to completion.
    ///
    /// `attempt` performs one physical try; it receives the (trace-decorated)
    /// components and the invocation's metrics-less inner reporting.
    /// `retry_on_error` is consulted for server-category failures unless the
    /// config carries its own predicate, which overrides it.
    pub async fn run<T, P, F, Fut>(
        self,
        mut call: OutwardsCall,
        retry_on_error: P,
        mut attempt: F,
    ) -> Result<T, ClientError>
    where
        P: Fn(&ClientError) -> bool,
        F: FnMut(RequestComponents, InvocationReporting) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let reporting = self.context.reporting();
        let started = Instant::now();

        // Private per-invocation aggregator, created only when the caller
        // attached one to fold into.
        let outer_aggregator = reporting.aggregator().cloned();
        let inner_aggregator = outer_aggregator
            .as_ref()
            .map(|_| Arc::new(InvocationAggregator::new()));

        let mut inner_reporting = reporting.inner();
        if let Some(agg) = &inner_aggregator {
            inner_reporting = inner_reporting
                .with_aggregator(Arc::clone(agg) as Arc<dyn OutwardsRequestAggregator>);
        }

        // Invocation-level trace start: runs once, may inject trace
        // identifiers into the headers reused by every attempt.
        let trace_token = reporting.trace_context().handle_outwards_request_start(
            &call.method,
            &call.components.path_with_query,
            reporting.span(),
            reporting.internal_request_id(),
            &mut call.components.additional_headers,
            &call.components.body,
        );

        let mut retries_remaining = self.config.num_retries;
        let mut aborted_attempts_remaining = ABORTED_ATTEMPTS_BUDGET;
        let mut attempt_index: u32 = 0;

        let outcome: Result<T, ClientError> = loop {
            if self
                .cancellation
                .is_some_and(CancellationToken::is_cancelled)
            {
                break Err(ClientError::cancelled());
            }

            attempt_index += 1;
            debug!(
                target: "courier.client.retry",
                request_id = %reporting.internal_request_id(),
                attempt = attempt_index,
                retries_remaining,
                "starting attempt"
            );

            let attempt_started = Instant::now();
            let result = match self.cancellation {
                Some(token) => {
                    tokio::select! {
                        () = token.cancelled() => Err(ClientError::cancelled()),
                        result = attempt(call.components.clone(), inner_reporting.clone()) => result,
                    }
                }
                None => attempt(call.components.clone(), inner_reporting.clone()).await,
            };

            if result.as_ref().is_err_and(|e| e.is_cancelled()) {
                // The attempt was torn down, not completed; it contributes
                // neither a counter nor an aggregator entry.
                break result;
            }

            if let Some(agg) = &inner_aggregator {
                agg.record_outwards_request(OutputRequestRecord::new(attempt_started.elapsed()));
            }

            match result {
                Ok(value) => {
                    reporting.metrics().record_success();
                    debug!(
                        target: "courier.client.retry",
                        request_id = %reporting.internal_request_id(),
                        attempt = attempt_index,
                        "attempt succeeded"
                    );
                    break Ok(value);
                }
                Err(error) if error.is_transient_closure() && aborted_attempts_remaining > 0 => {
                    // Transient closures spend the aborted-attempt budget,
                    // not retry slots, and wait the short fixed interval.
                    aborted_attempts_remaining -= 1;
                    debug!(
                        target: "courier.client.retry",
                        request_id = %reporting.internal_request_id(),
                        attempt = attempt_index,
                        aborted_attempts_remaining,
                        "transient connection closure, re-attempting"
                    );
                    if let Some(agg) = &inner_aggregator {
                        agg.record_retry_attempt(RetryAttemptRecord::new(ABORTED_ATTEMPT_WAIT));
                    }
                    if sleep_or_cancel(ABORTED_ATTEMPT_WAIT, self.cancellation).await {
                        break Err(ClientError::cancelled());
                    }
                }
                Err(error) => {
                    record_failure_counter(reporting, &error);

                    let predicate_approves = match &self.config.retry_on_error {
                        Some(policy) => policy(&error),
                        None => retry_on_error(&error),
                    };
                    // The category check wins: 4xx is final no matter what
                    // any predicate says.
                    let retriable =
                        error.category() == ErrorCategory::ServerError && predicate_approves;

                    if retriable && retries_remaining > 0 {
                        let wait = self.config.compute_wait(retries_remaining);
                        retries_remaining -= 1;
                        debug!(
                            target: "courier.client.retry",
                            request_id = %reporting.internal_request_id(),
                            attempt = attempt_index,
                            wait_ms = wait.as_millis() as u64,
                            retries_remaining,
                            response_code = error.response_code(),
                            "retriable failure, backing off"
                        );
                        if let Some(agg) = &inner_aggregator {
                            agg.record_retry_attempt(RetryAttemptRecord::new(wait));
                        }
                        if sleep_or_cancel(wait, self.cancellation).await {
                            break Err(ClientError::cancelled());
                        }
                    } else {
                        warn!(
                            target: "courier.client.retry",
                            request_id = %reporting.internal_request_id(),
                            attempt = attempt_index,
                            response_code = error.response_code(),
                            retriable,
                            "giving up"
                        );
                        break Err(error);
                    }
                }
            }
        };

        // Finalization: runs exactly once for every exit, including
        // cancellation, with the last-known state.
        match &outcome {
            Ok(_) => {
                reporting.trace_context().handle_outwards_request_success(
                    &trace_token,
                    reporting.span(),
                    reporting.internal_request_id(),
                    200,
                    None,
                );
            }
            Err(error) => {
                reporting.trace_context().handle_outwards_request_failure(
                    &trace_token,
                    reporting.span(),
                    reporting.internal_request_id(),
                    Some(error.response_code()),
                    None,
                    error,
                );
            }
        }

        let retries_consumed = self.config.num_retries - retries_remaining;
        reporting.metrics().record_retry_count(retries_consumed);
        reporting.metrics().record_latency(started.elapsed());

        if let (Some(inner), Some(outer)) = (&inner_aggregator, &outer_aggregator) {
            inner.fold_into(outer.as_ref());
        }

        outcome
    }
}

/// Sleep for `wait`, aborting early on cancellation. Returns whether the
/// sleep was cancelled.
async fn sleep_or_cancel(wait: Duration, cancellation: Option<&CancellationToken>) -> bool {
    match cancellation {
        Some(token) => {
            tokio::select! {
                () = token.cancelled() => true,
                () = tokio::time::sleep(wait) => false,
            }
        }
        None => {
            tokio::time::sleep(wait).await;
            false
        }
    }
}

fn record_failure_counter(reporting: &InvocationReporting, error: &ClientError) {
    match error.category() {
        ErrorCategory::ClientError => reporting.metrics().record_client_error(),
        ErrorCategory::ServerError => reporting.metrics().record_server_error(),
    }
}

/// Execute a retriable call with the default entry point.
///
/// Equivalent to `RetriableExecution::new(context, config).run(...)`.
pub async fn execute_retriable<T, D, P, F, Fut>(
    context: &InvocationContext<D>,
    config: &RetryConfig,
    call: OutwardsCall,
    retry_on_error: P,
    attempt: F,
) -> Result<T, ClientError>
where
    P: Fn(&ClientError) -> bool,
    F: FnMut(RequestComponents, InvocationReporting) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    RetriableExecution::new(context, config)
        .run(call, retry_on_error, attempt)
        .await
}
