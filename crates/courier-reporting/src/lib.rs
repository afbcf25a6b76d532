// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! courier-reporting
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Cross-cutting invocation handles and their decoration.

pub mod metrics;
pub mod trace;

pub use metrics::{
    Counter, CountRecorder, InMemoryCountRecorder, InMemoryCounter, InMemoryLatencyTimer,
    LatencyTimer, MetricsHandles,
};
pub use trace::{NoopTraceContext, RecordingTraceContext, TraceContext, TraceEvent, TraceToken};

use courier_aggregator::OutwardsRequestAggregator;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// InvocationReporting
// ---------------------------------------------------------------------------

/// Observability bundle carried through one logical invocation.
///
/// Value-like: decoration helpers return a new reporting and leave the
/// original untouched, so two concurrent invocations from the same client
/// never share mutable state (and always get independent request ids).
#[derive(Clone)]
pub struct InvocationReporting {
    span: tracing::Span,
    internal_request_id: String,
    outgoing_request_id: Option<String>,
    trace_context: Arc<dyn TraceContext>,
    metrics: MetricsHandles,
    aggregator: Option<Arc<dyn OutwardsRequestAggregator>>,
}

impl fmt::Debug for InvocationReporting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationReporting")
            .field("internal_request_id", &self.internal_request_id)
            .field("outgoing_request_id", &self.outgoing_request_id)
            .field("metrics", &self.metrics)
            .field("aggregator", &self.aggregator.is_some())
            .finish()
    }
}

impl Default for InvocationReporting {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationReporting {
    /// Create a reporting with a fresh internal request id, a no-op trace
    /// capability, and no metrics or aggregator.
    #[must_use]
    pub fn new() -> Self {
        let internal_request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "outwards_invocation",
            internal_request_id = %internal_request_id
        );
        Self {
            span,
            internal_request_id,
            outgoing_request_id: None,
            trace_context: Arc::new(NoopTraceContext),
            metrics: MetricsHandles::none(),
            aggregator: None,
        }
    }

    /// Replace the trace capability.
    #[must_use]
    pub fn with_trace_context(mut self, trace_context: Arc<dyn TraceContext>) -> Self {
        self.trace_context = trace_context;
        self
    }

    /// Replace the metrics handles.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsHandles) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach an outwards-request aggregator.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: Arc<dyn OutwardsRequestAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Derive a reporting for a new logical invocation: fresh internal
    /// request id and root span, same trace capability, metrics handles,
    /// and aggregator.
    ///
    /// Clients hold a template reporting and call this once per invocation
    /// so concurrent invocations never share ids.
    #[must_use]
    pub fn for_new_invocation(&self) -> Self {
        let internal_request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "outwards_invocation",
            internal_request_id = %internal_request_id
        );
        let mut derived = self.clone();
        derived.span = span;
        derived.internal_request_id = internal_request_id;
        derived.outgoing_request_id = None;
        derived
    }

    /// Derive a reporting whose span carries a freshly generated
    /// `outgoing_request_id`.
    #[must_use]
    pub fn with_outgoing_request_id_metadata(&self) -> Self {
        let outgoing_request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            parent: &self.span,
            "outgoing_request",
            outgoing_request_id = %outgoing_request_id
        );
        let mut derived = self.clone();
        derived.span = span;
        derived.outgoing_request_id = Some(outgoing_request_id);
        derived
    }

    /// Derive a reporting whose span additionally carries the endpoint host
    /// and, when present, the operation name.
    #[must_use]
    pub fn with_outgoing_decorated_span(
        &self,
        endpoint_host: &str,
        operation: Option<&str>,
    ) -> Self {
        let span = tracing::info_span!(
            parent: &self.span,
            "outgoing_endpoint",
            endpoint = %endpoint_host,
            operation = tracing::field::Empty
        );
        if let Some(op) = operation {
            span.record("operation", op);
        }
        let mut derived = self.clone();
        derived.span = span;
        derived
    }

    /// Derive the metrics-less reporting handed to the transport during
    /// retry wrapping, so counters are recorded exactly once by the
    /// orchestrator. Span, trace capability, and aggregator are shared.
    #[must_use]
    pub fn inner(&self) -> Self {
        let mut derived = self.clone();
        derived.metrics = MetricsHandles::none();
        derived
    }

    /// The invocation's `tracing` span.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Stable id for correlating everything this invocation logs.
    #[must_use]
    pub fn internal_request_id(&self) -> &str {
        &self.internal_request_id
    }

    /// Outgoing request id, present after request-id decoration.
    #[must_use]
    pub fn outgoing_request_id(&self) -> Option<&str> {
        self.outgoing_request_id.as_deref()
    }

    /// The distributed-trace capability.
    #[must_use]
    pub fn trace_context(&self) -> &Arc<dyn TraceContext> {
        &self.trace_context
    }

    /// The invocation's metrics handles.
    #[must_use]
    pub fn metrics(&self) -> &MetricsHandles {
        &self.metrics
    }

    /// The attached aggregator, if any.
    #[must_use]
    pub fn aggregator(&self) -> Option<&Arc<dyn OutwardsRequestAggregator>> {
        self.aggregator.as_ref()
    }
}

// ---------------------------------------------------------------------------
// InvocationContext
// ---------------------------------------------------------------------------

/// Pairing of an [`InvocationReporting`] with a per-request handler delegate.
///
/// Like the reporting itself, contexts are value-like: decoration returns a
/// new context.
#[derive(Debug, Clone)]
pub struct InvocationContext<D> {
    reporting: InvocationReporting,
    delegate: D,
}

impl<D> InvocationContext<D> {
    /// Pair a reporting with a handler delegate.
    #[must_use]
    pub fn new(reporting: InvocationReporting, delegate: D) -> Self {
        Self {
            reporting,
            delegate,
        }
    }

    /// The context's reporting.
    #[must_use]
    pub fn reporting(&self) -> &InvocationReporting {
        &self.reporting
    }

    /// The per-request handler delegate.
    #[must_use]
    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    /// Replace the reporting, keeping the delegate.
    #[must_use]
    pub fn with_reporting(self, reporting: InvocationReporting) -> Self {
        Self {
            reporting,
            delegate: self.delegate,
        }
    }
}

impl<D: Clone> InvocationContext<D> {
    /// Context whose reporting carries a fresh outgoing request id.
    #[must_use]
    pub fn with_outgoing_request_id_metadata(&self) -> Self {
        Self {
            reporting: self.reporting.with_outgoing_request_id_metadata(),
            delegate: self.delegate.clone(),
        }
    }

    /// Context whose reporting carries endpoint/operation metadata.
    #[must_use]
    pub fn with_outgoing_decorated_span(
        &self,
        endpoint_host: &str,
        operation: Option<&str>,
    ) -> Self {
        Self {
            reporting: self
                .reporting
                .with_outgoing_decorated_span(endpoint_host, operation),
            delegate: self.delegate.clone(),
        }
    }

    /// Context with the metrics-less inner reporting.
    #[must_use]
    pub fn inner(&self) -> Self {
        Self {
            reporting: self.reporting.inner(),
            delegate: self.delegate.clone(),
        }
    }
}
