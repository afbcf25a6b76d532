// SPDX-License-Identifier: MIT OR Apache-2.0
//! Distributed-trace capability: start/success/failure hooks around an
//! outwards request, carrying an opaque per-invocation token.

use courier_error::ClientError;
use http::Method;
use std::any::Any;
use std::fmt;
use std::sync::Mutex;

// ── TraceToken ──────────────────────────────────────────────────────

/// Opaque value produced by the start hook and handed back to the
/// success/failure hook. Its lifetime is one invocation.
#[derive(Default)]
pub struct TraceToken(Option<Box<dyn Any + Send>>);

impl TraceToken {
    /// A token carrying nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self(None)
    }

    /// Wrap an implementation-specific value.
    #[must_use]
    pub fn new(value: impl Any + Send) -> Self {
        Self(Some(Box::new(value)))
    }

    /// Borrow the wrapped value, if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for TraceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TraceToken")
            .field(&self.0.as_ref().map(|_| "..."))
            .finish()
    }
}

// ── TraceContext ────────────────────────────────────────────────────

/// Capability invoked around an outwards request to integrate with a
/// distributed tracing system.
///
/// The start hook receives the outbound headers mutably so trace
/// identifiers can be injected before the request is sent. The returned
/// [`TraceToken`] is passed back to exactly one of the terminal hooks.
pub trait TraceContext: Send + Sync {
    /// Called once before the request is sent. May mutate `headers`.
    #[allow(clippy::too_many_arguments)]
    fn handle_outwards_request_start(
        &self,
        method: &Method,
        uri: &str,
        span: &tracing::Span,
        internal_request_id: &str,
        headers: &mut Vec<(String, String)>,
        body: &[u8],
    ) -> TraceToken;

    /// Called once when the invocation terminates successfully.
    fn handle_outwards_request_success(
        &self,
        token: &TraceToken,
        span: &tracing::Span,
        internal_request_id: &str,
        status: u16,
        body: Option<&[u8]>,
    );

    /// Called once when the invocation terminates in failure.
    #[allow(clippy::too_many_arguments)]
    fn handle_outwards_request_failure(
        &self,
        token: &TraceToken,
        span: &tracing::Span,
        internal_request_id: &str,
        status: Option<u16>,
        body: Option<&[u8]>,
        error: &ClientError,
    );
}

// ── NoopTraceContext ────────────────────────────────────────────────

/// Trace capability that does nothing. The default for clients that have no
/// tracing backend wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTraceContext;

impl TraceContext for NoopTraceContext {
    fn handle_outwards_request_start(
        &self,
        _method: &Method,
        _uri: &str,
        _span: &tracing::Span,
        _internal_request_id: &str,
        _headers: &mut Vec<(String, String)>,
        _body: &[u8],
    ) -> TraceToken {
        TraceToken::empty()
    }

    fn handle_outwards_request_success(
        &self,
        _token: &TraceToken,
        _span: &tracing::Span,
        _internal_request_id: &str,
        _status: u16,
        _body: Option<&[u8]>,
    ) {
    }

    fn handle_outwards_request_failure(
        &self,
        _token: &TraceToken,
        _span: &tracing::Span,
        _internal_request_id: &str,
        _status: Option<u16>,
        _body: Option<&[u8]>,
        _error: &ClientError,
    ) {
    }
}

// ── RecordingTraceContext ───────────────────────────────────────────

/// One observed trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// The start hook fired.
    Start {
        /// HTTP method of the outwards request.
        method: String,
        /// Request URI (path with query).
        uri: String,
    },
    /// The success hook fired.
    Success {
        /// Terminal response status.
        status: u16,
    },
    /// The failure hook fired.
    Failure {
        /// Terminal response status, when a response was received.
        status: Option<u16>,
        /// Response code of the surfaced error.
        response_code: u16,
    },
}

/// In-memory trace capability that records events and injects a marker
/// header, for tests and local debugging.
#[derive(Debug, Default)]
pub struct RecordingTraceContext {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingTraceContext {
    /// Name of the header injected by the start hook.
    pub const TRACE_HEADER: &'static str = "x-courier-trace-id";

    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all observed events, in order.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().expect("trace lock poisoned").clone()
    }
}

impl TraceContext for RecordingTraceContext {
    fn handle_outwards_request_start(
        &self,
        method: &Method,
        uri: &str,
        _span: &tracing::Span,
        internal_request_id: &str,
        headers: &mut Vec<(String, String)>,
        _body: &[u8],
    ) -> TraceToken {
        headers.push((Self::TRACE_HEADER.to_string(), internal_request_id.to_string()));
        self.events
            .lock()
            .expect("trace lock poisoned")
            .push(TraceEvent::Start {
                method: method.to_string(),
                uri: uri.to_string(),
            });
        TraceToken::new(internal_request_id.to_string())
    }

    fn handle_outwards_request_success(
        &self,
        _token: &TraceToken,
        _span: &tracing::Span,
        _internal_request_id: &str,
        status: u16,
        _body: Option<&[u8]>,
    ) {
        self.events
            .lock()
            .expect("trace lock poisoned")
            .push(TraceEvent::Success { status });
    }

    fn handle_outwards_request_failure(
        &self,
        _token: &TraceToken,
        _span: &tracing::Span,
        _internal_request_id: &str,
        status: Option<u16>,
        _body: Option<&[u8]>,
        error: &ClientError,
    ) {
        self.events
            .lock()
            .expect("trace lock poisoned")
            .push(TraceEvent::Failure {
                status,
                response_code: error.response_code(),
            });
    }
}
