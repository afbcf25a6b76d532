// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! courier-error
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Error taxonomy for outwards HTTP requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Boxed cause carried at an attempt boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family a [`ClientError`] belongs to, derived from its response code.
///
/// Codes in `400..=499` are client errors; everything else (including
/// synthesized codes for transport failures) is a server error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The request itself was rejected; repeating it will not help.
    ClientError,
    /// The service or the path to it failed; repeating it may help.
    ServerError,
}

impl ErrorCategory {
    /// Derive the category for an HTTP-shaped response code.
    #[must_use]
    pub fn of(response_code: u16) -> Self {
        if (400..=499).contains(&response_code) {
            Self::ClientError
        } else {
            Self::ServerError
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientError => "client_error",
            Self::ServerError => "server_error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ClientErrorKind
// ---------------------------------------------------------------------------

/// The cause behind a [`ClientError`].
///
/// Transport-level kinds are synthesized at the attempt boundary; `HttpStatus`
/// and `Api` come from actual responses.
#[derive(Debug, Error)]
pub enum ClientErrorKind {
    /// Establishing a connection (TCP connect or pool acquisition) failed.
    #[error("failed to establish connection: {0}")]
    ConnectionFailed(#[source] BoxError),

    /// The connect phase exceeded its deadline.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// The response did not arrive within the read timeout.
    #[error("read timed out waiting for response")]
    ReadTimeout,

    /// The TLS handshake did not complete in time.
    #[error("TLS handshake timed out")]
    TlsHandshakeTimeout,

    /// The request/response stream was closed mid-flight.
    #[error("stream closed before the response completed")]
    StreamClosed,

    /// The remote end closed the connection.
    #[error("remote end closed the connection")]
    RemoteConnectionClosed,

    /// The channel went away without ever producing a response.
    #[error("connection closed unexpectedly with no response")]
    UnexpectedClosure,

    /// Non-success HTTP status with no richer service error available.
    #[error("HTTP request failed with status {status}")]
    HttpStatus {
        /// The raw response status code.
        status: u16,
    },

    /// The response body or headers failed to decode into the output type.
    #[error("failed to decode response: {0}")]
    Decode(#[source] BoxError),

    /// The request input failed to encode.
    #[error("failed to encode request: {0}")]
    Encode(#[source] BoxError),

    /// A service-specific error extracted from an error response body.
    #[error("service error: {message}")]
    Api {
        /// Human-readable message extracted from the response.
        message: String,
    },

    /// The enclosing invocation was cancelled cooperatively.
    #[error("invocation cancelled")]
    Cancelled,

    /// Untyped failure from the transport stack.
    #[error("unclassified transport error: {0}")]
    Other(#[source] BoxError),
}

// ---------------------------------------------------------------------------
// ClientError
// ---------------------------------------------------------------------------

/// Unified error for a single outwards HTTP invocation.
///
/// Carries an HTTP-shaped `response_code` (synthesized for transport
/// failures: 500 for connection-level problems, 400 for local
/// encode/decode problems), the causing [`ClientErrorKind`], and a derived
/// [`ErrorCategory`] used by retry policies.
///
/// # Examples
///
/// ```
/// use courier_error::{ClientError, ErrorCategory};
///
/// let err = ClientError::http_status(503);
/// assert_eq!(err.response_code(), 503);
/// assert_eq!(err.category(), ErrorCategory::ServerError);
/// assert!(err.is_retryable());
///
/// let err = ClientError::http_status(404);
/// assert_eq!(err.category(), ErrorCategory::ClientError);
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Error)]
#[error("outwards request failed with code {response_code}")]
pub struct ClientError {
    response_code: u16,
    #[source]
    kind: ClientErrorKind,
}

impl ClientError {
    /// Build an error from an explicit code and kind.
    #[must_use]
    pub fn new(response_code: u16, kind: ClientErrorKind) -> Self {
        Self {
            response_code,
            kind,
        }
    }

    /// Connection-create failure. Surfaces as code 500.
    pub fn connection(cause: impl Into<BoxError>) -> Self {
        Self::new(500, ClientErrorKind::ConnectionFailed(cause.into()))
    }

    /// Connect-phase timeout. Surfaces as code 500.
    #[must_use]
    pub fn connect_timeout() -> Self {
        Self::new(500, ClientErrorKind::ConnectTimeout)
    }

    /// Read timeout waiting for the response. Surfaces as code 500.
    #[must_use]
    pub fn read_timeout() -> Self {
        Self::new(500, ClientErrorKind::ReadTimeout)
    }

    /// TLS handshake timeout. Surfaces as code 500.
    #[must_use]
    pub fn tls_handshake_timeout() -> Self {
        Self::new(500, ClientErrorKind::TlsHandshakeTimeout)
    }

    /// Stream closed mid-flight. Transient; consumes the aborted-attempt
    /// budget rather than a retry slot.
    #[must_use]
    pub fn stream_closed() -> Self {
        Self::new(500, ClientErrorKind::StreamClosed)
    }

    /// Remote end closed the connection. Transient; consumes the
    /// aborted-attempt budget rather than a retry slot.
    #[must_use]
    pub fn remote_connection_closed() -> Self {
        Self::new(500, ClientErrorKind::RemoteConnectionClosed)
    }

    /// Channel closed without a response.
    #[must_use]
    pub fn unexpected_closure() -> Self {
        Self::new(500, ClientErrorKind::UnexpectedClosure)
    }

    /// Non-success HTTP status with no richer extraction available.
    #[must_use]
    pub fn http_status(status: u16) -> Self {
        Self::new(status, ClientErrorKind::HttpStatus { status })
    }

    /// Output deserialization failure. Surfaces as code 400 and is never
    /// retried.
    pub fn decode(cause: impl Into<BoxError>) -> Self {
        Self::new(400, ClientErrorKind::Decode(cause.into()))
    }

    /// Input serialization failure. Surfaces as code 400 and is never
    /// retried.
    pub fn encode(cause: impl Into<BoxError>) -> Self {
        Self::new(400, ClientErrorKind::Encode(cause.into()))
    }

    /// Service-specific error extracted from an error response.
    pub fn api(response_code: u16, message: impl Into<String>) -> Self {
        Self::new(
            response_code,
            ClientErrorKind::Api {
                message: message.into(),
            },
        )
    }

    /// Cooperative cancellation of the enclosing invocation.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(500, ClientErrorKind::Cancelled)
    }

    /// Untyped transport error. Surfaces as code 400.
    pub fn other(cause: impl Into<BoxError>) -> Self {
        Self::new(400, ClientErrorKind::Other(cause.into()))
    }

    /// The HTTP-shaped response code.
    #[must_use]
    pub fn response_code(&self) -> u16 {
        self.response_code
    }

    /// The causing kind.
    #[must_use]
    pub fn kind(&self) -> &ClientErrorKind {
        &self.kind
    }

    /// Category derived from the response code.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::of(self.response_code)
    }

    /// Whether this is a transient connection closure (stream closed or
    /// remote connection closed) eligible for the aborted-attempt budget.
    #[must_use]
    pub fn is_transient_closure(&self) -> bool {
        matches!(
            self.kind,
            ClientErrorKind::StreamClosed | ClientErrorKind::RemoteConnectionClosed
        )
    }

    /// Whether this was a cooperative cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ClientErrorKind::Cancelled)
    }

    /// Default retriable predicate: server-category errors only.
    ///
    /// Client-category errors are never retried; policy predicates are
    /// consulted on top of this, never instead of it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::ServerError
    }
}

/// Default retry predicate used when no caller-supplied predicate is given.
#[must_use]
pub fn is_retryable(err: &ClientError) -> bool {
    err.is_retryable()
}
