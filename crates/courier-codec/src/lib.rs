// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! courier-codec
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Encode/execute/decode pipeline contracts.

pub mod input;
pub mod json;

pub use input::{
    BodyRequestInput, HeadersEncodable, PathEncodable, QueryEncodable, RequestInput,
};
pub use json::{
    ComposedJsonDecoder, HttpStatusErrorProvider, JsonErrorProvider, JsonOperationDecoder,
    JsonOperationEncoder, OutputComposer,
};

use bytes::Bytes;
use courier_error::ClientError;
use courier_reporting::InvocationReporting;

// ---------------------------------------------------------------------------
// Wire-adjacent value types
// ---------------------------------------------------------------------------

/// The encoded form of one logical request.
///
/// Produced once per invocation and reused unchanged across retries.
///
/// # Examples
///
/// ```
/// use courier_codec::RequestComponents;
///
/// let c = RequestComponents::new("v1/items?limit=10", vec![], vec![]);
/// // The path is normalized to start with `/`.
/// assert_eq!(c.path_with_query, "/v1/items?limit=10");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestComponents {
    /// Request path including any query string; always starts with `/`.
    pub path_with_query: String,
    /// Ordered header name/value pairs beyond the transport's standard set.
    pub additional_headers: Vec<(String, String)>,
    /// Raw body bytes; empty for body-less requests.
    pub body: Vec<u8>,
}

impl RequestComponents {
    /// Build components, normalizing the path to start with `/`.
    #[must_use]
    pub fn new(
        path_with_query: impl Into<String>,
        additional_headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Self {
        let mut path_with_query = path_with_query.into();
        if !path_with_query.starts_with('/') {
            path_with_query.insert(0, '/');
        }
        Self {
            path_with_query,
            additional_headers,
            body,
        }
    }
}

/// The raw pieces of one HTTP response attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseComponents {
    /// Ordered response header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Response body, absent when the response carried none.
    pub body: Option<Bytes>,
}

impl ResponseComponents {
    /// Build response components.
    #[must_use]
    pub fn new(headers: Vec<(String, String)>, body: Option<Bytes>) -> Self {
        Self { headers, body }
    }

    /// First value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pipeline contracts
// ---------------------------------------------------------------------------

/// Turns a logical input into [`RequestComponents`].
pub trait OperationEncoder<In> {
    /// Encode the input and its query string.
    fn encode_input_and_query_string(
        &self,
        input: &In,
        http_path: &str,
        reporting: &InvocationReporting,
    ) -> Result<RequestComponents, ClientError>;
}

/// Turns [`ResponseComponents`] into an operation's output.
pub trait OperationDecoder<Out> {
    /// Decode the output from the response body and headers.
    fn decode_output(
        &self,
        components: &ResponseComponents,
        reporting: &InvocationReporting,
    ) -> Result<Out, ClientError>;
}

/// Produces a typed [`ClientError`] from a non-success response.
pub trait ResponseErrorProvider: Send + Sync {
    /// Extract the error carried by a non-success response.
    fn get_response_error(
        &self,
        status: u16,
        components: &ResponseComponents,
        reporting: &InvocationReporting,
    ) -> ClientError;
}

// ---------------------------------------------------------------------------
// Per-invocation delegate
// ---------------------------------------------------------------------------

/// Per-invocation handler capability: header policy for zero-length bodies
/// and a first crack at mapping error responses.
pub trait InvocationDelegate: Send + Sync {
    /// Whether `Content-Type`/`Content-Length` should be sent even when the
    /// body is empty.
    fn specify_content_headers_for_zero_length_body(&self) -> bool {
        false
    }

    /// Map a non-success response to an error before the configured
    /// [`ResponseErrorProvider`] is consulted. `None` defers.
    fn handle_error_response(
        &self,
        _status: u16,
        _components: &ResponseComponents,
        _reporting: &InvocationReporting,
    ) -> Option<ClientError> {
        None
    }
}

/// Delegate with the default behavior for every hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInvocationDelegate;

impl InvocationDelegate for DefaultInvocationDelegate {}
