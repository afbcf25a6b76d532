// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON implementations of the codec contracts.

use crate::input::{HeadersEncodable, PathEncodable, QueryEncodable, RequestInput};
use crate::{OperationDecoder, OperationEncoder, RequestComponents, ResponseComponents,
    ResponseErrorProvider};
use courier_error::{BoxError, ClientError};
use courier_reporting::InvocationReporting;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::form_urlencoded;

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Encoder producing a JSON body and a percent-encoded query string.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonOperationEncoder;

impl JsonOperationEncoder {
    fn substituted_path<P: PathEncodable>(
        http_path: &str,
        path: Option<&P>,
        postfix: Option<&str>,
    ) -> String {
        let mut out = http_path.to_string();
        if let Some(p) = path {
            for (name, value) in p.path_segments() {
                out = out.replace(&format!("{{{name}}}"), &value);
            }
        }
        if let Some(postfix) = postfix {
            if !out.ends_with('/') && !postfix.starts_with('/') {
                out.push('/');
            }
            out.push_str(postfix);
        }
        out
    }

    fn query_string<Q: QueryEncodable>(query: Option<&Q>) -> String {
        let Some(query) = query else {
            return String::new();
        };
        let pairs = query.query_pairs();
        if pairs.is_empty() {
            return String::new();
        }
        let mut ser = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            ser.append_pair(&k, &v);
        }
        ser.finish()
    }
}

impl<Q, P, B, H> OperationEncoder<RequestInput<Q, P, B, H>> for JsonOperationEncoder
where
    Q: QueryEncodable,
    P: PathEncodable,
    B: Serialize,
    H: HeadersEncodable,
{
    fn encode_input_and_query_string(
        &self,
        input: &RequestInput<Q, P, B, H>,
        http_path: &str,
        _reporting: &InvocationReporting,
    ) -> Result<RequestComponents, ClientError> {
        let mut path_with_query =
            Self::substituted_path(http_path, input.path.as_ref(), input.path_postfix.as_deref());
        let query = Self::query_string(input.query.as_ref());
        if !query.is_empty() {
            path_with_query.push('?');
            path_with_query.push_str(&query);
        }

        let body = match &input.body {
            Some(body) => serde_json::to_vec(body).map_err(ClientError::encode)?,
            None => Vec::new(),
        };

        let additional_headers = input
            .additional_headers
            .as_ref()
            .map(HeadersEncodable::header_pairs)
            .unwrap_or_default();

        Ok(RequestComponents::new(
            path_with_query,
            additional_headers,
            body,
        ))
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decoder deserializing the whole output from the JSON response body.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonOperationDecoder;

impl<Out: DeserializeOwned> OperationDecoder<Out> for JsonOperationDecoder {
    fn decode_output(
        &self,
        components: &ResponseComponents,
        _reporting: &InvocationReporting,
    ) -> Result<Out, ClientError> {
        let body = components
            .body
            .as_ref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                ClientError::decode(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "response body was empty",
                ))
            })?;
        serde_json::from_slice(body).map_err(ClientError::decode)
    }
}

/// Output assembled from a JSON-decoded body part and the response headers.
///
/// Either provider may fail; failures surface as decode errors from the
/// composing decoder.
pub trait OutputComposer: Sized {
    /// The body-derived component.
    type Body: DeserializeOwned;

    /// Combine the decoded body with whatever the headers contribute.
    fn compose(body: Self::Body, headers: &[(String, String)]) -> Result<Self, BoxError>;
}

/// Decoder for outputs that draw on both the response body and headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComposedJsonDecoder;

impl<Out: OutputComposer> OperationDecoder<Out> for ComposedJsonDecoder {
    fn decode_output(
        &self,
        components: &ResponseComponents,
        reporting: &InvocationReporting,
    ) -> Result<Out, ClientError> {
        let body: Out::Body = JsonOperationDecoder.decode_output(components, reporting)?;
        Out::compose(body, &components.headers).map_err(ClientError::decode)
    }
}

// ---------------------------------------------------------------------------
// Error provider
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Extracts a service error message from a JSON error body, falling back to
/// a bare status error when the body is absent or unparseable.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonErrorProvider;

impl ResponseErrorProvider for JsonErrorProvider {
    fn get_response_error(
        &self,
        status: u16,
        components: &ResponseComponents,
        _reporting: &InvocationReporting,
    ) -> ClientError {
        if let Some(body) = components.body.as_ref() {
            if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
                if let Some(message) = parsed.message.or(parsed.error) {
                    return ClientError::api(status, message);
                }
            }
        }
        ClientError::http_status(status)
    }
}

/// Error provider that never looks at the body.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpStatusErrorProvider;

impl ResponseErrorProvider for HttpStatusErrorProvider {
    fn get_response_error(
        &self,
        status: u16,
        _components: &ResponseComponents,
        _reporting: &InvocationReporting,
    ) -> ClientError {
        ClientError::http_status(status)
    }
}
