// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! courier-transport
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Single-attempt HTTP execution over a pooled client.

pub mod config;

pub use config::{TlsSettings, TransportConfig};

use courier_codec::{InvocationDelegate, RequestComponents, ResponseComponents,
    ResponseErrorProvider};
use courier_error::ClientError;
use courier_reporting::InvocationReporting;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use std::sync::Mutex;
use tracing::debug;

/// Response status codes treated as success.
const SUCCESS_STATUS: std::ops::RangeInclusive<u16> = 200..=206;

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// Performs one HTTP attempt per [`execute`](HttpTransport::execute) call.
///
/// The underlying `reqwest` client owns the shared connection pool and is
/// internally synchronized, so one transport serves many concurrent
/// invocations. Cloning is cheap and shares pool and shutdown state.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: TransportConfig,
    client: std::sync::Arc<Mutex<Option<reqwest::Client>>>,
}

impl HttpTransport {
    /// Build a transport (and its connection pool) from config.
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout);
        if let Some(tls) = &config.tls {
            if !tls.verify_certificates {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }
        let client = builder.build().map_err(ClientError::connection)?;
        Ok(Self {
            config,
            client: std::sync::Arc::new(Mutex::new(Some(client))),
        })
    }

    /// The transport's configuration.
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Release the pooled client. Idempotent; subsequent `execute` calls
    /// fail with a connection error.
    pub fn shutdown(&self) {
        let mut slot = self.client.lock().expect("transport lock poisoned");
        if slot.take().is_some() {
            debug!(target: "courier.transport", host = %self.config.host, "transport shut down");
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.client.lock().expect("transport lock poisoned").is_none()
    }

    fn client_handle(&self) -> Result<reqwest::Client, ClientError> {
        self.client
            .lock()
            .expect("transport lock poisoned")
            .clone()
            .ok_or_else(|| {
                ClientError::connection(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "transport has been shut down",
                ))
            })
    }

    /// Assemble the outbound header list: the request's additional headers,
    /// content headers (when the body is non-empty or the delegate opts in),
    /// then the always-present identity headers.
    fn assemble_headers<D: InvocationDelegate>(
        &self,
        components: &RequestComponents,
        delegate: &D,
    ) -> Vec<(String, String)> {
        let mut headers = components.additional_headers.clone();
        let body_len = components.body.len();
        if body_len > 0 || delegate.specify_content_headers_for_zero_length_body() {
            headers.push(("content-type".to_string(), self.config.content_type.clone()));
            headers.push(("content-length".to_string(), body_len.to_string()));
        }
        headers.push(("user-agent".to_string(), self.config.client_name.clone()));
        headers.push(("accept".to_string(), "*/*".to_string()));
        headers
    }

    /// Perform one physical attempt against the configured endpoint.
    ///
    /// The trace capability's start hook runs before send with the headers
    /// mutable; its success or failure hook runs on the attempt outcome.
    /// Pass the orchestrator's metrics-less inner reporting here so counters
    /// are recorded exactly once, above this layer.
    pub async fn execute<D: InvocationDelegate>(
        &self,
        method: Method,
        components: &RequestComponents,
        reporting: &InvocationReporting,
        delegate: &D,
        error_provider: &dyn ResponseErrorProvider,
    ) -> Result<ResponseComponents, ClientError> {
        let base_url = self.config.base_url();
        self.execute_at(&base_url, method, components, reporting, delegate, error_provider)
            .await
    }

    /// Perform one physical attempt against an explicit `scheme://host:port`
    /// base, reusing this transport's pool and timeouts.
    pub async fn execute_at<D: InvocationDelegate>(
        &self,
        base_url: &str,
        method: Method,
        components: &RequestComponents,
        reporting: &InvocationReporting,
        delegate: &D,
        error_provider: &dyn ResponseErrorProvider,
    ) -> Result<ResponseComponents, ClientError> {
        let client = self.client_handle()?;
        let url = format!("{base_url}{}", components.path_with_query);

        let mut headers = self.assemble_headers(components, delegate);
        let token = reporting.trace_context().handle_outwards_request_start(
            &method,
            &components.path_with_query,
            reporting.span(),
            reporting.internal_request_id(),
            &mut headers,
            &components.body,
        );

        debug!(
            target: "courier.transport",
            method = %method,
            url = %url,
            request_id = %reporting.internal_request_id(),
            "sending outwards request"
        );

        let outcome = self
            .send(&client, method, &url, headers, components)
            .await;

        match outcome {
            Ok((status, response)) if SUCCESS_STATUS.contains(&status) => {
                reporting.trace_context().handle_outwards_request_success(
                    &token,
                    reporting.span(),
                    reporting.internal_request_id(),
                    status,
                    response.body.as_deref(),
                );
                Ok(response)
            }
            Ok((status, response)) => {
                let error = delegate
                    .handle_error_response(status, &response, reporting)
                    .unwrap_or_else(|| {
                        error_provider.get_response_error(status, &response, reporting)
                    });
                reporting.trace_context().handle_outwards_request_failure(
                    &token,
                    reporting.span(),
                    reporting.internal_request_id(),
                    Some(status),
                    response.body.as_deref(),
                    &error,
                );
                Err(error)
            }
            Err(error) => {
                reporting.trace_context().handle_outwards_request_failure(
                    &token,
                    reporting.span(),
                    reporting.internal_request_id(),
                    None,
                    None,
                    &error,
                );
                Err(error)
            }
        }
    }

    async fn send(
        &self,
        client: &reqwest::Client,
        method: Method,
        url: &str,
        headers: Vec<(String, String)>,
        components: &RequestComponents,
    ) -> Result<(u16, ResponseComponents), ClientError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in &headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(ClientError::encode)?;
            let value = HeaderValue::from_str(value).map_err(ClientError::encode)?;
            header_map.append(name, value);
        }

        let mut request = client.request(method, url).headers(header_map);
        if !components.body.is_empty() {
            request = request.body(components.body.clone());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let body = (!body.is_empty()).then_some(body);

        Ok((status, ResponseComponents::new(response_headers, body)))
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Map a transport-stack error onto the [`ClientError`] taxonomy:
/// connection-create failures become 500s, deadline expiries become
/// timeouts, mid-flight closures become transient closure kinds, a channel
/// that went away without ever producing a response becomes the fixed
/// unexpected-closure error, and anything unclassified is wrapped at 400.
fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_connect() {
        if err.is_timeout() {
            return ClientError::connect_timeout();
        }
        return ClientError::connection(err);
    }
    if err.is_timeout() {
        return ClientError::read_timeout();
    }
    if err.is_body() || err.is_decode() {
        return ClientError::stream_closed();
    }
    if source_chain_mentions(&err, "connection reset") {
        return ClientError::remote_connection_closed();
    }
    // hyper's IncompleteMessage: the connection closed cleanly before any
    // complete response arrived.
    if source_chain_mentions(&err, "connection closed before message completed")
        || source_chain_mentions(&err, "IncompleteMessage")
    {
        return ClientError::unexpected_closure();
    }
    ClientError::other(err)
}

fn source_chain_mentions(err: &dyn std::error::Error, needle: &str) -> bool {
    let mut current: Option<&dyn std::error::Error> = Some(err);
    while let Some(e) = current {
        if e.to_string().contains(needle) {
            return true;
        }
        current = e.source();
    }
    false
}
