// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-endpoint invocation client: four verbs over one configured
//! transport and default invocation context.

use crate::cancel::CancellationToken;
use crate::retry::{OutwardsCall, RetriableExecution};
use courier_aggregator::{OutputRequestRecord, OutwardsRequestAggregator};
use courier_codec::{
    DefaultInvocationDelegate, HeadersEncodable, InvocationDelegate, JsonErrorProvider,
    JsonOperationDecoder, JsonOperationEncoder, OperationDecoder, OperationEncoder, PathEncodable,
    QueryEncodable, RequestComponents, RequestInput, ResponseComponents, ResponseErrorProvider,
};
use courier_error::{ClientError, ErrorCategory, is_retryable};
use courier_reporting::{InvocationContext, InvocationReporting};
use courier_retry::RetryConfig;
use courier_transport::{HttpTransport, TransportConfig};
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Per-endpoint configured entry point.
///
/// Pairs a pooled [`HttpTransport`] with a default [`InvocationContext`],
/// a [`RetryConfig`], and the JSON codec. Each call derives a decorated
/// per-invocation context (fresh outgoing request id, endpoint/operation
/// span metadata); the retriable verbs run the orchestrator, the plain
/// verbs perform exactly one attempt.
#[derive(Clone)]
pub struct InvocationClient<D = DefaultInvocationDelegate> {
    transport: HttpTransport,
    retry_config: RetryConfig,
    context: InvocationContext<D>,
    error_provider: Arc<dyn ResponseErrorProvider>,
}

impl<D: std::fmt::Debug> std::fmt::Debug for InvocationClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationClient")
            .field("transport", &self.transport)
            .field("retry_config", &self.retry_config)
            .field("context", &self.context)
            .finish()
    }
}

impl InvocationClient<DefaultInvocationDelegate> {
    /// Client over the given endpoint with default retry policy, context,
    /// delegate, and the JSON error provider.
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
            retry_config: RetryConfig::default(),
            context: InvocationContext::new(InvocationReporting::new(), DefaultInvocationDelegate),
            error_provider: Arc::new(JsonErrorProvider),
        })
    }
}

impl<D: InvocationDelegate + Clone> InvocationClient<D> {
    /// Swap in a different per-invocation delegate.
    #[must_use]
    pub fn with_delegate<D2: InvocationDelegate + Clone>(
        self,
        delegate: D2,
    ) -> InvocationClient<D2> {
        InvocationClient {
            transport: self.transport,
            retry_config: self.retry_config,
            context: InvocationContext::new(self.context.reporting().clone(), delegate),
            error_provider: self.error_provider,
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Replace the default reporting (trace context, metrics, aggregator).
    #[must_use]
    pub fn with_reporting(mut self, reporting: InvocationReporting) -> Self {
        self.context = self.context.with_reporting(reporting);
        self
    }

    /// Replace the response-error provider.
    #[must_use]
    pub fn with_error_provider(mut self, provider: Arc<dyn ResponseErrorProvider>) -> Self {
        self.error_provider = provider;
        self
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// The active retry policy.
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Release the owned transport. Idempotent.
    pub fn shutdown(&self) {
        self.transport.shutdown();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.transport.is_shut_down()
    }

    // ── Plumbing ────────────────────────────────────────────────────

    fn invocation_context(
        &self,
        endpoint: Option<&str>,
        operation: Option<&str>,
    ) -> InvocationContext<D> {
        let host = endpoint.unwrap_or(&self.transport.config().host);
        let reporting = self.context.reporting().for_new_invocation();
        InvocationContext::new(reporting, self.context.delegate().clone())
            .with_outgoing_request_id_metadata()
            .with_outgoing_decorated_span(host, operation)
    }

    fn base_url_for(&self, endpoint: Option<&str>) -> String {
        match endpoint {
            Some(host) => {
                let config = self.transport.config();
                let scheme = if config.tls.is_some() { "https" } else { "http" };
                format!("{scheme}://{host}:{}", config.port)
            }
            None => self.transport.config().base_url(),
        }
    }

    fn encode<Q, P, B, H>(
        &self,
        input: &RequestInput<Q, P, B, H>,
        endpoint_path: &str,
        reporting: &InvocationReporting,
    ) -> Result<RequestComponents, ClientError>
    where
        Q: QueryEncodable,
        P: PathEncodable,
        B: Serialize,
        H: HeadersEncodable,
    {
        JsonOperationEncoder.encode_input_and_query_string(input, endpoint_path, reporting)
    }

    /// One non-retriable attempt: transport, then `finish`, then metrics and
    /// aggregator records for the whole invocation.
    async fn run_single<T>(
        &self,
        ctx: &InvocationContext<D>,
        base_url: &str,
        method: Method,
        components: &RequestComponents,
        finish: impl FnOnce(ResponseComponents) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let reporting = ctx.reporting();
        let started = Instant::now();

        let result = match self
            .transport
            .execute_at(
                base_url,
                method,
                components,
                reporting,
                ctx.delegate(),
                self.error_provider.as_ref(),
            )
            .await
        {
            Ok(response) => finish(response),
            Err(error) => Err(error),
        };

        match &result {
            Ok(_) => reporting.metrics().record_success(),
            Err(error) => match error.category() {
                ErrorCategory::ClientError => reporting.metrics().record_client_error(),
                ErrorCategory::ServerError => reporting.metrics().record_server_error(),
            },
        }
        reporting.metrics().record_latency(started.elapsed());
        if let Some(aggregator) = reporting.aggregator() {
            aggregator.record_outwards_request(OutputRequestRecord::new(started.elapsed()));
        }

        result
    }

    async fn run_retriable<T, F, Fut>(
        &self,
        ctx: &InvocationContext<D>,
        call: OutwardsCall,
        cancellation: Option<&CancellationToken>,
        attempt: F,
    ) -> Result<T, ClientError>
    where
        F: FnMut(RequestComponents, InvocationReporting) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut execution = RetriableExecution::new(ctx, &self.retry_config);
        if let Some(token) = cancellation {
            execution = execution.with_cancellation(token);
        }
        execution.run(call, is_retryable, attempt).await
    }

    // ── Verbs ───────────────────────────────────────────────────────

    /// One attempt, decoded output.
    pub async fn execute_with_output<Q, P, B, H, Out>(
        &self,
        endpoint: Option<&str>,
        endpoint_path: &str,
        method: Method,
        operation: Option<&str>,
        input: &RequestInput<Q, P, B, H>,
    ) -> Result<Out, ClientError>
    where
        Q: QueryEncodable,
        P: PathEncodable,
        B: Serialize,
        H: HeadersEncodable,
        Out: DeserializeOwned,
    {
        let ctx = self.invocation_context(endpoint, operation);
        let components = self.encode(input, endpoint_path, ctx.reporting())?;
        let base_url = self.base_url_for(endpoint);
        self.run_single(&ctx, &base_url, method, &components, |response| {
            JsonOperationDecoder.decode_output(&response, ctx.reporting())
        })
        .await
    }

    /// One attempt, success carries no output.
    pub async fn execute_without_output<Q, P, B, H>(
        &self,
        endpoint: Option<&str>,
        endpoint_path: &str,
        method: Method,
        operation: Option<&str>,
        input: &RequestInput<Q, P, B, H>,
    ) -> Result<(), ClientError>
    where
        Q: QueryEncodable,
        P: PathEncodable,
        B: Serialize,
        H: HeadersEncodable,
    {
        let ctx = self.invocation_context(endpoint, operation);
        let components = self.encode(input, endpoint_path, ctx.reporting())?;
        let base_url = self.base_url_for(endpoint);
        self.run_single(&ctx, &base_url, method, &components, |_response| Ok(()))
            .await
    }

    /// Orchestrated attempts, decoded output.
    pub async fn execute_retriable_with_output<Q, P, B, H, Out>(
        &self,
        endpoint: Option<&str>,
        endpoint_path: &str,
        method: Method,
        operation: Option<&str>,
        input: &RequestInput<Q, P, B, H>,
    ) -> Result<Out, ClientError>
    where
        Q: QueryEncodable,
        P: PathEncodable,
        B: Serialize,
        H: HeadersEncodable,
        Out: DeserializeOwned,
    {
        self.execute_retriable_with_output_cancellable(
            endpoint,
            endpoint_path,
            method,
            operation,
            input,
            None,
        )
        .await
    }

    /// Orchestrated attempts with a caller-provided cancellation token.
    pub async fn execute_retriable_with_output_cancellable<Q, P, B, H, Out>(
        &self,
        endpoint: Option<&str>,
        endpoint_path: &str,
        method: Method,
        operation: Option<&str>,
        input: &RequestInput<Q, P, B, H>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Out, ClientError>
    where
        Q: QueryEncodable,
        P: PathEncodable,
        B: Serialize,
        H: HeadersEncodable,
        Out: DeserializeOwned,
    {
        let ctx = self.invocation_context(endpoint, operation);
        let components = self.encode(input, endpoint_path, ctx.reporting())?;
        let call = OutwardsCall::new(method.clone(), components);

        let transport = self.transport.clone();
        let delegate = ctx.delegate().clone();
        let error_provider = Arc::clone(&self.error_provider);
        let base_url = self.base_url_for(endpoint);

        self.run_retriable(&ctx, call, cancellation, move |components, reporting| {
            let transport = transport.clone();
            let delegate = delegate.clone();
            let error_provider = Arc::clone(&error_provider);
            let base_url = base_url.clone();
            let method = method.clone();
            async move {
                let response = transport
                    .execute_at(
                        &base_url,
                        method,
                        &components,
                        &reporting,
                        &delegate,
                        error_provider.as_ref(),
                    )
                    .await?;
                JsonOperationDecoder.decode_output(&response, &reporting)
            }
        })
        .await
    }

    /// Orchestrated attempts, success carries no output.
    pub async fn execute_retriable_without_output<Q, P, B, H>(
        &self,
        endpoint: Option<&str>,
        endpoint_path: &str,
        method: Method,
        operation: Option<&str>,
        input: &RequestInput<Q, P, B, H>,
    ) -> Result<(), ClientError>
    where
        Q: QueryEncodable,
        P: PathEncodable,
        B: Serialize,
        H: HeadersEncodable,
    {
        self.execute_retriable_without_output_cancellable(
            endpoint,
            endpoint_path,
            method,
            operation,
            input,
            None,
        )
        .await
    }

    /// Orchestrated attempts without output, with a cancellation token.
    pub async fn execute_retriable_without_output_cancellable<Q, P, B, H>(
        &self,
        endpoint: Option<&str>,
        endpoint_path: &str,
        method: Method,
        operation: Option<&str>,
        input: &RequestInput<Q, P, B, H>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<(), ClientError>
    where
        Q: QueryEncodable,
        P: PathEncodable,
        B: Serialize,
        H: HeadersEncodable,
    {
        let ctx = self.invocation_context(endpoint, operation);
        let components = self.encode(input, endpoint_path, ctx.reporting())?;
        let call = OutwardsCall::new(method.clone(), components);

        let transport = self.transport.clone();
        let delegate = ctx.delegate().clone();
        let error_provider = Arc::clone(&self.error_provider);
        let base_url = self.base_url_for(endpoint);

        self.run_retriable(&ctx, call, cancellation, move |components, reporting| {
            let transport = transport.clone();
            let delegate = delegate.clone();
            let error_provider = Arc::clone(&error_provider);
            let base_url = base_url.clone();
            let method = method.clone();
            async move {
                transport
                    .execute_at(
                        &base_url,
                        method,
                        &components,
                        &reporting,
                        &delegate,
                        error_provider.as_ref(),
                    )
                    .await
                    .map(|_| ())
            }
        })
        .await
    }
}
