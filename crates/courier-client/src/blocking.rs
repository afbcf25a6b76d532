// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blocking entry points: `block_on` adapters over the async core.
//!
//! There is exactly one retry state machine, the async one. This module
//! owns a current-thread runtime and drives it to completion per call.

use courier_codec::{
    DefaultInvocationDelegate, HeadersEncodable, InvocationDelegate, PathEncodable,
    QueryEncodable, RequestInput,
};
use courier_error::ClientError;
use courier_transport::TransportConfig;
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::Runtime;

/// Blocking counterpart of [`crate::InvocationClient`].
#[derive(Debug)]
pub struct InvocationClient<D = DefaultInvocationDelegate> {
    inner: crate::InvocationClient<D>,
    runtime: Runtime,
}

impl InvocationClient<DefaultInvocationDelegate> {
    /// Blocking client over the given endpoint with default policy.
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        Self::from_async(crate::InvocationClient::new(config)?)
    }
}

impl<D: InvocationDelegate + Clone> InvocationClient<D> {
    /// Wrap a configured async client behind a blocking surface.
    pub fn from_async(inner: crate::InvocationClient<D>) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ClientError::other)?;
        Ok(Self { inner, runtime })
    }

    /// The wrapped async client.
    #[must_use]
    pub fn as_async(&self) -> &crate::InvocationClient<D> {
        &self.inner
    }

    /// Release the owned transport. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// One attempt, decoded output.
    pub fn execute_with_output<Q, P, B, H, Out>(
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
        self.runtime.block_on(self.inner.execute_with_output(
            endpoint,
            endpoint_path,
            method,
            operation,
            input,
        ))
    }

    /// One attempt, success carries no output.
    pub fn execute_without_output<Q, P, B, H>(
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
        self.runtime.block_on(self.inner.execute_without_output(
            endpoint,
            endpoint_path,
            method,
            operation,
            input,
        ))
    }

    /// Orchestrated attempts, decoded output.
    pub fn execute_retriable_with_output<Q, P, B, H, Out>(
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
        self.runtime
            .block_on(self.inner.execute_retriable_with_output(
                endpoint,
                endpoint_path,
                method,
                operation,
                input,
            ))
    }

    /// Orchestrated attempts, success carries no output.
    pub fn execute_retriable_without_output<Q, P, B, H>(
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
        self.runtime
            .block_on(self.inner.execute_retriable_without_output(
                endpoint,
                endpoint_path,
                method,
                operation,
                input,
            ))
    }
}
