// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for the blocking adapter. The full behavior is exercised through
//! the async facade; here we check the `block_on` plumbing and lifecycle.

use courier_client::blocking;
use courier_client::InvocationClient;
use courier_codec::RequestInput;
use courier_error::ClientErrorKind;
use courier_retry::RetryConfig;
use courier_transport::TransportConfig;
use http::Method;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Item {
    #[allow(dead_code)]
    v: u32,
}

fn fast_retry() -> RetryConfig {
    RetryConfig::builder()
        .num_retries(1)
        .base_interval(Duration::from_millis(1))
        .max_interval(Duration::from_millis(5))
        .jitter(false)
        .build()
        .unwrap()
}

#[test]
fn blocking_retriable_call_drives_the_async_core() {
    // Nothing listens on port 1: every attempt fails with a connection
    // error, which is retriable, so the orchestrator runs to exhaustion.
    let async_client = InvocationClient::new(TransportConfig::new("127.0.0.1", 1))
        .unwrap()
        .with_retry_config(fast_retry());
    let client = blocking::InvocationClient::from_async(async_client).unwrap();

    let err = client
        .execute_retriable_with_output::<_, _, (), _, Item>(
            None,
            "/v1/items",
            Method::GET,
            None,
            &RequestInput::empty(),
        )
        .unwrap_err();

    assert_eq!(err.response_code(), 500);
    assert!(matches!(err.kind(), ClientErrorKind::ConnectionFailed(_)));
}

#[test]
fn blocking_plain_call_and_idempotent_shutdown() {
    let client = blocking::InvocationClient::new(TransportConfig::new("127.0.0.1", 1)).unwrap();

    let err = client
        .execute_without_output(None, "/v1/items", Method::GET, None, &RequestInput::empty())
        .unwrap_err();
    assert_eq!(err.response_code(), 500);

    client.shutdown();
    client.shutdown();
    assert!(client.as_async().is_shut_down());
}
