// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! courier
#![deny(unsafe_code)]
//!
//! Umbrella crate re-exporting the Courier workspace surface.

pub use courier_aggregator as aggregator;
pub use courier_client as client;
pub use courier_codec as codec;
pub use courier_error as error;
pub use courier_reporting as reporting;
pub use courier_retry as retry;
pub use courier_transport as transport;

pub use courier_client::{CancellationToken, InvocationClient, OutwardsCall, RetriableExecution};
pub use courier_codec::{BodyRequestInput, RequestComponents, RequestInput, ResponseComponents};
pub use courier_error::{ClientError, ClientErrorKind, ErrorCategory};
pub use courier_reporting::{InvocationContext, InvocationReporting, MetricsHandles};
pub use courier_retry::RetryConfig;
pub use courier_transport::{HttpTransport, TlsSettings, TransportConfig};
