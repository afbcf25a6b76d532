// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! courier-client
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Retry orchestration and the invocation-client facade.

pub mod blocking;
pub mod cancel;
pub mod facade;
pub mod retry;

pub use cancel::CancellationToken;
pub use facade::InvocationClient;
pub use retry::{OutwardsCall, RetriableExecution, execute_retriable};
