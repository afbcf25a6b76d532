// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! courier-retry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Immutable retry configuration and backoff computation.

use courier_error::ClientError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ── Policy constants ────────────────────────────────────────────────

/// How many transient connection closures (stream closed, remote connection
/// closed) an invocation may absorb without spending retry slots.
///
/// Current policy, not a contract.
pub const ABORTED_ATTEMPTS_BUDGET: u32 = 5;

/// Fixed wait before re-attempting after a transient connection closure.
///
/// Current policy, not a contract.
pub const ABORTED_ATTEMPT_WAIT: Duration = Duration::from_millis(2);

/// Serde helper — `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        (val.as_millis() as u64).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

// ── Predicate ───────────────────────────────────────────────────────

/// Shared retry predicate over a [`ClientError`].
///
/// Returning `true` asks for a retry; the orchestrator still refuses to
/// retry client-category (4xx) errors regardless of what a predicate says.
pub type RetryPredicate = Arc<dyn Fn(&ClientError) -> bool + Send + Sync>;

// ── Configuration ───────────────────────────────────────────────────

/// Errors produced when validating a [`RetryConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryConfigError {
    /// `base_interval` must be strictly positive.
    #[error("base interval must be greater than zero")]
    ZeroBaseInterval,

    /// `max_interval` must be at least `base_interval`.
    #[error("max interval {max_ms}ms is below base interval {base_ms}ms")]
    MaxBelowBase {
        /// Configured maximum, in milliseconds.
        max_ms: u64,
        /// Configured base, in milliseconds.
        base_ms: u64,
    },

    /// `exponential_base` must be at least 1.0.
    #[error("exponential base {0} is below 1.0")]
    ExponentialBaseTooSmall(f64),
}

/// Immutable backoff policy for a retryable invocation.
///
/// Constructed once at client setup and shared freely; the orchestrator
/// never mutates it.
///
/// # Examples
///
/// ```
/// use courier_retry::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::builder()
///     .num_retries(3)
///     .base_interval(Duration::from_millis(500))
///     .max_interval(Duration::from_secs(10))
///     .exponential_base(2.0)
///     .jitter(false)
///     .build()
///     .unwrap();
///
/// // base · exp^k, capped at max: 500, 1000, 2000 ms.
/// assert_eq!(config.compute_interval(3), Duration::from_millis(500));
/// assert_eq!(config.compute_interval(2), Duration::from_millis(1000));
/// assert_eq!(config.compute_interval(1), Duration::from_millis(2000));
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt. `0` means only
    /// the initial attempt.
    pub num_retries: u32,
    /// Base interval for exponential backoff.
    #[serde(with = "duration_millis")]
    pub base_interval: Duration,
    /// Cap applied to the computed interval.
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,
    /// Multiplier applied per consumed retry.
    pub exponential_base: f64,
    /// Whether the wait is drawn uniformly from `[0, interval)`.
    pub jitter: bool,
    /// Optional policy-level retry predicate. When present it overrides the
    /// caller-supplied predicate for server-category errors.
    #[serde(skip)]
    pub retry_on_error: Option<RetryPredicate>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            num_retries: 3,
            base_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: true,
            retry_on_error: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("num_retries", &self.num_retries)
            .field("base_interval", &self.base_interval)
            .field("max_interval", &self.max_interval)
            .field("exponential_base", &self.exponential_base)
            .field("jitter", &self.jitter)
            .field("retry_on_error", &self.retry_on_error.is_some())
            .finish()
    }
}

impl PartialEq for RetryConfig {
    fn eq(&self, other: &Self) -> bool {
        self.num_retries == other.num_retries
            && self.base_interval == other.base_interval
            && self.max_interval == other.max_interval
            && self.exponential_base == other.exponential_base
            && self.jitter == other.jitter
            && self.retry_on_error.is_some() == other.retry_on_error.is_some()
    }
}

impl RetryConfig {
    /// Start building a config. All fields default to [`RetryConfig::default`].
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Compute the (un-jittered) backoff interval for the attempt that
    /// follows, given how many retries are still available.
    ///
    /// `interval = min(max_interval, base_interval · exponential_base^k)`
    /// with `k = num_retries − retries_remaining`, truncated to integer
    /// milliseconds.
    #[must_use]
    pub fn compute_interval(&self, retries_remaining: u32) -> Duration {
        let attempt_index = self.num_retries.saturating_sub(retries_remaining);
        let factor = self.exponential_base.powi(attempt_index as i32);
        let raw_ms = self.base_interval.as_millis() as f64 * factor;
        let capped_ms = raw_ms.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Compute the actual wait before the next attempt.
    ///
    /// With jitter enabled and a nonzero interval the wait is drawn
    /// uniformly from `[0, interval)`; otherwise it equals the interval.
    #[must_use]
    pub fn compute_wait(&self, retries_remaining: u32) -> Duration {
        let interval = self.compute_interval(retries_remaining);
        let interval_ms = interval.as_millis() as u64;
        if self.jitter && interval_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..interval_ms))
        } else {
            interval
        }
    }

    /// Validate the config's invariants.
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if self.base_interval.is_zero() {
            return Err(RetryConfigError::ZeroBaseInterval);
        }
        if self.max_interval < self.base_interval {
            return Err(RetryConfigError::MaxBelowBase {
                max_ms: self.max_interval.as_millis() as u64,
                base_ms: self.base_interval.as_millis() as u64,
            });
        }
        if self.exponential_base < 1.0 {
            return Err(RetryConfigError::ExponentialBaseTooSmall(
                self.exponential_base,
            ));
        }
        Ok(())
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Fluent builder for [`RetryConfig`]; `build` validates the invariants.
#[derive(Debug, Default, Clone)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Maximum number of retries after the initial attempt.
    #[must_use]
    pub fn num_retries(mut self, n: u32) -> Self {
        self.config.num_retries = n;
        self
    }

    /// Base backoff interval.
    #[must_use]
    pub fn base_interval(mut self, d: Duration) -> Self {
        self.config.base_interval = d;
        self
    }

    /// Cap for the computed interval.
    #[must_use]
    pub fn max_interval(mut self, d: Duration) -> Self {
        self.config.max_interval = d;
        self
    }

    /// Per-retry multiplier.
    #[must_use]
    pub fn exponential_base(mut self, base: f64) -> Self {
        self.config.exponential_base = base;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, on: bool) -> Self {
        self.config.jitter = on;
        self
    }

    /// Policy-level retry predicate, overriding the caller-supplied one.
    #[must_use]
    pub fn retry_on_error(
        mut self,
        predicate: impl Fn(&ClientError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.config.retry_on_error = Some(Arc::new(predicate));
        self
    }

    /// Validate and produce the config.
    pub fn build(self) -> Result<RetryConfig, RetryConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
