//! Retry and fallback policies applied around each stage invocation.
//!
//! Both default to off: a failed stage halts the run immediately.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use super::registry::{DiscoveryRegistry, Endpoint};
use crate::error::PassportError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per endpoint, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn exponential(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }

    /// Whether a failure on attempt `attempt` (1-based) warrants another try.
    /// Only transient failures qualify; bad payloads never do.
    pub fn should_retry(&self, attempt: u32, err: &PassportError) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }

    /// Delay before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(scaled.max(0.0)).min(self.max_backoff.max(self.initial_backoff))
    }
}

/// Supplies an alternate endpoint once a stage's current endpoint has
/// exhausted its retries.
#[async_trait]
pub trait FallbackResolver: Send + Sync {
    async fn fallback(&self, skill: &str, failed: &Endpoint) -> Option<Endpoint>;
}

/// No alternates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

#[async_trait]
impl FallbackResolver for NoFallback {
    async fn fallback(&self, _skill: &str, _failed: &Endpoint) -> Option<Endpoint> {
        None
    }
}

/// Ordered alternates per skill.
#[derive(Debug, Clone, Default)]
pub struct StaticFallback {
    alternates: BTreeMap<String, Vec<Endpoint>>,
}

impl StaticFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, skill: impl Into<String>, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.alternates
            .entry(skill.into())
            .or_default()
            .extend(endpoints);
        self
    }
}

/// The alternate after `failed` in `list`, or the first one when `failed`
/// is not listed.
fn next_after(list: &[Endpoint], failed: &Endpoint) -> Option<Endpoint> {
    match list.iter().position(|ep| ep == failed) {
        Some(idx) => list.get(idx + 1).cloned(),
        None => list.first().cloned(),
    }
}

#[async_trait]
impl FallbackResolver for StaticFallback {
    async fn fallback(&self, skill: &str, failed: &Endpoint) -> Option<Endpoint> {
        next_after(self.alternates.get(skill)?, failed)
    }
}

#[async_trait]
impl FallbackResolver for DiscoveryRegistry {
    async fn fallback(&self, skill: &str, failed: &Endpoint) -> Option<Endpoint> {
        let endpoints = self.endpoints_for(skill);
        let idx = endpoints.iter().position(|ep| ep == failed)?;
        endpoints.get(idx + 1).cloned()
    }
}
