//! Fixed-window abuse rate limiting keyed by client identity.
//!
//! Every failed request (validation or domain error) records a failure for
//! the client. Once the count passes the rule's limit, further requests get
//! a general "too many attempts" error until the window runs out.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Backing counter service for the rate limiter.
pub trait FailureCounter: Send + Sync {
    /// Atomically increments the counter for `key` and returns the new count.
    ///
    /// An expired counter restarts at 1. The expiry is moved to
    /// `now + window` only while the count is within `limit`, so failures
    /// past the limit never extend the window.
    fn increment_failure(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<u32>;

    /// Current count for `key`, or 0 if absent or expired.
    fn failure_count(&self, key: &str, now: DateTime<Utc>) -> Result<u32>;
}

/// Threshold and window for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_secs: i64,
}

impl RateLimitRule {
    pub const LOGIN: RateLimitRule = RateLimitRule::new(6, 10);
    pub const SIGNUP: RateLimitRule = RateLimitRule::new(8, 10);
    pub const MUTATION: RateLimitRule = RateLimitRule::new(6, 10);

    pub const fn new(limit: u32, window_secs: i64) -> Self {
        Self { limit, window_secs }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }
}

pub struct RateLimiter<'a> {
    counter: &'a dyn FailureCounter,
    key: String,
    rule: RateLimitRule,
}

impl<'a> RateLimiter<'a> {
    /// Limiter shared by every route for this client.
    pub fn new(counter: &'a dyn FailureCounter, client: &str, rule: RateLimitRule) -> Self {
        Self {
            counter,
            key: format!("failed_attempts:{client}"),
            rule,
        }
    }

    /// Limiter scoped to a single route for this client.
    pub fn for_route(
        counter: &'a dyn FailureCounter,
        client: &str,
        route: &str,
        rule: RateLimitRule,
    ) -> Self {
        Self {
            counter,
            key: format!("failed_attempts:{client}:{route}"),
            rule,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn record_failure(&self) -> Result<u32> {
        self.record_failure_at(Utc::now())
    }

    pub fn record_failure_at(&self, now: DateTime<Utc>) -> Result<u32> {
        let count = self
            .counter
            .increment_failure(&self.key, self.rule.limit, self.rule.window(), now)?;
        tracing::debug!(key = %self.key, count, limit = self.rule.limit, "recorded failed attempt");
        Ok(count)
    }

    pub fn limit_exceeded(&self) -> Result<bool> {
        self.limit_exceeded_at(Utc::now())
    }

    pub fn limit_exceeded_at(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.counter.failure_count(&self.key, now)? > self.rule.limit)
    }
}
