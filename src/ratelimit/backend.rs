//! Rate limiter trait used by the HTTP layer.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::entry::{Decision, KeyStatus};
use super::rules::LimitRule;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// The HTTP middleware and admin handlers only talk to the limiter through
/// this trait, which keeps them independent of how state is stored.
/// Implementations must be synchronous and must not block on I/O.
pub trait RateLimiterBackend: Send + Sync {
    /// Check the rate limit for `key`, counting the action if it is admitted.
    fn check(&self, key: &str, now: DateTime<Utc>) -> Result<Decision>;

    /// Validate and apply a rule to a single key.
    fn set_config(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        now: DateTime<Utc>,
    ) -> Result<LimitRule>;

    /// The rule given to keys seen for the first time.
    fn default_config(&self) -> LimitRule;

    /// Validate and replace the default rule.
    fn set_default_config(&self, limit: i64, window_ms: i64) -> Result<LimitRule>;

    /// Status of every tracked key.
    fn snapshot_all(&self, now: DateTime<Utc>) -> BTreeMap<String, KeyStatus>;
}
