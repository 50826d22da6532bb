//! Validated rate limit rules.
//!
//! A [`LimitRule`] is the `{limit, windowMs}` pair applied to a key. The only
//! ways to obtain one are [`LimitRule::new`] and deserialisation, and both
//! reject non-positive values, so every rule held by the store is valid.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RatewardenError, Result};

/// Maximum admitted actions and the window they are counted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRule")]
pub struct LimitRule {
    limit: u64,
    window_ms: u64,
}

/// Unvalidated wire form of a rule.
///
/// Accepts `windowMs` (HTTP bodies) and `window_ms` (YAML configuration).
#[derive(Debug, Clone, Copy, Deserialize)]
struct RawRule {
    limit: i64,
    #[serde(rename = "windowMs", alias = "window_ms")]
    window_ms: i64,
}

impl TryFrom<RawRule> for LimitRule {
    type Error = RatewardenError;

    fn try_from(raw: RawRule) -> Result<Self> {
        LimitRule::new(raw.limit, raw.window_ms)
    }
}

impl LimitRule {
    /// Validate and build a rule.
    ///
    /// Fails with [`RatewardenError::InvalidConfig`] when either value is zero
    /// or negative.
    pub fn new(limit: i64, window_ms: i64) -> Result<Self> {
        if limit <= 0 {
            return Err(RatewardenError::InvalidConfig(
                "Limit must be greater than 0".to_string(),
            ));
        }
        if window_ms <= 0 {
            return Err(RatewardenError::InvalidConfig(
                "Window duration must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            limit: limit as u64,
            window_ms: window_ms as u64,
        })
    }

    /// Maximum admitted actions per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Window length as a calendar delta.
    pub fn window(&self) -> TimeDelta {
        // window_ms never exceeds i64::MAX, which TimeDelta can hold
        TimeDelta::try_milliseconds(self.window_ms as i64).unwrap_or(TimeDelta::MAX)
    }

    /// Window length as a std duration.
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for LimitRule {
    fn default() -> Self {
        Self {
            limit: 10,
            window_ms: 60_000,
        }
    }
}

impl std::fmt::Display for LimitRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} per {}ms", self.limit, self.window_ms)
    }
}
