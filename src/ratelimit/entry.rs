//! Per-key sliding window state and its admission logic.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use super::rules::LimitRule;
use crate::error::{RatewardenError, Result};

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the action was admitted and counted
    pub allowed: bool,
    /// The limit in force for the key
    pub limit: u64,
    /// Actions still admissible in the current window, after this one
    pub remaining: u64,
    /// When the oldest counted action leaves the window
    pub reset_time: DateTime<Utc>,
}

/// Read-only view of an entry, as reported by the admin status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub limit: u64,
    pub window_ms: u64,
    pub current_usage: u64,
    pub remaining: u64,
    pub last_access: DateTime<Utc>,
}

/// Rate limit state for one key.
///
/// Holds the instants of admitted actions. The window slides with the
/// current time: an instant counts while `now - instant < window`.
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    rule: LimitRule,
    timestamps: VecDeque<DateTime<Utc>>,
    last_access: DateTime<Utc>,
}

impl RateLimitEntry {
    /// Create an entry with an empty history.
    pub fn new(rule: LimitRule, now: DateTime<Utc>) -> Self {
        Self {
            rule,
            timestamps: VecDeque::new(),
            last_access: now,
        }
    }

    /// The rule in force for this entry.
    pub fn rule(&self) -> LimitRule {
        self.rule
    }

    /// Replace the rule, keeping history and last access untouched.
    pub fn set_rule(&mut self, rule: LimitRule) {
        self.rule = rule;
    }

    /// Instant of the most recent check.
    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    /// Number of stored timestamps, pruned or not.
    pub fn recorded(&self) -> usize {
        self.timestamps.len()
    }

    /// Drop timestamps that have left the window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.rule.window();
        self.timestamps.retain(|ts| in_window(*ts, now, window));
    }

    /// Count of timestamps still inside the window, without pruning.
    pub fn current_usage(&self, now: DateTime<Utc>) -> u64 {
        let window = self.rule.window();
        self.timestamps
            .iter()
            .filter(|ts| in_window(**ts, now, window))
            .count() as u64
    }

    /// Decide whether one more action is admitted at `now`, and record it if so.
    ///
    /// Fails only if the reset instant cannot be represented, in which case
    /// no action is recorded.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> Result<Decision> {
        self.prune(now);

        let window = self.rule.window();
        let oldest = self.timestamps.iter().min().copied().unwrap_or(now);
        let reset_time = oldest.checked_add_signed(window).ok_or_else(|| {
            RatewardenError::Evaluation(format!(
                "reset time out of range for a {}ms window",
                self.rule.window_ms()
            ))
        })?;

        self.last_access = now;

        let limit = self.rule.limit();
        let used = self.timestamps.len() as u64;

        if used < limit {
            self.timestamps.push_back(now);
            Ok(Decision {
                allowed: true,
                limit,
                remaining: limit - used - 1,
                reset_time,
            })
        } else {
            Ok(Decision {
                allowed: false,
                limit,
                remaining: 0,
                reset_time,
            })
        }
    }

    /// Prune, then report whether the entry may be evicted.
    ///
    /// An entry is expired once it has no timestamps left in the window and
    /// has not been checked for more than twice its window.
    pub fn is_expired(&mut self, now: DateTime<Utc>) -> bool {
        self.prune(now);
        if !self.timestamps.is_empty() {
            return false;
        }

        let window = self.rule.window();
        let idle = now.signed_duration_since(self.last_access);
        idle.checked_sub(&window)
            .is_some_and(|beyond_one_window| beyond_one_window > window)
    }

    /// Snapshot of this entry as seen at `now`.
    pub fn status(&self, now: DateTime<Utc>) -> KeyStatus {
        let current_usage = self.current_usage(now);
        KeyStatus {
            limit: self.rule.limit(),
            window_ms: self.rule.window_ms(),
            current_usage,
            remaining: self.rule.limit().saturating_sub(current_usage),
            last_access: self.last_access,
        }
    }
}

fn in_window(ts: DateTime<Utc>, now: DateTime<Utc>, window: TimeDelta) -> bool {
    now.signed_duration_since(ts) < window
}
