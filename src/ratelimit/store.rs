//! The limiter store: the authoritative map from key to rate limit entry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, trace};

use super::backend::RateLimiterBackend;
use super::entry::{Decision, KeyStatus, RateLimitEntry};
use super::rules::LimitRule;
use crate::error::Result;

/// Thread-safe store of per-key rate limit entries.
///
/// Entries live in a sharded map. Every operation on a key runs while
/// holding that key's shard guard, so concurrent checks on the same key are
/// serialised and can never admit more than the limit together. Keys on
/// other shards are unaffected.
pub struct LimiterStore {
    /// Rate limit entries indexed by client key
    entries: DashMap<String, RateLimitEntry>,
    /// Rule seeded into keys seen for the first time
    default_rule: RwLock<LimitRule>,
    /// Fixed rules seeded into specific keys instead of the default
    overrides: HashMap<String, LimitRule>,
}

impl LimiterStore {
    /// Create an empty store with the given default rule.
    pub fn new(default_rule: LimitRule) -> Self {
        Self::with_overrides(default_rule, HashMap::new())
    }

    /// Create an empty store where the listed keys start with their own rule.
    ///
    /// Overrides only decide the rule an entry is created with. A key that is
    /// evicted and seen again gets its override back.
    pub fn with_overrides(default_rule: LimitRule, overrides: HashMap<String, LimitRule>) -> Self {
        Self {
            entries: DashMap::new(),
            default_rule: RwLock::new(default_rule),
            overrides,
        }
    }

    /// Check the rate limit for `key` at `now`, counting the action if admitted.
    ///
    /// Unknown keys are created from their override, or else from a snapshot
    /// of the current default rule.
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> Result<Decision> {
        trace!(key = %key, "Checking rate limit");

        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            let rule = self.rule_for_new_key(key);
            debug!(key = %key, rule = %rule, "Creating new rate limit entry");
            RateLimitEntry::new(rule, now)
        });

        let decision = entry.evaluate(now)?;
        drop(entry);

        if !decision.allowed {
            debug!(
                key = %key,
                limit = decision.limit,
                reset_time = %decision.reset_time,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Set the rule for a single key.
    ///
    /// Creates the entry with an empty history if the key is unknown;
    /// otherwise replaces its rule and keeps its history. Nothing changes if
    /// validation fails.
    pub fn set_config(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        now: DateTime<Utc>,
    ) -> Result<LimitRule> {
        let rule = LimitRule::new(limit, window_ms)?;

        self.entries
            .entry(key.to_string())
            .and_modify(|entry| entry.set_rule(rule))
            .or_insert_with(|| RateLimitEntry::new(rule, now));

        info!(key = %key, rule = %rule, "Rate limit updated for key");
        Ok(rule)
    }

    /// Replace the default rule for keys created from now on.
    pub fn set_default_config(&self, limit: i64, window_ms: i64) -> Result<LimitRule> {
        let rule = LimitRule::new(limit, window_ms)?;
        *self.default_rule.write() = rule;

        info!(rule = %rule, "Default rate limit updated");
        Ok(rule)
    }

    /// The current default rule.
    pub fn default_config(&self) -> LimitRule {
        *self.default_rule.read()
    }

    fn rule_for_new_key(&self, key: &str) -> LimitRule {
        match self.overrides.get(key) {
            Some(rule) => *rule,
            None => *self.default_rule.read(),
        }
    }

    /// The rule currently applied to `key`, if it is tracked.
    pub fn rule_for(&self, key: &str) -> Option<LimitRule> {
        self.entries.get(key).map(|entry| entry.rule())
    }

    /// Read-only status of every tracked key at `now`.
    ///
    /// Usage counts only timestamps still in the window; stored history is
    /// not modified.
    pub fn snapshot_all(&self, now: DateTime<Utc>) -> BTreeMap<String, KeyStatus> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status(now)))
            .collect()
    }

    /// Prune every entry and evict the expired ones. Returns the eviction count.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            if entry.is_expired(now) {
                trace!(key = %key, "Evicting idle rate limit entry");
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LimiterStore {
    fn default() -> Self {
        Self::new(LimitRule::default())
    }
}

impl RateLimiterBackend for LimiterStore {
    fn check(&self, key: &str, now: DateTime<Utc>) -> Result<Decision> {
        LimiterStore::check(self, key, now)
    }

    fn set_config(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        now: DateTime<Utc>,
    ) -> Result<LimitRule> {
        LimiterStore::set_config(self, key, limit, window_ms, now)
    }

    fn default_config(&self) -> LimitRule {
        LimiterStore::default_config(self)
    }

    fn set_default_config(&self, limit: i64, window_ms: i64) -> Result<LimitRule> {
        LimiterStore::set_default_config(self, limit, window_ms)
    }

    fn snapshot_all(&self, now: DateTime<Utc>) -> BTreeMap<String, KeyStatus> {
        LimiterStore::snapshot_all(self, now)
    }
}
