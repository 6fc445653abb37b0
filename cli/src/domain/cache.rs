//! Cache entry and expiry policy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Default time-to-live of a cache entry, in seconds.
pub const DEFAULT_CACHE_TTL: u64 = 3600;

/// One persisted command output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub uuid: String,
    pub name: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub ttl: u64,
}

impl CacheEntry {
    #[must_use]
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, data: Value, ttl: u64) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            data,
            timestamp: Utc::now(),
            ttl,
        }
    }

    /// `true` once `now` is strictly past `timestamp + ttl`.
    #[must_use]
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        match self.timestamp.checked_add_signed(Duration::seconds(ttl)) {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    /// Context attached to a cached command's output.
    #[must_use]
    pub fn context(&self) -> Value {
        json!({
            "uuid": self.uuid,
            "name": self.name,
            "data": self.data,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

/// When a cached value has to be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: u64,
    /// Recompute expired entries automatically.
    pub auto_refresh: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            auto_refresh: true,
        }
    }
}

impl CachePolicy {
    /// Decides whether `entry` must be recomputed.
    #[must_use]
    pub fn needs_refresh(&self, entry: Option<&CacheEntry>, force: bool, now: DateTime<Utc>) -> bool {
        if force {
            return true;
        }
        entry.is_none_or(|entry| self.auto_refresh && entry.expired_at(now))
    }
}

/// Cache key of a command on a target: `<commandName>_<targetUuid>`.
#[must_use]
pub fn cache_key(command: &str, uuid: &str) -> String {
    format!("{command}_{uuid}")
}
