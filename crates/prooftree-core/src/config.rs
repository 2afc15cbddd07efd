//! Environment-driven runtime configuration.
//!
//! Deliberately small: this system has a handful of knobs, not hundreds.
//! Every key is prefixed `PROOFTREE_` and has a documented default.

use std::time::Duration;

/// Runtime configuration for the ledger, lock registry, and service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default claim lease duration when a command omits one.
    pub default_lease: Duration,
    /// Bounded retry count for `link()`-exists collisions during append.
    pub ledger_append_retry_limit: u32,
    /// Whether to `fsync` the event file and its directory after a successful link.
    /// Disabling this (`PROOFTREE_NO_FSYNC=1`) trades durability for test speed.
    pub fsync_on_append: bool,
    /// Grace period after lease expiration before a lock becomes reapable.
    pub reap_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_lease: Duration::from_secs(300),
            ledger_append_retry_limit: 64,
            fsync_on_append: true,
            reap_grace: Duration::from_secs(0),
        }
    }
}

impl Config {
    /// Load configuration from `PROOFTREE_*` environment variables, falling
    /// back to [`Config::default`] for anything unset or unparseable.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            default_lease: env_secs("PROOFTREE_DEFAULT_LEASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.default_lease),
            ledger_append_retry_limit: env_u32("PROOFTREE_LEDGER_APPEND_RETRY_LIMIT")
                .unwrap_or(default.ledger_append_retry_limit),
            fsync_on_append: std::env::var("PROOFTREE_NO_FSYNC")
                .map(|v| v != "1")
                .unwrap_or(default.fsync_on_append),
            reap_grace: env_secs("PROOFTREE_REAP_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.reap_grace),
        }
    }
}

fn env_secs(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
