use serde::Deserialize;
use std::time::Duration;

/// Admission control configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LimitConfig {
    /// Time for a client to regain one admission credit, in milliseconds
    /// Must be greater than zero
    /// Default: 1000 (one request per second steady state)
    #[serde(default = "default_refill_every_ms")]
    pub refill_every_ms: u64,
    /// Requests a single client may burst before being throttled
    /// Values below 1 are raised to 1
    /// Default: 10
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Maximum number of client keys tracked at once
    /// Oldest keys are evicted in batches once the ceiling is reached
    /// 0 means unset and falls back to the default
    /// Default: 100000
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
    /// Key extraction strategy
    /// Default: "peer"
    #[serde(default = "default_extract_by")]
    pub extract_by: ExtractBy,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            refill_every_ms: default_refill_every_ms(),
            burst: default_burst(),
            max_keys: default_max_keys(),
            extract_by: default_extract_by(),
        }
    }
}

impl LimitConfig {
    /// Refill interval as a `Duration`.
    pub fn refill_every(&self) -> Duration {
        Duration::from_millis(self.refill_every_ms)
    }

    /// Key capacity with the zero-means-unset fallback applied.
    pub fn effective_max_keys(&self) -> usize {
        if self.max_keys == 0 {
            default_max_keys()
        } else {
            self.max_keys
        }
    }
}

/// Client key extraction strategy
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractBy {
    /// Key requests by the connection peer address
    Peer,
    /// Key requests by the first entry of the X-Forwarded-For header
    /// Requests without a usable entry bypass admission control
    Forwarded,
}

fn default_refill_every_ms() -> u64 {
    1000
}

fn default_burst() -> u32 {
    10
}

fn default_max_keys() -> usize {
    100_000
}

fn default_extract_by() -> ExtractBy {
    ExtractBy::Peer
}
