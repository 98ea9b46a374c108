//! Harvest configuration.

use serde::{Deserialize, Serialize};

/// Default per-map fetch timeout. Kept short so one slow or hung map server
/// cannot starve the rest of the batch.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 1_500;

/// Default page navigation timeout.
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Default time the capture window stays open after the load event, giving
/// late-loaded scripts a chance to be parsed.
pub const DEFAULT_SETTLE_MS: u64 = 2_000;

/// Tunables for a harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Timeout applied to each remote map retrieval, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Timeout for page navigation, in milliseconds.
    pub navigation_timeout_ms: u64,
    /// How long the capture window stays open after navigation, in milliseconds.
    pub settle_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}
