//! Configuration for the trust boundary layer
//!
//! Supplied by the server collaborator at build or config time. Every field
//! has a safe default; `validate()` rejects configurations that would make
//! the guards unenforceable.

use crate::egress::extract_host;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trust boundary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrustGateConfig {
    /// Exact hostnames outbound requests may target (no wildcards)
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Authorization endpoint the watchdog polls
    #[serde(default = "default_kill_switch_url")]
    pub kill_switch_url: String,

    /// Watchdog poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline for any single outbound request in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Storage keys that may be persisted
    #[serde(default)]
    pub allowed_storage_keys: Vec<String>,

    /// Storage keys that must never be persisted
    #[serde(default = "default_blocked_storage_keys")]
    pub blocked_storage_keys: Vec<String>,

    /// Maximum anomalies retained in the local log
    #[serde(default = "default_anomaly_capacity")]
    pub anomaly_log_capacity: usize,
}

fn default_kill_switch_url() -> String {
    "https://api.backend.example/kill-switch".to_string()
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Key names that hold raw user text or secret material
fn default_blocked_storage_keys() -> Vec<String> {
    [
        "promptText",
        "rawText",
        "entityValue",
        "sessionSalt",
        "apiKey",
        "authToken",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_anomaly_capacity() -> usize {
    10_000
}

impl Default for TrustGateConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            kill_switch_url: default_kill_switch_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            allowed_storage_keys: Vec::new(),
            blocked_storage_keys: default_blocked_storage_keys(),
            anomaly_log_capacity: default_anomaly_capacity(),
        }
    }
}

impl TrustGateConfig {
    /// Watchdog poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check the configuration is enforceable
    ///
    /// The kill-switch host must itself be allowlisted — otherwise the
    /// watchdog's own polls would be blocked and the agent permanently
    /// disabled by its own egress guard.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_hosts.is_empty() {
            return Err(Error::Config(
                "allowed_hosts is empty: every outbound request would be blocked".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be non-zero".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "request_timeout_ms must be non-zero".to_string(),
            ));
        }

        let kill_host = extract_host(&self.kill_switch_url).ok_or_else(|| {
            Error::Config(format!(
                "kill_switch_url '{}' has no extractable host",
                self.kill_switch_url
            ))
        })?;
        let allowed = self
            .allowed_hosts
            .iter()
            .any(|h| crate::egress::normalize_host(h) == kill_host);
        if !allowed {
            return Err(Error::Config(format!(
                "kill_switch_url host '{}' is not in allowed_hosts",
                kill_host
            )));
        }

        Ok(())
    }
}
