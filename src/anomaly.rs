//! Local security anomaly log
//!
//! Structured records of enforcement decisions: blocked egress, blocked
//! storage writes, unknown storage keys, watchdog disables. The log is
//! append-only, bounded, and strictly local — anomalies are never sent
//! through the guarded channel, so a blocked exfiltration attempt cannot be
//! leaked through the very channel that blocked it.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;

/// Kind of anomaly observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Egress guard rejected an outbound request
    BlockedOutboundRequest,
    /// Persistence guard rejected a storage write
    BlockedStorageWrite,
    /// A storage key outside both the allowlist and blocklist was written
    UnknownStorageKey,
    /// The availability watchdog transitioned to disabled
    WatchdogDisabled,
}

/// A single enforcement anomaly
///
/// `detail` carries the rejected host or key name — never a payload body,
/// so the log cannot reconstruct what was being withheld.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAnomaly {
    /// What happened
    pub kind: AnomalyKind,
    /// Host, key, or reason involved
    pub detail: String,
    /// Timestamp (milliseconds since epoch)
    pub timestamp: i64,
}

impl SecurityAnomaly {
    /// Create an anomaly stamped with the current time
    pub fn new(kind: AnomalyKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Bounded in-memory anomaly log
///
/// Oldest entries are evicted once capacity is reached; `total_count` keeps
/// counting across evictions. Interior-mutable so guards can record through
/// a shared reference.
#[derive(Debug)]
pub struct AnomalyLog {
    inner: RwLock<LogInner>,
    capacity: usize,
}

#[derive(Debug)]
struct LogInner {
    anomalies: VecDeque<SecurityAnomaly>,
    total_count: u64,
}

impl AnomalyLog {
    /// Create a log retaining at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(LogInner {
                anomalies: VecDeque::with_capacity(capacity),
                total_count: 0,
            }),
            capacity,
        }
    }

    /// Append an anomaly
    pub fn record(&self, anomaly: SecurityAnomaly) {
        tracing::warn!(
            kind = ?anomaly.kind,
            detail = %anomaly.detail,
            "Security anomaly recorded"
        );

        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.anomalies.len() >= self.capacity {
            inner.anomalies.pop_front();
        }
        inner.anomalies.push_back(anomaly);
        inner.total_count += 1;
    }

    /// Most recent anomalies, newest first
    pub fn recent(&self, limit: usize) -> Vec<SecurityAnomaly> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.anomalies.iter().rev().take(limit).cloned().collect()
    }

    /// Anomalies of a given kind, oldest first
    pub fn by_kind(&self, kind: AnomalyKind) -> Vec<SecurityAnomaly> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .anomalies
            .iter()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect()
    }

    /// Total anomalies ever recorded, including evicted ones
    pub fn total_count(&self) -> u64 {
        match self.inner.read() {
            Ok(g) => g.total_count,
            Err(poisoned) => poisoned.into_inner().total_count,
        }
    }

    /// Number of anomalies currently retained
    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(g) => g.anomalies.len(),
            Err(poisoned) => poisoned.into_inner().anomalies.len(),
        }
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnomalyLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}
