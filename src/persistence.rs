//! Persistence guard — blocklist enforcement for local storage
//!
//! Validates every local write against a static blocklist of sensitive key
//! names *before* the underlying store is touched. The policy is
//! closed-world for the blocklist only: keys on the allowlist pass, keys on
//! the blocklist are rejected, and unrecognized keys pass but are flagged
//! as unknown so new configuration keys don't break while still leaving an
//! audit trail.

use crate::anomaly::{AnomalyKind, AnomalyLog, SecurityAnomaly};
use crate::capability::KeyValueStore;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Static classification of a storage key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Explicitly permitted
    Allowed,
    /// Explicitly forbidden — writes are rejected
    Blocked,
    /// On neither list — permitted, flagged for audit
    Unknown,
}

/// Guard over any [`KeyValueStore`]
///
/// The guard is the only component allowed to delete from the store, and
/// only inside [`PersistenceGuard::sweep_and_clear`]. Everywhere else it
/// merely rejects.
pub struct PersistenceGuard<S: KeyValueStore> {
    store: S,
    allowed_keys: HashSet<String>,
    blocked_keys: HashSet<String>,
    anomalies: Arc<AnomalyLog>,
}

impl<S: KeyValueStore> PersistenceGuard<S> {
    /// Create a guard with explicit allow and block lists
    pub fn new(
        store: S,
        allowed_keys: impl IntoIterator<Item = String>,
        blocked_keys: impl IntoIterator<Item = String>,
        anomalies: Arc<AnomalyLog>,
    ) -> Self {
        Self {
            store,
            allowed_keys: allowed_keys.into_iter().collect(),
            blocked_keys: blocked_keys.into_iter().collect(),
            anomalies,
        }
    }

    /// Classify a key against the static lists
    pub fn classify(&self, key: &str) -> KeyClass {
        if self.blocked_keys.contains(key) {
            KeyClass::Blocked
        } else if self.allowed_keys.contains(key) {
            KeyClass::Allowed
        } else {
            KeyClass::Unknown
        }
    }

    /// Write `value` under `key` unless the key is blocklisted
    ///
    /// The check happens strictly before the store call: a rejected write
    /// never reaches the store, so there is no write-then-rollback window.
    pub fn guard_write(&self, key: &str, value: Value) -> Result<()> {
        match self.classify(key) {
            KeyClass::Blocked => {
                self.anomalies.record(SecurityAnomaly::new(
                    AnomalyKind::BlockedStorageWrite,
                    key,
                ));
                Err(Error::PolicyViolation {
                    key: key.to_string(),
                })
            }
            KeyClass::Unknown => {
                self.anomalies.record(SecurityAnomaly::new(
                    AnomalyKind::UnknownStorageKey,
                    key,
                ));
                self.store.set(key, value)
            }
            KeyClass::Allowed => self.store.set(key, value),
        }
    }

    /// Write a batch atomically with respect to the blocklist
    ///
    /// Every key is validated first; if any is blocked the whole batch is
    /// rejected and nothing is persisted.
    pub fn guard_write_batch(&self, items: &[(String, Value)]) -> Result<()> {
        for (key, _) in items {
            if self.classify(key) == KeyClass::Blocked {
                self.anomalies.record(SecurityAnomaly::new(
                    AnomalyKind::BlockedStorageWrite,
                    key.as_str(),
                ));
                return Err(Error::PolicyViolation { key: key.clone() });
            }
        }

        for (key, value) in items {
            if self.classify(key) == KeyClass::Unknown {
                self.anomalies.record(SecurityAnomaly::new(
                    AnomalyKind::UnknownStorageKey,
                    key.as_str(),
                ));
            }
            self.store.set(key, value.clone())?;
        }
        Ok(())
    }

    /// Read a value; reads are not policy-gated
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.store.get(key)
    }

    /// Remove blocklisted keys that somehow reached the store
    ///
    /// Defensive cleanup for data written by a prior version or a bypassed
    /// guard. Returns the keys removed; a second run on a clean store
    /// returns an empty list.
    pub fn sweep_and_clear(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for key in self.store.keys()? {
            if self.blocked_keys.contains(&key) && self.store.remove(&key)? {
                removed.push(key);
            }
        }

        if !removed.is_empty() {
            tracing::info!(
                count = removed.len(),
                keys = ?removed,
                "Swept blocklisted keys from storage"
            );
        }
        Ok(removed)
    }

    /// Access the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }
}
