//! Session-scoped salt for one-way entity hashing
//!
//! The salt is the only shared mutable state in the anonymization path. It
//! lives exclusively in volatile memory: never serialized, never logged,
//! never transmitted. Resetting it (e.g. on logout) severs any linkage
//! between hashes produced before and after the reset.

use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::{Arc, RwLock};
use zeroize::Zeroizing;

/// Salt length in bytes (256 bits)
pub const SALT_LEN: usize = 32;

/// Process-lifetime session context owning the anonymization salt
///
/// Cheap to clone; clones share the same salt. The salt is created lazily on
/// first use and wiped from memory when replaced or dropped.
#[derive(Clone, Default)]
pub struct SessionContext {
    salt: Arc<RwLock<Option<Zeroizing<[u8; SALT_LEN]>>>>,
}

impl SessionContext {
    /// Create a context with no salt yet; the salt is generated on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current salt, generating it if this is the first use
    ///
    /// Returns a copy of the salt bytes wrapped in `Zeroizing` so the
    /// caller's copy is also wiped on drop.
    pub fn salt(&self) -> Zeroizing<[u8; SALT_LEN]> {
        if let Ok(guard) = self.salt.read() {
            if let Some(salt) = guard.as_ref() {
                return salt.clone();
            }
        }

        let mut guard = match self.salt.write() {
            Ok(g) => g,
            // Lock poisoned by a panicking reader; the salt itself is still
            // intact, so recover the inner state rather than propagate.
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(salt) = guard.as_ref() {
            return salt.clone();
        }

        let mut bytes = Zeroizing::new([0u8; SALT_LEN]);
        OsRng.fill_bytes(bytes.as_mut());
        *guard = Some(bytes.clone());
        tracing::debug!("Session salt initialized");
        bytes
    }

    /// Discard the current salt; the next use generates a fresh one
    ///
    /// Hashes produced before and after a reset cannot be correlated.
    pub fn reset(&self) {
        let mut guard = match self.salt.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
        tracing::info!("Session salt reset");
    }

    /// Whether a salt has been generated yet
    pub fn is_initialized(&self) -> bool {
        self.salt.read().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl std::fmt::Debug for SessionContext {
    // Never expose salt bytes through Debug output
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
