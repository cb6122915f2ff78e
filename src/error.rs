//! Error types for trustgate

use thiserror::Error;

/// Errors that can occur in the trust boundary layer
///
/// The variants deliberately distinguish "we chose not to" failures
/// (`NetworkBlocked`, `PolicyViolation`) from "we could not" failures
/// (`NetworkUnreachable`, `Timeout`) so callers never confuse an enforced
/// policy with an outage.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic primitive failure. Fatal: the pipeline must never
    /// degrade to passing plaintext through.
    #[error("Crypto failure: {0}")]
    Crypto(String),

    /// A local-storage write was rejected by the persistence guard
    #[error("Storage write blocked for key '{key}'")]
    PolicyViolation {
        key: String,
    },

    /// An outbound request was rejected by the egress allowlist
    #[error("Outbound request blocked: host '{host}' is not allowed")]
    NetworkBlocked {
        host: String,
    },

    /// The network transport failed (DNS, connect, TLS, ...)
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// A bounded network operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Input violated a structural invariant (bad span offsets, bad URL,
    /// out-of-order ledger positions, unparsable JSON body)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying key-value store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether this error represents a deliberate policy decision rather
    /// than an environmental failure.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            Error::PolicyViolation { .. } | Error::NetworkBlocked { .. }
        )
    }
}

/// Result type alias for trustgate operations
pub type Result<T> = std::result::Result<T, Error>;
