//! # trustgate
//!
//! Client-side trust boundary enforcement for endpoint AI agents.
//!
//! ## Overview
//!
//! `trustgate` sits between a local agent and third-party AI services and
//! guarantees, in-process, that:
//!
//! - raw sensitive values never leave the process — detected entity spans
//!   are replaced by session-salted SHA-256 hashes plus redacted context
//!   ([`Anonymizer`]);
//! - outbound network calls only reach an explicit host allowlist, with a
//!   structured anomaly on every rejection ([`EgressGuard`]);
//! - nothing sensitive is persisted locally, and storage corrupted by a
//!   prior version can be swept clean ([`PersistenceGuard`]);
//! - the agent fails safe when it cannot verify its authorization to run —
//!   unreachability and an explicit kill signal look the same
//!   ([`AvailabilityWatchdog`]);
//! - server-recorded events can be proven tamper-free after the fact, with
//!   the first broken position localized ([`verify_chain`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trustgate::{Anonymizer, EntitySpan, SessionContext, Sha256Provider};
//!
//! # fn example() -> trustgate::Result<()> {
//! let anonymizer = Anonymizer::new(SessionContext::new(), Arc::new(Sha256Provider));
//!
//! let text = "wire the funds to account 9876543210 today";
//! let outcome = anonymizer.hash_entities(text, &[EntitySpan::new(26, 36)])?;
//!
//! // Only the hash and redacted context leave the process
//! assert!(!outcome.entities[0].context_window.contains("9876543210"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Host capabilities (hashing, storage, network) are injected traits, so
//! the core runs identically under a browser-extension host, a desktop
//! agent, or a test harness:
//!
//! - [`DigestProvider`] — SHA-256; failure is fatal, never a plaintext
//!   fallback
//! - [`KeyValueStore`] — the guarded local store
//! - [`Transport`] — outbound HTTP; [`EgressGuard`] decorates any
//!   transport and is itself a transport, so the watchdog's own polling
//!   obeys the allowlist

pub mod anomaly;
pub mod anonymizer;
pub mod capability;
pub mod config;
pub mod egress;
pub mod error;
pub mod ledger;
pub mod persistence;
pub mod session;
pub mod watchdog;

// Re-export core types
pub use anomaly::{AnomalyKind, AnomalyLog, SecurityAnomaly};
pub use anonymizer::{
    Anonymizer, EntitySpan, HashOutcome, HashedEntity, SkippedSpan, REDACTION_MARKER,
};
pub use capability::{
    DigestProvider, HttpTransport, KeyValueStore, MemoryStore, OutboundRequest, Sha256Provider,
    Transport, TransportResponse,
};
pub use config::TrustGateConfig;
pub use egress::{extract_host, normalize_host, EgressGuard};
pub use error::{Error, Result};
pub use ledger::{
    compute_event_hash, verify_chain, ChainEntry, ChainVerification, CHAIN_FORMAT_VERSION,
    GENESIS_HASH,
};
pub use persistence::{KeyClass, PersistenceGuard};
pub use session::{SessionContext, SALT_LEN};
pub use watchdog::{AgentState, AvailabilityWatchdog, KillSwitchStatus, TransitionCallback};
