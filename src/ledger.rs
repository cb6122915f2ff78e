//! Audit ledger verification — tamper localization over a hash chain
//!
//! The server collaborator records events as a hash chain: each entry's
//! hash covers the previous entry's hash, so any retroactive edit breaks
//! every later link. Given a ledger dump in position order, the verifier
//! recomputes the chain and reports either full validity or the first
//! position where integrity fails. Verification is a pure function of its
//! input — no network, no clock — so any auditor can reproduce it from the
//! dump alone.
//!
//! Canonical hash format, version `tg1` (pinned; producers and verifiers
//! must agree byte-for-byte):
//!
//! ```text
//! event_hash = sha256_hex("tg1|" + position + "|" + previous_hash + "|" + payload_digest)
//! ```
//!
//! with `position` in decimal and both hex fields lowercased before
//! hashing. `payload_digest` is the producer's SHA-256 of the event body
//! and is opaque here.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version tag baked into every chain hash preimage
pub const CHAIN_FORMAT_VERSION: &str = "tg1";

/// `previous_hash` of position 0: 64 zero hex chars
///
/// Checked like any other link — position 0 is not exempt from validation.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One entry of the audit chain as supplied by the ledger collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    /// 0-based, strictly increasing position
    pub position: u64,
    /// Hash of this entry (canonical format above)
    pub event_hash: String,
    /// Stored copy of the previous entry's `event_hash`
    pub previous_hash: String,
    /// SHA-256 of the event body, computed by the producer
    pub payload_digest: String,
}

impl ChainEntry {
    /// Build the successor of `previous` for a new payload digest
    ///
    /// Producer-side counterpart of the verifier; tests and the telemetry
    /// collaborator use it so both ends share one canonical format.
    pub fn next(previous: Option<&ChainEntry>, payload_digest: impl Into<String>) -> Self {
        let payload_digest = payload_digest.into().to_ascii_lowercase();
        let (position, previous_hash) = match previous {
            Some(prev) => (prev.position + 1, prev.event_hash.clone()),
            None => (0, GENESIS_HASH.to_string()),
        };
        let event_hash = compute_event_hash(position, &previous_hash, &payload_digest);
        Self {
            position,
            event_hash,
            previous_hash,
            payload_digest,
        }
    }
}

/// Compute the canonical `tg1` chain hash for one entry
pub fn compute_event_hash(position: u64, previous_hash: &str, payload_digest: &str) -> String {
    let preimage = format!(
        "{}|{}|{}|{}",
        CHAIN_FORMAT_VERSION,
        position,
        previous_hash.to_ascii_lowercase(),
        payload_digest.to_ascii_lowercase()
    );
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verdict of a chain verification pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    /// Whether every checked link held
    pub valid: bool,
    /// Lowest position at which a check failed, if any
    pub broken_at_position: Option<u64>,
    /// Entries examined before the verdict (stops at the first break)
    pub total_checked: u64,
}

impl ChainVerification {
    fn valid(total_checked: u64) -> Self {
        Self {
            valid: true,
            broken_at_position: None,
            total_checked,
        }
    }

    fn broken(position: u64, total_checked: u64) -> Self {
        Self {
            valid: false,
            broken_at_position: Some(position),
            total_checked,
        }
    }
}

/// Verify a complete chain supplied in position order
///
/// Two independent checks per entry: the stored `previous_hash` must equal
/// the prior entry's `event_hash` (corrupted storage of the link), and the
/// recomputed hash must equal the stored `event_hash` (corrupted entry
/// content). The first failing position is reported and nothing after it
/// is analyzed — every later hash is a function of the broken link, so its
/// validity is undefined.
///
/// Out-of-order or non-contiguous positions are rejected as
/// [`Error::MalformedInput`] rather than silently reordered: a reordered
/// dump is itself evidence of corruption or tampering upstream.
pub fn verify_chain(entries: &[ChainEntry]) -> Result<ChainVerification> {
    for (index, entry) in entries.iter().enumerate() {
        if entry.position != index as u64 {
            return Err(Error::MalformedInput(format!(
                "chain positions must be contiguous from 0: expected {} at index {}, found {}",
                index, index, entry.position
            )));
        }
    }

    let mut expected_previous = GENESIS_HASH.to_string();
    for entry in entries {
        // Link check: stored previous_hash vs. the prior entry's hash
        if !entry.previous_hash.eq_ignore_ascii_case(&expected_previous) {
            tracing::warn!(
                position = entry.position,
                "Audit chain break: stored previous hash does not match prior entry"
            );
            return Ok(ChainVerification::broken(entry.position, entry.position + 1));
        }

        // Content check: recomputed hash vs. stored event_hash
        let recomputed =
            compute_event_hash(entry.position, &entry.previous_hash, &entry.payload_digest);
        if !entry.event_hash.eq_ignore_ascii_case(&recomputed) {
            tracing::warn!(
                position = entry.position,
                "Audit chain break: recomputed hash does not match stored event hash"
            );
            return Ok(ChainVerification::broken(entry.position, entry.position + 1));
        }

        expected_previous = entry.event_hash.to_ascii_lowercase();
    }

    Ok(ChainVerification::valid(entries.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn build_chain(len: usize) -> Vec<ChainEntry> {
        let mut entries: Vec<ChainEntry> = Vec::with_capacity(len);
        for i in 0..len {
            let digest = digest_of(&format!("event body {}", i));
            let entry = ChainEntry::next(entries.last(), digest);
            entries.push(entry);
        }
        entries
    }

    #[test]
    fn test_empty_chain_valid() {
        let verdict = verify_chain(&[]).unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.total_checked, 0);
    }

    #[test]
    fn test_fresh_chain_verifies() {
        let chain = build_chain(5);
        let verdict = verify_chain(&chain).unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.broken_at_position, None);
        assert_eq!(verdict.total_checked, 5);
    }

    #[test]
    fn test_genesis_previous_hash_is_checked() {
        let mut chain = build_chain(2);
        chain[0].previous_hash = "11".repeat(32);

        let verdict = verify_chain(&chain).unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.broken_at_position, Some(0));
        assert_eq!(verdict.total_checked, 1);
    }

    #[test]
    fn test_mutating_any_field_localizes_break() {
        let len = 4;
        for k in 0..len {
            for field in 0..3 {
                let mut chain = build_chain(len);
                match field {
                    0 => chain[k].event_hash = "ab".repeat(32),
                    1 => chain[k].previous_hash = "cd".repeat(32),
                    _ => chain[k].payload_digest = digest_of("tampered body"),
                }

                let verdict = verify_chain(&chain).unwrap();
                assert!(!verdict.valid, "k={k} field={field}");
                assert_eq!(verdict.broken_at_position, Some(k as u64), "k={k} field={field}");
            }
        }
    }

    #[test]
    fn test_short_circuits_at_first_break() {
        let mut chain = build_chain(6);
        chain[2].payload_digest = digest_of("edited");
        chain[4].event_hash = "ef".repeat(32);

        let verdict = verify_chain(&chain).unwrap();
        assert_eq!(verdict.broken_at_position, Some(2));
        assert_eq!(verdict.total_checked, 3);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut chain = build_chain(3);
        chain.swap(1, 2);
        assert!(matches!(
            verify_chain(&chain),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_gap_in_positions_rejected() {
        let mut chain = build_chain(3);
        chain.remove(1);
        assert!(matches!(
            verify_chain(&chain),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let mut chain = build_chain(2);
        chain[1].event_hash = chain[1].event_hash.to_ascii_uppercase();
        chain[1].previous_hash = chain[1].previous_hash.to_ascii_uppercase();

        let verdict = verify_chain(&chain).unwrap();
        assert!(verdict.valid);
    }

    #[test]
    fn test_spec_example_two_entry_chain() {
        // Chain of two entries built from genesis, then entry 1's hash
        // replaced with garbage
        let e0 = ChainEntry::next(None, digest_of("first event"));
        assert_eq!(e0.previous_hash, GENESIS_HASH);
        let e1 = ChainEntry::next(Some(&e0), digest_of("second event"));
        assert_eq!(e1.previous_hash, e0.event_hash);

        let verdict = verify_chain(&[e0.clone(), e1.clone()]).unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.total_checked, 2);

        let mut tampered = e1;
        tampered.event_hash = "99".repeat(32);
        let verdict = verify_chain(&[e0, tampered]).unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.broken_at_position, Some(1));
    }

    #[test]
    fn test_verification_is_deterministic() {
        let chain = build_chain(3);
        assert_eq!(verify_chain(&chain).unwrap(), verify_chain(&chain).unwrap());
    }

    #[test]
    fn test_camel_case_serialization() {
        let entry = ChainEntry::next(None, "aa".repeat(32));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("eventHash"));
        assert!(json.contains("previousHash"));
        assert!(json.contains("payloadDigest"));
    }
}
