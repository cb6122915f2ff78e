//! One-way anonymization of detected entity spans
//!
//! Converts detector output (character offsets into a document) into
//! session-salted SHA-256 hashes plus redacted context windows. Only the
//! hash and the redacted context ever cross the trust boundary; the raw
//! entity value never leaves the process.

use crate::capability::DigestProvider;
use crate::error::{Error, Result};
use crate::session::SessionContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Marker substituted for the entity value inside context windows
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Maximum whitespace-delimited tokens kept on each side of a span
const CONTEXT_TOKENS: usize = 5;

/// Half-open character offsets into a source text, produced by an external
/// detector. Valid iff `start < end <= text.chars().count()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySpan {
    /// First character of the entity
    pub start: usize,
    /// One past the last character of the entity
    pub end: usize,
}

impl EntitySpan {
    /// Create a span
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// The anonymized form of one detected entity
///
/// This is the only entity-derived data permitted to leave the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashedEntity {
    /// Where the entity sat in the source text
    pub position: EntitySpan,
    /// Lowercase hex SHA-256 of `salt || value`
    pub value_hash: String,
    /// Up to five tokens either side of the span, span replaced by
    /// [`REDACTION_MARKER`]
    pub context_window: String,
}

/// A span the anonymizer refused to process, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSpan {
    /// The offending span as supplied
    pub span: EntitySpan,
    /// Why it was skipped
    pub reason: String,
}

/// Result of one anonymization pass
///
/// Malformed spans fail individually, never the batch: one bad detector
/// result must not block the others. Skipped spans are reported, not
/// silently dropped.
#[derive(Debug, Clone, Default)]
pub struct HashOutcome {
    /// Successfully anonymized entities, in input order
    pub entities: Vec<HashedEntity>,
    /// Spans that violated the offset invariant
    pub skipped: Vec<SkippedSpan>,
}

/// Anonymizer over an injected digest and session salt
///
/// The session salt is the only shared mutable state this component
/// touches; it is lazily initialized on the first hash.
pub struct Anonymizer {
    session: SessionContext,
    digest: Arc<dyn DigestProvider>,
}

impl Anonymizer {
    /// Create an anonymizer bound to a session and digest capability
    pub fn new(session: SessionContext, digest: Arc<dyn DigestProvider>) -> Self {
        Self { session, digest }
    }

    /// Hash every valid span in `spans` against `text`
    ///
    /// Spans may overlap and arrive unordered; each is processed
    /// independently. A digest failure aborts the whole call — a broken
    /// hash primitive must never degrade to passing plaintext through.
    pub fn hash_entities(&self, text: &str, spans: &[EntitySpan]) -> Result<HashOutcome> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let char_len = chars.len();

        let mut outcome = HashOutcome::default();
        for span in spans {
            if span.start >= span.end || span.end > char_len {
                outcome.skipped.push(SkippedSpan {
                    span: *span,
                    reason: format!(
                        "span {}..{} violates 0 <= start < end <= {}",
                        span.start, span.end, char_len
                    ),
                });
                tracing::debug!(
                    start = span.start,
                    end = span.end,
                    "Skipping malformed entity span"
                );
                continue;
            }

            let byte_start = chars[span.start].0;
            let byte_end = if span.end == char_len {
                text.len()
            } else {
                chars[span.end].0
            };
            let value = &text[byte_start..byte_end];

            let salt = self.session.salt();
            let mut preimage = Vec::with_capacity(salt.len() + value.len());
            preimage.extend_from_slice(salt.as_ref());
            preimage.extend_from_slice(value.as_bytes());
            let value_hash = self
                .digest
                .sha256_hex(&preimage)
                .map_err(|e| Error::Crypto(format!("Entity hash failed: {}", e)))?;

            outcome.entities.push(HashedEntity {
                position: *span,
                value_hash,
                context_window: context_window(text, byte_start, byte_end),
            });
        }

        Ok(outcome)
    }
}

/// Build the redacted context window around a span (byte offsets)
///
/// Last ≤5 whitespace tokens before the span, the marker, first ≤5 after,
/// joined with single spaces. Either side is omitted when empty.
fn context_window(text: &str, byte_start: usize, byte_end: usize) -> String {
    let before: Vec<&str> = text[..byte_start].split_whitespace().collect();
    let after: Vec<&str> = text[byte_end..].split_whitespace().collect();

    let mut parts: Vec<&str> = Vec::with_capacity(CONTEXT_TOKENS * 2 + 1);
    let keep_before = before.len().saturating_sub(CONTEXT_TOKENS);
    parts.extend(&before[keep_before..]);
    parts.push(REDACTION_MARKER);
    parts.extend(after.iter().take(CONTEXT_TOKENS));

    parts.join(" ")
}
