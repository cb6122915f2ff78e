//! Host capability traits — the seams between the core and its runtime
//!
//! The original agent leaned on ambient host APIs for hashing, storage, and
//! network I/O. Here each becomes an injected trait so the core runs the
//! same way in production, in tests, and in any host process.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest as Sha2Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Digest — SHA-256 capability
// ---------------------------------------------------------------------------

/// SHA-256 digest capability
///
/// Failure is `Error::Crypto` and is fatal to the operation that needed the
/// digest — there is no plaintext fallback.
pub trait DigestProvider: Send + Sync {
    /// Compute the SHA-256 digest of `data`
    fn sha256(&self, data: &[u8]) -> Result<[u8; 32]>;

    /// Convenience: SHA-256 as lowercase hex
    fn sha256_hex(&self, data: &[u8]) -> Result<String> {
        Ok(hex::encode(self.sha256(data)?))
    }
}

/// Production digest backed by the `sha2` crate
#[derive(Debug, Default, Clone)]
pub struct Sha256Provider;

impl DigestProvider for Sha256Provider {
    fn sha256(&self, data: &[u8]) -> Result<[u8; 32]> {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Ok(hasher.finalize().into())
    }
}

// ---------------------------------------------------------------------------
// KeyValueStore — guarded local persistence
// ---------------------------------------------------------------------------

/// Key-value storage capability over JSON values
///
/// Every write path in the host must route through the persistence guard
/// before reaching an implementation of this trait.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if absent
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a key, returning whether it existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// List all currently persisted keys
    fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory store for tests and single-process use
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Storage(format!("Failed to acquire store lock: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Error::Storage(format!("Failed to acquire store lock: {}", e)))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Error::Storage(format!("Failed to acquire store lock: {}", e)))?;
        Ok(entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Storage(format!("Failed to acquire store lock: {}", e)))?;
        Ok(entries.keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Transport — outbound HTTP capability
// ---------------------------------------------------------------------------

/// An outbound HTTP request as seen by the egress guard
///
/// Both the bare-URL and pre-built-request call paths in the host reduce to
/// this struct, so host extraction happens exactly one way.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Fully-qualified request URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// JSON body, if any
    pub body: Option<Value>,
    /// Per-request deadline
    pub timeout: Duration,
}

impl OutboundRequest {
    /// Build a GET request with the given deadline
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            body: None,
            timeout,
        }
    }

    /// Build a POST request carrying a JSON body
    pub fn post(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            body: Some(body),
            timeout,
        }
    }
}

/// Response from the underlying transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl TransportResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON into `T`
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| Error::MalformedInput(format!("Invalid JSON response body: {}", e)))
    }
}

/// Network transport capability
///
/// Implementations perform the actual send; they never consult policy. The
/// egress guard decorates a transport and decides whether `send` is reached
/// at all.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatch the request, honoring its deadline
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse>;
}

/// Shared transports are transports
#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse> {
        (**self).send(request).await
    }
}

/// Production transport backed by `reqwest`
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh client
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse> {
        let method = request
            .method
            .parse::<reqwest::Method>()
            .map_err(|_| Error::MalformedInput(format!("Invalid HTTP method '{}'", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("Request to {} timed out", request.url))
            } else {
                Error::NetworkUnreachable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::NetworkUnreachable(format!("Failed to read body: {}", e)))?;

        Ok(TransportResponse { status, body })
    }
}
