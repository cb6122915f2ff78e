//! Availability watchdog — fail-closed kill-switch polling
//!
//! Polls the remote authorization endpoint on a fixed interval and derives
//! an explicit agent state. The defining invariant is fail-closed: a
//! timeout, network error, non-2xx status, unparsable body, explicit kill
//! signal, or inactive flag all produce `Disabled`. Unreachability is
//! indistinguishable from a kill signal as far as callers are concerned;
//! only the logs tell them apart.

use crate::anomaly::{AnomalyKind, AnomalyLog, SecurityAnomaly};
use crate::capability::{OutboundRequest, Transport};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Externally observable agent state
///
/// `Unknown` exists only between startup and the first poll result, so the
/// initial determination is an unambiguous transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// No poll has completed yet
    Unknown,
    /// Last poll confirmed the agent is authorized to run
    Enabled,
    /// Last poll failed or reported a kill signal; sticky until a poll
    /// explicitly reports enabled
    Disabled,
}

/// Wire format of the authorization endpoint (`GET /kill-switch`)
///
/// Field names are owned by the server; snake_case on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchStatus {
    /// Remote kill switch engaged
    pub kill_switch: bool,
    /// Agent is active for this installation
    pub active: bool,
    /// Server-side configuration version
    pub config_version: i64,
}

/// Callback invoked on every state transition with the new state
pub type TransitionCallback = Arc<dyn Fn(AgentState) + Send + Sync>;

/// Fail-closed availability watchdog
///
/// Polls through an injected transport — in production the egress guard, so
/// the watchdog's own traffic obeys the allowlist. `Clone` shares the same
/// state and poller.
#[derive(Clone)]
pub struct AvailabilityWatchdog {
    inner: Arc<WatchdogInner>,
}

struct WatchdogInner {
    transport: Arc<dyn Transport>,
    endpoint_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
    anomalies: Arc<AnomalyLog>,
    state_tx: watch::Sender<AgentState>,
    on_transition: Mutex<Option<TransitionCallback>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl AvailabilityWatchdog {
    /// Create a watchdog; no polling starts until [`start`](Self::start)
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint_url: impl Into<String>,
        poll_interval: Duration,
        poll_timeout: Duration,
        anomalies: Arc<AnomalyLog>,
    ) -> Self {
        let (state_tx, _) = watch::channel(AgentState::Unknown);
        Self {
            inner: Arc::new(WatchdogInner {
                transport,
                endpoint_url: endpoint_url.into(),
                poll_interval,
                poll_timeout,
                anomalies,
                state_tx,
                on_transition: Mutex::new(None),
                poller: Mutex::new(None),
            }),
        }
    }

    /// Register the transition callback
    ///
    /// Fires once per state change — including the first determination
    /// after startup — never on steady-state polls.
    pub fn on_transition(&self, callback: TransitionCallback) {
        if let Ok(mut slot) = self.inner.on_transition.lock() {
            *slot = Some(callback);
        }
    }

    /// Current state
    pub fn state(&self) -> AgentState {
        *self.inner.state_tx.borrow()
    }

    /// Watch-channel receiver for UI surfaces that want push updates
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether the agent is currently permitted to run
    pub fn is_enabled(&self) -> bool {
        self.state() == AgentState::Enabled
    }

    /// Perform one poll and apply any resulting transition
    ///
    /// The recurring poller calls this; tests can drive it directly.
    pub async fn poll_once(&self) {
        let (state, reason) = self.fetch_state().await;
        self.apply(state, reason);
    }

    /// Start the recurring poller
    ///
    /// Polls immediately, then on the interval — a restart never waits a
    /// full interval with stale assumed state. A no-op if already running.
    pub fn start(&self) {
        let mut poller = match self.inner.poller.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if poller.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let watchdog = self.clone();
        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(watchdog.inner.poll_interval);
            // First tick fires immediately
            loop {
                ticker.tick().await;
                watchdog.poll_once().await;
            }
        }));
        tracing::info!(
            endpoint = %self.inner.endpoint_url,
            interval_ms = self.inner.poll_interval.as_millis() as u64,
            "Availability watchdog started"
        );
    }

    /// Stop the recurring poller, cancelling any in-flight poll
    ///
    /// The last known state is left untouched; stopping never fires a
    /// spurious disabled transition.
    pub fn stop(&self) {
        let mut poller = match self.inner.poller.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = poller.take() {
            handle.abort();
            tracing::info!("Availability watchdog stopped");
        }
    }

    /// Fetch and evaluate the endpoint once, fail-closed
    async fn fetch_state(&self) -> (AgentState, Option<String>) {
        let request = OutboundRequest::get(&self.inner.endpoint_url, self.inner.poll_timeout);

        // Outer deadline guards transports that fail to honor the
        // per-request timeout; an indefinite hang would be a silent
        // fail-open.
        let outcome =
            tokio::time::timeout(self.inner.poll_timeout, self.inner.transport.send(request))
                .await;

        let response = match outcome {
            Err(_) => {
                return (
                    AgentState::Disabled,
                    Some("kill-switch poll timed out".to_string()),
                )
            }
            Ok(Err(e)) => {
                let reason = match &e {
                    Error::NetworkBlocked { host } => {
                        format!("kill-switch endpoint blocked by egress policy: {}", host)
                    }
                    Error::Timeout(msg) => format!("kill-switch poll timed out: {}", msg),
                    other => format!("kill-switch poll failed: {}", other),
                };
                return (AgentState::Disabled, Some(reason));
            }
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return (
                AgentState::Disabled,
                Some(format!("kill-switch endpoint returned {}", response.status)),
            );
        }

        let status: KillSwitchStatus = match response.json() {
            Ok(status) => status,
            Err(_) => {
                return (
                    AgentState::Disabled,
                    Some("kill-switch response body unparsable".to_string()),
                )
            }
        };

        if status.kill_switch {
            return (
                AgentState::Disabled,
                Some(format!(
                    "kill switch engaged (config v{})",
                    status.config_version
                )),
            );
        }
        if !status.active {
            return (
                AgentState::Disabled,
                Some(format!(
                    "agent marked inactive (config v{})",
                    status.config_version
                )),
            );
        }

        (AgentState::Enabled, None)
    }

    fn apply(&self, next: AgentState, reason: Option<String>) {
        let previous = *self.inner.state_tx.borrow();
        if previous == next {
            tracing::debug!(state = ?next, "Watchdog poll: steady state");
            return;
        }

        match next {
            AgentState::Disabled => {
                let detail = reason.as_deref().unwrap_or("disabled");
                self.inner.anomalies.record(SecurityAnomaly::new(
                    AnomalyKind::WatchdogDisabled,
                    detail,
                ));
                tracing::warn!(previous = ?previous, reason = %detail, "Agent disabled");
            }
            _ => {
                tracing::info!(previous = ?previous, state = ?next, "Agent state transition");
            }
        }

        self.inner.state_tx.send_replace(next);
        let callback = self
            .inner
            .on_transition
            .lock()
            .ok()
            .and_then(|slot| slot.clone());
        if let Some(callback) = callback {
            callback(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::TransportResponse;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport returning a scripted sequence of outcomes, repeating the
    /// last one when exhausted
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportResponse>>>,
        last_ok: Mutex<Option<TransportResponse>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<TransportResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes.into()),
                last_ok: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: OutboundRequest) -> Result<TransportResponse> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(response)) => {
                    *self.last_ok.lock().unwrap() = Some(response.clone());
                    Ok(response)
                }
                Some(Err(e)) => Err(e),
                None => match self.last_ok.lock().unwrap().clone() {
                    Some(response) => Ok(response),
                    None => Err(Error::NetworkUnreachable("script exhausted".to_string())),
                },
            }
        }
    }

    fn ok_body(kill_switch: bool, active: bool) -> Result<TransportResponse> {
        Ok(TransportResponse {
            status: 200,
            body: serde_json::json!({
                "kill_switch": kill_switch,
                "active": active,
                "config_version": 7
            })
            .to_string(),
        })
    }

    fn watchdog(transport: Arc<ScriptedTransport>) -> AvailabilityWatchdog {
        AvailabilityWatchdog::new(
            transport,
            "https://api.backend.example/kill-switch",
            Duration::from_millis(10),
            Duration::from_millis(100),
            Arc::new(AnomalyLog::default()),
        )
    }

    #[tokio::test]
    async fn test_initial_state_unknown() {
        let wd = watchdog(ScriptedTransport::new(vec![]));
        assert_eq!(wd.state(), AgentState::Unknown);
        assert!(!wd.is_enabled());
    }

    #[tokio::test]
    async fn test_healthy_poll_enables() {
        let wd = watchdog(ScriptedTransport::new(vec![ok_body(false, true)]));
        wd.poll_once().await;
        assert_eq!(wd.state(), AgentState::Enabled);
    }

    #[tokio::test]
    async fn test_every_failure_mode_disables() {
        let failure_scripts: Vec<Result<TransportResponse>> = vec![
            Err(Error::NetworkUnreachable("dns failure".to_string())),
            Err(Error::Timeout("deadline".to_string())),
            Ok(TransportResponse {
                status: 500,
                body: String::new(),
            }),
            Ok(TransportResponse {
                status: 200,
                body: "not json".to_string(),
            }),
            ok_body(true, true),
            ok_body(false, false),
        ];

        for outcome in failure_scripts {
            let wd = watchdog(ScriptedTransport::new(vec![outcome]));
            wd.poll_once().await;
            assert_eq!(wd.state(), AgentState::Disabled);
        }
    }

    #[tokio::test]
    async fn test_network_error_disables() {
        let wd = watchdog(ScriptedTransport::new(vec![Err(Error::NetworkUnreachable(
            "refused".to_string(),
        ))]));
        wd.poll_once().await;
        assert_eq!(wd.state(), AgentState::Disabled);
    }

    #[tokio::test]
    async fn test_blocked_egress_disables() {
        let wd = watchdog(ScriptedTransport::new(vec![Err(Error::NetworkBlocked {
            host: "api.backend.example".to_string(),
        })]));
        wd.poll_once().await;
        assert_eq!(wd.state(), AgentState::Disabled);
    }

    #[tokio::test]
    async fn test_disabled_sticky_until_explicit_enable() {
        let wd = watchdog(ScriptedTransport::new(vec![
            Err(Error::NetworkUnreachable("down".to_string())),
            Err(Error::NetworkUnreachable("still down".to_string())),
            ok_body(false, true),
        ]));

        wd.poll_once().await;
        assert_eq!(wd.state(), AgentState::Disabled);
        wd.poll_once().await;
        assert_eq!(wd.state(), AgentState::Disabled);
        wd.poll_once().await;
        assert_eq!(wd.state(), AgentState::Enabled);
    }

    #[tokio::test]
    async fn test_callback_fires_only_on_transition() {
        let wd = watchdog(ScriptedTransport::new(vec![
            ok_body(false, true),
            ok_body(false, true),
            ok_body(false, true),
            ok_body(true, true),
        ]));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        wd.on_transition(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        // First determination is a transition; the next two are steady state
        for _ in 0..3 {
            wd.poll_once().await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Kill signal: second transition
        wd.poll_once().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(wd.state(), AgentState::Disabled);
    }

    #[tokio::test]
    async fn test_disable_records_anomaly() {
        let anomalies = Arc::new(AnomalyLog::default());
        let wd = AvailabilityWatchdog::new(
            ScriptedTransport::new(vec![ok_body(true, true)]),
            "https://api.backend.example/kill-switch",
            Duration::from_millis(10),
            Duration::from_millis(100),
            anomalies.clone(),
        );

        wd.poll_once().await;
        let recorded = anomalies.by_kind(AnomalyKind::WatchdogDisabled);
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].detail.contains("kill switch"));
    }

    #[tokio::test]
    async fn test_start_polls_immediately_and_stop_is_quiet() {
        let wd = watchdog(ScriptedTransport::new(vec![ok_body(false, true)]));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        wd.on_transition(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut rx = wd.subscribe();
        wd.start();
        // The first poll happens on start, not one interval later
        tokio::time::timeout(Duration::from_millis(500), rx.changed())
            .await
            .expect("state should change promptly")
            .unwrap();
        assert_eq!(wd.state(), AgentState::Enabled);

        let fired_before_stop = fired.load(Ordering::SeqCst);
        wd.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // No spurious transition from stopping
        assert_eq!(fired.load(Ordering::SeqCst), fired_before_stop);
        assert_eq!(wd.state(), AgentState::Enabled);
    }

    #[tokio::test]
    async fn test_restart_polls_again() {
        let wd = watchdog(ScriptedTransport::new(vec![
            Err(Error::NetworkUnreachable("down".to_string())),
            ok_body(false, true),
        ]));

        wd.start();
        let mut rx = wd.subscribe();
        rx.wait_for(|s| *s == AgentState::Disabled).await.unwrap();
        wd.stop();

        wd.start();
        rx.wait_for(|s| *s == AgentState::Enabled).await.unwrap();
        wd.stop();
    }

    #[test]
    fn test_kill_switch_wire_format_snake_case() {
        let status: KillSwitchStatus =
            serde_json::from_str(r#"{"kill_switch":false,"active":true,"config_version":3}"#)
                .unwrap();
        assert!(!status.kill_switch);
        assert!(status.active);
        assert_eq!(status.config_version, 3);
    }
}
