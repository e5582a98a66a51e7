// Connection supervisor: sole owner of the host handle.
//
// Every host call goes through `with_handle`, which runs the blocking call
// on the blocking pool under a timeout and folds the outcome into one
// connection state machine:
//
//   Disconnected → Connecting → Connected | Disconnected
//   Connected    → Degraded   (push notifications could not be attached)
//   Connected | Degraded → Disconnected (probe or call hit a connection fault)
//
// After the handle is lost, one transparent re-acquire is allowed. Further
// attempts wait until `reconnect_threshold` consecutive failures pile up.

use std::sync::Arc;
use std::time::Duration;

use autosave_common::error::{ConnectionError, HostError};
use tracing::{debug, info, warn};

use crate::host::{HostConnector, HostSession};

/// Default consecutive failures before a reconnect attempt.
pub const DEFAULT_RECONNECT_THRESHOLD: u32 = 20;
/// Default bound on a single blocking host call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Handle valid, push notifications unavailable.
    Degraded(String),
}

impl ConnectionState {
    /// Connected and Degraded both serve saves and polls.
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Degraded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded(_) => "degraded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub reconnect_threshold: u32,
    pub call_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_threshold: DEFAULT_RECONNECT_THRESHOLD,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Result of the per-tick health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    /// Usable handle answered the probe.
    Alive,
    /// Probe failed; the handle was dropped.
    Lost,
    /// Still disconnected; no reconnect attempted this tick.
    Waiting { failures: u32 },
    /// A threshold-triggered reconnect succeeded.
    Reconnected,
    /// A threshold-triggered reconnect failed.
    ReconnectFailed,
}

pub struct ConnectionSupervisor<C: HostConnector> {
    connector: Arc<C>,
    config: SupervisorConfig,
    session: Option<Arc<dyn HostSession>>,
    state: ConnectionState,
    consecutive_failures: u32,
    transparent_retry_spent: bool,
    generation: u64,
    acquire_attempts: u64,
}

impl<C: HostConnector> ConnectionSupervisor<C> {
    pub fn new(connector: C, config: SupervisorConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            session: None,
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            transparent_retry_spent: false,
            generation: 0,
            acquire_attempts: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_usable(&self) -> bool {
        self.session.is_some() && self.state.is_usable()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Incremented on every successful acquire; lets the event adapter tell
    /// that its subscription belongs to a previous handle.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn acquire_attempts(&self) -> u64 {
        self.acquire_attempts
    }

    pub fn reconnect_threshold(&self) -> u32 {
        self.config.reconnect_threshold
    }

    // ── Acquire / release ──────────────────────────────────────────

    /// Obtain a fresh handle, replacing any current one.
    pub async fn acquire(&mut self) -> Result<(), ConnectionError> {
        self.session = None;
        self.acquire_attempts += 1;
        self.set_state(ConnectionState::Connecting);

        let connector = self.connector.clone();
        match run_bounded("host.connect", self.config.call_timeout, move || connector.connect())
            .await
        {
            Ok(session) => {
                self.session = Some(session);
                self.generation += 1;
                self.set_state(ConnectionState::Connected);
                info!(generation = self.generation, "connected to host");
                Ok(())
            }
            Err(error) => {
                self.consecutive_failures += 1;
                self.set_state(ConnectionState::Disconnected);
                warn!(
                    error = %error,
                    failures = self.consecutive_failures,
                    "failed to connect to host"
                );
                Err(match error {
                    HostError::Connection(inner) => inner,
                    other => ConnectionError::HostUnavailable(other.to_string()),
                })
            }
        }
    }

    /// Drop the handle (shutdown).
    pub fn release(&mut self) {
        if self.session.take().is_some() {
            info!("released host handle");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    // ── Degraded mode ──────────────────────────────────────────────

    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        if self.session.is_some() {
            self.set_state(ConnectionState::Degraded(reason.into()));
        }
    }

    pub fn mark_subscribed(&mut self) {
        if matches!(self.state, ConnectionState::Degraded(_)) {
            self.set_state(ConnectionState::Connected);
        }
    }

    // ── Liveness ───────────────────────────────────────────────────

    /// Cheap probe of the current handle. A failed probe drops the handle.
    pub async fn is_alive(&mut self) -> bool {
        let Some(session) = self.session.clone() else {
            return false;
        };
        match run_bounded("host.ping", self.config.call_timeout, move || session.ping()).await {
            Ok(()) => {
                self.record_success();
                true
            }
            Err(error) => {
                self.invalidate(&error);
                false
            }
        }
    }

    /// Per-tick health step: probe a usable handle, or count another
    /// failed tick while disconnected and reconnect once the threshold is
    /// reached.
    pub async fn check_health(&mut self) -> Health {
        if self.session.is_some() {
            return if self.is_alive().await { Health::Alive } else { Health::Lost };
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures < self.config.reconnect_threshold {
            return Health::Waiting { failures: self.consecutive_failures };
        }
        self.reconnect_after_threshold().await
    }

    async fn reconnect_after_threshold(&mut self) -> Health {
        info!(failures = self.consecutive_failures, "reconnect threshold reached, reconnecting");
        self.consecutive_failures = 0;
        match self.acquire().await {
            Ok(()) => Health::Reconnected,
            Err(_) => Health::ReconnectFailed,
        }
    }

    // ── Guarded calls ──────────────────────────────────────────────

    /// Run one host operation against the current handle.
    ///
    /// Connection faults (including timeouts) drop the handle and count as
    /// a failure; operation-level rejections leave the handle in place.
    pub async fn with_handle<R, F>(&mut self, op: &'static str, f: F) -> Result<R, HostError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn HostSession) -> Result<R, HostError> + Send + 'static,
    {
        let session = self.usable_session(op).await?;
        let result = run_bounded(op, self.config.call_timeout, move || f(session.as_ref())).await;
        match &result {
            Ok(_) => self.record_success(),
            Err(error) if error.is_connection_fault() => self.invalidate(error),
            Err(error) => debug!(op, error = %error, "host rejected operation"),
        }
        result
    }

    /// Count a failure the caller observed outside `with_handle`.
    pub fn record_failure(&mut self, op: &'static str, error: &HostError) {
        self.consecutive_failures += 1;
        debug!(op, error = %error, failures = self.consecutive_failures, "host failure recorded");
    }

    async fn usable_session(
        &mut self,
        op: &'static str,
    ) -> Result<Arc<dyn HostSession>, HostError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        if self.consecutive_failures >= self.config.reconnect_threshold {
            self.consecutive_failures = 0;
            self.acquire().await?;
        } else if !self.transparent_retry_spent {
            self.transparent_retry_spent = true;
            debug!(op, "handle stale, re-acquiring once");
            self.acquire().await?;
        } else {
            self.consecutive_failures += 1;
            return Err(ConnectionError::HostUnavailable(format!(
                "not connected ({} consecutive failures)",
                self.consecutive_failures
            ))
            .into());
        }

        self.session.clone().ok_or_else(|| ConnectionError::HandleInvalidated.into())
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.transparent_retry_spent = false;
    }

    fn invalidate(&mut self, error: &HostError) {
        self.session = None;
        self.consecutive_failures += 1;
        self.set_state(ConnectionState::Disconnected);
        warn!(
            error = %error,
            failures = self.consecutive_failures,
            "lost connection to host"
        );
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        match &next {
            ConnectionState::Degraded(reason) => {
                warn!(from = self.state.label(), reason = %reason, "connection degraded");
            }
            _ => info!(from = self.state.label(), to = next.label(), "connection state changed"),
        }
        self.state = next;
    }
}

/// Run a blocking host call on the blocking pool, bounded by `timeout`.
///
/// On timeout the call keeps running in the background; callers that need
/// per-document exclusion must track that themselves.
pub(crate) async fn run_bounded<R, F>(
    op: &'static str,
    timeout: Duration,
    f: F,
) -> Result<R, HostError>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R, HostError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(HostError::Protocol(format!("`{op}` aborted: {join_error}"))),
        Err(_) => Err(HostError::Timeout { op, after: timeout }),
    }
}
