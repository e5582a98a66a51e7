// Event adapter: best-effort bridge from host push notifications to the
// signal inbox.
//
// The sink runs on the host's delivery thread. It only folds the event into
// the inbox and returns; all host calls happen on the control loop.

use std::sync::Arc;
use std::time::Instant;

use autosave_common::error::AdapterError;
use autosave_common::types::{ChangeSignal, SignalSource};
use tracing::{debug, info, warn};

use crate::host::{EventSink, EventSubscription, HostConnector, HostEvent};
use crate::inbox::{LifecycleNotice, SignalInbox};
use crate::supervisor::ConnectionSupervisor;

/// Proof of a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscribed {
    /// Supervisor generation the subscription was attached to.
    pub generation: u64,
}

pub struct EventAdapter {
    inbox: Arc<SignalInbox>,
    subscription: Option<Box<dyn EventSubscription>>,
    generation: Option<u64>,
}

impl EventAdapter {
    pub fn new(inbox: Arc<SignalInbox>) -> Self {
        Self { inbox, subscription: None, generation: None }
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe through the supervisor's current handle, replacing any
    /// previous subscription.
    pub async fn start<C: HostConnector>(
        &mut self,
        supervisor: &mut ConnectionSupervisor<C>,
    ) -> Result<Subscribed, AdapterError> {
        self.stop();

        let sink = inbox_sink(self.inbox.clone());
        let subscribed = supervisor
            .with_handle("events.subscribe", move |session| session.subscribe(sink))
            .await;
        match subscribed {
            Ok(subscription) => {
                let generation = supervisor.generation();
                self.subscription = Some(subscription);
                self.generation = Some(generation);
                info!(generation, "push notifications attached");
                Ok(Subscribed { generation })
            }
            Err(error) => {
                let error = AdapterError::from(error);
                warn!(error = %error, "push notifications unavailable, polling only");
                Err(error)
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!(generation = ?self.generation, "push notifications detached");
        }
        self.generation = None;
    }
}

impl Drop for EventAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the callback handed to the host.
pub fn inbox_sink(inbox: Arc<SignalInbox>) -> EventSink {
    Arc::new(move |event: HostEvent| route_event(&inbox, event, Instant::now()))
}

fn route_event(inbox: &SignalInbox, event: HostEvent, at: Instant) {
    match event {
        HostEvent::DocumentChanged(doc) | HostEvent::SelectionChanged(doc) => {
            if !inbox.push_signal(ChangeSignal::new(doc, at, SignalSource::Push)) {
                debug!("inbox full, change signal dropped until next poll");
            }
        }
        HostEvent::DocumentOpened(doc) => {
            info!(doc = %doc.id(), name = %doc.name, "document opened");
            inbox.push_signal(ChangeSignal::new(doc, at, SignalSource::Push));
        }
        HostEvent::DocumentBeforeClose(doc) => {
            inbox.push_notice(LifecycleNotice::Closed(doc.id()));
        }
        HostEvent::DocumentSaved(doc) => {
            inbox.push_notice(LifecycleNotice::SavedExternally { id: doc.id(), at });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use autosave_common::error::HostError;
    use autosave_common::types::HostDocument;

    use super::*;
    use crate::host::memory::MemoryHost;
    use crate::supervisor::SupervisorConfig;

    fn stored(id: &str) -> HostDocument {
        HostDocument::new(id, format!("{id}.docx")).with_path(format!("/docs/{id}.docx"))
    }

    async fn connected(host: &MemoryHost) -> ConnectionSupervisor<MemoryHost> {
        let mut sup = ConnectionSupervisor::new(
            host.clone(),
            SupervisorConfig { reconnect_threshold: 20, call_timeout: Duration::from_secs(2) },
        );
        sup.acquire().await.expect("memory host should connect");
        sup
    }

    // ── Routing ────────────────────────────────────────────────────

    #[test]
    fn change_and_selection_events_become_push_signals() {
        let inbox = SignalInbox::default();
        let now = Instant::now();
        route_event(&inbox, HostEvent::DocumentChanged(stored("a")), now);
        route_event(&inbox, HostEvent::SelectionChanged(stored("b")), now);

        let drained = inbox.drain();
        assert_eq!(drained.signals.len(), 2);
        assert!(drained.signals.iter().all(|s| s.source == SignalSource::Push));
        assert!(drained.notices.is_empty());
    }

    #[test]
    fn lifecycle_events_become_notices() {
        let inbox = SignalInbox::default();
        let now = Instant::now();
        route_event(&inbox, HostEvent::DocumentBeforeClose(stored("a")), now);
        route_event(&inbox, HostEvent::DocumentSaved(stored("b")), now);

        let drained = inbox.drain();
        assert!(drained.signals.is_empty());
        assert_eq!(
            drained.notices,
            vec![
                LifecycleNotice::Closed(stored("a").id()),
                LifecycleNotice::SavedExternally { id: stored("b").id(), at: now },
            ]
        );
    }

    #[test]
    fn opened_document_is_signalled() {
        let inbox = SignalInbox::default();
        route_event(&inbox, HostEvent::DocumentOpened(stored("a")), Instant::now());
        assert_eq!(inbox.drain().signals.len(), 1);
    }

    // ── Subscription ───────────────────────────────────────────────

    #[tokio::test]
    async fn start_routes_host_events_into_inbox() {
        let host = MemoryHost::new();
        let mut sup = connected(&host).await;
        let inbox = Arc::new(SignalInbox::default());
        let mut adapter = EventAdapter::new(inbox.clone());

        let subscribed = adapter.start(&mut sup).await.expect("subscription should attach");
        assert_eq!(subscribed.generation, sup.generation());
        assert!(adapter.is_active());

        host.emit(HostEvent::DocumentChanged(stored("a")));
        assert_eq!(inbox.drain().signals.len(), 1);

        adapter.stop();
        assert_eq!(host.subscriber_count(), 0);
        host.emit(HostEvent::DocumentChanged(stored("a")));
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn subscription_failure_is_typed_and_non_fatal() {
        let host = MemoryHost::new();
        host.fail_subscribe(Some(HostError::rejected("events.subscribe", "events disabled")));
        let mut sup = connected(&host).await;
        let mut adapter = EventAdapter::new(Arc::new(SignalInbox::default()));

        let error = adapter.start(&mut sup).await.unwrap_err();
        assert!(matches!(error, AdapterError::SubscriptionFailed(_)));
        assert!(!adapter.is_active());
        assert!(sup.is_usable());
    }

    #[tokio::test]
    async fn restart_replaces_previous_subscription() {
        let host = MemoryHost::new();
        let mut sup = connected(&host).await;
        let mut adapter = EventAdapter::new(Arc::new(SignalInbox::default()));

        adapter.start(&mut sup).await.expect("first subscription");
        adapter.start(&mut sup).await.expect("second subscription");
        assert_eq!(host.subscriber_count(), 1);
    }
}
