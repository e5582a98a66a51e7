// Orchestrator: the control loop that ties the engine together.
//
// One tick:
//   (a) drain push signals and lifecycle notices from the inbox,
//   (b) scan the host if the poll cadence elapsed,
//   (c) save every due document,
//   (e) probe connection health, reconnect at the threshold and re-attach
//       push notifications to a fresh handle.
// Step (d) is the sleep between ticks in `run`, which is also where a stop
// request is observed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use autosave_common::types::SaveOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::adapter::EventAdapter;
use crate::host::HostConnector;
use crate::inbox::{LifecycleNotice, SignalInbox};
use crate::ledger::DebounceLedger;
use crate::poller::PollingWatcher;
use crate::scheduler::SaveScheduler;
use crate::supervisor::{ConnectionSupervisor, Health, SupervisorConfig};

/// Plain values the engine runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub debounce: Duration,
    pub polling_interval: Duration,
    pub fallback_polling_interval: Duration,
    pub reconnect_threshold: u32,
    pub main_loop_sleep: Duration,
    pub call_timeout: Duration,
    pub inbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(10),
            polling_interval: Duration::from_secs(15),
            fallback_polling_interval: Duration::from_secs(5),
            reconnect_threshold: 20,
            main_loop_sleep: Duration::from_millis(500),
            call_timeout: Duration::from_secs(10),
            inbox_capacity: crate::inbox::DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub signals: usize,
    pub closed: usize,
    pub external_saves: usize,
    pub polled: bool,
    pub saves: Vec<autosave_common::types::SaveReport>,
    pub health: Option<Health>,
}

impl TickReport {
    pub fn count(&self, kind: &str) -> usize {
        self.saves.iter().filter(|report| report.outcome.kind() == kind).count()
    }

    pub fn saved(&self) -> usize {
        self.saves.iter().filter(|report| report.outcome.is_saved()).count()
    }

    pub fn failed(&self) -> usize {
        self.saves.iter().filter(|report| matches!(report.outcome, SaveOutcome::Failed(_))).count()
    }
}

/// Totals over a whole run, logged and returned on shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub polls: u64,
    pub saved: u64,
    pub failed: u64,
    pub skipped_no_path: u64,
    pub reconnects: u64,
}

impl RunSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            ticks: 0,
            polls: 0,
            saved: 0,
            failed: 0,
            skipped_no_path: 0,
            reconnects: 0,
        }
    }

    fn record(&mut self, tick: &TickReport) {
        self.ticks += 1;
        self.polls += u64::from(tick.polled);
        self.saved += tick.saved() as u64;
        self.failed += tick.failed() as u64;
        self.skipped_no_path += tick.count("skipped_no_path") as u64;
        if tick.health == Some(Health::Reconnected) {
            self.reconnects += 1;
        }
    }
}

pub struct Orchestrator<C: HostConnector> {
    config: EngineConfig,
    supervisor: ConnectionSupervisor<C>,
    ledger: DebounceLedger,
    scheduler: SaveScheduler,
    watcher: PollingWatcher,
    inbox: Arc<SignalInbox>,
    adapter: EventAdapter,
    /// Handle generation the last subscribe attempt was made against.
    subscribe_attempted: Option<u64>,
}

impl<C: HostConnector> Orchestrator<C> {
    pub fn new(connector: C, config: EngineConfig) -> Self {
        let supervisor = ConnectionSupervisor::new(
            connector,
            SupervisorConfig {
                reconnect_threshold: config.reconnect_threshold,
                call_timeout: config.call_timeout,
            },
        );
        let inbox = Arc::new(SignalInbox::new(config.inbox_capacity));
        Self {
            supervisor,
            ledger: DebounceLedger::new(),
            scheduler: SaveScheduler::new(),
            watcher: PollingWatcher::new(config.polling_interval, config.fallback_polling_interval),
            adapter: EventAdapter::new(inbox.clone()),
            inbox,
            subscribe_attempted: None,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.supervisor
    }

    pub fn ledger(&self) -> &DebounceLedger {
        &self.ledger
    }

    pub fn watcher(&self) -> &PollingWatcher {
        &self.watcher
    }

    pub fn is_push_active(&self) -> bool {
        self.adapter.is_active()
    }

    pub fn scheduler(&self) -> &SaveScheduler {
        &self.scheduler
    }

    /// Connect and attach push notifications. A host that is not there yet
    /// is not an error; ticks keep trying.
    pub async fn start(&mut self) {
        match self.supervisor.acquire().await {
            Ok(()) => self.attach_push().await,
            Err(error) => info!(error = %error, "host not reachable yet, will keep trying"),
        }
    }

    async fn attach_push(&mut self) {
        self.subscribe_attempted = Some(self.supervisor.generation());
        match self.adapter.start(&mut self.supervisor).await {
            Ok(_) => {
                self.supervisor.mark_subscribed();
                self.watcher.set_polling_only(false);
            }
            Err(error) => {
                self.supervisor.mark_degraded(error.to_string());
                self.watcher.set_polling_only(true);
            }
        }
    }

    /// Run one tick at `now`.
    pub async fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        // (a) push inbox
        let drained = self.inbox.drain();
        if drained.dropped > 0 {
            debug!(dropped = drained.dropped, "inbox overflowed, next poll recovers");
        }
        report.signals = drained.signals.len();
        for signal in &drained.signals {
            self.scheduler.on_signal(&mut self.ledger, signal);
        }
        let mut closing_saves = Vec::new();
        for notice in drained.notices {
            match notice {
                LifecycleNotice::Closed(id) => {
                    // Last save attempt under the usual rules, then forget it.
                    let closing = self
                        .scheduler
                        .save_before_close(
                            &mut self.ledger,
                            &mut self.supervisor,
                            &id,
                            now,
                            self.config.debounce,
                        )
                        .await;
                    closing_saves.extend(closing);
                    if self.ledger.remove(&id) {
                        report.closed += 1;
                        info!(doc = %id, "document closing, dropped from ledger");
                    }
                }
                LifecycleNotice::SavedExternally { id, at } => {
                    if self.ledger.record_external_save(&id, at) {
                        report.external_saves += 1;
                        info!(doc = %id, "document saved from the editor");
                    }
                }
            }
        }

        // (b) poll
        if self.watcher.is_due(now) {
            let scan = self.watcher.tick(&mut self.supervisor, &mut self.ledger, now).await;
            report.polled = true;
            for signal in &scan.signals {
                self.scheduler.on_signal(&mut self.ledger, signal);
            }
        }

        // (c) saves
        report.saves = closing_saves;
        report.saves.extend(
            self.scheduler
                .process_due(&mut self.ledger, &mut self.supervisor, now, self.config.debounce)
                .await,
        );
        if report.polled {
            let saved = report.saved();
            info!(saved, "poll check saved {saved} documents");
        }

        // (e) health
        report.health = Some(self.check_health().await);
        report
    }

    async fn check_health(&mut self) -> Health {
        let health = self.supervisor.check_health().await;
        if health == Health::Lost {
            self.adapter.stop();
        }
        // A new handle (threshold reconnect or a transparent re-acquire
        // inside a host call) needs its own subscription.
        if self.supervisor.is_usable()
            && self.subscribe_attempted != Some(self.supervisor.generation())
        {
            self.attach_push().await;
        }
        health
    }

    /// Tick until `shutdown` fires, then detach and release the handle.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> RunSummary {
        let mut summary = RunSummary::new(Utc::now());
        self.start().await;

        loop {
            let report = self.tick(Instant::now()).await;
            summary.record(&report);

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.config.main_loop_sleep) => {}
            }
        }

        self.stop();
        summary.finished_at = Some(Utc::now());
        info!(
            ticks = summary.ticks,
            polls = summary.polls,
            saved = summary.saved,
            failed = summary.failed,
            reconnects = summary.reconnects,
            "autosave stopped"
        );
        summary
    }

    pub fn stop(&mut self) {
        self.adapter.stop();
        self.supervisor.release();
    }
}
