// Polling watcher: periodic full scan of the host's open documents.
//
// A scan is one guarded host call that enumerates documents and reads each
// dirty flag. Every dirty document yields a Poll signal, whether or not a
// push signal is already pending; the ledger folds duplicates. The fresh
// identity set prunes the ledger.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use autosave_common::error::{EnumerationError, HostError};
use autosave_common::types::{ChangeSignal, DocumentId, HostDocument, SignalSource};
use tracing::{debug, info, warn};

use crate::host::HostConnector;
use crate::ledger::DebounceLedger;
use crate::supervisor::ConnectionSupervisor;

/// Dirty flag as read during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DirtyProbe {
    Clean,
    Dirty,
    /// The query failed for this one document; treated as dirty.
    Unknown(HostError),
}

/// What one scan found.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollScan {
    pub signals: Vec<ChangeSignal>,
    /// Documents enumerated by the previous scan but not by this one.
    pub vanished: Vec<DocumentId>,
    /// Ledger entries dropped because their document is gone.
    pub pruned: Vec<DocumentId>,
    /// Number of documents enumerated; `None` when enumeration failed.
    pub enumerated: Option<usize>,
}

pub struct PollingWatcher {
    interval: Duration,
    fallback_interval: Duration,
    polling_only: bool,
    last_scan: Option<Instant>,
    known: HashSet<DocumentId>,
}

impl PollingWatcher {
    pub fn new(interval: Duration, fallback_interval: Duration) -> Self {
        Self {
            interval,
            fallback_interval,
            polling_only: false,
            last_scan: None,
            known: HashSet::new(),
        }
    }

    /// Switch to the fallback cadence while push notifications are down.
    pub fn set_polling_only(&mut self, polling_only: bool) {
        if self.polling_only != polling_only {
            info!(
                polling_only,
                interval_ms = self.cadence_for(polling_only).as_millis() as u64,
                "poll cadence changed"
            );
        }
        self.polling_only = polling_only;
    }

    pub fn is_polling_only(&self) -> bool {
        self.polling_only
    }

    /// Effective time between scans.
    pub fn cadence(&self) -> Duration {
        self.cadence_for(self.polling_only)
    }

    fn cadence_for(&self, polling_only: bool) -> Duration {
        if polling_only {
            self.interval.min(self.fallback_interval)
        } else {
            self.interval
        }
    }

    /// True when no scan ran yet or a full cadence has elapsed.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_scan {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cadence(),
        }
    }

    pub fn known_documents(&self) -> usize {
        self.known.len()
    }

    /// Run one scan. Enumeration failure yields an empty scan and counts
    /// against the supervisor; the caller only sees `enumerated: None`.
    pub async fn tick<C: HostConnector>(
        &mut self,
        supervisor: &mut ConnectionSupervisor<C>,
        ledger: &mut DebounceLedger,
        now: Instant,
    ) -> PollScan {
        self.last_scan = Some(now);

        let probed = match supervisor.with_handle("documents.list", scan_documents).await {
            Ok(probed) => probed,
            Err(error) => {
                if !error.is_connection_fault() {
                    supervisor.record_failure("documents.list", &error);
                }
                warn!(error = %EnumerationError(error), "poll scan failed");
                return PollScan::default();
            }
        };

        let current: HashSet<DocumentId> = probed.iter().map(|(doc, _)| doc.id()).collect();
        let mut vanished: Vec<DocumentId> = self.known.difference(&current).cloned().collect();
        vanished.sort();
        for id in &vanished {
            info!(doc = %id, "document closed");
        }
        for id in current.difference(&self.known) {
            debug!(doc = %id, "document discovered");
        }
        let pruned = ledger.prune(&current);
        self.known = current;

        let enumerated = probed.len();
        let mut signals = Vec::new();
        for (doc, probe) in probed {
            match probe {
                DirtyProbe::Clean => {}
                DirtyProbe::Dirty => signals.push(ChangeSignal::new(doc, now, SignalSource::Poll)),
                DirtyProbe::Unknown(error) => {
                    warn!(doc = %doc.id(), error = %error, "dirty flag unreadable, assuming dirty");
                    signals.push(ChangeSignal::new(doc, now, SignalSource::Poll));
                }
            }
        }
        debug!(enumerated, dirty = signals.len(), "poll scan complete");

        PollScan { signals, vanished, pruned, enumerated: Some(enumerated) }
    }
}

/// Runs on the blocking pool inside `with_handle`.
fn scan_documents(
    session: &dyn crate::host::HostSession,
) -> Result<Vec<(HostDocument, DirtyProbe)>, HostError> {
    let documents = session.documents()?;
    let mut probed = Vec::with_capacity(documents.len());
    for doc in documents {
        let probe = match session.is_dirty(&doc.host_id) {
            Ok(true) => DirtyProbe::Dirty,
            Ok(false) => DirtyProbe::Clean,
            // A dead handle aborts the scan; anything else is per-document.
            Err(error) if error.is_connection_fault() => return Err(error),
            Err(error) => DirtyProbe::Unknown(error),
        };
        probed.push((doc, probe));
    }
    Ok(probed)
}
