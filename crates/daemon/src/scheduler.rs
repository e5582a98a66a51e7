// Save scheduler: turns pending ledger entries into host saves.
//
// A pass walks every pending document in identity order. One document's
// failure is recorded and the pass moves on. Saves for the same identity
// never overlap: a save that outlived its timeout keeps its in-flight claim
// until the host call actually returns. The host's dirty flag is read
// right before each save; a document that is already clean is not written.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use autosave_common::error::{HostError, SaveFailure};
use autosave_common::types::{ChangeSignal, DocumentId, SaveOutcome, SaveReport};
use tracing::{debug, info, warn};

use crate::host::HostConnector;
use crate::ledger::DebounceLedger;
use crate::supervisor::ConnectionSupervisor;

#[derive(Clone, Default)]
struct InFlight {
    ids: Arc<Mutex<HashSet<DocumentId>>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashSet<DocumentId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, id: &DocumentId) -> Option<InFlightGuard> {
        if !self.lock().insert(id.clone()) {
            return None;
        }
        Some(InFlightGuard { set: self.clone(), id: id.clone() })
    }

    fn contains(&self, id: &DocumentId) -> bool {
        self.lock().contains(id)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Released when the save call returns, wherever it is running.
struct InFlightGuard {
    set: InFlight,
    id: DocumentId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

#[derive(Default)]
pub struct SaveScheduler {
    in_flight: InFlight,
}

impl SaveScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_signal(&self, ledger: &mut DebounceLedger, signal: &ChangeSignal) {
        debug!(doc = %signal.id(), source = signal.source.as_str(), "change signal");
        ledger.record_signal(signal);
    }

    pub fn is_in_flight(&self, id: &DocumentId) -> bool {
        self.in_flight.contains(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Consider every pending document once and save the due ones.
    pub async fn process_due<C: HostConnector>(
        &self,
        ledger: &mut DebounceLedger,
        supervisor: &mut ConnectionSupervisor<C>,
        now: Instant,
        interval: Duration,
    ) -> Vec<SaveReport> {
        let mut reports = Vec::new();
        for id in ledger.pending() {
            let outcome = self.process_one(ledger, supervisor, &id, now, interval).await;
            reports.push(SaveReport { id, outcome });
        }
        reports
    }

    /// Last chance for a document the host is about to close: the same rules
    /// as a regular pass, applied to that one document if it is pending.
    pub async fn save_before_close<C: HostConnector>(
        &self,
        ledger: &mut DebounceLedger,
        supervisor: &mut ConnectionSupervisor<C>,
        id: &DocumentId,
        now: Instant,
        interval: Duration,
    ) -> Option<SaveReport> {
        ledger.state(id).and_then(|state| state.pending_since())?;
        let outcome = self.process_one(ledger, supervisor, id, now, interval).await;
        Some(SaveReport { id: id.clone(), outcome })
    }

    async fn process_one<C: HostConnector>(
        &self,
        ledger: &mut DebounceLedger,
        supervisor: &mut ConnectionSupervisor<C>,
        id: &DocumentId,
        now: Instant,
        interval: Duration,
    ) -> SaveOutcome {
        let Some(document) = ledger.document(id).cloned() else {
            return SaveOutcome::SkippedNotDue;
        };

        if !document.has_storage() {
            if ledger.record_no_path(id) {
                warn!(doc = %id, name = %document.name, "document has never been saved, skipping");
            } else {
                debug!(doc = %id, "document still has no storage path");
            }
            return SaveOutcome::SkippedNoPath;
        }

        if self.in_flight.contains(id) {
            debug!(doc = %id, "previous save still running");
            return SaveOutcome::SkippedInFlight;
        }

        if !ledger.is_due(id, now, interval) {
            return SaveOutcome::SkippedNotDue;
        }

        let Some(guard) = self.in_flight.claim(id) else {
            return SaveOutcome::SkippedInFlight;
        };
        let host_id = document.host_id.clone();
        let result = supervisor
            .with_handle("document.save", move |session| {
                let _guard = guard;
                match session.is_dirty(&host_id) {
                    Ok(false) => return Ok(false),
                    Ok(true) => {}
                    Err(error) if error.is_connection_fault() => return Err(error),
                    Err(error) => {
                        warn!(
                            host_id = %host_id,
                            reason = %error,
                            "dirty flag unreadable, saving anyway"
                        );
                    }
                }
                session.save(&host_id).map(|()| true)
            })
            .await;

        match result {
            Ok(false) => {
                ledger.record_clean(id);
                debug!(doc = %id, outcome = "skipped_clean", "no unsaved changes");
                SaveOutcome::SkippedClean
            }
            Ok(true) => {
                ledger.record_save_result(id, now, Ok(()));
                info!(doc = %id, outcome = "saved", "document saved");
                SaveOutcome::Saved
            }
            Err(error) => {
                let failure = SaveFailure::from(&error);
                ledger.record_save_result(id, now, Err(failure.clone()));
                let failures = ledger.state(id).map_or(0, |state| state.consecutive_failures());
                log_failure(id, &error, failures);
                SaveOutcome::Failed(failure)
            }
        }
    }
}

fn log_failure(id: &DocumentId, error: &HostError, failures: u32) {
    warn!(doc = %id, outcome = "failed", reason = %error, failures, "save failed");
}
