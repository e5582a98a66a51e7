// Debounce ledger: per-document save bookkeeping.
//
// The only place that decides whether a document is due for saving. The
// scheduler and the polling watcher mutate it through the methods below;
// nothing else touches `DocumentState`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use autosave_common::error::SaveFailure;
use autosave_common::types::{ChangeSignal, DocumentId, HostDocument};

/// Save bookkeeping for one open document.
#[derive(Debug, Clone)]
pub struct DocumentState {
    document: HostDocument,
    dirty: bool,
    /// Earliest observation of the change that is still waiting to be saved.
    pending_since: Option<Instant>,
    last_attempt_at: Option<Instant>,
    last_success_at: Option<Instant>,
    consecutive_failures: u32,
    last_failure: Option<SaveFailure>,
    no_path_reported: bool,
}

impl DocumentState {
    fn new(document: HostDocument) -> Self {
        Self {
            document,
            dirty: false,
            pending_since: None,
            last_attempt_at: None,
            last_success_at: None,
            consecutive_failures: 0,
            last_failure: None,
            no_path_reported: false,
        }
    }

    pub fn document(&self) -> &HostDocument {
        &self.document
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn pending_since(&self) -> Option<Instant> {
        self.pending_since
    }

    pub fn last_attempt_at(&self) -> Option<Instant> {
        self.last_attempt_at
    }

    pub fn last_success_at(&self) -> Option<Instant> {
        self.last_success_at
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_failure(&self) -> Option<&SaveFailure> {
        self.last_failure.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct DebounceLedger {
    entries: HashMap<DocumentId, DocumentState>,
}

impl DebounceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the signalled document pending, creating its entry on first
    /// sight. Repeated signals keep the earliest observation time.
    pub fn record_signal(&mut self, signal: &ChangeSignal) {
        let state = self
            .entries
            .entry(signal.id())
            .or_insert_with(|| DocumentState::new(signal.document.clone()));
        state.document = signal.document.clone();
        state.dirty = true;
        state.pending_since = Some(match state.pending_since {
            Some(existing) => existing.min(signal.observed_at),
            None => signal.observed_at,
        });
    }

    /// True iff a signal is pending and either no save has succeeded yet or
    /// at least `interval` has passed since the last successful one.
    pub fn is_due(&self, id: &DocumentId, now: Instant, interval: Duration) -> bool {
        let Some(state) = self.entries.get(id) else {
            return false;
        };
        if state.pending_since.is_none() {
            return false;
        }
        match state.last_success_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        }
    }

    /// Earliest instant at which the pending change becomes due.
    pub fn due_at(&self, id: &DocumentId, interval: Duration) -> Option<Instant> {
        let state = self.entries.get(id)?;
        let pending = state.pending_since?;
        Some(match state.last_success_at {
            Some(last) => pending.max(last + interval),
            None => pending,
        })
    }

    /// Record the result of a dispatched save. A failure leaves the pending
    /// flag set so the next eligible pass retries.
    pub fn record_save_result(
        &mut self,
        id: &DocumentId,
        at: Instant,
        result: Result<(), SaveFailure>,
    ) {
        let Some(state) = self.entries.get_mut(id) else {
            return;
        };
        state.last_attempt_at = Some(at);
        match result {
            Ok(()) => {
                state.last_success_at = Some(at);
                state.pending_since = None;
                state.dirty = false;
                state.consecutive_failures = 0;
                state.last_failure = None;
            }
            Err(failure) => {
                state.consecutive_failures += 1;
                state.last_failure = Some(failure);
            }
        }
    }

    /// Consume the pending signal of a document that has no storage path.
    /// Returns true the first time, so the caller reports it only once.
    pub fn record_no_path(&mut self, id: &DocumentId) -> bool {
        let Some(state) = self.entries.get_mut(id) else {
            return false;
        };
        state.pending_since = None;
        !std::mem::replace(&mut state.no_path_reported, true)
    }

    /// The host reported no unsaved changes when the save was about to be
    /// dispatched. Clears the pending signal without touching the debounce
    /// window, since nothing was written.
    pub fn record_clean(&mut self, id: &DocumentId) -> bool {
        let Some(state) = self.entries.get_mut(id) else {
            return false;
        };
        state.pending_since = None;
        state.dirty = false;
        true
    }

    /// The user saved the document from the editor: treat it as our own
    /// successful save so the debounce window restarts. A change observed
    /// after `at` stays pending.
    pub fn record_external_save(&mut self, id: &DocumentId, at: Instant) -> bool {
        let Some(state) = self.entries.get_mut(id) else {
            return false;
        };
        state.last_success_at = Some(at);
        if state.pending_since.is_some_and(|pending| pending <= at) {
            state.pending_since = None;
            state.dirty = false;
        }
        state.consecutive_failures = 0;
        state.last_failure = None;
        true
    }

    /// Drop the entry of a document the host reported closed.
    pub fn remove(&mut self, id: &DocumentId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Remove entries whose identity is not in `current`. Returns the
    /// removed identities, sorted.
    pub fn prune(&mut self, current: &HashSet<DocumentId>) -> Vec<DocumentId> {
        let mut removed: Vec<DocumentId> =
            self.entries.keys().filter(|id| !current.contains(*id)).cloned().collect();
        for id in &removed {
            self.entries.remove(id);
        }
        removed.sort();
        removed
    }

    /// Identities with a pending signal, sorted for deterministic passes.
    pub fn pending(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self
            .entries
            .iter()
            .filter(|(_, state)| state.pending_since.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn document(&self, id: &DocumentId) -> Option<&HostDocument> {
        self.entries.get(id).map(|state| &state.document)
    }

    pub fn state(&self, id: &DocumentId) -> Option<&DocumentState> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
