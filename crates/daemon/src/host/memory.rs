// In-process scriptable host for engine tests.
//
// Every handle shares one state; `crash()` invalidates sessions handed out
// earlier, the way a host process restart would.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use autosave_common::error::{ConnectionError, HostError};
use autosave_common::types::HostDocument;

use super::{EventSink, EventSubscription, HostConnector, HostEvent, HostSession};

#[derive(Debug, Clone)]
struct OpenDocument {
    doc: HostDocument,
    dirty: bool,
}

#[derive(Default)]
struct MemoryHostState {
    available: bool,
    epoch: u64,
    documents: BTreeMap<String, OpenDocument>,
    save_failures: HashMap<String, HostError>,
    dirty_probe_failures: HashMap<String, HostError>,
    subscribe_failure: Option<HostError>,
    enumeration_failure: Option<HostError>,
    save_delay: Option<Duration>,
    sinks: Vec<(u64, EventSink)>,
    next_sink_id: u64,
    connect_calls: usize,
    save_calls: Vec<String>,
    saves_in_progress: HashMap<String, usize>,
    max_concurrent_saves: usize,
}

/// Scriptable host shared between the test and the engine under test.
#[derive(Clone)]
pub struct MemoryHost {
    state: Arc<Mutex<MemoryHostState>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        let state = MemoryHostState { available: true, ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryHostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting ──────────────────────────────────────────────────

    pub fn open(&self, doc: HostDocument, dirty: bool) {
        self.lock().documents.insert(doc.host_id.clone(), OpenDocument { doc, dirty });
    }

    pub fn close(&self, host_id: &str) {
        self.lock().documents.remove(host_id);
    }

    pub fn set_dirty(&self, host_id: &str, dirty: bool) {
        if let Some(open) = self.lock().documents.get_mut(host_id) {
            open.dirty = dirty;
        }
    }

    /// Give an unsaved document a storage path ("Save As").
    pub fn assign_path(&self, host_id: &str, path: impl Into<std::path::PathBuf>) {
        if let Some(open) = self.lock().documents.get_mut(host_id) {
            open.doc.path = Some(path.into());
        }
    }

    /// Simulate the host going away. Existing sessions become invalid.
    pub fn crash(&self) {
        let mut state = self.lock();
        state.available = false;
        state.epoch += 1;
        state.sinks.clear();
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn fail_saves(&self, host_id: &str, error: HostError) {
        self.lock().save_failures.insert(host_id.to_string(), error);
    }

    pub fn clear_save_failure(&self, host_id: &str) {
        self.lock().save_failures.remove(host_id);
    }

    pub fn fail_dirty_probe(&self, host_id: &str, error: HostError) {
        self.lock().dirty_probe_failures.insert(host_id.to_string(), error);
    }

    pub fn fail_enumeration(&self, error: Option<HostError>) {
        self.lock().enumeration_failure = error;
    }

    pub fn fail_subscribe(&self, error: Option<HostError>) {
        self.lock().subscribe_failure = error;
    }

    /// Make every save block for `delay` before completing.
    pub fn set_save_delay(&self, delay: Option<Duration>) {
        self.lock().save_delay = delay;
    }

    /// Deliver a notification to every live subscriber, on the caller's thread.
    pub fn emit(&self, event: HostEvent) {
        let sinks: Vec<EventSink> = self.lock().sinks.iter().map(|(_, s)| s.clone()).collect();
        for sink in sinks {
            sink(event.clone());
        }
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn is_dirty(&self, host_id: &str) -> Option<bool> {
        self.lock().documents.get(host_id).map(|open| open.dirty)
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn save_calls(&self) -> Vec<String> {
        self.lock().save_calls.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().sinks.len()
    }

    pub fn max_concurrent_saves(&self) -> usize {
        self.lock().max_concurrent_saves
    }
}

impl HostConnector for MemoryHost {
    fn connect(&self) -> Result<Arc<dyn HostSession>, HostError> {
        let mut state = self.lock();
        state.connect_calls += 1;
        if !state.available {
            return Err(HostError::unavailable("memory host is down"));
        }
        Ok(Arc::new(MemorySession { host: self.clone(), epoch: state.epoch }))
    }
}

struct MemorySession {
    host: MemoryHost,
    epoch: u64,
}

impl MemorySession {
    fn live(&self) -> Result<MutexGuard<'_, MemoryHostState>, HostError> {
        let state = self.host.lock();
        if state.epoch != self.epoch {
            return Err(ConnectionError::HandleInvalidated.into());
        }
        if !state.available {
            return Err(HostError::unavailable("memory host is down"));
        }
        Ok(state)
    }
}

impl HostSession for MemorySession {
    fn ping(&self) -> Result<(), HostError> {
        self.live().map(|_| ())
    }

    fn documents(&self) -> Result<Vec<HostDocument>, HostError> {
        let state = self.live()?;
        if let Some(error) = &state.enumeration_failure {
            return Err(error.clone());
        }
        Ok(state.documents.values().map(|open| open.doc.clone()).collect())
    }

    fn is_dirty(&self, host_id: &str) -> Result<bool, HostError> {
        let state = self.live()?;
        if let Some(error) = state.dirty_probe_failures.get(host_id) {
            return Err(error.clone());
        }
        state
            .documents
            .get(host_id)
            .map(|open| open.dirty)
            .ok_or_else(|| HostError::rejected("document.is_dirty", "unknown document"))
    }

    fn save(&self, host_id: &str) -> Result<(), HostError> {
        let delay = {
            let mut state = self.live()?;
            state.save_calls.push(host_id.to_string());
            if let Some(error) = state.save_failures.get(host_id) {
                return Err(error.clone());
            }
            let open = state
                .documents
                .get(host_id)
                .ok_or_else(|| HostError::rejected("document.save", "unknown document"))?;
            if open.doc.path.is_none() {
                return Err(HostError::NoPath);
            }
            let running = state.saves_in_progress.entry(host_id.to_string()).or_insert(0);
            *running += 1;
            let running = *running;
            state.max_concurrent_saves = state.max_concurrent_saves.max(running);
            state.save_delay
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.host.lock();
        if let Some(running) = state.saves_in_progress.get_mut(host_id) {
            *running = running.saturating_sub(1);
        }
        if let Some(open) = state.documents.get_mut(host_id) {
            open.dirty = false;
        }
        Ok(())
    }

    fn subscribe(&self, sink: EventSink) -> Result<Box<dyn EventSubscription>, HostError> {
        let mut state = self.live()?;
        if let Some(error) = &state.subscribe_failure {
            return Err(error.clone());
        }
        let id = state.next_sink_id;
        state.next_sink_id += 1;
        state.sinks.push((id, sink));
        Ok(Box::new(MemorySubscription { host: self.host.clone(), id: Some(id) }))
    }
}

struct MemorySubscription {
    host: MemoryHost,
    id: Option<u64>,
}

impl EventSubscription for MemorySubscription {
    fn unsubscribe(&mut self) {
        if let Some(id) = self.id.take() {
            self.host.lock().sinks.retain(|(sink_id, _)| *sink_id != id);
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
