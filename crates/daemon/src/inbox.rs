// Thread-safe inbox between host callbacks and the control loop.
//
// Host notifications arrive on the host's delivery thread; they are folded
// in here without blocking and drained once per tick. Change signals are
// keyed by document identity (earliest observation wins), lifecycle notices
// keep arrival order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use autosave_common::types::{ChangeSignal, DocumentId};

/// Default bound on distinct pending documents.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// Lifecycle events that bypass the debounce path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleNotice {
    /// The host is closing the document.
    Closed(DocumentId),
    /// The user saved the document from the editor.
    SavedExternally { id: DocumentId, at: Instant },
}

/// Everything collected since the previous drain.
#[derive(Debug, Default)]
pub struct Drained {
    pub signals: Vec<ChangeSignal>,
    pub notices: Vec<LifecycleNotice>,
    /// Signals rejected because the inbox was full.
    pub dropped: u64,
}

#[derive(Default)]
struct InboxState {
    signals: HashMap<DocumentId, ChangeSignal>,
    notices: VecDeque<LifecycleNotice>,
    dropped: u64,
}

/// Bounded, identity-keyed inbox.
pub struct SignalInbox {
    capacity: usize,
    state: Mutex<InboxState>,
}

impl Default for SignalInbox {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAPACITY)
    }
}

impl SignalInbox {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), state: Mutex::new(InboxState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold a signal in. Returns false when it was dropped because the inbox
    /// already holds `capacity` other documents; the next poll recovers it.
    pub fn push_signal(&self, signal: ChangeSignal) -> bool {
        let id = signal.id();
        let mut state = self.lock();
        if let Some(existing) = state.signals.get_mut(&id) {
            if signal.observed_at < existing.observed_at {
                *existing = signal;
            } else {
                existing.document = signal.document;
            }
            return true;
        }
        if state.signals.len() >= self.capacity {
            state.dropped += 1;
            return false;
        }
        state.signals.insert(id, signal);
        true
    }

    pub fn push_notice(&self, notice: LifecycleNotice) {
        let mut state = self.lock();
        if state.notices.len() >= self.capacity {
            state.notices.pop_front();
            state.dropped += 1;
        }
        state.notices.push_back(notice);
    }

    pub fn drain(&self) -> Drained {
        let mut state = self.lock();
        let mut signals: Vec<ChangeSignal> = state.signals.drain().map(|(_, s)| s).collect();
        signals.sort_by_key(|signal| signal.observed_at);
        Drained {
            signals,
            notices: state.notices.drain(..).collect(),
            dropped: std::mem::take(&mut state.dropped),
        }
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        state.signals.len() + state.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
