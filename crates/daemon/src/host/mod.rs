// Host automation boundary: the narrow surface the engine needs from the
// editor that owns the documents.
//
// Calls are synchronous and may block while the host is busy; the
// connection supervisor moves them off the control loop and bounds them
// with a timeout. Backends convert every host-layer fault to `HostError`.

pub mod bridge;
pub mod memory;

use std::sync::Arc;

use autosave_common::error::HostError;
use autosave_common::types::HostDocument;

/// Push notification delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    DocumentChanged(HostDocument),
    SelectionChanged(HostDocument),
    DocumentOpened(HostDocument),
    DocumentBeforeClose(HostDocument),
    /// The user saved the document from the editor.
    DocumentSaved(HostDocument),
}

impl HostEvent {
    pub fn document(&self) -> &HostDocument {
        match self {
            HostEvent::DocumentChanged(doc)
            | HostEvent::SelectionChanged(doc)
            | HostEvent::DocumentOpened(doc)
            | HostEvent::DocumentBeforeClose(doc)
            | HostEvent::DocumentSaved(doc) => doc,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::DocumentChanged(_) => "document_changed",
            HostEvent::SelectionChanged(_) => "selection_changed",
            HostEvent::DocumentOpened(_) => "document_opened",
            HostEvent::DocumentBeforeClose(_) => "document_before_close",
            HostEvent::DocumentSaved(_) => "document_saved",
        }
    }
}

/// Callback invoked on the host's delivery thread for every notification.
/// Implementations must return quickly and never call back into the host.
pub type EventSink = Arc<dyn Fn(HostEvent) + Send + Sync>;

/// Live subscription to host notifications. Dropping it unsubscribes.
pub trait EventSubscription: Send {
    fn unsubscribe(&mut self);
}

/// A connected handle to the host and its open-document collection.
pub trait HostSession: Send + Sync {
    /// Cheap, side-effect free liveness probe.
    fn ping(&self) -> Result<(), HostError>;

    /// Enumerate currently open documents.
    fn documents(&self) -> Result<Vec<HostDocument>, HostError>;

    /// Read the host's dirty flag for one document.
    fn is_dirty(&self, host_id: &str) -> Result<bool, HostError>;

    /// Persist one document to its storage location.
    fn save(&self, host_id: &str) -> Result<(), HostError>;

    /// Attach a notification sink.
    fn subscribe(&self, sink: EventSink) -> Result<Box<dyn EventSubscription>, HostError>;
}

/// Produces fresh host sessions. Only the connection supervisor calls this.
pub trait HostConnector: Send + Sync + 'static {
    fn connect(&self) -> Result<Arc<dyn HostSession>, HostError>;
}
