// Core domain types shared by the engine, host backends and CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::SaveFailure;

// ── Documents ──────────────────────────────────────────────────────

/// A document as enumerated by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HostDocument {
    /// Opaque identifier assigned by the host. Stable for the lifetime of
    /// the open document, not across host restarts.
    pub host_id: String,
    /// Display name (window title / file name).
    pub name: String,
    /// Storage location. `None` until the user saves the document once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl HostDocument {
    pub fn new(host_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { host_id: host_id.into(), name: name.into(), path: None }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The identity the engine tracks this document under.
    pub fn id(&self) -> DocumentId {
        match &self.path {
            Some(path) => DocumentId::Stored(path.clone()),
            None => DocumentId::Unsaved(self.host_id.clone()),
        }
    }

    pub fn has_storage(&self) -> bool {
        self.path.is_some()
    }
}

/// Stable key for an open document.
///
/// Derived from the storage path when there is one. Documents that were
/// never saved fall back to the host identifier; those are tracked so their
/// signals can be answered with `SkippedNoPath`, but are never written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentId {
    Stored(PathBuf),
    Unsaved(String),
}

impl DocumentId {
    pub fn path(&self) -> Option<&Path> {
        match self {
            DocumentId::Stored(path) => Some(path),
            DocumentId::Unsaved(_) => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Stored(path) => write!(f, "{}", path.display()),
            DocumentId::Unsaved(host_id) => write!(f, "unsaved:{host_id}"),
        }
    }
}

// ── Change signals ─────────────────────────────────────────────────

/// Where a change signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Host-originated notification.
    Push,
    /// Periodic scan of dirty flags.
    Poll,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Push => "push",
            SignalSource::Poll => "poll",
        }
    }
}

/// Normalized notice that a document may need saving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSignal {
    pub document: HostDocument,
    pub observed_at: Instant,
    pub source: SignalSource,
}

impl ChangeSignal {
    pub fn new(document: HostDocument, observed_at: Instant, source: SignalSource) -> Self {
        Self { document, observed_at, source }
    }

    pub fn id(&self) -> DocumentId {
        self.document.id()
    }
}

// ── Save outcomes ──────────────────────────────────────────────────

/// Result of considering one pending document in a scheduler pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Pending, but the debounce interval has not elapsed yet.
    SkippedNotDue,
    /// The document has no storage location and is never written.
    SkippedNoPath,
    /// A previous save for this document has not returned yet.
    SkippedInFlight,
    /// The host reports no unsaved changes; the pending signal is dropped.
    SkippedClean,
    Failed(SaveFailure),
}

impl SaveOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            SaveOutcome::Saved => "saved",
            SaveOutcome::SkippedNotDue => "skipped_not_due",
            SaveOutcome::SkippedNoPath => "skipped_no_path",
            SaveOutcome::SkippedInFlight => "skipped_in_flight",
            SaveOutcome::SkippedClean => "skipped_clean",
            SaveOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }
}

/// One entry of a scheduler pass report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub id: DocumentId,
    pub outcome: SaveOutcome,
}
