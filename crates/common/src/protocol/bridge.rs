// Host bridge protocol: method names and payloads exchanged with the editor's
// automation bridge over the JSON-RPC socket.

use serde::{Deserialize, Serialize};

use crate::types::HostDocument;

// ── Requests ───────────────────────────────────────────────────────
pub const HOST_PING: &str = "host.ping";
pub const DOCUMENTS_LIST: &str = "documents.list";
pub const DOCUMENT_IS_DIRTY: &str = "document.is_dirty";
pub const DOCUMENT_SAVE: &str = "document.save";
pub const EVENTS_SUBSCRIBE: &str = "events.subscribe";

/// All request methods the bridge must answer.
pub const REQUEST_METHODS: &[&str] =
    &[HOST_PING, DOCUMENTS_LIST, DOCUMENT_IS_DIRTY, DOCUMENT_SAVE, EVENTS_SUBSCRIBE];

// ── Notifications (bridge → engine) ────────────────────────────────
pub const EVENT_DOCUMENT_CHANGED: &str = "document.changed";
pub const EVENT_SELECTION_CHANGED: &str = "selection.changed";
pub const EVENT_DOCUMENT_OPENED: &str = "document.opened";
pub const EVENT_DOCUMENT_BEFORE_CLOSE: &str = "document.before_close";
pub const EVENT_DOCUMENT_SAVED: &str = "document.saved";

pub const EVENT_METHODS: &[&str] = &[
    EVENT_DOCUMENT_CHANGED,
    EVENT_SELECTION_CHANGED,
    EVENT_DOCUMENT_OPENED,
    EVENT_DOCUMENT_BEFORE_CLOSE,
    EVENT_DOCUMENT_SAVED,
];

// ── Bridge-specific error codes ────────────────────────────────────
/// The document has never been saved and has no destination.
pub const ERROR_NO_PATH: i32 = -32010;
/// The host refused the operation (read-only, locked, modal dialog open).
pub const ERROR_REJECTED: i32 = -32011;
/// The referenced document is no longer open.
pub const ERROR_UNKNOWN_DOCUMENT: i32 = -32012;

// ── Payloads ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingResult {
    /// Host application name, e.g. "Microsoft Word".
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentsListResult {
    pub documents: Vec<HostDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentParams {
    pub host_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirtyResult {
    pub dirty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveResult {
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeResult {
    /// Event methods the bridge will stream on this connection.
    pub events: Vec<String>,
}

/// Params of every notification the bridge streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventParams {
    pub document: HostDocument,
}
