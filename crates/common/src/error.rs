// Typed failures for every call across the host automation boundary.

use std::time::Duration;

use thiserror::Error;

/// The host handle itself is missing or unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("host unavailable: {0}")]
    HostUnavailable(String),

    #[error("host handle invalidated")]
    HandleInvalidated,
}

/// Failure of a single host call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("`{op}` timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("host rejected `{op}`: {message}")]
    Rejected { op: &'static str, message: String },

    #[error("document has no storage path")]
    NoPath,

    #[error("host protocol error: {0}")]
    Protocol(String),
}

impl HostError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        HostError::Connection(ConnectionError::HostUnavailable(reason.into()))
    }

    pub fn rejected(op: &'static str, message: impl Into<String>) -> Self {
        HostError::Rejected { op, message: message.into() }
    }

    /// True when the failure says something about the handle rather than
    /// about the one document or request involved.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            HostError::Connection(_) | HostError::Timeout { .. } | HostError::Protocol(_)
        )
    }
}

/// The push-notification subscription could not be attached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("event subscription failed: {0}")]
    SubscriptionFailed(String),
}

impl From<HostError> for AdapterError {
    fn from(error: HostError) -> Self {
        AdapterError::SubscriptionFailed(error.to_string())
    }
}

/// Why a dispatched save did not persist the document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaveFailure {
    #[error("document has no storage path")]
    NoPath,

    #[error("host rejected save: {0}")]
    HostRejected(String),

    #[error("save timed out")]
    Timeout,

    #[error("host disconnected: {0}")]
    Disconnected(String),
}

impl From<&HostError> for SaveFailure {
    fn from(error: &HostError) -> Self {
        match error {
            HostError::NoPath => SaveFailure::NoPath,
            HostError::Timeout { .. } => SaveFailure::Timeout,
            HostError::Rejected { message, .. } => SaveFailure::HostRejected(message.clone()),
            HostError::Connection(inner) => SaveFailure::Disconnected(inner.to_string()),
            HostError::Protocol(message) => SaveFailure::Disconnected(message.clone()),
        }
    }
}

/// Listing the open documents failed as a whole.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("document enumeration failed: {0}")]
pub struct EnumerationError(#[from] pub HostError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_faults_are_classified() {
        assert!(HostError::unavailable("gone").is_connection_fault());
        assert!(HostError::Timeout { op: "documents.list", after: Duration::from_secs(1) }
            .is_connection_fault());
        assert!(HostError::Protocol("garbage".into()).is_connection_fault());
        assert!(!HostError::rejected("document.save", "read-only").is_connection_fault());
        assert!(!HostError::NoPath.is_connection_fault());
    }

    #[test]
    fn save_failure_from_host_error() {
        assert_eq!(SaveFailure::from(&HostError::NoPath), SaveFailure::NoPath);
        assert_eq!(
            SaveFailure::from(&HostError::Timeout { op: "document.save", after: Duration::ZERO }),
            SaveFailure::Timeout
        );
        assert_eq!(
            SaveFailure::from(&HostError::rejected("document.save", "locked")),
            SaveFailure::HostRejected("locked".into())
        );
        assert!(matches!(
            SaveFailure::from(&HostError::unavailable("closed")),
            SaveFailure::Disconnected(_)
        ));
    }

    #[test]
    fn error_messages() {
        assert_eq!(HostError::unavailable("no bridge").to_string(), "host unavailable: no bridge");
        assert_eq!(
            EnumerationError(HostError::Connection(ConnectionError::HandleInvalidated)).to_string(),
            "document enumeration failed: host handle invalidated"
        );
        assert_eq!(
            AdapterError::from(HostError::rejected("events.subscribe", "disabled")).to_string(),
            "event subscription failed: host rejected `events.subscribe`: disabled"
        );
    }
}
