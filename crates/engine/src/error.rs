// Error types for collaborator calls and user-initiated session operations.

use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a persistence or transport collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("edit channel closed")]
    ChannelClosed,
}

impl BackendError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    pub fn document_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "document", id }
    }

    pub fn version_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "version", id }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Why the write guard refused a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDenial {
    ReadOnly,
    Locked,
}

impl std::fmt::Display for GuardDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "user cannot write this document"),
            Self::Locked => write!(f, "document is locked"),
        }
    }
}

/// Errors surfaced by user-initiated session operations (explicit save,
/// manual snapshot, version browse and restore).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no document is open")]
    NoDocumentOpen,

    #[error("save blocked: {0}")]
    WriteBlocked(GuardDenial),

    #[error("invalid page request: {0}")]
    InvalidPage(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("session runtime has stopped")]
    RuntimeStopped,
}
