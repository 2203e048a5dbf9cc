//! Error types for exported functions and dispatch.

use thiserror::Error;

/// Errors related to exported host functions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// An export was registered with an empty name.
    #[error("Exported function name is empty")]
    EmptyName,

    /// An export used the dispatch sentinel as its name.
    #[error("Exported function name '{}' is reserved", crate::dispatch::SENTINEL)]
    ReservedName,

    /// An export name cannot be used as a shell function name.
    #[error("Invalid exported function name: {0:?}")]
    InvalidName(String),

    /// A dispatch named a function that was never exported.
    #[error("No exported function named '{0}'")]
    UnknownFunction(String),

    /// The sentinel was present but no function name followed it.
    #[error("Dispatch arguments carry the sentinel but no function name")]
    MalformedEnvelope,
}

impl HostError {
    /// Check if this error came from looking up a dispatched function.
    pub fn is_dispatch_error(&self) -> bool {
        matches!(self, HostError::UnknownFunction(_) | HostError::MalformedEnvelope)
    }
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;
