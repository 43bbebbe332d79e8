//! Shared error vocabulary surfaced across the orchestration subsystem.

use uuid::Uuid;

/// Error category, stable across the whole stack so `af-daemon` can map it to
/// an HTTP status without re-deriving it from the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    NoCapacity,
    TransportFailed,
    AgentUnavailable,
    Internal,
}

crate::simple_display! {
    ErrorKind {
        NotFound => "NOT_FOUND",
        InvalidInput => "INVALID_INPUT",
        NoCapacity => "NO_CAPACITY",
        TransportFailed => "TRANSPORT_FAILED",
        AgentUnavailable => "AGENT_UNAVAILABLE",
        Internal => "INTERNAL",
    }
}

/// A domain-level failure. Every fallible operation in `af-stores`, `af-engine`,
/// and `af-transport` returns `Result<T, DomainError>` (or wraps a crate-local
/// error that converts into this one at the boundary).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DomainError {
    pub kind: ErrorKind,
    pub message: String,
    /// Set only for `Internal` errors so logs and the 500 response can be
    /// correlated.
    pub correlation_id: Option<Uuid>,
}

impl DomainError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let correlation_id = matches!(kind, ErrorKind::Internal).then(Uuid::new_v4);
        Self { kind, message: message.into(), correlation_id }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn no_capacity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoCapacity, message)
    }

    pub fn transport_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportFailed, message)
    }

    pub fn agent_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AgentUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
