//! Transport-level errors (spec §4.6).

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("network error contacting agent: {0}")]
    Network(String),
    #[error("agent endpoint timed out")]
    Timeout,
    #[error("agent rejected the request (4xx): {0}")]
    Rejected(u16),
    #[error("agent endpoint returned a server error (5xx): {0}")]
    ServerError(u16),
    #[error("circuit open for this agent, cooling down")]
    CircuitOpen,
}

impl TransportError {
    /// Whether this failure should count toward the circuit breaker and is
    /// eligible for retry (network errors and 5xx; not 4xx, which is
    /// terminal per spec §4.6).
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Timeout | TransportError::ServerError(_))
    }

    /// Whether the Scheduler should mark the agent `Error` and release it
    /// (spec §4.5 step 3: "if HTTP-level 5xx or timeout").
    pub fn is_agent_fault(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::ServerError(_))
    }
}
