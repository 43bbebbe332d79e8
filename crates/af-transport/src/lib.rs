//! Outbound HTTP transport to agent endpoints (spec §4.6).
//!
//! [`AgentTransport`] is the abstract seam; [`HttpAgentTransport`] is the
//! reqwest-backed production implementation, guarded by a per-agent
//! [`CircuitBreaker`].

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod circuit_breaker;
pub mod error;
pub mod http;
pub mod transport;

pub use circuit_breaker::CircuitBreaker;
pub use error::TransportError;
pub use http::HttpAgentTransport;
pub use transport::{AgentStatusReport, AgentTransport};
