//! AgentTransport contract (spec §4.6).

use af_core::{Agent, Job, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Remote agent liveness, as reported by `GET {agentUrl}/status` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Sends jobs, cancellations, and status queries to a remote agent endpoint
/// (spec §4.6). Implementations own their own retry/circuit-breaker policy;
/// `send`'s contract requires at most 3 attempts with exponential backoff on
/// network errors or 5xx, with 4xx terminal.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// POST-shaped request carrying the full job. Succeeds iff the remote
    /// acknowledges acceptance within the configured send timeout.
    async fn send(&self, agent: &Agent, job: &Job) -> Result<(), TransportError>;

    /// Best-effort, no retry.
    async fn cancel(&self, agent: &Agent, job_id: &JobId);

    /// Polled by HealthMonitor when heartbeats are stale. A transport error
    /// maps to `Error`, never `Offline` (staleness is what implies Offline).
    async fn status(&self, agent: &Agent) -> Result<AgentStatusReport, TransportError>;
}
