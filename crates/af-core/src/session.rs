//! Session data model (spec §3, §4.3).

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::define_id;

define_id! {
    /// Opaque session identifier, e.g. `ses-xxxxxxxxxxxxxxxxxxx`.
    pub struct SessionId("ses-");
}

/// Session lifecycle state machine (spec §4.3):
/// `Creating -> Starting -> Active -> (Busy <-> Idle) -> Recycling|Terminating -> Terminated | Unhealthy | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Creating,
    Starting,
    Active,
    Busy,
    Idle,
    Recycling,
    Terminating,
    Terminated,
    Unhealthy,
    Error,
}

crate::simple_display! {
    SessionStatus {
        Creating => "creating",
        Starting => "starting",
        Active => "active",
        Busy => "busy",
        Idle => "idle",
        Recycling => "recycling",
        Terminating => "terminating",
        Terminated => "terminated",
        Unhealthy => "unhealthy",
        Error => "error",
    }
}

/// Rolling health-check bookkeeping for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    #[serde(rename = "healthChecksPerformed")]
    pub health_checks_performed: u32,
    #[serde(rename = "healthChecksFailed")]
    pub health_checks_failed: u32,
}

/// An isolated execution environment bound 1:1 to an agent (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    #[serde(rename = "hostUser")]
    pub host_user: String,
    pub status: SessionStatus,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "terminatedAt")]
    pub terminated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "assignedAgentId")]
    pub assigned_agent: Option<AgentId>,
    #[serde(default, rename = "jobsProcessed")]
    pub jobs_processed: u32,
    #[serde(rename = "lastActivity")]
    pub last_activity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lastHealthCheck")]
    pub last_health_check: Option<u64>,
    pub port: u16,
    /// Bumped on every recycle (spec §9 open question: "preserve the
    /// externally visible `sessionId` ... requires a `generation` counter").
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub metrics: SessionMetrics,
}

impl Session {
    pub fn new(host_user: impl Into<String>, port: u16, created_at: u64) -> Self {
        Self {
            id: SessionId::new(),
            host_user: host_user.into(),
            status: SessionStatus::Creating,
            created_at,
            terminated_at: None,
            assigned_agent: None,
            jobs_processed: 0,
            last_activity: created_at,
            last_health_check: None,
            port,
            generation: 0,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        // "at most one agent bound at any instant" is enforced structurally:
        // `assigned_agent` is a single `Option`, never a collection.
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
