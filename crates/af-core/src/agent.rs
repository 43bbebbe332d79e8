//! Agent data model (spec §3, §4.2).

use serde::{Deserialize, Serialize};

use crate::define_id;
use crate::job::JobId;
use crate::session::SessionId;

define_id! {
    /// Opaque agent identifier, e.g. `agt-xxxxxxxxxxxxxxxxxxx`.
    pub struct AgentId("agt-");
}

/// Agent lifecycle state machine (spec §4.2):
/// `Starting -> Idle -> Busy -> Idle | Error | Offline | Recycling -> Idle | Terminating -> (removed)`.
/// `Offline` is re-enterable via heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Starting,
    Idle,
    Busy,
    Error,
    Offline,
    Recycling,
    Terminating,
}

crate::simple_display! {
    AgentStatus {
        Starting => "starting",
        Idle => "idle",
        Busy => "busy",
        Error => "error",
        Offline => "offline",
        Recycling => "recycling",
        Terminating => "terminating",
    }
}

/// What an agent declares it can run. An empty `supported_applications` list
/// means "accepts anything" (spec §4.2 placement step 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCapability {
    #[serde(default, rename = "supportedApplications")]
    pub supported_applications: Vec<String>,
    #[serde(default = "default_max_concurrent_jobs", rename = "maxConcurrentJobs")]
    pub max_concurrent_jobs: u32,
}

pub fn default_max_concurrent_jobs() -> u32 {
    1
}

impl AgentCapability {
    /// Case-insensitive substring match against the job's application target.
    pub fn fits(&self, application_target: &str) -> bool {
        if self.supported_applications.is_empty() {
            return true;
        }
        let target = application_target.to_lowercase();
        self.supported_applications.iter().any(|app| target.contains(&app.to_lowercase()))
    }
}

/// Rolling performance metrics used by the placement ranking (spec §4.2 step 4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    #[serde(rename = "totalCompleted")]
    pub total_completed: u32,
    #[serde(rename = "totalFailed")]
    pub total_failed: u32,
    #[serde(rename = "averageDurationMs")]
    pub average_duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lastCompletedAt")]
    pub last_completed_at: Option<u64>,
}

impl AgentMetrics {
    pub fn success_rate(&self) -> f64 {
        let total = self.total_completed + self.total_failed;
        if total == 0 {
            // Cold agents rank as perfectly reliable so they are eligible,
            // but `jobs_executed` (ascending) breaks the tie in their favor
            // only when warmed agents are equally "perfect".
            1.0
        } else {
            self.total_completed as f64 / total as f64
        }
    }

    /// Fold a single completed job's duration into the running average and
    /// bump the appropriate completed/failed counter.
    pub fn record(&mut self, succeeded: bool, duration_ms: u64, completed_at: u64) {
        if succeeded {
            self.total_completed += 1;
        } else {
            self.total_failed += 1;
        }
        let total = (self.total_completed + self.total_failed) as f64;
        self.average_duration_ms += (duration_ms as f64 - self.average_duration_ms) / total;
        self.last_completed_at = Some(completed_at);
    }
}

/// A worker process executing jobs against a desktop UI (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    #[serde(rename = "hostUser")]
    pub host_user: String,
    pub capability: AgentCapability,
    pub status: AgentStatus,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lastHeartbeat")]
    pub last_heartbeat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "currentJobId")]
    pub current_job_id: Option<JobId>,
    #[serde(default, rename = "jobsExecuted")]
    pub jobs_executed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lastError")]
    pub last_error: Option<String>,
    #[serde(rename = "endpointUrl")]
    pub endpoint_url: String,
    #[serde(default)]
    pub metrics: AgentMetrics,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        session_id: SessionId,
        host_user: impl Into<String>,
        capability: AgentCapability,
        endpoint_url: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            session_id,
            host_user: host_user.into(),
            capability,
            status: AgentStatus::Starting,
            created_at,
            last_heartbeat: None,
            current_job_id: None,
            jobs_executed: 0,
            last_error: None,
            endpoint_url: endpoint_url.into(),
            metrics: AgentMetrics::default(),
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        let busy_iff_current_job = self.current_job_id.is_some() == (self.status == AgentStatus::Busy);
        if !busy_iff_current_job {
            return Err("current_job_id set iff status == Busy".into());
        }
        Ok(())
    }
}

/// A point-in-time copy of an agent, returned by the pool's registry so
/// scheduler decisions never interleave with lifecycle mutation (spec
/// §4.2's "reads return snapshots").
pub type AgentSnapshot = Agent;

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
