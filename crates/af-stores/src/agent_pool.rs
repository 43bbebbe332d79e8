//! AgentPool: registry of agents, capability filter, placement, heartbeat
//! tracking, lifecycle (spec §4.2).

use std::collections::HashMap;

use af_core::{Agent, AgentId, AgentSnapshot, AgentStatus, Clock, DomainError, JobId};
use parking_lot::Mutex;

pub const DEFAULT_RECYCLE_THRESHOLD: u32 = 50;

/// Outcome of [`AgentPool::release`]: whether the caller should schedule a
/// deferred recycle and which session to ask `SessionManager` to release.
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub needs_recycle: bool,
    pub session_id: af_core::SessionId,
}

/// Registry of agents, serialized under a single lock (spec §4.2, §5). Reads
/// return owned clones ("snapshots") so scheduler decisions never interleave
/// with lifecycle transitions.
pub struct AgentPool<C: Clock> {
    agents: Mutex<HashMap<AgentId, Agent>>,
    clock: C,
    recycle_threshold: u32,
}

impl<C: Clock> AgentPool<C> {
    pub fn new(clock: C) -> Self {
        Self { agents: Mutex::new(HashMap::new()), clock, recycle_threshold: DEFAULT_RECYCLE_THRESHOLD }
    }

    pub fn with_recycle_threshold(mut self, threshold: u32) -> Self {
        self.recycle_threshold = threshold;
        self
    }

    pub fn register(&self, agent: Agent) {
        self.agents.lock().insert(agent.id, agent);
    }

    pub fn get(&self, id: &AgentId) -> Option<AgentSnapshot> {
        self.agents.lock().get(id).cloned()
    }

    pub fn snapshot_idle(&self) -> Vec<AgentSnapshot> {
        self.agents.lock().values().filter(|a| a.status == AgentStatus::Idle).cloned().collect()
    }

    pub fn snapshot_all(&self) -> Vec<AgentSnapshot> {
        self.agents.lock().values().cloned().collect()
    }

    pub fn unregister(&self, id: &AgentId) -> bool {
        self.agents.lock().remove(id).is_some()
    }

    /// Select the best-fit idle agent for `job` (spec §4.2 `pick`). Does not
    /// mutate any state; the caller commits the reservation separately via
    /// [`AgentPool::reserve`] once the job's own transition succeeds, per the
    /// lock-snapshot-release-I/O-relock discipline of spec §5.
    pub fn pick(&self, application_target: &str) -> Option<AgentId> {
        let agents = self.agents.lock();
        let mut candidates: Vec<&Agent> = agents
            .values()
            .filter(|a| a.status == AgentStatus::Idle)
            .filter(|a| a.capability.fits(application_target))
            .filter(|a| active_jobs(a) < a.capability.max_concurrent_jobs)
            .collect();

        candidates.sort_by(|a, b| {
            b.metrics
                .success_rate()
                .total_cmp(&a.metrics.success_rate())
                .then_with(|| a.jobs_executed.cmp(&b.jobs_executed))
                .then_with(|| a.metrics.average_duration_ms.total_cmp(&b.metrics.average_duration_ms))
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });

        candidates.first().map(|a| a.id)
    }

    /// Commit a placement decision: the agent must still be `Idle` (spec §5's
    /// "commit that finds the world has changed ... retries or abandons").
    pub fn reserve(&self, id: &AgentId, job_id: JobId) -> Result<(), DomainError> {
        let mut agents = self.agents.lock();
        let agent = agents.get_mut(id).ok_or_else(|| DomainError::not_found(format!("agent {id}")))?;
        if agent.status != AgentStatus::Idle {
            return Err(DomainError::no_capacity(format!("agent {id} is no longer idle")));
        }
        agent.status = AgentStatus::Busy;
        agent.current_job_id = Some(job_id);
        Ok(())
    }

    /// Roll back a reservation that could not be dispatched (spec §4.5 step
    /// 3: transport send failed, job goes back to `Queued`).
    pub fn unreserve(&self, id: &AgentId) {
        let mut agents = self.agents.lock();
        if let Some(agent) = agents.get_mut(id) {
            agent.status = AgentStatus::Idle;
            agent.current_job_id = None;
        }
    }

    /// Release an agent after a terminal job transition (spec §4.2
    /// `release`). `succeeded` and `duration_ms` feed the ranking metrics.
    pub fn release(&self, id: &AgentId, succeeded: bool, duration_ms: u64) -> Result<ReleaseOutcome, DomainError> {
        let mut agents = self.agents.lock();
        let agent = agents.get_mut(id).ok_or_else(|| DomainError::not_found(format!("agent {id}")))?;
        let now = self.clock.epoch_ms();
        agent.jobs_executed += 1;
        agent.metrics.record(succeeded, duration_ms, now);
        agent.current_job_id = None;
        agent.status = AgentStatus::Idle;
        agent.last_heartbeat = Some(now);
        let needs_recycle = agent.jobs_executed >= self.recycle_threshold;
        Ok(ReleaseOutcome { needs_recycle, session_id: agent.session_id })
    }

    /// Heartbeat never interrupts a job: an `Offline` agent recovers to
    /// `Idle`, a `Busy` agent just gets a fresher timestamp (spec §4.2).
    pub fn touch(&self, id: &AgentId) -> bool {
        let mut agents = self.agents.lock();
        let Some(agent) = agents.get_mut(id) else { return false };
        agent.last_heartbeat = Some(self.clock.epoch_ms());
        if agent.status == AgentStatus::Offline {
            agent.status = AgentStatus::Idle;
        }
        true
    }

    /// Mark an agent offline due to heartbeat staleness. Returns the job it
    /// was running, if any, so the caller can fail it (spec §4.8). Clears
    /// `current_job_id` since `health_monitor`'s offline sweep deliberately
    /// bypasses `release()` when failing that job.
    pub fn mark_offline(&self, id: &AgentId, reason: &str) -> Option<JobId> {
        let mut agents = self.agents.lock();
        let agent = agents.get_mut(id)?;
        if agent.status == AgentStatus::Offline {
            return None;
        }
        let current_job = agent.current_job_id.take();
        agent.status = AgentStatus::Offline;
        agent.last_error = Some(reason.to_string());
        current_job
    }

    /// Mark an agent as errored (transport 5xx/timeout at send time, or a
    /// failed recycle).
    pub fn mark_error(&self, id: &AgentId, reason: &str) {
        let mut agents = self.agents.lock();
        if let Some(agent) = agents.get_mut(id) {
            agent.status = AgentStatus::Error;
            agent.last_error = Some(reason.to_string());
            agent.current_job_id = None;
        }
    }

    pub fn begin_recycle(&self, id: &AgentId) {
        let mut agents = self.agents.lock();
        if let Some(agent) = agents.get_mut(id) {
            agent.status = AgentStatus::Recycling;
        }
    }

    pub fn complete_recycle(&self, id: &AgentId) {
        let mut agents = self.agents.lock();
        if let Some(agent) = agents.get_mut(id) {
            agent.status = AgentStatus::Idle;
            agent.jobs_executed = 0;
            agent.last_error = None;
            agent.metrics = af_core::AgentMetrics::default();
        }
    }

    pub fn fail_recycle(&self, id: &AgentId, cause: &str) {
        let mut agents = self.agents.lock();
        if let Some(agent) = agents.get_mut(id) {
            agent.status = AgentStatus::Error;
            agent.last_error = Some(cause.to_string());
        }
    }

    pub fn recycle_threshold(&self) -> u32 {
        self.recycle_threshold
    }
}

fn active_jobs(agent: &Agent) -> u32 {
    if agent.current_job_id.is_some() {
        1
    } else {
        0
    }
}

#[cfg(test)]
#[path = "agent_pool_tests.rs"]
mod tests;
