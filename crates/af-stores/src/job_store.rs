//! JobStore: registry of all jobs by id, state transitions, status queries
//! (spec §4.1).

use std::collections::HashMap;

use af_core::{AgentId, DomainError, Job, JobId, JobStatus};
use parking_lot::Mutex;

/// Extra fields a particular transition needs. Only the fields relevant to
/// the target status are consulted; the others are ignored.
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    pub assigned_agent: Option<AgentId>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TransitionOptions {
    pub fn assign(agent: AgentId) -> Self {
        Self { assigned_agent: Some(agent), ..Default::default() }
    }

    pub fn success(result: impl Into<String>) -> Self {
        Self { result: Some(result.into()), ..Default::default() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Default::default() }
    }
}

/// Result of a successful transition: the post-transition job snapshot, and
/// the agent id the caller must release (if the job just became terminal or
/// was cancelled while in flight). JobStore never calls into AgentPool
/// itself — the release is "wired by the Scheduler" per spec §4.1.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub job: Job,
    pub released_agent: Option<AgentId>,
    /// Set only when a dispatched-but-undelivered job rolled back from
    /// `Assigned` to `Queued` (spec §4.5 step 3): the caller must
    /// `AgentPool::unreserve` this agent, not `release` it — no job actually
    /// ran, so no metrics should be recorded.
    pub unreserve_agent: Option<AgentId>,
    /// Set when the transition was `Retry` and the job landed back on
    /// `Queued` with a decayed priority — the caller must re-push it onto
    /// the PriorityQueue.
    pub requeue: bool,
}

/// Retention policy for [`JobStore::prune`] (spec §4.8 cleanup sweep).
#[derive(Debug, Clone, Copy)]
pub struct PrunePolicy {
    pub max_history: usize,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self { max_history: 1000 }
    }
}

fn is_legal(current: JobStatus, target: JobStatus) -> bool {
    use JobStatus::*;
    if target == Cancelled {
        return !current.is_terminal();
    }
    matches!(
        (current, target),
        (Pending, Queued)
            | (Queued, Assigned)
            | (Assigned, Queued) // dispatch (transport send) failed, spec §4.5 step 3
            | (Assigned, Running)
            | (Running, Success)
            | (Running, Failed)
            | (Running, Timeout)
            | (Failed, Retry)
    )
}

/// Registry of all jobs, serialized under a single lock (spec §4.1, §5).
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self { jobs: Mutex::new(HashMap::new()) }
    }

    pub fn put(&self, job: Job) {
        self.jobs.lock().insert(job.id, job);
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.lock().get(id).cloned()
    }

    pub fn by_status(&self, status: JobStatus) -> Vec<Job> {
        self.jobs.lock().values().filter(|j| j.status == status).cloned().collect()
    }

    /// All jobs, most recently created first — the ordering `listJobs` (spec
    /// §4.9) requires.
    pub fn list_all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.lock().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn transition(
        &self,
        id: &JobId,
        target: JobStatus,
        now_ms: u64,
        opts: TransitionOptions,
    ) -> Result<TransitionOutcome, DomainError> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get(id).ok_or_else(|| DomainError::not_found(format!("job {id} not found")))?;

        if !is_legal(job.status, target) {
            return Err(DomainError::invalid_input(format!(
                "illegal transition {} -> {} for job {id}",
                job.status, target
            )));
        }

        let mut next = job.clone();
        let mut released_agent = None;
        let mut unreserve_agent = None;
        let mut requeue = false;

        match target {
            JobStatus::Queued => {
                // Covers both the fresh Pending -> Queued enqueue and the
                // Assigned -> Queued rollback after a failed dispatch (spec
                // §4.5 step 3), which must clear the stale assignment.
                next.status = JobStatus::Queued;
                next.queued_at = Some(now_ms);
                if job.status == JobStatus::Assigned {
                    unreserve_agent = next.assigned_agent.take();
                    next.assigned_at = None;
                }
            }
            JobStatus::Assigned => {
                let agent = opts
                    .assigned_agent
                    .ok_or_else(|| DomainError::internal("Assigned transition requires assigned_agent"))?;
                next.status = JobStatus::Assigned;
                next.assigned_agent = Some(agent);
                next.assigned_at = Some(now_ms);
            }
            JobStatus::Running => {
                next.status = JobStatus::Running;
                next.started_at = Some(now_ms);
            }
            JobStatus::Success | JobStatus::Failed | JobStatus::Timeout => {
                next.status = target;
                next.completed_at = Some(now_ms);
                next.result = opts.result.or(next.result);
                next.error = opts.error.or(next.error);
                if next.result.is_none() && next.error.is_none() {
                    next.error = Some(format!("job ended {target} with no detail"));
                }
                released_agent = next.assigned_agent.take();
            }
            JobStatus::Cancelled => {
                next.status = JobStatus::Cancelled;
                next.completed_at = Some(now_ms);
                next.error = Some("cancelled".to_string());
                released_agent = next.assigned_agent.take();
            }
            JobStatus::Retry => {
                if next.retry_count >= next.max_retries {
                    return Err(DomainError::invalid_input(format!(
                        "job {id} has exhausted max_retries ({})",
                        next.max_retries
                    )));
                }
                next.retry_count += 1;
                next.priority = next.priority.decay();
                next.started_at = None;
                next.assigned_at = None;
                next.assigned_agent = None;
                next.error = None;
                next.status = JobStatus::Queued;
                next.queued_at = Some(now_ms);
                requeue = true;
            }
            JobStatus::Pending => unreachable!("Pending is never a transition target"),
        }

        next.check_invariants().map_err(DomainError::internal)?;
        let outcome = TransitionOutcome { job: next.clone(), released_agent, unreserve_agent, requeue };
        jobs.insert(*id, next);
        Ok(outcome)
    }

    /// Retain at most `policy.max_history` terminal jobs, newest first by
    /// `completed_at`; drop the rest (spec §4.8 cleanup sweep).
    pub fn prune(&self, policy: PrunePolicy) -> usize {
        let mut jobs = self.jobs.lock();
        let mut terminal: Vec<(JobId, u64)> = jobs
            .values()
            .filter(|j| j.is_terminal())
            .map(|j| (j.id, j.completed_at.unwrap_or(0)))
            .collect();
        terminal.sort_by(|a, b| b.1.cmp(&a.1));
        let to_drop: Vec<JobId> = terminal.into_iter().skip(policy.max_history).map(|(id, _)| id).collect();
        let dropped = to_drop.len();
        for id in to_drop {
            jobs.remove(&id);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "job_store_tests.rs"]
mod tests;
