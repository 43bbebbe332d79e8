//! Scheduler: drains the queue onto idle agents, dispatches, handles retries
//! and requeue (spec §4.5).

use std::sync::Arc;

use af_core::{AgentId, Clock, DomainError, JobId, JobStatus};
use af_stores::{AgentPool, JobStore, PriorityQueue, SessionManager, TransitionOptions};
use af_transport::AgentTransport;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Everything the Scheduler needs a handle to, shared with `HealthMonitor`
/// and `IngressAPI` via the `Orchestrator` (spec §4.5, §5).
pub struct Scheduler<C: Clock> {
    pub(crate) jobs: Arc<JobStore>,
    pub(crate) queue: Arc<PriorityQueue>,
    pub(crate) agents: Arc<AgentPool<C>>,
    pub(crate) sessions: Arc<SessionManager<C>>,
    pub(crate) transport: Arc<dyn AgentTransport>,
    pub(crate) clock: C,
    wake: Notify,
}

/// Outcome of one dispatch attempt, used by [`Scheduler::drain`] to decide
/// whether dispatch capacity is exhausted for this tick.
enum DispatchOutcome {
    QueueEmpty,
    Dispatched,
    NoCapacity,
    Skipped,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        jobs: Arc<JobStore>,
        queue: Arc<PriorityQueue>,
        agents: Arc<AgentPool<C>>,
        sessions: Arc<SessionManager<C>>,
        transport: Arc<dyn AgentTransport>,
        clock: C,
    ) -> Self {
        Self { jobs, queue, agents, sessions, transport, clock, wake: Notify::new() }
    }

    /// Enqueue a freshly created `Pending` job: `Queued` transition, push to
    /// the priority queue, wake the drain loop (spec §4.5's "event-driven
    /// wake on enqueue").
    pub fn enqueue(&self, job_id: JobId) -> Result<(), DomainError> {
        let now = self.clock.epoch_ms();
        self.jobs.transition(&job_id, JobStatus::Queued, now, TransitionOptions::default())?;
        let job = self.jobs.get(&job_id).ok_or_else(|| DomainError::internal("job vanished after transition"))?;
        self.queue.push(job_id, job.priority);
        self.wake.notify_one();
        Ok(())
    }

    /// Run the long-lived tick loop: a `tokio::time::interval` plus the
    /// `enqueue` wake channel (spec §4.5). Returns only when `shutdown`
    /// resolves.
    pub async fn run(self: Arc<Self>, tick: std::time::Duration, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = interval.tick() => self.drain().await,
                _ = self.wake.notified() => self.drain().await,
                _ = &mut shutdown => {
                    info!("scheduler stopping");
                    return;
                }
            }
        }
    }

    /// Drain the queue while idle agents remain (spec §4.5 steps 1-3).
    pub async fn drain(&self) {
        let mut idle_capacity = self.agents.snapshot_idle().len();
        if idle_capacity == 0 {
            return;
        }
        let mut attempts = self.queue.size();
        while idle_capacity > 0 && attempts > 0 {
            attempts -= 1;
            match self.dispatch_one().await {
                DispatchOutcome::QueueEmpty => break,
                DispatchOutcome::Dispatched => idle_capacity -= 1,
                DispatchOutcome::NoCapacity | DispatchOutcome::Skipped => continue,
            }
        }
    }

    async fn dispatch_one(&self) -> DispatchOutcome {
        // Step 1-2: take the lock, snapshot a placement decision, release.
        let Some((job_id, priority, sequence)) = self.queue.pop() else {
            return DispatchOutcome::QueueEmpty;
        };

        let Some(job) = self.jobs.get(&job_id) else {
            // Pruned or otherwise vanished between enqueue and pop.
            return DispatchOutcome::Skipped;
        };
        if job.status != JobStatus::Queued {
            // Cancelled (or otherwise moved on) while waiting.
            return DispatchOutcome::Skipped;
        }

        let Some(agent_id) = self.agents.pick(&job.application) else {
            self.queue.push_with_sequence(job_id, priority, sequence);
            return DispatchOutcome::NoCapacity;
        };

        // Step 5-6: re-take the lock, commit. `reserve` re-validates Idle.
        if self.agents.reserve(&agent_id, job_id).is_err() {
            self.queue.push_with_sequence(job_id, priority, sequence);
            return DispatchOutcome::Skipped;
        }

        let now = self.clock.epoch_ms();
        let assigned = match self.jobs.transition(&job_id, JobStatus::Assigned, now, TransitionOptions::assign(agent_id)) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(%job_id, error = %err, "failed to mark job Assigned after reservation");
                self.agents.unreserve(&agent_id);
                self.queue.push_with_sequence(job_id, priority, sequence);
                return DispatchOutcome::Skipped;
            }
        };

        let Some(agent) = self.agents.get(&agent_id) else {
            self.queue.push_with_sequence(job_id, priority, sequence);
            return DispatchOutcome::Skipped;
        };

        // Step 4: perform I/O with no lock held.
        match self.transport.send(&agent, &assigned.job).await {
            Ok(()) => {
                let _ = self.jobs.transition(&job_id, JobStatus::Running, self.clock.epoch_ms(), TransitionOptions::default());
                DispatchOutcome::Dispatched
            }
            Err(err) => {
                let is_agent_fault = err.is_agent_fault();
                let rollback =
                    self.jobs.transition(&job_id, JobStatus::Queued, self.clock.epoch_ms(), TransitionOptions::default());
                match rollback {
                    Ok(outcome) => {
                        if let Some(agent_id) = outcome.unreserve_agent {
                            self.agents.unreserve(&agent_id);
                        }
                    }
                    Err(rollback_err) => {
                        error!(%job_id, error = %rollback_err, "failed to roll back job after dispatch failure")
                    }
                }
                self.queue.push_with_sequence(job_id, priority, sequence);
                if is_agent_fault {
                    self.agents.mark_error(&agent_id, "transport send failed (5xx/timeout)");
                    warn!(%agent_id, %err, "agent marked Error after a failed dispatch");
                }
                DispatchOutcome::Skipped
            }
        }
    }

    /// Inbound status callback from an agent (spec §4.5). Applies the
    /// terminal transition, releases the agent, and schedules a retry if
    /// the job failed and has budget left.
    pub fn report_terminal(
        &self,
        job_id: JobId,
        status: JobStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> Result<(), DomainError> {
        let now = self.clock.epoch_ms();
        let opts = match (&result, &error) {
            (Some(r), _) => TransitionOptions::success(r.clone()),
            (None, Some(e)) => TransitionOptions::failed(e.clone()),
            (None, None) => TransitionOptions::default(),
        };
        let outcome = self.jobs.transition(&job_id, status, now, opts)?;
        if let Some(agent_id) = outcome.released_agent {
            self.release_agent(&agent_id, status == JobStatus::Success, &outcome.job);
        }

        if status == JobStatus::Failed {
            self.maybe_retry(job_id)?;
        }
        Ok(())
    }

    fn release_agent(&self, agent_id: &AgentId, succeeded: bool, job: &af_core::Job) {
        let duration_ms = match (job.started_at, job.completed_at) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        };
        match self.agents.release(agent_id, succeeded, duration_ms) {
            Ok(outcome) => {
                let _ = self.sessions.release(&outcome.session_id);
                if outcome.needs_recycle {
                    self.agents.begin_recycle(agent_id);
                    info!(%agent_id, session_id = %outcome.session_id, "deferred recycle triggered at jobsExecuted threshold");
                }
            }
            Err(err) => error!(%agent_id, error = %err, "failed to release agent"),
        }
    }

    /// `Failed -> Retry -> Queued`, decaying priority by one level, iff
    /// `retryCount < maxRetries` (spec §4.1, §4.4, §4.5).
    fn maybe_retry(&self, job_id: JobId) -> Result<(), DomainError> {
        let now = self.clock.epoch_ms();
        match self.jobs.transition(&job_id, JobStatus::Retry, now, TransitionOptions::default()) {
            Ok(outcome) => {
                if outcome.requeue {
                    self.queue.push(job_id, outcome.job.priority);
                }
                Ok(())
            }
            // Retries exhausted: the job is already terminally `Failed`
            // from the transition in `report_terminal`; nothing further.
            Err(_) => Ok(()),
        }
    }

    /// `cancelJob` (spec §4.5, §4.9): synchronous in effect. Returns the
    /// agent and job id the caller should best-effort notify via
    /// `AgentTransport::cancel` if the job was in flight.
    pub fn cancel(&self, job_id: JobId) -> Result<Option<(af_core::Agent, JobId)>, DomainError> {
        let now = self.clock.epoch_ms();
        let outcome = self.jobs.transition(&job_id, JobStatus::Cancelled, now, TransitionOptions::default())?;
        if let Some(agent_id) = outcome.released_agent {
            self.release_agent(&agent_id, false, &outcome.job);
            if let Some(agent) = self.agents.get(&agent_id) {
                return Ok(Some((agent, job_id)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
