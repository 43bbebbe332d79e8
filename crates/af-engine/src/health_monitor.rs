//! HealthMonitor: three independently-ticking sweeps — agent/session health,
//! job timeout, and cleanup — each isolated so one sweep's failure never
//! affects another (spec §4.8).

use std::sync::Arc;
use std::time::Duration;

use af_core::{Clock, JobId, JobStatus};
use af_stores::{AgentPool, JobStore, PrunePolicy, SessionManager, SessionProvisioner, TransitionOptions};
use af_transport::AgentTransport;
use tracing::{error, info, warn};

/// Cadences and thresholds for the three sweeps (spec §4.8, §6 config keys).
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitorConfig {
    pub agent_sweep_interval: Duration,
    pub job_sweep_interval: Duration,
    pub cleanup_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub session_max_jobs: u32,
    pub job_timeout: Duration,
    pub prune: PrunePolicy,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            agent_sweep_interval: Duration::from_secs(120),
            job_sweep_interval: Duration::from_secs(120),
            cleanup_interval: Duration::from_secs(4 * 3600),
            heartbeat_timeout: Duration::from_secs(5 * 60),
            inactivity_timeout: Duration::from_secs(2 * 3600),
            session_max_jobs: 50,
            job_timeout: Duration::from_secs(30 * 60),
            prune: PrunePolicy::default(),
        }
    }
}

/// Holds handles to every store the sweeps touch. Does not own a Scheduler
/// reference: a timed-out or offline-orphaned job is transitioned directly
/// via `JobStore`/`AgentPool`, matching spec §4.8's "fail the job... attempt
/// to re-assign on next tick" (the next `Scheduler` drain picks it back up
/// once it's `Queued` again — see `sweep_agent_health`'s re-enqueue).
pub struct HealthMonitor<C: Clock> {
    jobs: Arc<JobStore>,
    agents: Arc<AgentPool<C>>,
    sessions: Arc<SessionManager<C>>,
    queue: Arc<af_stores::PriorityQueue>,
    transport: Arc<dyn AgentTransport>,
    provisioner: Arc<dyn SessionProvisioner>,
    clock: C,
    config: HealthMonitorConfig,
}

impl<C: Clock> HealthMonitor<C> {
    pub fn new(
        jobs: Arc<JobStore>,
        agents: Arc<AgentPool<C>>,
        sessions: Arc<SessionManager<C>>,
        queue: Arc<af_stores::PriorityQueue>,
        transport: Arc<dyn AgentTransport>,
        provisioner: Arc<dyn SessionProvisioner>,
        clock: C,
        config: HealthMonitorConfig,
    ) -> Self {
        Self { jobs, agents, sessions, queue, transport, provisioner, clock, config }
    }

    /// Spawn the three sweep loops, returning their `JoinHandle`s so the
    /// `Orchestrator` can abort them on shutdown (spec §5 "drain in-flight
    /// ticks, then terminate").
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let agent_sweep = {
            let this = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(this.config.agent_sweep_interval);
                loop {
                    interval.tick().await;
                    this.sweep_agent_and_session_health().await;
                }
            })
        };
        let job_sweep = {
            let this = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(this.config.job_sweep_interval);
                loop {
                    interval.tick().await;
                    this.sweep_job_health().await;
                }
            })
        };
        let cleanup_sweep = {
            let this = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(this.config.cleanup_interval);
                loop {
                    interval.tick().await;
                    this.sweep_cleanup().await;
                }
            })
        };
        vec![agent_sweep, job_sweep, cleanup_sweep]
    }

    /// Agent heartbeat staleness + session inactivity/overuse (spec §4.8
    /// first two bullets). Kept on one cadence since both key off the same
    /// agent/session pair. `pub` so tests can drive a sweep deterministically
    /// without waiting on the real interval in [`HealthMonitor::spawn`].
    pub async fn sweep_agent_and_session_health(&self) {
        let now = self.clock.epoch_ms();
        let heartbeat_timeout_ms = self.config.heartbeat_timeout.as_millis() as u64;

        for agent in self.agents.snapshot_all() {
            if agent.status == af_core::AgentStatus::Offline {
                continue;
            }
            let stale = match agent.last_heartbeat {
                Some(last) => now.saturating_sub(last) > heartbeat_timeout_ms,
                None => now.saturating_sub(agent.created_at) > heartbeat_timeout_ms,
            };
            if !stale {
                continue;
            }
            // Confirm via transport before declaring the failure mode (spec
            // §4.6): a transport-confirmed error means `Error`, plain
            // staleness with no confirmed failure means `Offline`.
            match self.transport.status(&agent).await {
                Ok(_report) => {
                    let Some(job_id) = self.agents.mark_offline(&agent.id, "heartbeat stale") else { continue };
                    self.fail_offline_agents_job(job_id).await;
                }
                Err(err) => {
                    warn!(agent_id = %agent.id, error = %err, "transport confirmed agent failure");
                    self.agents.mark_error(&agent.id, &format!("transport confirmed failure: {err}"));
                    if let Some(job_id) = agent.current_job_id {
                        self.fail_offline_agents_job(job_id).await;
                    }
                }
            }
        }

        let inactivity_ms = self.config.inactivity_timeout.as_millis() as u64;
        for session in self.sessions.snapshot_all() {
            if session.status == af_core::SessionStatus::Terminated {
                continue;
            }
            let idle_too_long = now.saturating_sub(session.last_activity) > inactivity_ms;
            let overused = session.jobs_processed >= self.config.session_max_jobs;
            if !(idle_too_long || overused) {
                continue;
            }
            let Some(agent_id) = session.assigned_agent else { continue };
            info!(session_id = %session.id, %agent_id, idle_too_long, overused, "session due for recycle");
            if let Err(err) = self.sessions.recycle(&session.id, self.provisioner.as_ref()).await {
                warn!(session_id = %session.id, error = %err, "session recycle failed");
                self.agents.fail_recycle(&agent_id, &err.to_string());
            }
        }
    }

    async fn fail_offline_agents_job(&self, job_id: JobId) {
        let now = self.clock.epoch_ms();
        match self.jobs.transition(
            &job_id,
            JobStatus::Failed,
            now,
            TransitionOptions::failed("agent went offline"),
        ) {
            Ok(outcome) => {
                // Agent is already Offline or Error (set by the caller);
                // nothing left to release there. Requeue the job if it
                // still has retry budget, letting the next Scheduler tick
                // re-assign it.
                match self.jobs.transition(&job_id, JobStatus::Retry, now, TransitionOptions::default()) {
                    Ok(retry) if retry.requeue => self.queue.push(job_id, retry.job.priority),
                    _ => {}
                }
                let _ = outcome;
            }
            Err(err) => error!(%job_id, error = %err, "failed to fail a job after its agent went offline"),
        }
    }

    /// Running jobs that have overrun `jobTimeout` (spec §4.8 third bullet).
    pub async fn sweep_job_health(&self) {
        let now = self.clock.epoch_ms();
        let timeout_ms = self.config.job_timeout.as_millis() as u64;
        for job in self.jobs.by_status(JobStatus::Running) {
            let Some(started) = job.started_at else { continue };
            if now.saturating_sub(started) <= timeout_ms {
                continue;
            }
            let outcome = match self.jobs.transition(&job.id, JobStatus::Timeout, now, TransitionOptions::default()) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(job_id = %job.id, error = %err, "failed to time out a running job");
                    continue;
                }
            };
            if let Some(agent_id) = outcome.released_agent {
                if let Ok(release) = self.agents.release(&agent_id, false, now.saturating_sub(started)) {
                    let _ = self.sessions.release(&release.session_id);
                }
                if let Some(agent) = self.agents.get(&agent_id) {
                    self.transport.cancel(&agent, &job.id).await;
                }
            }
        }
    }

    /// Terminal-job retention plus orphaned-session teardown (spec §4.8
    /// fourth bullet).
    pub async fn sweep_cleanup(&self) {
        let dropped = self.jobs.prune(self.config.prune);
        if dropped > 0 {
            info!(dropped, "pruned terminal jobs past history retention");
        }

        let held_sessions: std::collections::HashSet<_> =
            self.agents.snapshot_all().into_iter().map(|a| a.session_id).collect();
        for session in self.sessions.snapshot_all() {
            if session.status == af_core::SessionStatus::Terminated {
                continue;
            }
            if held_sessions.contains(&session.id) {
                continue;
            }
            info!(session_id = %session.id, "terminating orphaned session held by no agent");
            if let Err(err) = self.sessions.terminate(&session.id, self.provisioner.as_ref()).await {
                warn!(session_id = %session.id, error = %err, "orphan session terminate failed");
            }
        }
    }
}
