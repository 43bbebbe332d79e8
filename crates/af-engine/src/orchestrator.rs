//! Orchestrator: owns the four stores, the transport, the provisioner, and
//! the long-running Scheduler/HealthMonitor tasks; exposes the IngressAPI
//! operations spec §4.9 names (spec §5's "small, fixed set of long-running
//! tasks... plus per-request handlers").

use std::sync::Arc;
use std::time::Duration;

use af_core::{
    Agent, AgentCapability, AgentId, Clock, DomainError, Job, JobId, JobStatus, Priority, Step, Template, TemplateId,
};
use af_stores::{AgentPool, JobStore, PrunePolicy, SessionManager, SessionProvisioner};
use af_transport::AgentTransport;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::health_monitor::{HealthMonitor, HealthMonitorConfig};
use crate::scheduler::Scheduler;
use crate::template_engine::TemplateEngine;

/// Flat config keys from spec §6, with the spec's stated defaults.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub rdp_base_port: u16,
    pub scheduler_tick: Duration,
    pub scheduler_send_timeout: Duration,
    pub agent_heartbeat_timeout: Duration,
    pub session_inactivity_timeout: Duration,
    pub session_max_jobs: u32,
    pub job_timeout: Duration,
    pub history_max_completed: usize,
    pub agent_recycle_after_jobs: u32,
    pub transport_circuit_failures: u32,
    pub transport_circuit_cooldown: Duration,
    pub default_agent_count: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rdp_base_port: 3390,
            scheduler_tick: Duration::from_secs(5),
            scheduler_send_timeout: Duration::from_secs(10),
            agent_heartbeat_timeout: Duration::from_secs(5 * 60),
            session_inactivity_timeout: Duration::from_secs(2 * 3600),
            session_max_jobs: 50,
            job_timeout: Duration::from_secs(30 * 60),
            history_max_completed: 1000,
            agent_recycle_after_jobs: 50,
            transport_circuit_failures: 5,
            transport_circuit_cooldown: Duration::from_secs(30),
            default_agent_count: 2,
        }
    }
}

/// `createJob` request body (spec §6 `POST /jobs`).
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub name: String,
    #[serde(rename = "applicationPath")]
    pub application: String,
    #[serde(default)]
    pub arguments: Option<Vec<String>>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, rename = "webhookUrl")]
    pub webhook_url: Option<String>,
}

/// `executeTemplate` request body (spec §6 `POST /templates/{id}/execute`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteTemplateOpts {
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, rename = "webhookUrl")]
    pub webhook_url: Option<String>,
}

/// `registerAgent` request body (spec §6 `POST /agents`).
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterAgentSpec {
    pub name: String,
    pub user: String,
    #[serde(default)]
    pub capabilities: Option<AgentCapability>,
}

/// `listJobs` query parameters (spec §4.9, §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct JobListFilter {
    pub status: Option<JobStatus>,
    pub skip: usize,
    pub take: usize,
}

const MAX_LIST_TAKE: usize = 100;

pub struct Orchestrator<C: Clock> {
    jobs: Arc<JobStore>,
    queue: Arc<af_stores::PriorityQueue>,
    agents: Arc<AgentPool<C>>,
    sessions: Arc<SessionManager<C>>,
    templates: Arc<TemplateEngine>,
    scheduler: Arc<Scheduler<C>>,
    health: Arc<HealthMonitor<C>>,
    transport: Arc<dyn AgentTransport>,
    provisioner: Arc<dyn SessionProvisioner>,
    clock: C,
    config: EngineConfig,
    shutdown: Arc<Notify>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    health_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(
        config: EngineConfig,
        clock: C,
        transport: Arc<dyn AgentTransport>,
        provisioner: Arc<dyn SessionProvisioner>,
    ) -> Arc<Self> {
        let jobs = Arc::new(JobStore::new());
        let queue = Arc::new(af_stores::PriorityQueue::new());
        let agents = Arc::new(AgentPool::new(clock.clone()).with_recycle_threshold(config.agent_recycle_after_jobs));
        let sessions = Arc::new(SessionManager::new(clock.clone(), config.rdp_base_port));
        let templates = Arc::new(TemplateEngine::new());

        let scheduler = Arc::new(Scheduler::new(
            jobs.clone(),
            queue.clone(),
            agents.clone(),
            sessions.clone(),
            transport.clone(),
            clock.clone(),
        ));

        let health_config = HealthMonitorConfig {
            agent_sweep_interval: Duration::from_secs(120),
            job_sweep_interval: Duration::from_secs(120),
            cleanup_interval: Duration::from_secs(4 * 3600),
            heartbeat_timeout: config.agent_heartbeat_timeout,
            inactivity_timeout: config.session_inactivity_timeout,
            session_max_jobs: config.session_max_jobs,
            job_timeout: config.job_timeout,
            prune: PrunePolicy { max_history: config.history_max_completed },
        };
        let health = Arc::new(HealthMonitor::new(
            jobs.clone(),
            agents.clone(),
            sessions.clone(),
            queue.clone(),
            transport.clone(),
            provisioner.clone(),
            clock.clone(),
            health_config,
        ));

        Arc::new(Self {
            jobs,
            queue,
            agents,
            sessions,
            templates,
            scheduler,
            health,
            transport,
            provisioner,
            clock,
            config,
            shutdown: Arc::new(Notify::new()),
            scheduler_task: Mutex::new(None),
            health_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Direct access for tests driving a deterministic sweep without waiting
    /// on [`HealthMonitor::spawn`]'s real-time intervals.
    pub fn health_monitor(&self) -> &HealthMonitor<C> {
        &self.health
    }

    pub fn agent_pool(&self) -> &AgentPool<C> {
        &self.agents
    }

    /// Direct access for tests that want to drive a dispatch pass
    /// deterministically instead of waiting on [`Orchestrator::start`]'s
    /// background tick loop.
    pub fn scheduler(&self) -> &Scheduler<C> {
        &self.scheduler
    }

    /// Spawn the Scheduler tick loop and the three HealthMonitor sweeps
    /// (spec §5's "small, fixed set of long-running tasks").
    pub fn start(self: &Arc<Self>) {
        let scheduler = self.scheduler.clone();
        let shutdown = self.shutdown.clone();
        let tick = self.config.scheduler_tick;
        let scheduler_task = tokio::spawn(async move {
            scheduler.run(tick, async move { shutdown.notified().await }).await;
        });
        *self.scheduler_task.lock() = Some(scheduler_task);
        *self.health_tasks.lock() = self.health.clone().spawn();
        info!("orchestrator started");
    }

    /// Signal the Scheduler to stop (it drains its current tick first) and
    /// abort the HealthMonitor's sweep tasks (spec §5 "both drain in-flight
    /// ticks, then the process terminates").
    pub async fn shutdown(&self) {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.scheduler_task.lock().take() {
            let _ = handle.await;
        }
        for handle in self.health_tasks.lock().drain(..) {
            handle.abort();
        }
        info!("orchestrator stopped");
    }

    pub async fn create_job(&self, spec: JobSpec) -> Result<JobId, DomainError> {
        if spec.name.trim().is_empty() {
            return Err(DomainError::invalid_input("name is required"));
        }
        if spec.application.trim().is_empty() {
            return Err(DomainError::invalid_input("application is required"));
        }
        if spec.steps.is_empty() {
            return Err(DomainError::invalid_input("at least one step is required"));
        }
        let now = self.clock.epoch_ms();
        let mut job = Job::new(spec.name, spec.application, spec.steps, now);
        job.arguments = spec.arguments;
        job.priority = spec.priority.unwrap_or_default();
        job.webhook_url = spec.webhook_url;
        let job_id = job.id;
        self.jobs.put(job);
        self.scheduler.enqueue(job_id)?;
        Ok(job_id)
    }

    pub async fn execute_template(
        &self,
        template_id: TemplateId,
        params: IndexMap<String, Value>,
        opts: ExecuteTemplateOpts,
    ) -> Result<JobId, DomainError> {
        let now = self.clock.epoch_ms();
        let mut job = self.templates.expand(&template_id, &params, now, opts.priority)?;
        job.webhook_url = opts.webhook_url;
        let job_id = job.id;
        self.jobs.put(job);
        self.scheduler.enqueue(job_id)?;
        Ok(job_id)
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.jobs.get(&id)
    }

    /// Ordered by `createdAt` desc (spec §4.9); `take` is clamped to 100.
    pub fn list_jobs(&self, filter: JobListFilter) -> Vec<Job> {
        let take = filter.take.min(MAX_LIST_TAKE).max(1);
        self.jobs
            .list_all()
            .into_iter()
            .filter(|job| match filter.status {
                Some(s) => job.status == s,
                None => true,
            })
            .skip(filter.skip)
            .take(take)
            .collect()
    }

    /// `true` if the job was in-flight and is now `Cancelled`; `false` if it
    /// was already terminal; `NOT_FOUND` if it doesn't exist.
    pub async fn cancel_job(&self, id: JobId) -> Result<bool, DomainError> {
        let job = self.jobs.get(&id).ok_or_else(|| DomainError::not_found(format!("job {id} not found")))?;
        if job.is_terminal() {
            return Ok(false);
        }
        let notify = self.scheduler.cancel(id)?;
        if let Some((agent, job_id)) = notify {
            let transport = self.transport.clone();
            tokio::spawn(async move { transport.cancel(&agent, &job_id).await });
        }
        Ok(true)
    }

    pub fn list_templates(&self) -> Vec<Template> {
        self.templates.list()
    }

    pub fn get_template(&self, id: TemplateId) -> Option<Template> {
        self.templates.get(&id)
    }

    /// Provisions the session, binds it to a freshly started agent, and
    /// registers it `Idle` (spec §4.9, §4.2, §4.3). The agent's endpoint is
    /// the session's locally bound port — the provisioner is responsible for
    /// actually starting the agent process there.
    pub async fn register_agent(&self, spec: RegisterAgentSpec) -> Result<Agent, DomainError> {
        let session = self.sessions.create(&spec.user, self.provisioner.as_ref()).await?;
        let now = self.clock.epoch_ms();
        let endpoint_url = format!("http://127.0.0.1:{}", session.port);
        // `AgentCapability`'s derived `Default` leaves `max_concurrent_jobs`
        // at 0, which would make every placement filter reject the agent;
        // fall back to the spec's stated default of 1 explicitly.
        let capability = spec.capabilities.unwrap_or_else(|| AgentCapability {
            supported_applications: Vec::new(),
            max_concurrent_jobs: af_core::agent::default_max_concurrent_jobs(),
        });
        let mut agent = Agent::new(spec.name, session.id, spec.user, capability, endpoint_url, now);
        agent.status = af_core::AgentStatus::Idle;
        agent.last_heartbeat = Some(now);
        let agent_id = agent.id;
        self.sessions.assign(&session.id, agent_id)?;
        self.agents.register(agent.clone());
        Ok(agent)
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        self.agents.snapshot_all()
    }

    /// Tears down the bound session and removes the agent from the pool.
    pub async fn unregister_agent(&self, id: AgentId) -> Result<bool, DomainError> {
        let Some(agent) = self.agents.get(&id) else { return Ok(false) };
        self.sessions.terminate(&agent.session_id, self.provisioner.as_ref()).await?;
        Ok(self.agents.unregister(&id))
    }

    pub fn heartbeat(&self, id: AgentId) -> bool {
        self.agents.touch(&id)
    }

    /// Entry point for agent-side completion notifications (spec §4.9
    /// `statusCallback`).
    pub fn status_callback(
        &self,
        job_id: JobId,
        status: JobStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> Result<(), DomainError> {
        self.scheduler.report_terminal(job_id, status, result, error)
    }
}
