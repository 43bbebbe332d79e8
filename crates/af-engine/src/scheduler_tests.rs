use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use af_core::{Agent, AgentCapability, FakeClock, JobId, Priority, Step, StepType};
use af_transport::{AgentStatusReport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex as PlMutex;

/// A transport double whose `send` outcome is scripted per-call, and which
/// records every agent id it was asked to send to.
#[derive(Default)]
struct FakeTransport {
    sent_to: PlMutex<Vec<AgentId>>,
    fail_next: AtomicUsize,
}

impl FakeTransport {
    fn fail_next_n(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentTransport for FakeTransport {
    async fn send(&self, agent: &Agent, _job: &af_core::Job) -> Result<(), TransportError> {
        self.sent_to.lock().push(agent.id);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::ServerError(503));
        }
        Ok(())
    }

    async fn cancel(&self, _agent: &Agent, _job_id: &JobId) {}

    async fn status(&self, _agent: &Agent) -> Result<AgentStatusReport, TransportError> {
        Ok(AgentStatusReport { alive: true, detail: None })
    }
}

fn step() -> Step {
    Step::new(0, StepType::Click, "ok")
}

fn harness() -> (Arc<Scheduler<FakeClock>>, Arc<FakeTransport>, FakeClock) {
    let clock = FakeClock::new();
    let jobs = Arc::new(JobStore::new());
    let queue = Arc::new(PriorityQueue::new());
    let agents = Arc::new(AgentPool::new(clock.clone()));
    let sessions = Arc::new(SessionManager::new(clock.clone(), 20000));
    let transport = Arc::new(FakeTransport::default());
    let scheduler = Arc::new(Scheduler::new(
        jobs,
        queue,
        agents,
        sessions,
        transport.clone() as Arc<dyn AgentTransport>,
        clock.clone(),
    ));
    (scheduler, transport, clock)
}

fn register_idle_agent(scheduler: &Scheduler<FakeClock>, app: &str) -> AgentId {
    let session_id = af_core::SessionId::new();
    let mut agent = Agent::new(
        "agent",
        session_id,
        "host-user",
        AgentCapability { supported_applications: vec![app.to_string()], max_concurrent_jobs: 1 },
        "http://127.0.0.1:9/",
        scheduler.clock.epoch_ms(),
    );
    agent.status = af_core::AgentStatus::Idle;
    let id = agent.id;
    scheduler.agents.register(agent);
    id
}

fn new_job(app: &str, now: u64) -> af_core::Job {
    af_core::Job::new("job", app, vec![step()], now)
}

#[tokio::test]
async fn single_job_dispatches_to_the_only_idle_agent() {
    let (scheduler, transport, clock) = harness();
    let agent_id = register_idle_agent(&scheduler, "notepad");
    let job = new_job("notepad", clock.epoch_ms());
    let job_id = job.id;
    scheduler.jobs.put(job);
    scheduler.enqueue(job_id).unwrap();

    scheduler.drain().await;

    assert_eq!(transport.sent_to.lock().as_slice(), &[agent_id]);
    let stored = scheduler.jobs.get(&job_id).unwrap();
    assert_eq!(stored.status, af_core::JobStatus::Running);
    assert_eq!(stored.assigned_agent, Some(agent_id));
}

#[tokio::test]
async fn higher_priority_job_dispatches_before_an_earlier_lower_priority_one() {
    let (scheduler, transport, clock) = harness();
    register_idle_agent(&scheduler, "notepad");
    let now = clock.epoch_ms();

    let mut low = new_job("notepad", now);
    low.priority = Priority::Low;
    let low_id = low.id;
    scheduler.jobs.put(low);
    scheduler.enqueue(low_id).unwrap();

    let mut critical = new_job("notepad", now);
    critical.priority = Priority::Critical;
    let critical_id = critical.id;
    scheduler.jobs.put(critical);
    scheduler.enqueue(critical_id).unwrap();

    scheduler.drain().await;

    // Only one idle agent existed, so only the higher-priority job should
    // have been dispatched on this pass.
    assert_eq!(transport.sent_to.lock().len(), 1);
    assert_eq!(scheduler.jobs.get(&critical_id).unwrap().status, af_core::JobStatus::Running);
    assert_eq!(scheduler.jobs.get(&low_id).unwrap().status, af_core::JobStatus::Queued);
}

#[tokio::test]
async fn failed_dispatch_rolls_back_to_queued_and_unreserves_the_agent() {
    let (scheduler, transport, clock) = harness();
    let agent_id = register_idle_agent(&scheduler, "notepad");
    transport.fail_next_n(1);
    let job = new_job("notepad", clock.epoch_ms());
    let job_id = job.id;
    scheduler.jobs.put(job);
    scheduler.enqueue(job_id).unwrap();

    scheduler.drain().await;

    let stored = scheduler.jobs.get(&job_id).unwrap();
    assert_eq!(stored.status, af_core::JobStatus::Queued);
    assert!(stored.assigned_agent.is_none());
    let agent = scheduler.agents.get(&agent_id).unwrap();
    assert_eq!(agent.status, af_core::AgentStatus::Error);
}

#[tokio::test]
async fn capability_mismatch_leaves_the_job_queued() {
    let (scheduler, transport, clock) = harness();
    register_idle_agent(&scheduler, "calculator");
    let job = new_job("notepad", clock.epoch_ms());
    let job_id = job.id;
    scheduler.jobs.put(job);
    scheduler.enqueue(job_id).unwrap();

    scheduler.drain().await;

    assert!(transport.sent_to.lock().is_empty());
    assert_eq!(scheduler.jobs.get(&job_id).unwrap().status, af_core::JobStatus::Queued);
}

#[tokio::test]
async fn retry_decays_priority_and_requeues() {
    let (scheduler, _transport, clock) = harness();
    let _agent_id = register_idle_agent(&scheduler, "notepad");
    let mut job = new_job("notepad", clock.epoch_ms());
    job.priority = Priority::High;
    let job_id = job.id;
    scheduler.jobs.put(job);
    scheduler.enqueue(job_id).unwrap();
    scheduler.drain().await;

    scheduler.report_terminal(job_id, af_core::JobStatus::Failed, None, Some("boom".into())).unwrap();

    let stored = scheduler.jobs.get(&job_id).unwrap();
    assert_eq!(stored.status, af_core::JobStatus::Queued);
    assert_eq!(stored.priority, Priority::Normal);
    assert_eq!(stored.retry_count, 1);
    assert_eq!(scheduler.queue.size(), 1);
}

#[tokio::test]
async fn agent_recycle_triggers_at_the_jobs_executed_threshold() {
    let (scheduler, _transport, clock) = harness();
    let agent_id = register_idle_agent(&scheduler, "notepad");
    // Push jobs_executed to just below the default threshold directly,
    // then release once more to cross it.
    for _ in 0..(af_stores::DEFAULT_RECYCLE_THRESHOLD - 1) {
        scheduler.agents.release(&agent_id, true, 10).unwrap();
    }

    let job = new_job("notepad", clock.epoch_ms());
    let job_id = job.id;
    scheduler.jobs.put(job);
    scheduler.enqueue(job_id).unwrap();
    scheduler.drain().await;
    scheduler.report_terminal(job_id, af_core::JobStatus::Success, Some("done".into()), None).unwrap();

    let agent = scheduler.agents.get(&agent_id).unwrap();
    assert_eq!(agent.status, af_core::AgentStatus::Recycling);
}

#[tokio::test]
async fn cancelling_a_running_job_releases_its_agent() {
    let (scheduler, _transport, clock) = harness();
    let agent_id = register_idle_agent(&scheduler, "notepad");
    let job = new_job("notepad", clock.epoch_ms());
    let job_id = job.id;
    scheduler.jobs.put(job);
    scheduler.enqueue(job_id).unwrap();
    scheduler.drain().await;

    let notified = scheduler.cancel(job_id).unwrap();
    assert!(notified.is_some());
    assert_eq!(scheduler.jobs.get(&job_id).unwrap().status, af_core::JobStatus::Cancelled);
    assert_eq!(scheduler.agents.get(&agent_id).unwrap().status, af_core::AgentStatus::Idle);
}
