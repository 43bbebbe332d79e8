//! Randomized state-machine tests for the testable properties in spec §8:
//! retry monotonicity, the terminal-job invariant, and FIFO-within-priority
//! ordering. Exercises `JobStore`/`PriorityQueue` directly since both are
//! synchronous, sidestepping the need to drive the full async `Scheduler`.

use af_core::{AgentId, Job, JobStatus, Priority, Step, StepType};
use af_stores::{JobStore, PriorityQueue, TransitionOptions};
use proptest::prelude::*;

fn sample_job(now: u64) -> Job {
    let steps = vec![Step::new(0, StepType::Click, "ok")];
    let mut job = Job::new("proptest job", "calc", steps, now);
    job.max_retries = 2;
    job
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Dispatch,
    Fail,
    Succeed,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![Just(Action::Dispatch), Just(Action::Fail), Just(Action::Succeed)]
}

proptest! {
    /// `retryCount` only increases and never exceeds `maxRetries`, and every
    /// terminal job carries a `completedAt` plus a `result` or `errorMessage`
    /// (spec §8 invariants).
    #[test]
    fn retry_monotonic_and_terminal_invariant_hold(actions in prop::collection::vec(action_strategy(), 1..40)) {
        let store = JobStore::new();
        let mut now = 1_000u64;
        let mut job = sample_job(now);
        let job_id = job.id;
        job.status = JobStatus::Queued;
        job.queued_at = Some(now);
        store.put(job);

        let agent = AgentId::new();
        let mut last_retry_count = 0u32;

        for action in actions {
            now += 1;
            let job = store.get(&job_id).unwrap();
            if job.is_terminal() {
                prop_assert!(job.completed_at.is_some());
                prop_assert!(job.result.is_some() || job.error.is_some());
                break;
            }

            match (job.status, action) {
                (JobStatus::Queued, Action::Dispatch) => {
                    store.transition(&job_id, JobStatus::Assigned, now, TransitionOptions::assign(agent)).unwrap();
                    store.transition(&job_id, JobStatus::Running, now, TransitionOptions::default()).unwrap();
                }
                (JobStatus::Running, Action::Fail) => {
                    store.transition(&job_id, JobStatus::Failed, now, TransitionOptions::failed("boom")).unwrap();
                    if let Ok(outcome) = store.transition(&job_id, JobStatus::Retry, now, TransitionOptions::default()) {
                        prop_assert!(outcome.job.retry_count > last_retry_count);
                        prop_assert!(outcome.job.retry_count <= outcome.job.max_retries);
                        last_retry_count = outcome.job.retry_count;
                    }
                }
                (JobStatus::Running, Action::Succeed) => {
                    store.transition(&job_id, JobStatus::Success, now, TransitionOptions::success("done")).unwrap();
                }
                _ => {}
            }

            let after = store.get(&job_id).unwrap();
            prop_assert!(after.retry_count >= last_retry_count);
            prop_assert!(after.retry_count <= after.max_retries);
        }
    }

    /// FIFO within priority: jobs enqueued at the same priority, in order,
    /// dequeue in that same order (spec §8).
    #[test]
    fn fifo_within_priority_band(n in 1usize..30, priority_idx in 0usize..4) {
        let priorities = [Priority::Low, Priority::Normal, Priority::High, Priority::Critical];
        let priority = priorities[priority_idx];
        let queue = PriorityQueue::new();
        let ids: Vec<_> = (0..n).map(|_| af_core::JobId::new()).collect();
        for id in &ids {
            queue.push(*id, priority);
        }
        let mut popped = Vec::new();
        while let Some((id, _, _)) = queue.pop() {
            popped.push(id);
        }
        prop_assert_eq!(popped, ids);
    }
}
