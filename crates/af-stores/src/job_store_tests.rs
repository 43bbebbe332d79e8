use super::*;
use af_core::{Priority, Step, StepType};

fn job(max_retries: u32) -> Job {
    let mut j = Job::new("j", "calc", vec![Step::new(0, StepType::Click, "5")], 0);
    j.max_retries = max_retries;
    j
}

#[test]
fn pending_to_queued_stamps_queued_at() {
    let store = JobStore::new();
    let j = job(3);
    let id = j.id;
    store.put(j);
    let outcome = store.transition(&id, JobStatus::Queued, 100, TransitionOptions::default()).expect("legal");
    assert_eq!(outcome.job.status, JobStatus::Queued);
    assert_eq!(outcome.job.queued_at, Some(100));
}

#[test]
fn illegal_transition_is_rejected_without_mutation() {
    let store = JobStore::new();
    let j = job(3);
    let id = j.id;
    store.put(j);
    let err = store.transition(&id, JobStatus::Running, 100, TransitionOptions::default());
    assert!(err.is_err());
    assert_eq!(store.get(&id).unwrap().status, JobStatus::Pending);
}

#[test]
fn full_happy_path_releases_agent_on_terminal() {
    let store = JobStore::new();
    let j = job(3);
    let id = j.id;
    let agent = AgentId::new();
    store.put(j);
    store.transition(&id, JobStatus::Queued, 0, TransitionOptions::default()).unwrap();
    store.transition(&id, JobStatus::Assigned, 1, TransitionOptions::assign(agent)).unwrap();
    store.transition(&id, JobStatus::Running, 2, TransitionOptions::default()).unwrap();
    let outcome = store.transition(&id, JobStatus::Success, 3, TransitionOptions::success("ok")).unwrap();
    assert_eq!(outcome.job.status, JobStatus::Success);
    assert_eq!(outcome.job.completed_at, Some(3));
    assert_eq!(outcome.released_agent, Some(agent));
    assert!(outcome.job.assigned_agent.is_none());
}

#[test]
fn retry_decays_priority_and_requeues_until_max_retries() {
    let store = JobStore::new();
    let mut j = job(2);
    j.priority = Priority::High;
    let id = j.id;
    let agent = AgentId::new();
    store.put(j);
    store.transition(&id, JobStatus::Queued, 0, TransitionOptions::default()).unwrap();
    store.transition(&id, JobStatus::Assigned, 1, TransitionOptions::assign(agent)).unwrap();
    store.transition(&id, JobStatus::Running, 2, TransitionOptions::default()).unwrap();
    store.transition(&id, JobStatus::Failed, 3, TransitionOptions::failed("boom")).unwrap();

    let retry1 = store.transition(&id, JobStatus::Retry, 4, TransitionOptions::default()).unwrap();
    assert!(retry1.requeue);
    assert_eq!(retry1.job.status, JobStatus::Queued);
    assert_eq!(retry1.job.priority, Priority::Normal);
    assert_eq!(retry1.job.retry_count, 1);

    store.transition(&id, JobStatus::Assigned, 5, TransitionOptions::assign(agent)).unwrap();
    store.transition(&id, JobStatus::Running, 6, TransitionOptions::default()).unwrap();
    store.transition(&id, JobStatus::Failed, 7, TransitionOptions::failed("boom again")).unwrap();
    let retry2 = store.transition(&id, JobStatus::Retry, 8, TransitionOptions::default()).unwrap();
    assert_eq!(retry2.job.priority, Priority::Low);
    assert_eq!(retry2.job.retry_count, 2);

    store.transition(&id, JobStatus::Assigned, 9, TransitionOptions::assign(agent)).unwrap();
    store.transition(&id, JobStatus::Running, 10, TransitionOptions::default()).unwrap();
    store.transition(&id, JobStatus::Failed, 11, TransitionOptions::failed("final")).unwrap();
    let exhausted = store.transition(&id, JobStatus::Retry, 12, TransitionOptions::default());
    assert!(exhausted.is_err());
    assert_eq!(store.get(&id).unwrap().status, JobStatus::Failed);
}

#[test]
fn cancel_from_any_non_terminal_status_is_idempotent_once_terminal() {
    let store = JobStore::new();
    let j = job(3);
    let id = j.id;
    store.put(j);
    let first = store.transition(&id, JobStatus::Cancelled, 5, TransitionOptions::default()).unwrap();
    assert_eq!(first.job.status, JobStatus::Cancelled);
    assert_eq!(first.job.completed_at, Some(5));
    let second = store.transition(&id, JobStatus::Cancelled, 9, TransitionOptions::default());
    assert!(second.is_err());
    assert_eq!(store.get(&id).unwrap().completed_at, Some(5));
}

#[test]
fn prune_keeps_only_the_newest_terminal_jobs() {
    let store = JobStore::new();
    for i in 0..5u64 {
        let mut j = job(3);
        j.status = JobStatus::Success;
        j.completed_at = Some(i);
        j.result = Some("ok".into());
        store.put(j);
    }
    let dropped = store.prune(PrunePolicy { max_history: 2 });
    assert_eq!(dropped, 3);
    assert_eq!(store.len(), 2);
}
