use super::*;

#[test]
fn empty_capability_list_accepts_anything() {
    let cap = AgentCapability::default();
    assert!(cap.fits("calc.exe"));
}

#[test]
fn non_empty_capability_list_requires_case_insensitive_substring() {
    let cap = AgentCapability { supported_applications: vec!["Calc".into()], max_concurrent_jobs: 1 };
    assert!(cap.fits("calc.exe"));
    assert!(!cap.fits("notepad.exe"));
}

#[test]
fn cold_agent_has_perfect_success_rate() {
    let metrics = AgentMetrics::default();
    assert_eq!(metrics.success_rate(), 1.0);
}

#[test]
fn success_rate_reflects_completed_vs_failed() {
    let mut metrics = AgentMetrics::default();
    metrics.record(true, 100, 1000);
    metrics.record(false, 200, 2000);
    assert_eq!(metrics.success_rate(), 0.5);
}

#[test]
fn average_duration_is_a_running_mean() {
    let mut metrics = AgentMetrics::default();
    metrics.record(true, 100, 1000);
    metrics.record(true, 300, 2000);
    assert!((metrics.average_duration_ms - 200.0).abs() < 1e-9);
}

#[test]
fn invariant_rejects_busy_without_current_job() {
    let mut agent = Agent::new(
        "a1",
        SessionId::new(),
        "rpa-user",
        AgentCapability::default(),
        "http://127.0.0.1:9000",
        0,
    );
    agent.status = AgentStatus::Busy;
    assert!(agent.check_invariants().is_err());
}
