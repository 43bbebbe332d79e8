use super::*;

#[test]
fn fresh_session_starts_in_creating_with_zero_generation() {
    let session = Session::new("rpa-user", 3390, 0);
    assert_eq!(session.status, SessionStatus::Creating);
    assert_eq!(session.generation, 0);
    assert!(session.assigned_agent.is_none());
}

#[test]
fn display_renders_lowercase_status_tokens() {
    assert_eq!(SessionStatus::Unhealthy.to_string(), "unhealthy");
}
