use super::*;
use af_core::FakeClock;
use std::sync::atomic::{AtomicU32, Ordering};

struct FakeProvisioner {
    fail_provision: bool,
    healthy: std::sync::atomic::AtomicBool,
    destroy_calls: AtomicU32,
}

impl FakeProvisioner {
    fn new() -> Self {
        Self {
            fail_provision: false,
            healthy: std::sync::atomic::AtomicBool::new(true),
            destroy_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SessionProvisioner for FakeProvisioner {
    async fn provision(&self, user: &str, port: u16) -> Result<ProvisionHandle, DomainError> {
        if self.fail_provision {
            return Err(DomainError::agent_unavailable("provisioning failed"));
        }
        Ok(ProvisionHandle(format!("{user}:{port}")))
    }

    async fn destroy(&self, _handle: &ProvisionHandle) -> Result<(), DomainError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check_health(&self, _handle: &ProvisionHandle) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn create_provisions_and_activates() {
    let mgr = SessionManager::new(FakeClock::new(), 3390);
    let provisioner = FakeProvisioner::new();
    let session = mgr.create("rpa-user", &provisioner).await.expect("create");
    assert_eq!(session.status, SessionStatus::Active);
    assert!((3390..4390).contains(&session.port));
}

#[tokio::test]
async fn create_fails_fast_when_provisioning_fails() {
    let mgr = SessionManager::new(FakeClock::new(), 3390);
    let mut provisioner = FakeProvisioner::new();
    provisioner.fail_provision = true;
    let err = mgr.create("rpa-user", &provisioner).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn recycle_preserves_id_and_bumps_generation() {
    let mgr = SessionManager::new(FakeClock::new(), 3390);
    let provisioner = FakeProvisioner::new();
    let session = mgr.create("rpa-user", &provisioner).await.unwrap();
    let id = session.id;
    let recycled = mgr.recycle(&id, &provisioner).await.unwrap();
    assert_eq!(recycled.id, id);
    assert_eq!(recycled.generation, 1);
    assert_eq!(recycled.jobs_processed, 0);
}

#[tokio::test]
async fn check_health_marks_unhealthy_then_recovers() {
    let mgr = SessionManager::new(FakeClock::new(), 3390);
    let provisioner = FakeProvisioner::new();
    let session = mgr.create("rpa-user", &provisioner).await.unwrap();
    provisioner.healthy.store(false, Ordering::SeqCst);
    let healthy = mgr.check_health(&session.id, &provisioner).await.unwrap();
    assert!(!healthy);
    assert_eq!(mgr.get(&session.id).unwrap().status, SessionStatus::Unhealthy);

    provisioner.healthy.store(true, Ordering::SeqCst);
    mgr.check_health(&session.id, &provisioner).await.unwrap();
    assert_eq!(mgr.get(&session.id).unwrap().status, SessionStatus::Active);
}

#[tokio::test]
async fn release_increments_jobs_processed() {
    let mgr = SessionManager::new(FakeClock::new(), 3390);
    let provisioner = FakeProvisioner::new();
    let session = mgr.create("rpa-user", &provisioner).await.unwrap();
    mgr.assign(&session.id, AgentId::new()).unwrap();
    mgr.release(&session.id).unwrap();
    assert_eq!(mgr.get(&session.id).unwrap().jobs_processed, 1);
}
