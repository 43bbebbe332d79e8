//! SessionManager: owns sessions, binds 1:1 to an agent (spec §4.3).

use std::collections::HashMap;

use af_core::{AgentId, Clock, DomainError, Session, SessionId, SessionStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

/// Opaque handle returned by a [`SessionProvisioner`], carried alongside the
/// session so `terminate`/`checkHealth` know what to ask the provisioner
/// about. The provisioner's internals (host OS user creation, remote-desktop
/// session setup) are out of scope per spec §1 — this is the abstract seam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionHandle(pub String);

/// Abstract seam for host OS user creation and remote-desktop session
/// provisioning (spec §1 "out of scope... modeled as an abstract
/// `SessionProvisioner` interface").
#[async_trait]
pub trait SessionProvisioner: Send + Sync {
    async fn provision(&self, user: &str, port: u16) -> Result<ProvisionHandle, DomainError>;
    async fn destroy(&self, handle: &ProvisionHandle) -> Result<(), DomainError>;
    async fn check_health(&self, handle: &ProvisionHandle) -> bool;
}

struct Record {
    session: Session,
    handle: Option<ProvisionHandle>,
    host_user: String,
}

/// Registry of sessions, serialized under a single lock (spec §4.3, §5).
pub struct SessionManager<C: Clock> {
    sessions: Mutex<HashMap<SessionId, Record>>,
    clock: C,
    base_port: u16,
}

impl<C: Clock> SessionManager<C> {
    pub fn new(clock: C, base_port: u16) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), clock, base_port }
    }

    fn port_in_use(sessions: &HashMap<SessionId, Record>, port: u16) -> bool {
        sessions.values().any(|r| r.session.port == port && r.session.status != SessionStatus::Terminated)
    }

    /// Draw a free port from `basePort + random(0..1000)`, retrying on
    /// collision up to 8 times (spec §5 "Ports and identifiers").
    fn allocate_port(&self) -> Result<u16, DomainError> {
        let sessions = self.sessions.lock();
        let mut rng = rand::thread_rng();
        for _ in 0..8 {
            let candidate = self.base_port + rng.gen_range(0..1000u16);
            if !Self::port_in_use(&sessions, candidate) {
                return Ok(candidate);
            }
        }
        Err(DomainError::internal("exhausted 8 attempts allocating a session port"))
    }

    pub async fn create(
        &self,
        user_label: &str,
        provisioner: &dyn SessionProvisioner,
    ) -> Result<Session, DomainError> {
        let port = self.allocate_port()?;
        let mut session = Session::new(user_label, port, self.clock.epoch_ms());
        session.status = SessionStatus::Starting;
        self.sessions.lock().insert(
            session.id,
            Record { session: session.clone(), handle: None, host_user: user_label.to_string() },
        );

        match provisioner.provision(user_label, port).await {
            Ok(handle) => {
                let mut sessions = self.sessions.lock();
                let record = sessions
                    .get_mut(&session.id)
                    .ok_or_else(|| DomainError::internal("session vanished mid-create"))?;
                record.handle = Some(handle);
                record.session.status = SessionStatus::Active;
                record.session.created_at = self.clock.epoch_ms();
                record.session.last_activity = record.session.created_at;
                Ok(record.session.clone())
            }
            Err(err) => {
                // Provisioning failures fail-fast back to the caller
                // (AgentPool.register) per spec §4.3 failure semantics.
                self.sessions.lock().remove(&session.id);
                Err(err)
            }
        }
    }

    pub async fn terminate(&self, id: &SessionId, provisioner: &dyn SessionProvisioner) -> Result<bool, DomainError> {
        let handle = {
            let mut sessions = self.sessions.lock();
            let Some(record) = sessions.get_mut(id) else { return Ok(false) };
            record.session.status = SessionStatus::Terminating;
            record.handle.clone()
        };
        if let Some(handle) = handle {
            provisioner.destroy(&handle).await?;
        }
        let mut sessions = self.sessions.lock();
        if let Some(record) = sessions.get_mut(id) {
            record.session.status = SessionStatus::Terminated;
            record.session.terminated_at = Some(self.clock.epoch_ms());
        }
        sessions.remove(id);
        Ok(true)
    }

    pub fn assign(&self, id: &SessionId, agent_id: AgentId) -> Result<(), DomainError> {
        let mut sessions = self.sessions.lock();
        let record = sessions.get_mut(id).ok_or_else(|| DomainError::not_found(format!("session {id}")))?;
        record.session.assigned_agent = Some(agent_id);
        record.session.status = SessionStatus::Busy;
        record.session.last_activity = self.clock.epoch_ms();
        Ok(())
    }

    pub fn release(&self, id: &SessionId) -> Result<(), DomainError> {
        let mut sessions = self.sessions.lock();
        let record = sessions.get_mut(id).ok_or_else(|| DomainError::not_found(format!("session {id}")))?;
        record.session.status = SessionStatus::Active;
        record.session.last_activity = self.clock.epoch_ms();
        record.session.jobs_processed += 1;
        Ok(())
    }

    /// Destroy the underlying session and create a fresh one for the same
    /// user, preserving the externally visible `sessionId` and bumping
    /// `generation` (spec §9 open question).
    pub async fn recycle(&self, id: &SessionId, provisioner: &dyn SessionProvisioner) -> Result<Session, DomainError> {
        let (host_user, old_handle) = {
            let sessions = self.sessions.lock();
            let record = sessions.get(id).ok_or_else(|| DomainError::not_found(format!("session {id}")))?;
            (record.host_user.clone(), record.handle.clone())
        };

        if let Some(handle) = old_handle {
            provisioner.destroy(&handle).await?;
        }

        let port = self.allocate_port()?;
        let new_handle = provisioner.provision(&host_user, port).await?;

        let mut sessions = self.sessions.lock();
        let record = sessions.get_mut(id).ok_or_else(|| DomainError::not_found(format!("session {id}")))?;
        record.handle = Some(new_handle);
        record.session.port = port;
        record.session.generation += 1;
        record.session.status = SessionStatus::Active;
        record.session.jobs_processed = 0;
        record.session.last_activity = self.clock.epoch_ms();
        Ok(record.session.clone())
    }

    pub async fn check_health(&self, id: &SessionId, provisioner: &dyn SessionProvisioner) -> Result<bool, DomainError> {
        let handle = {
            let sessions = self.sessions.lock();
            let record = sessions.get(id).ok_or_else(|| DomainError::not_found(format!("session {id}")))?;
            record.handle.clone()
        };
        let healthy = match handle {
            Some(h) => provisioner.check_health(&h).await,
            None => false,
        };

        let mut sessions = self.sessions.lock();
        if let Some(record) = sessions.get_mut(id) {
            record.session.last_health_check = Some(self.clock.epoch_ms());
            record.session.metrics.health_checks_performed += 1;
            if healthy {
                if record.session.status == SessionStatus::Unhealthy {
                    record.session.status = SessionStatus::Active;
                }
            } else {
                record.session.status = SessionStatus::Unhealthy;
                record.session.metrics.health_checks_failed += 1;
            }
        }
        Ok(healthy)
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.lock().get(id).map(|r| r.session.clone())
    }

    pub fn snapshot_all(&self) -> Vec<Session> {
        self.sessions.lock().values().map(|r| r.session.clone()).collect()
    }
}

#[cfg(test)]
#[path = "session_manager_tests.rs"]
mod tests;
