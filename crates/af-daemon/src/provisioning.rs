//! Production [`SessionProvisioner`]. Host OS session/RDP provisioning is
//! explicitly out of scope (spec §1, §9 "modeled as an abstract
//! interface... never built out as real OS integrations"): this
//! implementation satisfies the trait contract without touching the host,
//! so `af-daemon` can run end-to-end against agents that are started and
//! addressed out of band.

use af_core::DomainError;
use af_stores::{ProvisionHandle, SessionProvisioner};
use async_trait::async_trait;
use tracing::warn;

pub struct NullSessionProvisioner;

#[async_trait]
impl SessionProvisioner for NullSessionProvisioner {
    async fn provision(&self, user: &str, port: u16) -> Result<ProvisionHandle, DomainError> {
        warn!(user, port, "session provisioning is a no-op in this build; agent is expected to already be reachable");
        Ok(ProvisionHandle(format!("{user}:{port}")))
    }

    async fn destroy(&self, _handle: &ProvisionHandle) -> Result<(), DomainError> {
        Ok(())
    }

    async fn check_health(&self, _handle: &ProvisionHandle) -> bool {
        true
    }
}
