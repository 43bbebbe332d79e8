//! The four owned registries from spec §5: `JobStore`, `PriorityQueue`,
//! `SessionManager`, `AgentPool`. Each has its own serializing lock; lock
//! order is always PriorityQueue -> JobStore -> AgentPool -> SessionManager.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod agent_pool;
pub mod job_store;
pub mod priority_queue;
pub mod session_manager;

pub use agent_pool::{AgentPool, ReleaseOutcome, DEFAULT_RECYCLE_THRESHOLD};
pub use job_store::{JobStore, PrunePolicy, TransitionOptions, TransitionOutcome};
pub use priority_queue::PriorityQueue;
pub use session_manager::{ProvisionHandle, SessionManager, SessionProvisioner};
