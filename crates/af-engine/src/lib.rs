//! Orchestration engine: template expansion, scheduling, health monitoring,
//! and the `Orchestrator` facade that wires the stores and transport crates
//! together behind the operations `af-daemon`'s IngressAPI exposes (spec §4,
//! §5).

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

mod error;
mod health_monitor;
mod orchestrator;
mod scheduler;
mod template_engine;

pub use error::EngineError;
pub use health_monitor::{HealthMonitor, HealthMonitorConfig};
pub use orchestrator::{
    EngineConfig, ExecuteTemplateOpts, JobListFilter, JobSpec, Orchestrator, RegisterAgentSpec,
};
pub use scheduler::Scheduler;
pub use template_engine::{DerivationRule, TemplateEngine};
