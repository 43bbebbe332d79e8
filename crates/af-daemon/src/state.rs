//! Shared app state, following the pack's state-wrapper-struct-over-`Arc`
//! convention (grounded on `FlexNetOS-noa_ark_os/server/api/src/routes.rs`'s
//! `ApiRoutes` wrapping `ApiState`).

use std::sync::Arc;

use af_core::SystemClock;
use af_engine::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<SystemClock>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator<SystemClock>>) -> Self {
        Self { orchestrator }
    }
}
