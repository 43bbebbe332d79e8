//! The ingress HTTP surface from spec §6, following the
//! state-wrapper-struct + free-function-handlers + `with_state` router shape
//! used by the pack's axum services (grounded on
//! `FlexNetOS-noa_ark_os/server/api/src/routes.rs`).

use af_core::{AgentId, JobId, JobStatus, TemplateId};
use af_engine::{ExecuteTemplateOpts, JobListFilter, JobSpec, RegisterAgentSpec};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/status", patch(status_callback))
        .route("/templates", get(list_templates))
        .route("/templates/:id", get(get_template))
        .route("/templates/:id/execute", post(execute_template))
        .route("/agents", post(register_agent).get(list_agents))
        .route("/agents/:id/heartbeat", post(heartbeat))
        .route("/agents/:id", delete(unregister_agent))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct JobCreatedBody {
    #[serde(rename = "jobId")]
    job_id: JobId,
}

async fn create_job(State(state): State<AppState>, Json(spec): Json<JobSpec>) -> Result<impl IntoResponse, ApiError> {
    let job_id = state.orchestrator.create_job(spec).await?;
    Ok((StatusCode::CREATED, Json(JobCreatedBody { job_id })))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::from_string(id);
    match state.orchestrator.get_job(job_id) {
        Some(job) => Ok((StatusCode::OK, Json(job))),
        None => Err(af_core::DomainError::not_found(format!("job {job_id} not found")).into()),
    }
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    skip: usize,
    #[serde(default = "default_take")]
    take: usize,
}

fn default_take() -> usize {
    50
}

async fn list_jobs(State(state): State<AppState>, Query(query): Query<ListJobsQuery>) -> impl IntoResponse {
    let jobs = state.orchestrator.list_jobs(JobListFilter { status: query.status, skip: query.skip, take: query.take });
    (StatusCode::OK, Json(jobs))
}

#[derive(Serialize)]
struct CancelBody {
    success: bool,
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::from_string(id);
    let success = state.orchestrator.cancel_job(job_id).await?;
    Ok((StatusCode::OK, Json(CancelBody { success })))
}

#[derive(Debug, Deserialize)]
struct StatusCallbackBody {
    status: JobStatus,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn status_callback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusCallbackBody>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::from_string(id);
    state.orchestrator.status_callback(job_id, body.status, body.result, body.error)?;
    Ok(StatusCode::OK)
}

async fn list_templates(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.orchestrator.list_templates()))
}

async fn get_template(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let template_id = TemplateId::from_string(id);
    match state.orchestrator.get_template(template_id) {
        Some(template) => Ok((StatusCode::OK, Json(template))),
        None => Err(af_core::DomainError::not_found(format!("template {template_id} not found")).into()),
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteTemplateBody {
    #[serde(default)]
    parameters: IndexMap<String, Value>,
    #[serde(default)]
    priority: Option<af_core::Priority>,
    #[serde(default, rename = "webhookUrl")]
    webhook_url: Option<String>,
}

async fn execute_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ExecuteTemplateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let template_id = TemplateId::from_string(id);
    let job_id = state
        .orchestrator
        .execute_template(
            template_id,
            body.parameters,
            ExecuteTemplateOpts { priority: body.priority, webhook_url: body.webhook_url },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(JobCreatedBody { job_id })))
}

async fn register_agent(
    State(state): State<AppState>,
    Json(spec): Json<RegisterAgentSpec>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state.orchestrator.register_agent(spec).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.orchestrator.list_agents()))
}

async fn heartbeat(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let agent_id = AgentId::from_string(id);
    if state.orchestrator.heartbeat(agent_id) {
        Ok(StatusCode::OK)
    } else {
        Err(af_core::DomainError::not_found(format!("agent {agent_id} not found")).into())
    }
}

async fn unregister_agent(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let agent_id = AgentId::from_string(id);
    if state.orchestrator.unregister_agent(agent_id).await? {
        Ok(StatusCode::OK)
    } else {
        Err(af_core::DomainError::not_found(format!("agent {agent_id} not found")).into())
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthBody { status: "ok" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use af_core::{Agent, DomainError, Job, JobId, SystemClock};
    use af_engine::{EngineConfig, Orchestrator};
    use af_stores::{ProvisionHandle, SessionProvisioner};
    use af_transport::{AgentStatusReport, AgentTransport, TransportError};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    struct NoopTransport;

    #[async_trait]
    impl AgentTransport for NoopTransport {
        async fn send(&self, _agent: &Agent, _job: &Job) -> Result<(), TransportError> {
            Ok(())
        }

        async fn cancel(&self, _agent: &Agent, _job_id: &JobId) {}

        async fn status(&self, _agent: &Agent) -> Result<AgentStatusReport, TransportError> {
            Ok(AgentStatusReport { alive: true, detail: None })
        }
    }

    struct NoopProvisioner;

    #[async_trait]
    impl SessionProvisioner for NoopProvisioner {
        async fn provision(&self, user: &str, port: u16) -> Result<ProvisionHandle, DomainError> {
            Ok(ProvisionHandle(format!("{user}:{port}")))
        }

        async fn destroy(&self, _handle: &ProvisionHandle) -> Result<(), DomainError> {
            Ok(())
        }

        async fn check_health(&self, _handle: &ProvisionHandle) -> bool {
            true
        }
    }

    fn test_router() -> Router {
        let orchestrator = Orchestrator::new(
            EngineConfig::default(),
            SystemClock,
            Arc::new(NoopTransport) as Arc<dyn AgentTransport>,
            Arc::new(NoopProvisioner) as Arc<dyn SessionProvisioner>,
        );
        build_router(AppState::new(orchestrator))
    }

    #[tokio::test]
    async fn health_returns_ok_status() {
        let response = test_router()
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn get_unknown_job_returns_not_found() {
        let response = test_router()
            .oneshot(axum::http::Request::builder().uri("/jobs/job-doesnotexist0000000").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_and_list_agents_round_trips() {
        let router = test_router();
        let body = serde_json::json!({"name": "A1", "user": "a1-user"}).to_string();
        let response = router
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/agents")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .oneshot(axum::http::Request::builder().uri("/agents").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let agents: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(agents.len(), 1);
    }
}
