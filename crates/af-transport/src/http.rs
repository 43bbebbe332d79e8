//! reqwest-backed `AgentTransport` (spec §4.6): retries network errors and
//! 5xx up to 3 attempts with [250ms, 500ms, 1000ms] backoff, treats 4xx as
//! terminal, and consults a per-agent [`CircuitBreaker`] before every call.

use std::time::Duration;

use af_core::{Agent, Clock, Job, JobId};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::TransportError;
use crate::transport::{AgentStatusReport, AgentTransport};

const RETRY_BACKOFFS_MS: [u64; 3] = [250, 500, 1000];
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
const DEFAULT_BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

/// Talks to agent endpoints over HTTP, per spec §6's `POST {agentUrl}/jobs`,
/// `POST {agentUrl}/jobs/{id}/cancel`, `GET {agentUrl}/status` surface.
pub struct HttpAgentTransport<C: Clock> {
    client: Client,
    breaker: CircuitBreaker<C>,
}

impl<C: Clock> HttpAgentTransport<C> {
    pub fn new(clock: C) -> Self {
        Self::with_config(clock, DEFAULT_SEND_TIMEOUT, DEFAULT_BREAKER_THRESHOLD, DEFAULT_BREAKER_COOLDOWN)
    }

    #[allow(clippy::expect_used)]
    pub fn with_config(clock: C, send_timeout: Duration, breaker_threshold: u32, breaker_cooldown: Duration) -> Self {
        let client = Client::builder()
            .timeout(send_timeout)
            .build()
            .expect("reqwest client config is always valid");
        Self { client, breaker: CircuitBreaker::new(clock, breaker_threshold, breaker_cooldown) }
    }

    async fn classify(resp: Result<reqwest::Response, reqwest::Error>) -> Result<reqwest::Response, TransportError> {
        match resp {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    Ok(resp)
                } else if status.is_server_error() {
                    Err(TransportError::ServerError(status.as_u16()))
                } else if status == StatusCode::REQUEST_TIMEOUT {
                    Err(TransportError::Timeout)
                } else {
                    Err(TransportError::Rejected(status.as_u16()))
                }
            }
            Err(err) if err.is_timeout() => Err(TransportError::Timeout),
            Err(err) => Err(TransportError::Network(err.to_string())),
        }
    }
}

#[async_trait]
impl<C: Clock> AgentTransport for HttpAgentTransport<C> {
    async fn send(&self, agent: &Agent, job: &Job) -> Result<(), TransportError> {
        self.breaker.before_call(agent.id)?;

        let url = format!("{}/jobs", agent.endpoint_url.trim_end_matches('/'));
        let mut last_err = None;
        for (attempt, backoff_ms) in std::iter::once(0).chain(RETRY_BACKOFFS_MS).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            let resp = self.client.post(&url).json(job).send().await;
            match Self::classify(resp).await {
                Ok(_) => {
                    self.breaker.record_success(agent.id);
                    return Ok(());
                }
                Err(err) if err.is_retryable() => {
                    warn!(agent = %agent.id, attempt, error = %err, "send attempt failed, will retry");
                    last_err = Some(err);
                }
                Err(err) => {
                    // 4xx is terminal: don't retry, don't trip the breaker.
                    return Err(err);
                }
            }
        }

        self.breaker.record_failure(agent.id);
        match last_err {
            Some(err) => Err(err),
            None => Err(TransportError::Network("exhausted retries with no recorded error".into())),
        }
    }

    async fn cancel(&self, agent: &Agent, job_id: &JobId) {
        let url = format!("{}/jobs/{}/cancel", agent.endpoint_url.trim_end_matches('/'), job_id);
        if let Err(err) = self.client.post(&url).send().await {
            debug!(agent = %agent.id, %job_id, error = %err, "best-effort cancel failed");
        }
    }

    async fn status(&self, agent: &Agent) -> Result<AgentStatusReport, TransportError> {
        self.breaker.before_call(agent.id)?;
        let url = format!("{}/status", agent.endpoint_url.trim_end_matches('/'));
        let resp = self.client.get(&url).send().await;
        match Self::classify(resp).await {
            Ok(resp) => {
                self.breaker.record_success(agent.id);
                match resp.json::<AgentStatusReport>().await {
                    Ok(report) => Ok(report),
                    Err(err) => Err(TransportError::Network(err.to_string())),
                }
            }
            Err(err) => {
                if err.is_retryable() {
                    self.breaker.record_failure(agent.id);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
