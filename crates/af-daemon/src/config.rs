//! Config loading: a TOML file with the flat dotted keys from spec §6,
//! each overridable by an `AF_*` environment variable, following the
//! daemon crate's own env-var-first style (`af-daemon` has no teacher
//! counterpart file to adapt directly, so this mirrors that idiom).

use std::path::Path;
use std::time::Duration;

use af_engine::EngineConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("invalid value for {key}: {detail}")]
    InvalidValue { key: &'static str, detail: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "bind.address")]
    pub bind_address: String,
    #[serde(rename = "rdp.basePort")]
    pub rdp_base_port: u16,
    #[serde(rename = "scheduler.tickSeconds")]
    pub scheduler_tick_seconds: u64,
    #[serde(rename = "scheduler.sendTimeoutSeconds")]
    pub scheduler_send_timeout_seconds: u64,
    #[serde(rename = "agent.heartbeatTimeoutMinutes")]
    pub agent_heartbeat_timeout_minutes: u64,
    #[serde(rename = "session.inactivityTimeoutHours")]
    pub session_inactivity_timeout_hours: u64,
    #[serde(rename = "session.maxJobs")]
    pub session_max_jobs: u32,
    #[serde(rename = "job.timeoutMinutes")]
    pub job_timeout_minutes: u64,
    #[serde(rename = "history.maxCompleted")]
    pub history_max_completed: usize,
    #[serde(rename = "agent.recycleAfterJobs")]
    pub agent_recycle_after_jobs: u32,
    #[serde(rename = "transport.circuitFailures")]
    pub transport_circuit_failures: u32,
    #[serde(rename = "transport.circuitCooldownSeconds")]
    pub transport_circuit_cooldown_seconds: u64,
    #[serde(rename = "defaultAgentCount")]
    pub default_agent_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            rdp_base_port: engine.rdp_base_port,
            scheduler_tick_seconds: engine.scheduler_tick.as_secs(),
            scheduler_send_timeout_seconds: engine.scheduler_send_timeout.as_secs(),
            agent_heartbeat_timeout_minutes: engine.agent_heartbeat_timeout.as_secs() / 60,
            session_inactivity_timeout_hours: engine.session_inactivity_timeout.as_secs() / 3600,
            session_max_jobs: engine.session_max_jobs,
            job_timeout_minutes: engine.job_timeout.as_secs() / 60,
            history_max_completed: engine.history_max_completed,
            agent_recycle_after_jobs: engine.agent_recycle_after_jobs,
            transport_circuit_failures: engine.transport_circuit_failures,
            transport_circuit_cooldown_seconds: engine.transport_circuit_cooldown.as_secs(),
            default_agent_count: engine.default_agent_count,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply `AF_*` environment
    /// overrides on top (env wins, matching the daemon crate's
    /// env-first precedent in `env.rs`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("AF_BIND_ADDRESS") {
            self.bind_address = v;
        }
        self.rdp_base_port = env_u16("AF_RDP_BASE_PORT", self.rdp_base_port)?;
        self.scheduler_tick_seconds = env_u64("AF_SCHEDULER_TICK_SECONDS", self.scheduler_tick_seconds)?;
        self.scheduler_send_timeout_seconds =
            env_u64("AF_SCHEDULER_SEND_TIMEOUT_SECONDS", self.scheduler_send_timeout_seconds)?;
        self.agent_heartbeat_timeout_minutes =
            env_u64("AF_AGENT_HEARTBEAT_TIMEOUT_MINUTES", self.agent_heartbeat_timeout_minutes)?;
        self.session_inactivity_timeout_hours =
            env_u64("AF_SESSION_INACTIVITY_TIMEOUT_HOURS", self.session_inactivity_timeout_hours)?;
        self.session_max_jobs = env_u32("AF_SESSION_MAX_JOBS", self.session_max_jobs)?;
        self.job_timeout_minutes = env_u64("AF_JOB_TIMEOUT_MINUTES", self.job_timeout_minutes)?;
        self.history_max_completed = env_usize("AF_HISTORY_MAX_COMPLETED", self.history_max_completed)?;
        self.agent_recycle_after_jobs = env_u32("AF_AGENT_RECYCLE_AFTER_JOBS", self.agent_recycle_after_jobs)?;
        self.transport_circuit_failures = env_u32("AF_TRANSPORT_CIRCUIT_FAILURES", self.transport_circuit_failures)?;
        self.transport_circuit_cooldown_seconds =
            env_u64("AF_TRANSPORT_CIRCUIT_COOLDOWN_SECONDS", self.transport_circuit_cooldown_seconds)?;
        self.default_agent_count = env_u32("AF_DEFAULT_AGENT_COUNT", self.default_agent_count)?;
        Ok(())
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            rdp_base_port: self.rdp_base_port,
            scheduler_tick: Duration::from_secs(self.scheduler_tick_seconds),
            scheduler_send_timeout: Duration::from_secs(self.scheduler_send_timeout_seconds),
            agent_heartbeat_timeout: Duration::from_secs(self.agent_heartbeat_timeout_minutes * 60),
            session_inactivity_timeout: Duration::from_secs(self.session_inactivity_timeout_hours * 3600),
            session_max_jobs: self.session_max_jobs,
            job_timeout: Duration::from_secs(self.job_timeout_minutes * 60),
            history_max_completed: self.history_max_completed,
            agent_recycle_after_jobs: self.agent_recycle_after_jobs,
            transport_circuit_failures: self.transport_circuit_failures,
            transport_circuit_cooldown: Duration::from_secs(self.transport_circuit_cooldown_seconds),
            default_agent_count: self.default_agent_count,
        }
    }
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue { key, detail: v }),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue { key, detail: v }),
        Err(_) => Ok(default),
    }
}

fn env_u16(key: &'static str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue { key, detail: v }),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue { key, detail: v }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_config_defaults() {
        let config = Config::default();
        let engine = config.to_engine_config();
        let expected = EngineConfig::default();
        assert_eq!(engine.rdp_base_port, expected.rdp_base_port);
        assert_eq!(engine.scheduler_tick, expected.scheduler_tick);
        assert_eq!(engine.agent_heartbeat_timeout, expected.agent_heartbeat_timeout);
        assert_eq!(engine.default_agent_count, expected.default_agent_count);
    }

    #[test]
    fn parses_toml_with_dotted_keys() {
        let toml = r#"
            "rdp.basePort" = 4000
            "scheduler.tickSeconds" = 3
            "defaultAgentCount" = 4
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.rdp_base_port, 4000);
        assert_eq!(config.scheduler_tick_seconds, 3);
        assert_eq!(config.default_agent_count, 4);
        // unspecified keys keep their serde(default) Default::default() values
        assert_eq!(config.session_max_jobs, Config::default().session_max_jobs);
    }
}
