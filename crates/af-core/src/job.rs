//! Job and Step data model (spec §3).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::define_id;
use crate::template::TemplateId;

define_id! {
    /// Opaque job identifier, e.g. `job-xxxxxxxxxxxxxxxxxxx`.
    pub struct JobId("job-");
}

use crate::agent::AgentId;

/// Job priority. `Critical > High > Normal > Low`; `Ord` follows declaration
/// order of the discriminants below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    /// One level down, floored at `Low`. Used by the Scheduler's retry path
    /// and PriorityQueue's decay-on-retry rule (§4.4, §4.5).
    pub fn decay(self) -> Self {
        match self {
            Priority::Critical => Priority::High,
            Priority::High => Priority::Normal,
            Priority::Normal => Priority::Low,
            Priority::Low => Priority::Low,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Job lifecycle status. `Retry` is never a stored status: `JobStore::transition`
/// accepts it as an input signal meaning "requeue after a failure" and
/// immediately lands the job on `Queued` (spec §4.1's `Failed → Retry → Queued`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Assigned,
    Running,
    Success,
    Failed,
    Cancelled,
    Timeout,
    Retry,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout)
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Queued => "queued",
        Assigned => "assigned",
        Running => "running",
        Success => "success",
        Failed => "failed",
        Cancelled => "cancelled",
        Timeout => "timeout",
        Retry => "retry",
    }
}

/// Closed set of UI-interaction step types (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Click,
    DoubleClick,
    RightClick,
    Type,
    KeyPress,
    Wait,
    WaitForElement,
    GetText,
    SetText,
    SelectItem,
    DragDrop,
    Scroll,
    TakeScreenshot,
    Validate,
    Custom,
}

/// A single UI interaction within a job or template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub order: u32,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default = "default_step_timeout_ms", rename = "timeoutMs")]
    pub timeout_ms: u64,
    #[serde(default, rename = "continueOnError")]
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Value>,
}

pub fn default_step_timeout_ms() -> u64 {
    5000
}

impl Step {
    pub fn new(order: u32, step_type: StepType, target: impl Into<String>) -> Self {
        Self {
            order,
            step_type,
            target: target.into(),
            value: None,
            timeout_ms: default_step_timeout_ms(),
            continue_on_error: false,
            description: None,
            parameters: IndexMap::new(),
        }
    }
}

impl Step {
    crate::setters! {
        into { description: String }
        set { timeout_ms: u64, continue_on_error: bool }
        option { value: String }
    }
}

pub fn default_max_retries() -> u32 {
    3
}

/// A unit of automation work to be executed on one agent (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    #[serde(rename = "applicationPath")]
    pub application: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
    pub steps: Vec<Step>,
    pub status: JobStatus,
    pub priority: Priority,

    #[serde(rename = "createdAt")]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "queuedAt")]
    pub queued_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "assignedAt")]
    pub assigned_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "startedAt")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "completedAt")]
    pub completed_at: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "assignedAgentId")]
    pub assigned_agent: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "errorMessage")]
    pub error: Option<String>,

    #[serde(default, rename = "retryCount")]
    pub retry_count: u32,
    #[serde(default = "default_max_retries", rename = "maxRetries")]
    pub max_retries: u32,

    #[serde(default)]
    pub screenshots: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "webhookUrl")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "templateId")]
    pub template_id: Option<TemplateId>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "templateParameters")]
    pub template_parameters: Option<IndexMap<String, Value>>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

impl Job {
    /// Construct a fresh `Pending` job with a new id. `created_at` is supplied
    /// by the caller so the store never reaches for the wall clock itself.
    pub fn new(name: impl Into<String>, application: impl Into<String>, steps: Vec<Step>, created_at: u64) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            application: application.into(),
            arguments: None,
            steps,
            status: JobStatus::Pending,
            priority: Priority::default(),
            created_at,
            queued_at: None,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            assigned_agent: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            screenshots: Vec::new(),
            webhook_url: None,
            template_id: None,
            template_parameters: None,
            metadata: IndexMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Invariant check used by tests and by the store before it commits a
    /// transition: timestamps are monotonic, `assignedAgent` tracks status,
    /// terminal jobs have both `completed_at` and a terminal reason.
    pub fn check_invariants(&self) -> Result<(), String> {
        let stamps = [self.created_at, self.queued_at.unwrap_or(self.created_at)];
        if stamps[1] < stamps[0] {
            return Err("queued_at precedes created_at".into());
        }
        if let (Some(a), Some(q)) = (self.assigned_at, self.queued_at) {
            if a < q {
                return Err("assigned_at precedes queued_at".into());
            }
        }
        if let (Some(s), Some(a)) = (self.started_at, self.assigned_at) {
            if s < a {
                return Err("started_at precedes assigned_at".into());
            }
        }
        if let (Some(c), Some(s)) = (self.completed_at, self.started_at) {
            if c < s {
                return Err("completed_at precedes started_at".into());
            }
        }
        if self.is_terminal() {
            if self.completed_at.is_none() {
                return Err("terminal job missing completed_at".into());
            }
            if self.result.is_none() && self.error.is_none() {
                return Err("terminal job missing result/error".into());
            }
        }
        if self.retry_count > self.max_retries {
            return Err("retry_count exceeds max_retries".into());
        }
        let assigned_iff_busy = matches!(self.status, JobStatus::Assigned | JobStatus::Running);
        if self.assigned_agent.is_some() != assigned_iff_busy {
            return Err("assigned_agent set iff status in {Assigned,Running}".into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
