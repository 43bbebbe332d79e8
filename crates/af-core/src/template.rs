//! Template data model (spec §3, §4.7).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::define_id;
use crate::job::{default_step_timeout_ms, StepType};

define_id! {
    /// Opaque template identifier, e.g. `tpl-xxxxxxxxxxxxxxxxxxx`.
    pub struct TemplateId("tpl-");
}

/// Declared type of a template parameter; values are coerced to this type at
/// expansion time (spec §4.7 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

/// One declared input to a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "validationPattern")]
    pub validation_pattern: Option<String>,
}

/// A `Step` shape that permits `{token}` placeholders in `target`/`value`/
/// `description`, resolved by [`crate::Clock`]-independent substitution at
/// expansion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTemplate {
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

/// A parameterized job recipe expanded at submission time (spec §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "applicationPath")]
    pub application: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
    pub parameters: Vec<TemplateParameter>,
    pub steps: Vec<StepTemplate>,
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
