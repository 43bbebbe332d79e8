//! TemplateEngine: validates parameters, substitutes tokens, expands a
//! [`Template`] into a concrete [`Job`] (spec §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use af_core::{Job, ParamType, Priority, Step, Template, TemplateId, TemplateParameter};
use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

use crate::error::EngineError;

/// A per-template-id rule computing derived parameters (spec §4.7 step 3,
/// e.g. a calculator template computing `{result}` from its operands).
/// Takes the already-resolved, stringified declared parameters and returns
/// additional name → value pairs to fold into the substitution map.
pub type DerivationRule = dyn Fn(&IndexMap<String, String>) -> IndexMap<String, String> + Send + Sync;

fn token_pattern() -> Regex {
    // Tokens are brace-delimited (`{name}`); the closing brace disambiguates
    // a short name from a longer one sharing a prefix (`{n}` vs `{num}`), so
    // a single scan resolves every occurrence without re-expanding already
    // substituted text.
    Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("token pattern is a constant, always valid")
}

/// Registry of templates and their derivation rules, expanding parameterized
/// recipes into concrete jobs (spec §4.7).
pub struct TemplateEngine {
    templates: Mutex<HashMap<TemplateId, Template>>,
    derivations: Mutex<HashMap<TemplateId, Arc<DerivationRule>>>,
    token_re: Regex,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self { templates: Mutex::new(HashMap::new()), derivations: Mutex::new(HashMap::new()), token_re: token_pattern() }
    }

    pub fn register(&self, template: Template) {
        self.templates.lock().insert(template.id, template);
    }

    /// Attach a derivation rule for a template id (spec §4.7 step 3).
    pub fn register_derivation(
        &self,
        id: TemplateId,
        rule: impl Fn(&IndexMap<String, String>) -> IndexMap<String, String> + Send + Sync + 'static,
    ) {
        self.derivations.lock().insert(id, Arc::new(rule));
    }

    pub fn get(&self, id: &TemplateId) -> Option<Template> {
        self.templates.lock().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Template> {
        self.templates.lock().values().cloned().collect()
    }

    /// Expand a template with the given raw parameters into a fresh
    /// `Pending` job (spec §4.7). `priority` overrides the default `Normal`
    /// when set.
    pub fn expand(
        &self,
        id: &TemplateId,
        params: &IndexMap<String, Value>,
        now_ms: u64,
        priority: Option<Priority>,
    ) -> Result<Job, EngineError> {
        let template = self.get(id).ok_or_else(|| EngineError::TemplateNotFound(*id))?;

        let mut resolved: IndexMap<String, String> = IndexMap::new();
        for decl in &template.parameters {
            let raw = params.get(&decl.name).cloned().or_else(|| decl.default.clone());
            let Some(raw) = raw else {
                if decl.required {
                    return Err(EngineError::ParamMissing(decl.name.clone()));
                }
                continue;
            };
            let value = coerce(decl, &raw)?;
            if let Some(pattern) = &decl.validation_pattern {
                let re = Regex::new(pattern)
                    .map_err(|e| EngineError::ParamInvalid { name: decl.name.clone(), detail: e.to_string() })?;
                if !re.is_match(&value) {
                    return Err(EngineError::ParamInvalid {
                        name: decl.name.clone(),
                        detail: format!("{value:?} does not match {pattern:?}"),
                    });
                }
            }
            resolved.insert(decl.name.clone(), value);
        }

        if let Some(rule) = self.derivations.lock().get(id).cloned() {
            for (k, v) in rule(&resolved) {
                resolved.insert(k, v);
            }
        }

        let mut unresolved = Vec::new();
        let steps: Vec<Step> = template
            .steps
            .iter()
            .map(|st| {
                let mut step = Step::new(st.order, st.step_type, self.substitute(&st.target, &resolved, &mut unresolved));
                if let Some(value) = &st.value {
                    step = step.value(self.substitute(value, &resolved, &mut unresolved));
                }
                if let Some(description) = &st.description {
                    step = step.description(self.substitute(description, &resolved, &mut unresolved));
                }
                step = step.timeout_ms(st.timeout_ms).continue_on_error(st.continue_on_error);
                step.parameters = st.parameters.clone();
                step
            })
            .collect();

        if !unresolved.is_empty() {
            unresolved.sort();
            unresolved.dedup();
            return Err(EngineError::UnresolvedTokens(unresolved));
        }

        let mut steps = steps;
        steps.sort_by_key(|s| s.order);

        let mut job = Job::new(template.name.clone(), template.application.clone(), steps, now_ms);
        job.arguments = template.arguments.clone();
        job.priority = priority.unwrap_or_default();
        job.template_id = Some(template.id);
        job.template_parameters = Some(resolved.into_iter().map(|(k, v)| (k, Value::String(v))).collect());
        Ok(job)
    }

    fn substitute(&self, text: &str, values: &IndexMap<String, String>, unresolved: &mut Vec<String>) -> String {
        self.token_re
            .replace_all(text, |caps: &regex::Captures| {
                let name = &caps[1];
                match values.get(name) {
                    Some(v) => v.clone(),
                    None => {
                        unresolved.push(name.to_string());
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}

fn coerce(decl: &TemplateParameter, raw: &Value) -> Result<String, EngineError> {
    match decl.param_type {
        ParamType::String => match raw {
            Value::String(s) => Ok(s.clone()),
            other => Ok(other.to_string()),
        },
        ParamType::Number => match raw {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => s
                .parse::<f64>()
                .map(|n| n.to_string())
                .map_err(|_| EngineError::ParamInvalid { name: decl.name.clone(), detail: format!("{raw} is not a number") }),
            _ => Err(EngineError::ParamInvalid { name: decl.name.clone(), detail: format!("{raw} is not a number") }),
        },
        ParamType::Boolean => match raw {
            Value::Bool(b) => Ok(b.to_string()),
            Value::String(s) if s == "true" || s == "false" => Ok(s.clone()),
            _ => Err(EngineError::ParamInvalid { name: decl.name.clone(), detail: format!("{raw} is not a boolean") }),
        },
    }
}

#[cfg(test)]
#[path = "template_engine_tests.rs"]
mod tests;
