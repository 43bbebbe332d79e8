//! TemplateEngine-specific errors (spec §4.7), mapped onto [`DomainError`]
//! at the edge (IngressAPI and anywhere else this crosses a crate boundary).

use af_core::{DomainError, TemplateId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("template {0} not found")]
    TemplateNotFound(TemplateId),
    #[error("missing required parameter: {0}")]
    ParamMissing(String),
    #[error("invalid parameter {name}: {detail}")]
    ParamInvalid { name: String, detail: String },
    #[error("unresolved template token(s): {0:?}")]
    UnresolvedTokens(Vec<String>),
}

impl From<EngineError> for DomainError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::TemplateNotFound(id) => DomainError::not_found(format!("template {id}")),
            _ => DomainError::invalid_input(err.to_string()),
        }
    }
}
