use thiserror::Error;

use crate::compile::FieldErrors;
use crate::spec::field::FieldType;

/// Rejected input or lookup on a mounted form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{0}' is not currently rendered")]
    Hidden(String),
    #[error("field '{0}' is disabled")]
    Disabled(String),
    #[error("field '{field}' ({kind}) does not accept {input} input")]
    UnsupportedInput {
        field: String,
        kind: FieldType,
        input: &'static str,
    },
    #[error("no renderer registered for field type {0}")]
    MissingRenderer(FieldType),
}

/// Why a submission was blocked.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("{} field(s) failed validation", .0.len())]
    Invalid(FieldErrors),
    #[error("{} conditionally required field(s) are empty", .0.len())]
    ConditionallyRequired(FieldErrors),
}

impl SubmitError {
    pub fn errors(&self) -> &FieldErrors {
        match self {
            SubmitError::Invalid(errors) | SubmitError::ConditionallyRequired(errors) => errors,
        }
    }

    /// `schema` for the compiled rules, `conditional` for the submit-time scan.
    pub fn phase(&self) -> &'static str {
        match self {
            SubmitError::Invalid(_) => "schema",
            SubmitError::ConditionallyRequired(_) => "conditional",
        }
    }
}
