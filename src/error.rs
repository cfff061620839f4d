// Error types shared by the quote engine, the query service and the API

use crate::quote::QuoteError;
use crate::schema::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CalcError {
    /// Shorthand for a single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>, context: &str) -> Self {
        CalcError::Validation(vec![ValidationError {
            field: field.to_string(),
            message: message.into(),
            context: context.to_string(),
        }])
    }

    pub fn no_offers() -> Self {
        CalcError::NotFound("No offers found".to_string())
    }
}

impl From<Vec<ValidationError>> for CalcError {
    fn from(errors: Vec<ValidationError>) -> Self {
        CalcError::Validation(errors)
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, CalcError>;
