//! Schemaguard core: validation of request properties against JSON Schema, report formatting,
//! custom schema properties, validation middleware and a small synchronous request pipeline.

pub mod format;
pub mod middleware;
pub mod pipeline;
pub mod properties;
pub mod schema;

pub use format::{
    format_validations, FormattedPropertyValidation, RawError, ValidationFailure, ValidationReport,
    ValidatorResult,
};
pub use middleware::{
    validate, FailureMode, InvalidHook, Middleware, Next, ValidHook, ValidationMiddleware,
    ValidationOptions,
};
pub use pipeline::{validation_error_handler, ErrorHandler, Pipeline, Request, RequestHandler, Response};
pub use properties::{PropertyEvaluator, SchemaProperties};
pub use schema::{JsonSchemaValidator, SchemaValidator, ValidateOptions};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(
        "schemaguard: The schema property \"{0}\" already exists. See if it achieves what you need or try giving it another name."
    )]
    PropertyExists(String),
    #[error("invalid schema for {property}: {reason}")]
    InvalidSchema { property: String, reason: String },
    #[error("schemaguard: Invalid data found")]
    Validation(ValidationFailure),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("handler error: {0}")]
    Handler(String),
}

impl CoreError {
    /// True for errors raised while building validators or middleware, before any request is seen.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoreError::PropertyExists(_) | CoreError::InvalidSchema { .. })
    }

    /// The validation report carried by a validation failure.
    pub fn validations(&self) -> Option<&ValidationReport> {
        match self {
            CoreError::Validation(failure) => Some(&failure.validations),
            _ => None,
        }
    }
}
