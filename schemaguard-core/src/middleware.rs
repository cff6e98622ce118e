//! Validation middleware: validates configured request properties before the rest of the chain runs.
//!
//! ```ignore
//! let middleware = ValidationMiddleware::builder()
//!     .schema_dependency(address_schema)
//!     .failure_mode(FailureMode::Proceed)
//!     .build([("body", user_schema), ("query", token_schema)])?;
//! pipeline.add_middleware(middleware);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::format::{format_validations, ValidationFailure, ValidationReport};
use crate::pipeline::{Request, Response};
use crate::properties::SchemaProperties;
use crate::schema::{JsonSchemaValidator, SchemaValidator, ValidateOptions};
use crate::CoreError;

/// Continuation handed to a middleware: either proceed down the chain or pass a failure along.
pub struct Next<'a> {
    chain: &'a dyn Fn(&mut Response, Option<CoreError>) -> Result<(), CoreError>,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a dyn Fn(&mut Response, Option<CoreError>) -> Result<(), CoreError>) -> Self {
        Self { chain }
    }

    pub fn proceed(self, response: &mut Response) -> Result<(), CoreError> {
        (self.chain)(response, None)
    }

    pub fn fail(self, response: &mut Response, error: CoreError) -> Result<(), CoreError> {
        (self.chain)(response, Some(error))
    }
}

/// Request middleware: `(request, response, next)`.
pub trait Middleware: Send + Sync {
    fn handle(&self, request: &Request, response: &mut Response, next: Next<'_>) -> Result<(), CoreError>;
}

impl<F> Middleware for F
where
    F: Fn(&Request, &mut Response, Next<'_>) -> Result<(), CoreError> + Send + Sync,
{
    fn handle(&self, request: &Request, response: &mut Response, next: Next<'_>) -> Result<(), CoreError> {
        self(request, response, next)
    }
}

/// Called when every configured request property is valid. Receives the validated property names.
pub type ValidHook =
    Arc<dyn Fn(&[String], &Request, &mut Response, Next<'_>) -> Result<(), CoreError> + Send + Sync>;

/// Called with the failure when at least one request property is invalid.
pub type InvalidHook = Arc<
    dyn Fn(ValidationFailure, &Request, &mut Response, Next<'_>) -> Result<(), CoreError> + Send + Sync,
>;

/// How the default invalid hook delivers a [`ValidationFailure`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailureMode {
    /// Return `Err(CoreError::Validation(..))` from the middleware.
    #[default]
    Raise,
    /// Hand the error to [`Next::fail`].
    Proceed,
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raise" => Ok(FailureMode::Raise),
            "proceed" => Ok(FailureMode::Proceed),
            other => Err(format!("unknown failure mode {other:?} (expected raise or proceed)")),
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureMode::Raise => f.write_str("raise"),
            FailureMode::Proceed => f.write_str("proceed"),
        }
    }
}

fn default_valid_hook() -> ValidHook {
    Arc::new(
        |_keys: &[String], _request: &Request, response: &mut Response, next: Next<'_>| {
            next.proceed(response)
        },
    )
}

fn default_invalid_hook(mode: FailureMode) -> InvalidHook {
    match mode {
        FailureMode::Raise => Arc::new(
            |failure: ValidationFailure, _request: &Request, _response: &mut Response, _next: Next<'_>| {
                Err(CoreError::Validation(failure))
            },
        ),
        FailureMode::Proceed => Arc::new(
            |failure: ValidationFailure, _request: &Request, response: &mut Response, next: Next<'_>| {
                next.fail(response, CoreError::Validation(failure))
            },
        ),
    }
}

/// Builder for [`ValidationMiddleware`].
#[derive(Default)]
pub struct ValidationOptions {
    validator: Option<Box<dyn SchemaValidator>>,
    properties: SchemaProperties,
    dependencies: Vec<Value>,
    failure_mode: FailureMode,
    on_valid: Option<ValidHook>,
    on_invalid: Option<InvalidHook>,
}

impl ValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `validator` instead of a [`JsonSchemaValidator`]. Custom properties set through
    /// [`ValidationOptions::properties`] are then ignored.
    pub fn validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn properties(mut self, properties: SchemaProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn schema_dependency(mut self, schema: Value) -> Self {
        self.dependencies.push(schema);
        self
    }

    pub fn schema_dependencies(mut self, schemas: impl IntoIterator<Item = Value>) -> Self {
        self.dependencies.extend(schemas);
        self
    }

    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    pub fn on_valid<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[String], &Request, &mut Response, Next<'_>) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.on_valid = Some(Arc::new(hook));
        self
    }

    pub fn on_invalid<F>(mut self, hook: F) -> Self
    where
        F: Fn(ValidationFailure, &Request, &mut Response, Next<'_>) -> Result<(), CoreError>
            + Send
            + Sync
            + 'static,
    {
        self.on_invalid = Some(Arc::new(hook));
        self
    }

    /// Register dependencies, compile every schema and assemble the middleware.
    ///
    /// Errors here are configuration errors: a dependency without `$id`, a request property listed
    /// twice, an unresolvable `$ref`, or a schema the validator cannot compile.
    pub fn build<I, K>(self, schemas: I) -> Result<ValidationMiddleware, CoreError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut validator: Box<dyn SchemaValidator> = match self.validator {
            Some(validator) => validator,
            None => Box::new(JsonSchemaValidator::new(self.properties)),
        };
        for dependency in self.dependencies {
            validator.add_schema(dependency)?;
        }

        let schemas: Vec<(String, Value)> = schemas
            .into_iter()
            .map(|(key, schema)| (key.into(), schema))
            .collect();
        for (i, (key, schema)) in schemas.iter().enumerate() {
            if schemas[..i].iter().any(|(earlier, _)| earlier == key) {
                return Err(CoreError::InvalidSchema {
                    property: format!("request.{key}"),
                    reason: "request property declared more than once".into(),
                });
            }
            validator.prepare(schema).map_err(|e| match e {
                CoreError::InvalidSchema { reason, .. } => CoreError::InvalidSchema {
                    property: format!("request.{key}"),
                    reason,
                },
                other => other,
            })?;
        }

        Ok(ValidationMiddleware {
            keys: schemas.iter().map(|(key, _)| key.clone()).collect(),
            schemas,
            validator,
            on_valid: self.on_valid.unwrap_or_else(default_valid_hook),
            on_invalid: self
                .on_invalid
                .unwrap_or_else(|| default_invalid_hook(self.failure_mode)),
        })
    }
}

/// Validates request properties against their schemas, one validator call per property.
pub struct ValidationMiddleware {
    schemas: Vec<(String, Value)>,
    keys: Vec<String>,
    validator: Box<dyn SchemaValidator>,
    on_valid: ValidHook,
    on_invalid: InvalidHook,
}

impl ValidationMiddleware {
    pub fn builder() -> ValidationOptions {
        ValidationOptions::new()
    }

    /// Request property names this middleware validates, in declaration order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Validate without running hooks. `None` when every property is valid.
    pub fn validate_request(&self, request: &Request) -> Result<Option<ValidationReport>, CoreError> {
        let mut invalid = Vec::new();
        for (key, schema) in &self.schemas {
            let options = ValidateOptions::new(format!("request.{key}"));
            let result = self
                .validator
                .validate(request.property(key), schema, &options)?;
            if !result.valid {
                invalid.push((key.clone(), result));
            }
        }
        if invalid.is_empty() {
            return Ok(None);
        }
        Ok(Some(format_validations(&invalid)))
    }
}

impl Middleware for ValidationMiddleware {
    fn handle(&self, request: &Request, response: &mut Response, next: Next<'_>) -> Result<(), CoreError> {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            properties = ?self.keys,
            "validating request"
        );
        match self.validate_request(request)? {
            None => (self.on_valid)(&self.keys, request, response, next),
            Some(report) => {
                tracing::info!(
                    method = %request.method,
                    path = %request.path,
                    failed = report.len(),
                    "request failed schema validation"
                );
                (self.on_invalid)(ValidationFailure::new(report), request, response, next)
            }
        }
    }
}

impl fmt::Debug for ValidationMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationMiddleware")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// Middleware with default options: `schemas` maps request property names to schemas,
/// `schema_dependencies` are registered for `$ref` resolution.
pub fn validate<I, K>(
    schemas: I,
    schema_dependencies: impl IntoIterator<Item = Value>,
) -> Result<ValidationMiddleware, CoreError>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    ValidationOptions::new()
        .schema_dependencies(schema_dependencies)
        .build(schemas)
}
