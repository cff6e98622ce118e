//! Rule files: which request properties to validate, and the schemas they `$ref`.
//!
//! ```json
//! { "schemas": { "body": { "type": "object" } }, "dependencies": [ { "$id": "..." } ] }
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use schemaguard_core::{FailureMode, ValidationMiddleware};

use crate::CliError;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Rules {
    /// Request property name -> schema.
    pub schemas: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<Value>,
}

impl Rules {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rules: Rules = serde_json::from_str(&text).map_err(|source| CliError::Json {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(
            path = %path.display(),
            schemas = rules.schemas.len(),
            dependencies = rules.dependencies.len(),
            "loaded rules"
        );
        Ok(rules)
    }

    pub fn middleware(&self, mode: FailureMode) -> Result<ValidationMiddleware, CliError> {
        let middleware = ValidationMiddleware::builder()
            .schema_dependencies(self.dependencies.iter().cloned())
            .failure_mode(mode)
            .build(self.schemas.clone())?;
        Ok(middleware)
    }
}
