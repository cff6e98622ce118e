//! Custom schema properties: named constraint evaluators that extend the schema vocabulary.
//!
//! A [`SchemaProperties`] value is plain configuration. It is built once at startup and handed to
//! [`crate::JsonSchemaValidator::new`], which turns every entry into a keyword of that validator only.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::CoreError;

/// Evaluates one custom keyword: `(instance, subschema) -> error message`.
///
/// `subschema` is the schema object carrying the keyword, so an evaluator for `includes` reads its
/// argument from `subschema["includes"]`.
pub type PropertyEvaluator = Arc<dyn Fn(&Value, &Value) -> Option<String> + Send + Sync>;

/// Keywords the validator already understands (draft 3 through 2020-12).
pub const BUILTIN_PROPERTIES: &[&str] = &[
    "$ref",
    "$schema",
    "$id",
    "id",
    "$defs",
    "definitions",
    "$anchor",
    "$dynamicRef",
    "$dynamicAnchor",
    "$recursiveRef",
    "$recursiveAnchor",
    "$vocabulary",
    "type",
    "enum",
    "const",
    "multipleOf",
    "divisibleBy",
    "maximum",
    "exclusiveMaximum",
    "minimum",
    "exclusiveMinimum",
    "maxLength",
    "minLength",
    "pattern",
    "format",
    "items",
    "prefixItems",
    "additionalItems",
    "unevaluatedItems",
    "contains",
    "minContains",
    "maxContains",
    "maxItems",
    "minItems",
    "uniqueItems",
    "maxProperties",
    "minProperties",
    "required",
    "properties",
    "patternProperties",
    "additionalProperties",
    "unevaluatedProperties",
    "dependencies",
    "dependentRequired",
    "dependentSchemas",
    "propertyNames",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "disallow",
    "extends",
    "contentEncoding",
    "contentMediaType",
    "contentSchema",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_PROPERTIES.contains(&name)
}

/// Registry of custom schema properties.
#[derive(Clone, Default)]
pub struct SchemaProperties {
    evaluators: BTreeMap<String, PropertyEvaluator>,
}

impl SchemaProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`. Fails with [`CoreError::PropertyExists`] if the validator already has a keyword
    /// of that name or it was registered before.
    pub fn add<F>(&mut self, name: &str, evaluate: F) -> Result<&mut Self, CoreError>
    where
        F: Fn(&Value, &Value) -> Option<String> + Send + Sync + 'static,
    {
        self.check_available(name)?;
        self.evaluators.insert(name.to_owned(), Arc::new(evaluate));
        tracing::debug!(property = name, "registered custom schema property");
        Ok(self)
    }

    /// Builder form of [`SchemaProperties::add`].
    pub fn with<F>(mut self, name: &str, evaluate: F) -> Result<Self, CoreError>
    where
        F: Fn(&Value, &Value) -> Option<String> + Send + Sync + 'static,
    {
        self.add(name, evaluate)?;
        Ok(self)
    }

    /// Register several properties at once. Nothing is registered unless every name is available.
    pub fn add_all<I, N>(&mut self, properties: I) -> Result<&mut Self, CoreError>
    where
        I: IntoIterator<Item = (N, PropertyEvaluator)>,
        N: Into<String>,
    {
        let batch: Vec<(String, PropertyEvaluator)> = properties
            .into_iter()
            .map(|(name, evaluate)| (name.into(), evaluate))
            .collect();
        for (i, (name, _)) in batch.iter().enumerate() {
            self.check_available(name)?;
            if batch[..i].iter().any(|(earlier, _)| earlier == name) {
                return Err(CoreError::PropertyExists(name.clone()));
            }
        }
        for (name, evaluate) in batch {
            tracing::debug!(property = %name, "registered custom schema property");
            self.evaluators.insert(name, evaluate);
        }
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&PropertyEvaluator> {
        self.evaluators.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.evaluators.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyEvaluator)> {
        self.evaluators.iter().map(|(name, evaluate)| (name.as_str(), evaluate))
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    fn check_available(&self, name: &str) -> Result<(), CoreError> {
        if is_builtin(name) || self.evaluators.contains_key(name) {
            return Err(CoreError::PropertyExists(name.to_owned()));
        }
        Ok(())
    }
}

impl fmt::Debug for SchemaProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.evaluators.keys()).finish()
    }
}
