//! JSON Schema validation of request properties.
//!
//! [`SchemaValidator`] is the contract the middleware needs from a schema engine. The default
//! implementation, [`JsonSchemaValidator`], is backed by the `jsonschema` crate:
//!
//! - dependency schemas are registered by `$id` and resolved locally for `$ref`, never over the network;
//! - custom schema properties become `jsonschema` keywords;
//! - errors are reported with dotted property paths rooted at a label (`request.body.firstName`).
//!
//! A boolean `"required"` at the schema root marks the request property itself as mandatory. It is
//! stripped before compilation: a missing instance then yields `is required`, otherwise it is valid.
//! Below the root, draft-3 style `"required": true` on a property schema is folded into the parent's
//! `required` array.
//!
//! Errors for one instance location are reported in the order their keywords appear in the schema.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::paths::{LazyLocation, Location};
use jsonschema::{Keyword, Retrieve, Uri, ValidationError, Validator};
use serde_json::{Map, Value};

use crate::format::{RawError, ValidatorResult};
use crate::properties::{PropertyEvaluator, SchemaProperties};
use crate::CoreError;

/// Per-call validator options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Prefix of every reported property path, e.g. `request.body`.
    pub root_label: String,
}

impl ValidateOptions {
    pub fn new(root_label: impl Into<String>) -> Self {
        Self {
            root_label: root_label.into(),
        }
    }
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self::new("instance")
    }
}

/// Schema engine used by [`crate::ValidationMiddleware`].
pub trait SchemaValidator: Send + Sync {
    /// Register a schema that other schemas reference through `$ref`.
    fn add_schema(&mut self, schema: Value) -> Result<(), CoreError>;

    /// Compile `schema` ahead of the first request so broken schemas fail at startup.
    fn prepare(&self, _schema: &Value) -> Result<(), CoreError> {
        Ok(())
    }

    /// Validate `instance` (absent when the request has no such property) against `schema`.
    fn validate(
        &self,
        instance: Option<&Value>,
        schema: &Value,
        options: &ValidateOptions,
    ) -> Result<ValidatorResult, CoreError>;
}

struct CompiledSchema {
    validator: Validator,
    required: bool,
    /// Schema as compiled, used to rank errors by keyword position.
    schema: Value,
}

/// [`SchemaValidator`] backed by the `jsonschema` crate. Compiled schemas are cached by schema text.
pub struct JsonSchemaValidator {
    properties: SchemaProperties,
    dependencies: HashMap<String, Value>,
    compiled: RwLock<HashMap<String, Arc<CompiledSchema>>>,
}

impl JsonSchemaValidator {
    pub fn new(properties: SchemaProperties) -> Self {
        Self {
            properties,
            dependencies: HashMap::new(),
            compiled: RwLock::new(HashMap::new()),
        }
    }

    pub fn properties(&self) -> &SchemaProperties {
        &self.properties
    }

    pub fn dependency_ids(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    fn compiled(&self, schema: &Value, label: &str) -> Result<Arc<CompiledSchema>, CoreError> {
        let key = schema.to_string();
        if let Some(hit) = self
            .compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }
        let compiled = Arc::new(self.compile(schema, label)?);
        self.compiled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    fn compile(&self, schema: &Value, label: &str) -> Result<CompiledSchema, CoreError> {
        let (required, schema) = normalize(schema);
        let mut opts = jsonschema::options();
        opts.should_validate_formats(true);
        opts.with_retriever(DependencyRetriever {
            schemas: self.dependencies.clone(),
        });
        for (name, evaluate) in self.properties.iter() {
            let evaluate = Arc::clone(evaluate);
            opts.with_keyword(
                name,
                move |parent: &Map<String, Value>, _value: &Value, schema_path: Location| {
                    let keyword: Box<dyn Keyword> = Box::new(CustomKeyword {
                        subschema: Value::Object(parent.clone()),
                        evaluate: Arc::clone(&evaluate),
                        schema_path,
                    });
                    Ok(keyword)
                },
            );
        }
        let validator = opts
            .build(&schema)
            .map_err(|e| CoreError::InvalidSchema {
                property: label.to_owned(),
                reason: e.to_string(),
            })?;
        tracing::debug!(schema = label, required, "compiled schema");
        Ok(CompiledSchema {
            validator,
            required,
            schema,
        })
    }
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self::new(SchemaProperties::default())
    }
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator")
            .field("properties", &self.properties)
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn add_schema(&mut self, mut schema: Value) -> Result<(), CoreError> {
        let id = schema
            .get("$id")
            .or_else(|| schema.get("id"))
            .and_then(Value::as_str)
            .map(|id| id.trim_end_matches('#').to_owned())
            .ok_or_else(|| CoreError::InvalidSchema {
                property: "schema dependency".into(),
                reason: "missing \"$id\"".into(),
            })?;
        fold_required(&mut schema);
        tracing::debug!(id = %id, "registered schema dependency");
        self.dependencies.insert(id, schema);
        self.compiled
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn prepare(&self, schema: &Value) -> Result<(), CoreError> {
        self.compiled(schema, "schema").map(|_| ())
    }

    fn validate(
        &self,
        instance: Option<&Value>,
        schema: &Value,
        options: &ValidateOptions,
    ) -> Result<ValidatorResult, CoreError> {
        let compiled = self.compiled(schema, &options.root_label)?;
        let Some(instance) = instance else {
            if !compiled.required {
                return Ok(ValidatorResult::valid());
            }
            return Ok(ValidatorResult::from_errors(vec![RawError {
                instance_path: String::new(),
                property: options.root_label.clone(),
                message: "is required".to_string(),
                value: None,
            }]));
        };
        let mut ranked: Vec<(String, Option<usize>, RawError)> = compiled
            .validator
            .iter_errors(instance)
            .map(|e| {
                let schema_path = e.schema_path.to_string();
                let rank = keyword_rank(&compiled.schema, &schema_path);
                let error = raw_error(&e, instance, &options.root_label);
                (parent_path(&schema_path).to_owned(), rank, error)
            })
            .collect();
        sort_by_declaration(&mut ranked);
        Ok(ValidatorResult::from_errors(
            ranked.into_iter().map(|(_, _, error)| error).collect(),
        ))
    }
}

/// Resolves `$ref` URIs against registered dependency schemas.
struct DependencyRetriever {
    schemas: HashMap<String, Value>,
}

impl Retrieve for DependencyRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri = uri.as_str();
        // Relative ids such as "/UserSchema" resolve against the default base "json-schema:///".
        let relative = uri.strip_prefix("json-schema://").unwrap_or(uri);
        let last = uri.rsplit('/').next().unwrap_or(uri);
        [uri, relative, last]
            .into_iter()
            .find_map(|candidate| self.schemas.get(candidate))
            .cloned()
            .ok_or_else(|| format!("schema dependency {uri:?} is not registered").into())
    }
}

/// Bridges a [`PropertyEvaluator`] into a `jsonschema` keyword.
struct CustomKeyword {
    subschema: Value,
    evaluate: PropertyEvaluator,
    schema_path: Location,
}

impl Keyword for CustomKeyword {
    fn validate<'i>(
        &self,
        instance: &'i Value,
        location: &LazyLocation,
    ) -> Result<(), ValidationError<'i>> {
        match (self.evaluate)(instance, &self.subschema) {
            None => Ok(()),
            Some(message) => Err(ValidationError::custom(
                self.schema_path.clone(),
                location.into(),
                instance,
                message,
            )),
        }
    }

    fn is_valid(&self, instance: &Value) -> bool {
        (self.evaluate)(instance, &self.subschema).is_none()
    }
}

/// Strip the root boolean `required` and fold nested draft-3 `"required": bool` into parent arrays.
fn normalize(schema: &Value) -> (bool, Value) {
    let mut schema = schema.clone();
    let mut required = false;
    if let Some(map) = schema.as_object_mut() {
        if let Some(Value::Bool(flag)) = map.get("required") {
            required = *flag;
            map.shift_remove("required");
        }
    }
    fold_required(&mut schema);
    (required, schema)
}

/// Keywords whose values are data, not subschemas.
const DATA_KEYWORDS: &[&str] = &["enum", "const", "default", "examples"];

fn fold_required(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            let mut folded = Vec::new();
            if let Some(Value::Object(properties)) = map.get_mut("properties") {
                for (name, property) in properties.iter_mut() {
                    let Some(child) = property.as_object_mut() else {
                        continue;
                    };
                    if let Some(Value::Bool(flag)) = child.get("required") {
                        if *flag {
                            folded.push(Value::String(name.clone()));
                        }
                        child.shift_remove("required");
                    }
                }
            }
            if !folded.is_empty() {
                match map.get_mut("required") {
                    Some(Value::Array(names)) => {
                        for name in folded {
                            if !names.contains(&name) {
                                names.push(name);
                            }
                        }
                    }
                    _ => {
                        map.insert("required".to_owned(), Value::Array(folded));
                    }
                }
            }
            for (keyword, value) in map.iter_mut() {
                if !DATA_KEYWORDS.contains(&keyword.as_str()) {
                    fold_required(value);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(fold_required),
        _ => {}
    }
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn parent_path(schema_path: &str) -> &str {
    schema_path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Position of the failing keyword within its schema object. `None` when the path leaves `schema`
/// (through `$ref`, for instance).
fn keyword_rank(schema: &Value, schema_path: &str) -> Option<usize> {
    let mut segments: Vec<String> = schema_path.split('/').skip(1).map(unescape).collect();
    let keyword = segments.pop()?;
    let mut node = schema;
    for segment in &segments {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    node.as_object()?.keys().position(|k| *k == keyword)
}

/// Within each run of errors sharing an instance location and a schema object, order errors by
/// keyword position. Unranked errors keep their relative order after the ranked ones.
fn sort_by_declaration(errors: &mut [(String, Option<usize>, RawError)]) {
    let mut start = 0;
    while start < errors.len() {
        let (parent, _, first) = &errors[start];
        let end = start
            + errors[start..]
                .iter()
                .take_while(|(p, _, e)| p == parent && e.instance_path == first.instance_path)
                .count();
        errors[start..end].sort_by_key(|(_, rank, _)| rank.unwrap_or(usize::MAX));
        start = end;
    }
}

fn raw_error(error: &ValidationError<'_>, instance: &Value, root_label: &str) -> RawError {
    let instance_path = error.instance_path.to_string();
    let mut property = display_path(root_label, &instance_path, instance);
    let message = describe(&error.kind).unwrap_or_else(|| error.to_string());
    let value = match &error.kind {
        ValidationErrorKind::Required { property: missing } => {
            match missing.as_str() {
                Some(name) => push_key(&mut property, name),
                None => push_key(&mut property, &missing.to_string()),
            }
            None
        }
        _ => Some(Value::clone(&error.instance)),
    };
    RawError {
        instance_path,
        property,
        message,
        value,
    }
}

fn describe(kind: &ValidationErrorKind) -> Option<String> {
    let message = match kind {
        ValidationErrorKind::Required { .. } => "is required".to_string(),
        ValidationErrorKind::MinLength { limit } | ValidationErrorKind::MinItems { limit } => {
            format!("does not meet minimum length of {limit}")
        }
        ValidationErrorKind::MaxLength { limit } | ValidationErrorKind::MaxItems { limit } => {
            format!("does not meet maximum length of {limit}")
        }
        ValidationErrorKind::Format { format } => {
            format!("does not conform to the \"{format}\" format")
        }
        ValidationErrorKind::Pattern { pattern } => format!("does not match pattern \"{pattern}\""),
        ValidationErrorKind::Minimum { limit } => format!("must be greater than or equal to {limit}"),
        ValidationErrorKind::Maximum { limit } => format!("must be less than or equal to {limit}"),
        ValidationErrorKind::Enum { options } => {
            let options = match options {
                Value::Array(items) => items.iter().map(plain).collect::<Vec<_>>().join(","),
                other => plain(other),
            };
            format!("is not one of enum values: {options}")
        }
        ValidationErrorKind::Type { kind } => {
            let types = match kind {
                TypeKind::Single(ty) => ty.to_string(),
                TypeKind::Multiple(types) => (*types)
                    .into_iter()
                    .map(|ty| ty.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            };
            format!("is not of a type(s) {types}")
        }
        ValidationErrorKind::Custom { message } => message.clone(),
        _ => return None,
    };
    Some(message)
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a JSON Pointer as `label.key[0]["odd key"]`, walking `instance` to tell array indices from keys.
fn display_path(root_label: &str, pointer: &str, instance: &Value) -> String {
    let mut out = root_label.to_owned();
    let mut current = Some(instance);
    for raw in pointer.split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        match current {
            Some(Value::Array(items)) => {
                out.push('[');
                out.push_str(&segment);
                out.push(']');
                current = segment.parse::<usize>().ok().and_then(|i| items.get(i));
            }
            other => {
                push_key(&mut out, &segment);
                current = other.and_then(|v| v.get(segment.as_str()));
            }
        }
    }
    out
}

fn push_key(out: &mut String, key: &str) {
    if is_identifier(key) {
        out.push('.');
        out.push_str(key);
    } else {
        out.push('[');
        out.push_str(&Value::String(key.to_owned()).to_string());
        out.push(']');
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
