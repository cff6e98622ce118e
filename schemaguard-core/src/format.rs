//! Validator output and the report shape handed to error handlers.
//!
//! The validator produces one [`RawError`] per violated constraint, possibly several per field.
//! [`format_validations`] folds those into a [`ValidationReport`] with one entry per run of
//! errors on the same property path.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// One violated constraint, as reported by a [`crate::SchemaValidator`].
#[derive(Clone, Debug, PartialEq)]
pub struct RawError {
    /// JSON Pointer into the validated instance (`/address/city`).
    pub instance_path: String,
    /// Display path rooted at the root label (`request.body.address.city`).
    pub property: String,
    pub message: String,
    /// Offending value; `None` when the instance does not exist (e.g. a missing required field).
    pub value: Option<Value>,
}

/// Result of validating one request property.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidatorResult {
    pub valid: bool,
    pub errors: Vec<RawError>,
}

impl ValidatorResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<RawError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// All messages for one property path, in validator order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormattedPropertyValidation {
    pub property: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub messages: Vec<String>,
}

/// Request property name -> formatted validations. Keeps the order in which properties were validated
/// and serializes as a JSON object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    entries: Vec<(String, Vec<FormattedPropertyValidation>)>,
}

impl ValidationReport {
    pub fn get(&self, request_property: &str) -> Option<&[FormattedPropertyValidation]> {
        self.entries
            .iter()
            .find(|(name, _)| name == request_property)
            .map(|(_, v)| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FormattedPropertyValidation])> {
        self.entries
            .iter()
            .map(|(name, v)| (name.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> Vec<(String, Vec<FormattedPropertyValidation>)> {
        self.entries
    }
}

impl Serialize for ValidationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, validations) in &self.entries {
            map.serialize_entry(name, validations)?;
        }
        map.end()
    }
}

/// Consolidate raw validator errors per request property.
///
/// Errors are grouped by adjacency: a new entry starts whenever the property path differs from the
/// previous error's path, so two errors for the same path separated by another path stay as two
/// entries. Empty error lists produce empty entries; callers decide which properties to include.
pub fn format_validations(validations: &[(String, ValidatorResult)]) -> ValidationReport {
    let entries = validations
        .iter()
        .map(|(request_property, result)| {
            let mut consolidated: Vec<FormattedPropertyValidation> = Vec::new();
            for err in &result.errors {
                if let Some(current) = consolidated
                    .last_mut()
                    .filter(|current| current.property == err.property)
                {
                    current.messages.push(err.message.clone());
                    continue;
                }
                consolidated.push(FormattedPropertyValidation {
                    property: err.property.clone(),
                    value: err.value.clone(),
                    messages: vec![err.message.clone()],
                });
            }
            (request_property.clone(), consolidated)
        })
        .collect();
    ValidationReport { entries }
}

/// Invalid data found in a request. Carried by [`crate::CoreError::Validation`].
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationFailure {
    pub message: String,
    pub validations: ValidationReport,
}

impl ValidationFailure {
    pub fn new(validations: ValidationReport) -> Self {
        Self {
            message: "Invalid data found".to_string(),
            validations,
        }
    }

    /// JSON body for a 400 response: `{ "statusText": "Bad Request", "validations": ... }`.
    pub fn to_body(&self) -> Value {
        serde_json::json!({
            "statusText": "Bad Request",
            "validations": self.validations,
        })
    }
}
