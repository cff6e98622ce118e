//! One-shot validation of a request document through a pipeline.

use std::fs;
use std::path::Path;

use http::StatusCode;
use serde_json::{json, Map, Value};

use schemaguard_core::{FailureMode, Pipeline, Request, Response};

use crate::{CliError, Rules};

/// Result of [`check`]: the rendered response body and whether the request passed.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub valid: bool,
    pub body: Value,
}

/// Read a request document. Every top-level key becomes a request property.
/// `query_string`, when given, replaces `query`.
pub fn load_request(
    path: impl AsRef<Path>,
    method: &str,
    route: &str,
    query_string: Option<&str>,
) -> Result<Request, CliError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let properties: Map<String, Value> =
        serde_json::from_str(&text).map_err(|source| CliError::Json {
            path: path.display().to_string(),
            source,
        })?;
    let mut request = Request::new(method, route);
    for (name, value) in properties {
        request.set_property(name, value);
    }
    if let Some(query_string) = query_string {
        request = request.with_query_string(query_string);
    }
    Ok(request)
}

/// Run `request` through the rules' validation middleware and a handler answering `{"valid": true}`.
pub fn check(rules: &Rules, request: &Request, mode: FailureMode) -> Result<Outcome, CliError> {
    let mut pipeline = Pipeline::new();
    pipeline.add_middleware(rules.middleware(mode)?);
    pipeline.set_handler(|_req: &Request, res: &mut Response| {
        *res = Response::json(StatusCode::OK, &json!({ "valid": true }))?;
        Ok(())
    });
    let response = pipeline.handle(request)?;
    Ok(Outcome {
        valid: response.status.is_success(),
        body: response.json_body()?,
    })
}
