//! Synchronous request pipeline: middleware chain, terminal handler, error handler.
//!
//! No transport here: the host builds a [`Request`] from whatever it received and turns the returned
//! [`Response`] back into its own type.

use std::collections::HashMap;

use http::StatusCode;
use serde_json::{Map, Value};

use crate::middleware::{Middleware, Next};
use crate::CoreError;

/// Incoming request: method, path, headers and named JSON slices (`body`, `query`, `params`, ...).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    properties: HashMap<String, Value>,
}

impl Request {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_body(self, body: Value) -> Self {
        self.with_property("body", body)
    }

    pub fn with_query(self, query: Value) -> Self {
        self.with_property("query", query)
    }

    pub fn with_params(self, params: Value) -> Self {
        self.with_property("params", params)
    }

    /// Set `query` from a raw query string: `token=abc&page=2` -> `{"token": "abc", "page": "2"}`.
    /// Keys and values are form-urlencoded (`%40`, `+`). Values stay strings; a repeated key keeps
    /// its last value.
    pub fn with_query_string(self, query_string: &str) -> Self {
        let params: Map<String, Value> =
            url::form_urlencoded::parse(query_string.trim_start_matches('?').as_bytes())
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
                .collect();
        self.with_query(Value::Object(params))
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn body(&self) -> Option<&Value> {
        self.property("body")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Outgoing response.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            body: Vec::new(),
            content_type: None,
        }
    }

    pub fn json(status: StatusCode, value: &Value) -> Result<Self, CoreError> {
        Ok(Self {
            status,
            body: serde_json::to_vec(value)?,
            content_type: Some("application/json".to_string()),
        })
    }

    pub fn json_body(&self) -> Result<Value, CoreError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal handler: runs after every middleware proceeded.
pub type RequestHandler = Box<dyn Fn(&Request, &mut Response) -> Result<(), CoreError> + Send + Sync>;

/// Receives errors raised by middlewares or the handler. Returns the error back to leave it unhandled.
pub type ErrorHandler =
    Box<dyn Fn(CoreError, &Request, &mut Response) -> Result<(), CoreError> + Send + Sync>;

/// Default error handler: validation failures become `400 { statusText, validations }`.
/// Every other error is returned unhandled.
pub fn validation_error_handler(
    error: CoreError,
    _request: &Request,
    response: &mut Response,
) -> Result<(), CoreError> {
    match error {
        CoreError::Validation(failure) => {
            *response = Response::json(StatusCode::BAD_REQUEST, &failure.to_body())?;
            Ok(())
        }
        other => Err(other),
    }
}

/// Middlewares in registration order, then the handler.
pub struct Pipeline {
    middlewares: Vec<Box<dyn Middleware>>,
    handler: Option<RequestHandler>,
    error_handler: ErrorHandler,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
            handler: None,
            error_handler: Box::new(validation_error_handler),
        }
    }

    pub fn add_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middlewares.push(Box::new(middleware));
        self
    }

    pub fn set_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(CoreError, &Request, &mut Response) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.error_handler = Box::new(handler);
        self
    }

    /// Run the chain for one request. Errors the error handler declines are returned.
    pub fn handle(&self, request: &Request) -> Result<Response, CoreError> {
        let mut response = Response::new();
        if let Err(error) = self.dispatch(0, request, &mut response) {
            if let Err(unhandled) = (self.error_handler)(error, request, &mut response) {
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    error = %unhandled,
                    "unhandled pipeline error"
                );
                return Err(unhandled);
            }
        }
        Ok(response)
    }

    fn dispatch(&self, index: usize, request: &Request, response: &mut Response) -> Result<(), CoreError> {
        let Some(middleware) = self.middlewares.get(index) else {
            let handler = self
                .handler
                .as_ref()
                .ok_or_else(|| CoreError::Handler("no handler set".into()))?;
            return handler(request, response);
        };
        let chain = |response: &mut Response, failure: Option<CoreError>| match failure {
            None => self.dispatch(index + 1, request, response),
            Some(error) => Err(error),
        };
        middleware.handle(request, response, Next::new(&chain))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
