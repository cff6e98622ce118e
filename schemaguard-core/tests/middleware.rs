//! Validation middleware driven directly, with hand-built continuations.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::StatusCode;
use serde_json::{json, Value};
use schemaguard_core::{
    validate, CoreError, FailureMode, Middleware, Next, Request, Response, ValidationFailure,
    ValidationMiddleware,
};

/// What the continuation was called with: `None` = proceeded, `Some(err)` = failed.
type Seen = RefCell<Option<Option<String>>>;

fn run(middleware: &ValidationMiddleware, request: &Request, seen: &Seen) -> Result<Response, CoreError> {
    let chain = |_res: &mut Response, failure: Option<CoreError>| -> Result<(), CoreError> {
        *seen.borrow_mut() = Some(failure.map(|e| e.to_string()));
        Ok(())
    };
    let mut response = Response::new();
    middleware.handle(request, &mut response, Next::new(&chain))?;
    Ok(response)
}

fn token_schema() -> Value {
    json!({
        "type": "object",
        "required": ["token"],
        "properties": { "token": { "type": "string", "minLength": 10 } }
    })
}

fn no_dependencies() -> Vec<Value> {
    Vec::new()
}

#[test]
fn valid_request_proceeds() {
    let middleware = validate([("query", token_schema())], no_dependencies()).unwrap();
    let seen = Seen::default();
    let req = Request::new("GET", "/").with_query_string("token=0123456789");
    run(&middleware, &req, &seen).unwrap();
    assert_eq!(*seen.borrow(), Some(None));
}

#[test]
fn raise_returns_the_failure_without_calling_next() {
    let middleware = ValidationMiddleware::builder()
        .failure_mode(FailureMode::Raise)
        .build([("query", token_schema())])
        .unwrap();
    let seen = Seen::default();
    let req = Request::new("GET", "/").with_query_string("token=short");

    let err = run(&middleware, &req, &seen).unwrap_err();
    assert!(seen.borrow().is_none());
    assert_eq!(err.to_string(), "schemaguard: Invalid data found");
    let report = err.validations().unwrap();
    assert_eq!(report.keys().collect::<Vec<_>>(), vec!["query"]);
    assert_eq!(
        report.get("query").unwrap()[0].messages,
        vec!["does not meet minimum length of 10"]
    );
}

#[test]
fn proceed_hands_the_failure_to_next() {
    let middleware = ValidationMiddleware::builder()
        .failure_mode(FailureMode::Proceed)
        .build([("query", token_schema())])
        .unwrap();
    let seen = Seen::default();
    let req = Request::new("GET", "/").with_query_string("token=short");

    run(&middleware, &req, &seen).unwrap();
    assert_eq!(
        *seen.borrow(),
        Some(Some("schemaguard: Invalid data found".to_string()))
    );
}

#[test]
fn failure_mode_parses_from_text() {
    assert_eq!("raise".parse::<FailureMode>().unwrap(), FailureMode::Raise);
    assert_eq!("Proceed".parse::<FailureMode>().unwrap(), FailureMode::Proceed);
    assert!("ignore".parse::<FailureMode>().is_err());
    assert_eq!(FailureMode::default(), FailureMode::Raise);
    assert_eq!(FailureMode::Proceed.to_string(), "proceed");
}

#[test]
fn custom_hooks_replace_the_defaults() {
    let valid_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&valid_calls);
    let middleware = ValidationMiddleware::builder()
        .on_valid(move |keys: &[String], _req: &Request, res: &mut Response, next: Next<'_>| {
            assert_eq!(keys, ["body".to_string(), "query".to_string()]);
            counter.fetch_add(1, Ordering::SeqCst);
            next.proceed(res)
        })
        .on_invalid(
            |failure: ValidationFailure, _req: &Request, res: &mut Response, _next: Next<'_>| {
                let body = json!({ "errors": failure.validations.len() });
                *res = Response::json(StatusCode::UNPROCESSABLE_ENTITY, &body)?;
                Ok(())
            },
        )
        .build([
            ("body", json!({ "type": "object", "required": ["name"] })),
            ("query", token_schema()),
        ])
        .unwrap();
    assert_eq!(middleware.keys(), ["body".to_string(), "query".to_string()]);

    let seen = Seen::default();
    let valid = Request::new("POST", "/")
        .with_body(json!({ "name": "x" }))
        .with_query_string("token=0123456789");
    run(&middleware, &valid, &seen).unwrap();
    assert_eq!(valid_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.borrow(), Some(None));

    let seen = Seen::default();
    let invalid = Request::new("POST", "/").with_body(json!({}));
    let res = run(&middleware, &invalid, &seen).unwrap();
    assert!(seen.borrow().is_none());
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.json_body().unwrap(), json!({ "errors": 1 }));
    assert_eq!(valid_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn validate_request_reports_without_hooks() {
    let schema = json!({ "properties": { "id": { "pattern": "^[0-9]+$" } } });
    let middleware = validate([("params", schema)], no_dependencies()).unwrap();

    let ok = Request::new("GET", "/users/7").with_params(json!({ "id": "7" }));
    assert!(middleware.validate_request(&ok).unwrap().is_none());

    let bad = Request::new("GET", "/users/x").with_params(json!({ "id": "x" }));
    let report = middleware.validate_request(&bad).unwrap().unwrap();
    let entries = report.get("params").unwrap();
    assert_eq!(entries[0].property, "request.params.id");
    assert_eq!(entries[0].value, Some(json!("x")));
    assert_eq!(entries[0].messages, vec!["does not match pattern \"^[0-9]+$\""]);
}

#[test]
fn unresolvable_ref_fails_at_build() {
    let schema = json!({
        "type": "object",
        "properties": { "address": { "$ref": "https://schemaguard.test/missing.json" } }
    });
    let err = validate([("body", schema)], no_dependencies()).unwrap_err();
    assert!(err.is_configuration());
    assert!(matches!(err, CoreError::InvalidSchema { ref property, .. } if property == "request.body"));
}

#[test]
fn malformed_schema_fails_at_build() {
    let schema = json!({ "type": "string", "minLength": "ten" });
    let err = validate([("query", schema)], no_dependencies()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidSchema { ref property, .. } if property == "request.query"));
}

#[test]
fn dependency_without_id_is_rejected() {
    let err = validate(
        [("body", json!({ "type": "object" }))],
        [json!({ "type": "object", "properties": {} })],
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::InvalidSchema { ref reason, .. } if reason.contains("$id")));
}

#[test]
fn relative_dependency_ids_resolve() {
    let address = json!({
        "id": "/AddressSchema",
        "type": "object",
        "properties": { "zip": { "type": "string" } }
    });
    let schema = json!({
        "type": "object",
        "properties": { "address": { "$ref": "/AddressSchema" } }
    });
    let middleware = validate([("body", schema)], [address]).unwrap();
    let bad = Request::new("POST", "/").with_body(json!({ "address": { "zip": 1234 } }));
    let report = middleware.validate_request(&bad).unwrap().unwrap();
    assert_eq!(report.get("body").unwrap()[0].property, "request.body.address.zip");
}

#[test]
fn middleware_is_shared_across_threads() {
    let middleware = validate([("query", token_schema())], no_dependencies()).unwrap();
    std::thread::scope(|scope| {
        for i in 0..4 {
            let middleware = &middleware;
            scope.spawn(move || {
                let token = if i % 2 == 0 { "0123456789" } else { "short" };
                let req = Request::new("GET", "/").with_query_string(&format!("token={token}"));
                let report = middleware.validate_request(&req).unwrap();
                assert_eq!(report.is_some(), i % 2 == 1);
            });
        }
    });
}

#[test]
fn duplicate_request_property_is_rejected() {
    let err = validate(
        [("query", token_schema()), ("query", json!({ "type": "object" }))],
        no_dependencies(),
    )
    .unwrap_err();
    assert!(err.is_configuration());
    assert!(matches!(err, CoreError::InvalidSchema { ref property, .. } if property == "request.query"));
}

#[test]
fn union_types_are_listed() {
    let schema = json!({ "properties": { "id": { "type": ["integer", "string"] } } });
    let middleware = validate([("params", schema)], no_dependencies()).unwrap();
    let req = Request::new("GET", "/").with_params(json!({ "id": true }));
    let report = middleware.validate_request(&req).unwrap().unwrap();
    assert_eq!(
        report.get("params").unwrap()[0].messages,
        vec!["is not of a type(s) integer,string"]
    );
}

#[test]
fn query_string_edge_cases() {
    let req = Request::new("GET", "/").with_query_string("?a=1&&=skipped&b&a=2&c=x%20y");
    assert_eq!(
        req.property("query"),
        Some(&json!({ "a": "2", "b": "", "c": "x y" }))
    );
}
