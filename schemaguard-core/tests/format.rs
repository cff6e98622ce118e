//! Report formatting: adjacency grouping of raw validator errors.

use serde_json::{json, Value};
use schemaguard_core::{format_validations, RawError, ValidationFailure, ValidatorResult};

fn err(property: &str, message: &str, value: Option<Value>) -> RawError {
    RawError {
        instance_path: String::new(),
        property: property.to_string(),
        message: message.to_string(),
        value,
    }
}

#[test]
fn adjacent_errors_merge() {
    let result = ValidatorResult::from_errors(vec![
        err("request.body.p1", "m1", Some(json!("a"))),
        err("request.body.p1", "m2", Some(json!("a"))),
        err("request.body.p2", "m3", None),
    ]);
    let report = format_validations(&[("body".to_string(), result)]);
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        json!({
            "body": [
                { "property": "request.body.p1", "value": "a", "messages": ["m1", "m2"] },
                { "property": "request.body.p2", "messages": ["m3"] }
            ]
        })
    );
}

#[test]
fn non_adjacent_errors_stay_separate() {
    let result = ValidatorResult::from_errors(vec![
        err("request.body.p1", "m1", None),
        err("request.body.p2", "m2", None),
        err("request.body.p1", "m3", None),
    ]);
    let report = format_validations(&[("body".to_string(), result)]);
    let body = report.get("body").unwrap();
    assert_eq!(body.len(), 3);
    assert_eq!(body[0].property, "request.body.p1");
    assert_eq!(body[0].messages, vec!["m1"]);
    assert_eq!(body[2].property, "request.body.p1");
    assert_eq!(body[2].messages, vec!["m3"]);
}

#[test]
fn value_comes_from_first_error_of_a_run() {
    let result = ValidatorResult::from_errors(vec![
        err("request.query.token", "first", Some(json!("x"))),
        err("request.query.token", "second", Some(json!("ignored"))),
    ]);
    let report = format_validations(&[("query".to_string(), result)]);
    assert_eq!(report.get("query").unwrap()[0].value, Some(json!("x")));
}

#[test]
fn empty_error_list_yields_empty_entry() {
    let report = format_validations(&[("params".to_string(), ValidatorResult::default())]);
    assert_eq!(report.len(), 1);
    assert_eq!(report.get("params").unwrap().len(), 0);
}

#[test]
fn keys_keep_input_order() {
    let report = format_validations(&[
        ("query".to_string(), ValidatorResult::from_errors(vec![err("q", "m", None)])),
        ("body".to_string(), ValidatorResult::from_errors(vec![err("b", "m", None)])),
    ]);
    assert_eq!(report.keys().collect::<Vec<_>>(), vec!["query", "body"]);
    let rendered = serde_json::to_string(&report).unwrap();
    assert!(rendered.find("\"query\"").unwrap() < rendered.find("\"body\"").unwrap());
}

#[test]
fn formatting_is_idempotent() {
    let input = vec![(
        "body".to_string(),
        ValidatorResult::from_errors(vec![
            err("request.body.a", "m1", Some(json!(1))),
            err("request.body.a", "m2", Some(json!(1))),
            err("request.body.b", "m3", None),
        ]),
    )];
    assert_eq!(format_validations(&input), format_validations(&input));
}

#[test]
fn failure_body_shape() {
    let report = format_validations(&[(
        "body".to_string(),
        ValidatorResult::from_errors(vec![err("request.body.firstName", "is required", None)]),
    )]);
    let failure = ValidationFailure::new(report);
    assert_eq!(failure.message, "Invalid data found");
    assert_eq!(
        failure.to_body(),
        json!({
            "statusText": "Bad Request",
            "validations": {
                "body": [{ "property": "request.body.firstName", "messages": ["is required"] }]
            }
        })
    );
}
