//! BDD step definitions for the HTTP JSON API

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use cucumber::{then, when};
use tower::ServiceExt;

use roomwatch::dashboard::build_router;

use crate::world::RoomwatchWorld;

#[when(expr = "{string} is requested from the API")]
async fn request_path(world: &mut RoomwatchWorld, uri: String) {
    let app = build_router(Arc::new(world.queries()));
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    world.response_status = Some(response.status().as_u16());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    world.response_json = Some(serde_json::from_slice(&body).unwrap());
}

#[then(expr = "the response status should be {int}")]
fn response_status(world: &mut RoomwatchWorld, status: u16) {
    assert_eq!(world.response_status, Some(status));
}

#[then(expr = "the response field {string} should be {string}")]
fn response_field(world: &mut RoomwatchWorld, pointer: String, expected: String) {
    let json = world.response_json.as_ref().expect("no response body");
    let value = json
        .pointer(&pointer)
        .unwrap_or_else(|| panic!("No field {} in {}", pointer, json));
    let actual = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    assert_eq!(actual, expected);
}

#[then(expr = "the response should be a list of {int} item(s)")]
fn response_list(world: &mut RoomwatchWorld, count: usize) {
    let json = world.response_json.as_ref().expect("no response body");
    let items = json.as_array().expect("response is not a list");
    assert_eq!(items.len(), count);
}
