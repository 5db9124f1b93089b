// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn request() -> CallbackRequest {
    CallbackRequest {
        url: "http://caller.test/cb".into(),
        headers: vec![("Nexus-Operation-Id".into(), "order-42".into())],
        body: br#"{"state":"succeeded"}"#.to_vec(),
    }
}

#[tokio::test]
async fn scripted_results_are_consumed_in_order() {
    let adapter = FakeCallbackAdapter::new();
    adapter.respond_with(503).fail_with("connection refused");

    assert_eq!(adapter.post(&request()).await, Ok(503));
    assert_eq!(
        adapter.post(&request()).await,
        Err(CallbackError::Transport("connection refused".into()))
    );
    assert_eq!(adapter.post(&request()).await, Ok(200));
    assert_eq!(adapter.calls().len(), 3);
}

#[tokio::test]
async fn default_status_applies_after_script() {
    let adapter = FakeCallbackAdapter::new();
    adapter.set_default_status(500);
    assert_eq!(adapter.post(&request()).await, Ok(500));
}

#[tokio::test]
async fn calls_expose_headers_and_body() {
    let adapter = FakeCallbackAdapter::new();
    adapter.post(&request()).await.unwrap();

    let call = &adapter.calls()[0];
    assert_eq!(call.header("nexus-operation-id"), Some("order-42"));
    assert_eq!(call.body_json()["state"], "succeeded");
}
