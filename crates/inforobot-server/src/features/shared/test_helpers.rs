//! Test helpers for feature route tests
//!
//! Builds a [`FeatureState`] over the in-memory store and queue so routes can
//! be exercised with `tower::ServiceExt::oneshot` and no database.

use axum::{body::Body, http::Request, response::Response};
use serde_json::Value;
use std::sync::Arc;

use crate::features::FeatureState;
use crate::pipeline::{InMemoryJobQueue, InMemoryRequestStore};

pub struct TestState {
    pub state: FeatureState,
    pub store: Arc<InMemoryRequestStore>,
    pub queue: Arc<InMemoryJobQueue>,
}

impl TestState {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        Self {
            state: FeatureState {
                store: store.clone(),
                queue: queue.clone(),
            },
            store,
            queue,
        }
    }
}

/// JSON request with the given method, path, and body
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
