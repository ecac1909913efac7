//! API tests against PostgreSQL
//!
//! Uses `#[sqlx::test]`, which creates a fresh database per test from
//! `DATABASE_URL` and applies the workspace migrations.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

use inforobot_server::{
    api::{self, AppState},
    config::{Config, EnrichmentConfig, PipelineConfig},
    features::FeatureState,
    pipeline::{
        queue::QueueSettings, GrokClient, JobQueue, PgJobQueue, PgRequestStore, PipelineRuntime,
        RequestStore,
    },
};

struct TestApp {
    router: Router,
    store: Arc<dyn RequestStore>,
    queue: Arc<dyn JobQueue>,
}

fn create_test_app(pool: PgPool) -> TestApp {
    let store: Arc<dyn RequestStore> = Arc::new(PgRequestStore::new(pool.clone()));
    let queue: Arc<dyn JobQueue> =
        Arc::new(PgJobQueue::new(pool.clone(), QueueSettings::default()));

    let state = AppState {
        db: pool,
        features: FeatureState {
            store: store.clone(),
            queue: queue.clone(),
        },
    };

    TestApp {
        router: api::create_router(state, &Config::default().cors),
        store,
        queue,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    router.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_health(pool: PgPool) {
    let app = create_test_app(pool);

    let response = send(&app.router, "GET", "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["database"], "connected");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_request_lifecycle(pool: PgPool) {
    let app = create_test_app(pool);

    let response = send(
        &app.router,
        "POST",
        "/api/v1/submit",
        Some(json!({ "url": "http://example.com" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    let index_id = body["data"]["index_id"].as_str().unwrap().to_string();
    let job_id = body["data"]["job_id"].as_i64().unwrap();

    let response = send(&app.router, "GET", &format!("/api/v1/jobs/{}", job_id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["state"], "queued");

    let response = send(
        &app.router,
        "PUT",
        &format!("/api/v1/requests/{}", index_id),
        Some(json!({ "content": "hand-written summary", "status": "complete" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app.router, "GET", &format!("/api/v1/requests/{}", index_id), None).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "complete");
    assert_eq!(body["data"]["content"], "hand-written summary");

    let response = send(&app.router, "GET", "/api/v1/index", None).await;
    let body = body_json(response).await;
    assert_eq!(
        body["data"],
        json!([{ "index_id": index_id, "address": "http://example.com" }])
    );

    let response = send(&app.router, "DELETE", &format!("/api/v1/requests/{}", index_id), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app.router, "GET", &format!("/api/v1/requests/{}", index_id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_index_is_empty_list_without_rows(pool: PgPool) {
    let app = create_test_app(pool);

    let response = send(&app.router, "GET", "/api/v1/index", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"], json!([]));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_submitted_url_is_processed_by_runtime(pool: PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Example Domain" } }]
        })))
        .mount(&server)
        .await;

    let app = create_test_app(pool);
    let enrichment = Arc::new(
        GrokClient::new(EnrichmentConfig {
            api_url: server.uri(),
            ..EnrichmentConfig::default()
        })
        .unwrap(),
    );
    let runtime = PipelineRuntime::from_config(
        &PipelineConfig::default(),
        app.store.clone(),
        app.queue.clone(),
        enrichment,
    );

    let response = send(
        &app.router,
        "POST",
        "/api/v1/submit",
        Some(json!({ "url": "http://example.com" })),
    )
    .await;
    let body = body_json(response).await;
    let index_id = body["data"]["index_id"].as_str().unwrap().to_string();
    let job_id = body["data"]["job_id"].as_i64().unwrap();

    assert!(runtime.process_next("test-worker").await.unwrap());
    assert!(!runtime.process_next("test-worker").await.unwrap());

    let request = app.store.get(&index_id).await.unwrap();
    assert_eq!(request.content.as_deref(), Some("Example Domain"));

    let response = send(&app.router, "GET", &format!("/api/v1/jobs/{}", job_id), None).await;
    assert_eq!(body_json(response).await["data"]["state"], "done");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_runtime_shuts_down_when_idle(pool: PgPool) {
    let app = create_test_app(pool);
    let runtime = PipelineRuntime::from_config(
        &PipelineConfig {
            workers: 2,
            poll_interval_ms: 10,
            ..PipelineConfig::default()
        },
        app.store.clone(),
        app.queue.clone(),
        Arc::new(GrokClient::new(EnrichmentConfig::default()).unwrap()),
    );

    let handle = runtime.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown(Duration::from_secs(1)))
        .await
        .unwrap();
}
