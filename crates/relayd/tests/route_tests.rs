//! HTTP surface tests driven through the router without a socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use relayd::backend::FakeBackend;
use relayd::classifier::RelevanceClassifier;
use relayd::error::ModelError;
use relayd::formatter::ActivityFormatter;
use relayd::llm_client::{FakeTextModel, TextModel};
use relayd::metrics::DispatchMetrics;
use relayd::orchestrator::{DispatchSettings, Dispatcher};
use relayd::registry::BackendRegistry;
use relayd::server::{app, AppState, MAX_BODY_SIZE};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const CLASSIFY: &str = "Known services";
const FORMAT: &str = "data extraction assistant";

const SCORES: &str = r#"[{"service": "Ticketing", "applicability": 95}, {"service": "Weather", "applicability": 10}]"#;

struct Harness {
    app: Router,
    ticketing: Arc<FakeBackend>,
}

fn harness(model: FakeTextModel) -> Harness {
    let model: Arc<dyn TextModel> = Arc::new(model);
    let ticketing = Arc::new(FakeBackend::ok(json!({"events": [{"name": "Jazz Night"}]})));
    let registry = BackendRegistry::builder()
        .register("Ticketing", ticketing.clone())
        .build();
    let metrics = DispatchMetrics::new().unwrap();
    let classifier = RelevanceClassifier::new(
        model.clone(),
        vec!["Ticketing".to_string(), "Weather".to_string()],
    );
    let dispatcher = Dispatcher::new(classifier, Arc::new(registry), DispatchSettings::default())
        .with_metrics(metrics.clone());
    let state = AppState::new(dispatcher, ActivityFormatter::new(model), metrics);

    Harness {
        app: app(Arc::new(state)),
        ticketing,
    }
}

fn default_harness() -> Harness {
    harness(
        FakeTextModel::builder()
            .respond_when(CLASSIFY, SCORES)
            .respond_when(
                FORMAT,
                r#"[{"activity_name": "Jazz Night", "location": "Oslo"}]"#,
            )
            .build(),
    )
}

fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn read_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_prompt_returns_ordered_outcomes() {
    let h = default_harness();
    let response = h
        .app
        .oneshot(post_json("/v1/prompt", r#"{"prompt": "concerts in Oslo"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let outcomes = body["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["backend"], "Ticketing");
    assert_eq!(outcomes[0]["data"]["events"][0]["name"], "Jazz Night");
    assert_eq!(outcomes[1]["backend"], "Weather");
    assert!(outcomes[1]["error"].is_string());
    assert_eq!(h.ticketing.call_count(), 1);
}

#[tokio::test]
async fn test_legacy_prompt_alias() {
    let h = default_harness();
    let response = h
        .app
        .oneshot(post_json("/promptOpenAI", r#"{"prompt": "concerts"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_or_blank_prompt_is_bad_request() {
    for body in [r#"{}"#, r#"{"prompt": ""}"#, r#"{"prompt": "   "}"#] {
        let h = default_harness();
        let response = h.app.oneshot(post_json("/v1/prompt", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
        let json = read_json(response).await;
        assert_eq!(json["error"], "prompt is required");
        assert_eq!(h.ticketing.call_count(), 0);
    }
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let h = default_harness();
    let response = h
        .app
        .oneshot(post_json("/v1/prompt", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("invalid request body"));
}

#[tokio::test]
async fn test_classifier_failure_is_bad_gateway() {
    let h = harness(FakeTextModel::always_error(ModelError::Timeout(10)));
    let response = h
        .app
        .oneshot(post_json("/v1/prompt", r#"{"prompt": "concerts"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = read_json(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to analyze the prompt"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let h = default_harness();
    let prompt = "x".repeat(MAX_BODY_SIZE + 1);
    let body = serde_json::to_string(&json!({ "prompt": prompt })).unwrap();
    let response = h.app.oneshot(post_json("/v1/prompt", body)).await.unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(h.ticketing.call_count(), 0);
}

#[tokio::test]
async fn test_activities_include_backend_errors() {
    let h = default_harness();
    let response = h
        .app
        .oneshot(post_json("/v1/activities", r#"{"prompt": "concerts in Oslo"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["activities"][0]["activity_name"], "Jazz Night");
    assert!(body["activities"][0]["date"].is_null());
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["backend"], "Weather");
    assert!(errors[0]["error"].is_string());
}

#[tokio::test]
async fn test_activities_formatter_failure_is_bad_gateway() {
    let h = harness(
        FakeTextModel::builder()
            .respond_when(CLASSIFY, SCORES)
            .respond_when(FORMAT, "Sorry, I cannot help with that.")
            .build(),
    );
    let response = h
        .app
        .oneshot(post_json("/v1/activities", r#"{"prompt": "concerts"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_execute_action_on_named_backend() {
    let h = default_harness();
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/v1/backends/Ticketing/execute",
            r#"{"action": "venues", "params": {"city": "Oslo"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["backend"], "Ticketing");
    assert!(body["data"].is_object());

    let response = h
        .app
        .oneshot(post_json("/v1/backends/Weather/execute", r#"{"action": "forecast"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_lists_backends() {
    let h = default_harness();
    let response = h.app.oneshot(get("/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backends"], json!(["Ticketing"]));
}

#[tokio::test]
async fn test_server_check() {
    let h = default_harness();
    let response = h.app.oneshot(get("/test")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_text(response).await, "Server check verified");
}

#[tokio::test]
async fn test_metrics_after_dispatch() {
    let h = default_harness();
    let response = h
        .app
        .clone()
        .oneshot(post_json("/v1/prompt", r#"{"prompt": "concerts"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h.app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = read_text(response).await;
    assert!(text.contains("relay_dispatch_requests_total{result=\"ok\"} 1"));
    assert!(text.contains("backend=\"_unregistered\",status=\"skipped\"} 1"));
}

#[tokio::test]
async fn test_missing_and_blank_prompts_counted_alike() {
    let h = default_harness();
    for body in [r#"{}"#, r#"{"prompt": "  "}"#] {
        let response = h
            .app
            .clone()
            .oneshot(post_json("/v1/prompt", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = h.app.oneshot(get("/metrics")).await.unwrap();
    let text = read_text(response).await;
    assert!(text.contains("relay_dispatch_requests_total{result=\"client_error\"} 2"), "{}", text);
}
