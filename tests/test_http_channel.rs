//! HTTP channel routes, driven in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use concierge::config::VerifierConfig;
use concierge::orchestrator::Orchestrator;
use concierge::registry::transport::{ScriptedReply, ScriptedTransport};
use concierge::registry::{AgentDescriptor, AgentRegistry, AgentTransport};
use concierge::subsystems::comms::{CommsState, axum_channel};
use concierge::verifier::Verifier;

async fn app(transport: ScriptedTransport) -> axum::Router {
    let registry = Arc::new(AgentRegistry::with_timeouts(
        AgentTransport::Scripted(transport),
        Duration::from_millis(500),
        Duration::from_millis(200),
    ));
    registry
        .register(AgentDescriptor::new("invoices", "Invoices", "http://invoices.local").with_keywords(["invoice"]))
        .await
        .unwrap();
    registry
        .register(AgentDescriptor::new("imports", "Imports", "http://imports.local").with_keywords(["customs"]))
        .await
        .unwrap();

    let verifier = Verifier::new(
        &VerifierConfig {
            timeout: Duration::from_millis(200),
            scope_topics: vec!["invoices".into()],
            risk_terms: Vec::new(),
            risk_patterns: Vec::new(),
        },
        None,
    )
    .unwrap();
    let orchestrator = Arc::new(Orchestrator::new(registry, verifier, Duration::from_secs(2)));

    let (event_tx, _event_rx) = mpsc::channel(8);
    let comms = Arc::new(CommsState::new("test", orchestrator, event_tx));
    axum_channel::router("http-test", comms)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn query_returns_answer_json() {
    let transport = ScriptedTransport::new().reply("invoices", "Invoice 7 is paid.");
    let response = app(transport)
        .await
        .oneshot(post_json("/api/query", r#"{"query":"is invoice 7 paid?","session_id":"web-1"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "answer");
    assert_eq!(body["route_reason"], "exact_keyword");
    assert_eq!(body["sections"][0]["agent_id"], "invoices");
    assert_eq!(body["sections"][0]["content"], "Invoice 7 is paid.");
}

#[tokio::test]
async fn named_agent_bypasses_routing() {
    let transport = ScriptedTransport::new()
        .reply("invoices", "Invoice 7 is paid.")
        .reply("imports", "No customs entry references invoice 7.");
    let response = app(transport)
        .await
        .oneshot(post_json("/api/query", r#"{"query":"is invoice 7 paid?","agent":"Imports"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["route_reason"], "named");
    assert_eq!(body["sections"][0]["agent_id"], "imports");
}

#[tokio::test]
async fn unknown_named_agent_is_an_alert() {
    let response = app(ScriptedTransport::new().reply("invoices", "x"))
        .await
        .oneshot(post_json("/api/query", r#"{"query":"hello","agent":"weather"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "alert");
    assert_eq!(body["reason_code"], "unknown_agent");
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let response = app(ScriptedTransport::new())
        .await
        .oneshot(post_json("/api/query", r#"{"query":"   "}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "bad_request");
}

#[tokio::test]
async fn all_failures_come_back_as_alert_json() {
    let transport = ScriptedTransport::new()
        .reply_with("invoices", ScriptedReply::Unreachable)
        .reply_with("imports", ScriptedReply::Unreachable);
    let response = app(transport)
        .await
        .oneshot(post_json("/api/query", r#"{"query":"what fees apply"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "alert");
    assert_eq!(body["alert"], "agent_unavailable");
    assert_eq!(body["reason_code"], "all_agents_failed");
    assert_eq!(body["unavailable"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn agents_lists_the_registry() {
    let response = app(ScriptedTransport::new()).await.oneshot(get("/api/agents")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let ids: Vec<&str> = body.as_array().unwrap().iter().filter_map(|a| a["id"].as_str()).collect();
    assert_eq!(ids, vec!["invoices", "imports"]);
}

#[tokio::test]
async fn health_reflects_probes() {
    let transport = ScriptedTransport::new().reply("invoices", "up");
    let app = app(transport).await;

    let before = json_body(app.clone().oneshot(get("/api/health")).await.unwrap()).await;
    assert_eq!(before["status"], "ok");
    assert_eq!(before["agents_total"], 2);
    assert_eq!(before["agents_reachable"], 0);

    let after = json_body(app.oneshot(post_json("/api/health/refresh", "")).await.unwrap()).await;
    assert_eq!(after["status"], "degraded");
    assert_eq!(after["agents_reachable"], 1);
    assert_eq!(after["agents"][0]["health"], "reachable");
    assert_eq!(after["agents"][1]["health"], "unreachable");
}

#[tokio::test]
async fn favicon_is_empty() {
    let response = app(ScriptedTransport::new()).await.oneshot(get("/favicon.ico")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
