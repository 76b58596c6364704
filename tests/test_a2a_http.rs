//! A2A transport against a live in-process HTTP agent.
//!
//! One axum server plays several agents, selected by the first path segment:
//!
//! - `invoices`  task reply with a text artifact, echoes contextId back
//! - `ledger`    message reply with text and data parts
//! - `broken`    JSON-RPC error
//! - `quiet`     result with nothing in it
//! - `gave-up`   task in `failed` state
//! - `crashing`  HTTP 500
//! - `sleepy`    answers after two seconds
//! - `modern`    card only at `agent-card.json`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use concierge::query::Query;
use concierge::registry::transport::A2aClient;
use concierge::registry::{AgentDescriptor, AgentRegistry, AgentTransport, HealthState};

type Received = Arc<Mutex<Vec<Value>>>;

async fn rpc(Path(agent): Path<String>, State(received): State<Received>, Json(body): Json<Value>) -> Response {
    received.lock().unwrap().push(body.clone());
    let id = body["id"].clone();
    let context_id = body["params"]["message"]["contextId"].clone();

    let result = match agent.as_str() {
        "invoices" => json!({
            "kind": "task",
            "id": "task-1",
            "contextId": "ctx-from-agent",
            "status": { "state": "completed" },
            "artifacts": [{ "parts": [{ "kind": "text", "text": format!("Invoice total: 420 EUR (ctx {})", context_id.as_str().unwrap_or("")) }] }]
        }),
        "ledger" => json!({
            "kind": "message",
            "role": "agent",
            "parts": [
                { "kind": "text", "text": "Ledger balance attached." },
                { "kind": "data", "data": { "balance": 1200 } }
            ]
        }),
        "broken" => {
            return Json(json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32601, "message": "method not found" } }))
                .into_response();
        }
        "quiet" => json!({ "kind": "message", "parts": [] }),
        "gave-up" => json!({ "kind": "task", "status": { "state": "failed" } }),
        "crashing" => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "sleepy" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            json!({ "kind": "message", "parts": [{ "kind": "text", "text": "finally" }] })
        }
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}

fn card(agent: &str) -> Value {
    json!({
        "name": format!("{agent} desk"),
        "description": format!("Answers {agent} questions"),
        "version": "1.0.0",
        "skills": [{ "id": "lookup", "name": "Lookup", "tags": ["Billing", "statements"] }]
    })
}

async fn legacy_card(Path(agent): Path<String>) -> Response {
    if agent == "modern" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(card(&agent)).into_response()
}

async fn current_card(Path(agent): Path<String>) -> Response {
    Json(card(&agent)).into_response()
}

async fn spawn_agents() -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route("/{agent}", post(rpc))
        .route("/{agent}/.well-known/agent.json", get(legacy_card))
        .route("/{agent}/.well-known/agent-card.json", get(current_card))
        .with_state(Arc::clone(&received));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), received)
}

async fn registry_for(base: &str, agents: &[&str]) -> AgentRegistry {
    let registry = AgentRegistry::with_timeouts(
        AgentTransport::A2a(A2aClient::new().unwrap()),
        Duration::from_millis(500),
        Duration::from_millis(500),
    );
    for id in agents {
        registry
            .register(AgentDescriptor::new(*id, *id, format!("{base}/{id}")))
            .await
            .unwrap();
    }
    registry
}

#[tokio::test]
async fn task_reply_text_is_extracted() {
    let (base, received) = spawn_agents().await;
    let registry = registry_for(&base, &["invoices"]).await;

    let response = registry
        .dispatch("invoices", &Query::new("invoice total?").with_session("s-1"))
        .await
        .unwrap();
    assert!(response.payload.text.contains("Invoice total: 420 EUR"));
    assert_eq!(response.payload.context_id.as_deref(), Some("ctx-from-agent"));
    assert_eq!(registry.get("invoices").await.unwrap().health, HealthState::Reachable);

    let body = received.lock().unwrap()[0].clone();
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["method"], "message/send");
    assert_eq!(body["params"]["message"]["role"], "user");
    assert_eq!(body["params"]["message"]["parts"][0]["text"], "invoice total?");
    assert_eq!(body["params"]["message"]["contextId"], "s-1");
}

#[tokio::test]
async fn agent_context_is_reused_for_the_same_session() {
    let (base, received) = spawn_agents().await;
    let registry = registry_for(&base, &["invoices"]).await;

    let query = Query::new("invoice total?").with_session("s-2");
    registry.dispatch("invoices", &query).await.unwrap();
    let second = registry.dispatch("invoices", &query).await.unwrap();

    assert!(second.payload.text.contains("ctx ctx-from-agent"));
    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies[1]["params"]["message"]["contextId"], "ctx-from-agent");
}

#[tokio::test]
async fn message_reply_carries_structured_data() {
    let (base, _) = spawn_agents().await;
    let registry = registry_for(&base, &["ledger"]).await;

    let response = registry.dispatch("ledger", &Query::new("balance")).await.unwrap();
    assert!(response.payload.text.contains("Ledger balance attached."));
    assert_eq!(response.payload.data, vec![json!({ "balance": 1200 })]);
}

#[tokio::test]
async fn bad_replies_are_protocol_errors() {
    let (base, _) = spawn_agents().await;
    let registry = registry_for(&base, &["broken", "quiet", "gave-up", "crashing"]).await;

    for id in ["broken", "quiet", "gave-up", "crashing"] {
        let err = registry.dispatch(id, &Query::new("hello")).await.unwrap_err();
        assert_eq!(err.reason_code(), "protocol_error", "{id}: {err}");
        // It answered, so it is up.
        assert_eq!(registry.get(id).await.unwrap().health, HealthState::Reachable);
    }
}

#[tokio::test]
async fn slow_agent_times_out_without_changing_health() {
    let (base, _) = spawn_agents().await;
    let registry = registry_for(&base, &["sleepy"]).await;

    let err = registry.dispatch("sleepy", &Query::new("hello")).await.unwrap_err();
    assert_eq!(err.reason_code(), "timeout");
    assert_eq!(registry.get("sleepy").await.unwrap().health, HealthState::Unknown);
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry = registry_for(&format!("http://{addr}"), &["gone"]).await;
    let err = registry.dispatch("gone", &Query::new("hello")).await.unwrap_err();
    assert_eq!(err.reason_code(), "unreachable");
    assert_eq!(registry.get("gone").await.unwrap().health, HealthState::Unreachable);
    assert_eq!(registry.health_check("gone").await, HealthState::Unreachable);
}

#[tokio::test]
async fn discovery_enriches_the_descriptor() {
    let (base, _) = spawn_agents().await;
    let registry = registry_for(&base, &["invoices"]).await;

    let card = registry.discover("invoices").await.unwrap();
    assert_eq!(card.name, "invoices desk");

    let agent = registry.get("invoices").await.unwrap();
    assert_eq!(agent.description.as_deref(), Some("Answers invoices questions"));
    assert!(agent.aliases.contains(&"invoices desk".to_string()));
    assert!(agent.keywords.contains(&"billing".to_string()));
    assert!(agent.keywords.contains(&"statements".to_string()));
    assert_eq!(agent.health, HealthState::Reachable);
    assert!(agent.last_checked.is_some());
}

#[tokio::test]
async fn card_falls_back_to_newer_path() {
    let (base, _) = spawn_agents().await;
    let registry = registry_for(&base, &["modern"]).await;

    let card = registry.discover("modern").await.unwrap();
    assert_eq!(card.name, "modern desk");
    assert_eq!(registry.health_check("modern").await, HealthState::Reachable);
}
