//! A2A transport: JSON-RPC 2.0 `message/send` over HTTP.
//!
//! Agents publish a card at `/.well-known/agent.json` and accept
//! `POST {url}` with a JSON-RPC envelope.  The reply `result` is either a
//! Task (artifacts + status) or a Message (parts); text is gathered from
//! every place agents are known to put it.  All wire types are private.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{AppError, DispatchError};
use crate::registry::descriptor::{AgentDescriptor, ResponsePayload};

use super::{AgentCard, OutboundMessage};

/// Card locations, tried in order; the second is the newer spelling.
const CARD_PATHS: &[&str] = &[".well-known/agent.json", ".well-known/agent-card.json"];

/// Task states that mean the agent gave up on the request.
const FAILED_STATES: &[&str] = &["failed", "rejected", "canceled"];

// ── Client ────────────────────────────────────────────────────────────────────

/// Shared HTTP client for every agent.  `reqwest::Client` pools connections
/// per host, so repeated dispatches to one agent reuse its session.
#[derive(Debug, Clone)]
pub struct A2aClient {
    client: Client,
}

impl A2aClient {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::Comms(format!("failed to build A2A HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn send(
        &self,
        agent: &AgentDescriptor,
        message: &OutboundMessage,
        timeout: Duration,
    ) -> Result<ResponsePayload, DispatchError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: &message.message_id,
            method: "message/send",
            params: SendParams {
                message: WireMessage {
                    role: "user",
                    kind: "message",
                    parts: vec![WirePart { kind: "text", text: &message.text }],
                    message_id: &message.message_id,
                    context_id: &message.context_id,
                },
            },
        };

        debug!(agent_id = %agent.id, url = %agent.url, message_id = %message.message_id, "sending A2A message");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&request)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full A2A request payload");
        }

        let response = self
            .client
            .post(&agent.url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&agent.id, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(protocol(&agent.id, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&agent.id, e, timeout))?;
        trace!(agent_id = %agent.id, body = %body, "full A2A response body");

        let envelope: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| protocol(&agent.id, format!("unparseable JSON-RPC body: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(protocol(
                &agent.id,
                format!("JSON-RPC error {}: {}", err.code, err.message),
            ));
        }
        let result = envelope
            .result
            .ok_or_else(|| protocol(&agent.id, "JSON-RPC response without result".into()))?;

        if let Some(state) = task_state(&result).filter(|s| FAILED_STATES.contains(s)) {
            return Err(protocol(&agent.id, format!("task {state}")));
        }

        let payload = extract_payload(&result);
        if payload.is_empty() {
            return Err(protocol(&agent.id, "empty reply".into()));
        }
        Ok(payload)
    }

    pub async fn fetch_card(
        &self,
        agent: &AgentDescriptor,
        timeout: Duration,
    ) -> Result<AgentCard, DispatchError> {
        let mut last_err = protocol(&agent.id, "no agent card".into());
        for path in CARD_PATHS {
            let url = format!("{}/{path}", agent.url.trim_end_matches('/'));
            let response = self
                .client
                .get(&url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| transport_error(&agent.id, e, timeout))?;

            match response.status() {
                StatusCode::NOT_FOUND => {
                    last_err = protocol(&agent.id, format!("no agent card at {url}"));
                    continue;
                }
                s if !s.is_success() => return Err(protocol(&agent.id, format!("HTTP {s} from {url}"))),
                _ => {}
            }

            return response
                .json::<AgentCard>()
                .await
                .map_err(|e| protocol(&agent.id, format!("invalid agent card: {e}")));
        }
        Err(last_err)
    }
}

fn transport_error(agent_id: &str, e: reqwest::Error, timeout: Duration) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout {
            agent_id: agent_id.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        DispatchError::Unreachable { agent_id: agent_id.to_string(), detail: e.to_string() }
    }
}

fn protocol(agent_id: &str, detail: String) -> DispatchError {
    DispatchError::Protocol { agent_id: agent_id.to_string(), detail }
}

// ── Reply extraction ──────────────────────────────────────────────────────────

fn task_state(result: &Value) -> Option<&str> {
    result.get("status")?.get("state")?.as_str()
}

/// Gather text and structured data from a `message/send` result.
///
/// Order: artifact parts, `result.text`, `result.messages[].text`,
/// `result.status.message.parts`, then Message `result.parts`.
pub(crate) fn extract_payload(result: &Value) -> ResponsePayload {
    let mut texts = Vec::new();
    let mut data = Vec::new();

    for artifact in array(result.get("artifacts")) {
        for part in array(artifact.get("parts")) {
            collect_part(part, &mut texts, &mut data);
        }
    }

    if let Some(t) = non_empty(result.get("text")) {
        texts.push(t.to_string());
    }

    for msg in array(result.get("messages")) {
        if let Some(t) = non_empty(msg.get("text")) {
            texts.push(t.to_string());
        }
    }

    let status_parts = result
        .get("status")
        .and_then(|s| s.get("message"))
        .and_then(|m| m.get("parts"));
    for part in array(status_parts) {
        if let Some(t) = non_empty(part.get("text")) {
            texts.push(t.to_string());
        }
    }

    for part in array(result.get("parts")) {
        collect_part(part, &mut texts, &mut data);
    }

    ResponsePayload {
        text: texts.join("\n"),
        data,
        context_id: non_empty(result.get("contextId")).map(str::to_string),
    }
}

fn collect_part(part: &Value, texts: &mut Vec<String>, data: &mut Vec<Value>) {
    match part {
        Value::String(s) if !s.is_empty() => texts.push(s.clone()),
        Value::Object(_) => {
            if let Some(t) = non_empty(part.get("text")) {
                texts.push(t.to_string());
            } else if let Some(d) = part.get("data").filter(|d| !d.is_null()) {
                let rendered = serde_json::to_string_pretty(d).unwrap_or_else(|_| d.to_string());
                texts.push(format!("Extracted data:\n{rendered}"));
                data.push(d.clone());
            }
        }
        _ => {}
    }
}

fn array(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value.and_then(Value::as_array).into_iter().flatten()
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'a str,
    method: &'static str,
    params: SendParams<'a>,
}

#[derive(Debug, Serialize)]
struct SendParams<'a> {
    message: WireMessage<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage<'a> {
    role: &'static str,
    kind: &'static str,
    parts: Vec<WirePart<'a>>,
    message_id: &'a str,
    context_id: &'a str,
}

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_shape() {
        let msg = OutboundMessage::new("hello", "ctx-1");
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: &msg.message_id,
            method: "message/send",
            params: SendParams {
                message: WireMessage {
                    role: "user",
                    kind: "message",
                    parts: vec![WirePart { kind: "text", text: &msg.text }],
                    message_id: &msg.message_id,
                    context_id: &msg.context_id,
                },
            },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["method"], "message/send");
        assert_eq!(v["params"]["message"]["contextId"], "ctx-1");
        assert_eq!(v["params"]["message"]["parts"][0]["text"], "hello");
        assert_eq!(v["params"]["message"]["messageId"], v["id"]);
    }

    #[test]
    fn artifacts_text_and_data_are_collected_in_order() {
        let result = json!({
            "kind": "task",
            "contextId": "ctx-9",
            "artifacts": [{ "parts": [
                { "kind": "text", "text": "Invoice 7 total: 120 USD" },
                { "kind": "data", "data": { "total": 120 } },
                "plain part"
            ]}],
            "status": { "state": "completed", "message": { "parts": [{ "kind": "text", "text": "done" }] } }
        });
        let p = extract_payload(&result);
        let lines: Vec<&str> = p.text.lines().collect();
        assert_eq!(lines[0], "Invoice 7 total: 120 USD");
        assert_eq!(lines[1], "Extracted data:");
        assert!(p.text.contains("\"total\": 120"));
        assert!(p.text.contains("plain part"));
        assert!(p.text.ends_with("done"));
        assert_eq!(p.data, vec![json!({ "total": 120 })]);
        assert_eq!(p.context_id.as_deref(), Some("ctx-9"));
    }

    #[test]
    fn message_result_parts_are_collected() {
        let result = json!({ "kind": "message", "role": "agent", "parts": [{ "kind": "text", "text": "hi" }] });
        assert_eq!(extract_payload(&result).text, "hi");
    }

    #[test]
    fn legacy_text_and_messages_fields() {
        let result = json!({ "text": "a", "messages": [{ "text": "b" }, { "other": 1 }] });
        assert_eq!(extract_payload(&result).text, "a\nb");
    }

    #[test]
    fn empty_result_yields_empty_payload() {
        assert!(extract_payload(&json!({ "kind": "task", "artifacts": [] })).is_empty());
    }

    #[test]
    fn failed_task_state_is_detected() {
        let result = json!({ "status": { "state": "failed" } });
        assert_eq!(task_state(&result), Some("failed"));
    }

    #[test]
    fn card_deserialises_with_defaults() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "Invoices Agent",
            "skills": [{ "id": "lookup", "name": "Lookup", "tags": ["invoice", "vat"] }]
        }))
        .unwrap();
        assert_eq!(card.description, "");
        assert_eq!(card.skill_tags().collect::<Vec<_>>(), vec!["invoice", "vat"]);
    }
}
