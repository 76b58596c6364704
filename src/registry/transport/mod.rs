//! Remote-call protocol seam.
//!
//! `AgentTransport` is an enum over concrete transports, dispatched the same
//! way the analyzer providers are.  The registry owns one instance and never
//! touches the wire itself.

pub mod a2a;
pub mod scripted;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

use super::descriptor::{AgentDescriptor, ResponsePayload};

pub use a2a::A2aClient;
pub use scripted::{ScriptedReply, ScriptedTransport};

/// One outbound user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub message_id: String,
    /// Conversation id; the agent uses it to thread replies.
    pub context_id: String,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            message_id: uuid::Uuid::new_v4().to_string(),
            context_id: context_id.into(),
        }
    }
}

// ── Agent card ────────────────────────────────────────────────────────────────

/// Self-description published by an A2A agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AgentCard {
    /// Skill tags across all skills, in order.
    pub fn skill_tags(&self) -> impl Iterator<Item = &str> {
        self.skills.iter().flat_map(|s| s.tags.iter().map(String::as_str))
    }
}

// ── Transport enum ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum AgentTransport {
    /// JSON-RPC 2.0 over HTTP.
    A2a(A2aClient),
    /// Deterministic in-process replies.
    Scripted(ScriptedTransport),
}

impl AgentTransport {
    /// Send one message and wait for the reply.  `timeout` is reported in
    /// `DispatchError::Timeout` when the transport itself gives up first.
    pub async fn send(
        &self,
        agent: &AgentDescriptor,
        message: &OutboundMessage,
        timeout: Duration,
    ) -> Result<ResponsePayload, DispatchError> {
        match self {
            AgentTransport::A2a(c) => c.send(agent, message, timeout).await,
            AgentTransport::Scripted(s) => s.send(agent, message).await,
        }
    }

    pub async fn fetch_card(
        &self,
        agent: &AgentDescriptor,
        timeout: Duration,
    ) -> Result<AgentCard, DispatchError> {
        match self {
            AgentTransport::A2a(c) => c.fetch_card(agent, timeout).await,
            AgentTransport::Scripted(s) => s.fetch_card(agent).await,
        }
    }
}
