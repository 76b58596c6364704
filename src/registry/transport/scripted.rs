//! Scripted transport: canned per-agent replies, no network.
//!
//! Used by tests and offline demos to drive the orchestrator through every
//! dispatch outcome deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::DispatchError;
use crate::registry::descriptor::{AgentDescriptor, ResponsePayload};

use super::{AgentCard, OutboundMessage};

/// What a scripted agent does when called.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Payload(ResponsePayload),
    /// Wait, then behave like the inner reply.
    Delayed(Duration, Box<ScriptedReply>),
    Unreachable,
    /// A reply with nothing usable in it.
    Malformed,
}

/// One recorded call, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub agent_id: String,
    pub text: String,
    pub context_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    replies: HashMap<String, ScriptedReply>,
    cards: HashMap<String, AgentCard>,
    calls: Arc<Mutex<Vec<ScriptedCall>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, agent_id: &str, text: &str) -> Self {
        self.reply_with(agent_id, ScriptedReply::Text(text.to_string()))
    }

    pub fn reply_with(mut self, agent_id: &str, reply: ScriptedReply) -> Self {
        self.replies.insert(agent_id.to_string(), reply);
        self
    }

    pub fn card(mut self, agent_id: &str, card: AgentCard) -> Self {
        self.cards.insert(agent_id.to_string(), card);
        self
    }

    /// Every `send` so far, in call order.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub(super) async fn send(
        &self,
        agent: &AgentDescriptor,
        message: &OutboundMessage,
    ) -> Result<ResponsePayload, DispatchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ScriptedCall {
                agent_id: agent.id.clone(),
                text: message.text.clone(),
                context_id: message.context_id.clone(),
            });
        }

        let mut reply = self.replies.get(&agent.id).cloned().unwrap_or(ScriptedReply::Unreachable);
        loop {
            match reply {
                ScriptedReply::Delayed(d, inner) => {
                    tokio::time::sleep(d).await;
                    reply = *inner;
                }
                ScriptedReply::Text(text) => return Ok(ResponsePayload::text(text)),
                ScriptedReply::Payload(payload) => return Ok(payload),
                ScriptedReply::Unreachable => {
                    return Err(DispatchError::Unreachable {
                        agent_id: agent.id.clone(),
                        detail: "connection refused".into(),
                    });
                }
                ScriptedReply::Malformed => {
                    return Err(DispatchError::Protocol {
                        agent_id: agent.id.clone(),
                        detail: "empty reply".into(),
                    });
                }
            }
        }
    }

    pub(super) async fn fetch_card(&self, agent: &AgentDescriptor) -> Result<AgentCard, DispatchError> {
        if matches!(self.replies.get(&agent.id), None | Some(ScriptedReply::Unreachable)) {
            return Err(DispatchError::Unreachable {
                agent_id: agent.id.clone(),
                detail: "connection refused".into(),
            });
        }
        Ok(self.cards.get(&agent.id).cloned().unwrap_or_else(|| AgentCard {
            name: agent.name.clone(),
            description: String::new(),
            url: Some(agent.url.clone()),
            version: None,
            skills: Vec::new(),
        }))
    }
}
