//! Registry value types: agent descriptors, health, and dispatch results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;

/// Words too generic to identify an agent on their own.
const GENERIC_NAME_TOKENS: &[&str] = &["agent", "agents", "service", "assistant", "bot"];

/// Name tokens shorter than this are not treated as a recognisable name form.
const MIN_NAME_TOKEN_LEN: usize = 4;

// ── HealthState ───────────────────────────────────────────────────────────────

/// Last known liveness of a remote agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Never probed or dispatched to.
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Reachable => "reachable",
            HealthState::Unreachable => "unreachable",
        }
    }
}

// ── AgentDescriptor ───────────────────────────────────────────────────────────

/// Identity, endpoint and declared capabilities of one remote agent.
///
/// Owned by [`super::AgentRegistry`]; everything else works on clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Lowercased capability keywords, registration order preserved.
    pub keywords: Vec<String>,
    /// Lowercased alternative name forms.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// From the agent card, when discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub health: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            keywords: Vec::new(),
            aliases: Vec::new(),
            description: None,
            health: HealthState::Unknown,
            last_checked: None,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for k in keywords {
            push_unique(&mut self.keywords, k.as_ref());
        }
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for a in aliases {
            push_unique(&mut self.aliases, a.as_ref());
        }
        self
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(&config.id, &config.name, &config.url)
            .with_keywords(&config.keywords)
            .with_aliases(&config.aliases)
    }

    /// Every recognisable form of this agent's name, lowercased: the full
    /// name, the id, the aliases, and distinctive name tokens
    /// (e.g. `"invoices"` from "Invoices Agent").
    pub fn name_forms(&self) -> Vec<String> {
        let mut forms = Vec::new();
        push_unique(&mut forms, &self.name);
        push_unique(&mut forms, &self.id.replace('_', " "));
        for alias in &self.aliases {
            push_unique(&mut forms, alias);
        }
        for token in self.name.split(|c: char| !c.is_alphanumeric()) {
            let token = token.to_lowercase();
            if token.chars().count() >= MIN_NAME_TOKEN_LEN
                && !GENERIC_NAME_TOKENS.contains(&token.as_str())
            {
                push_unique(&mut forms, &token);
            }
        }
        forms
    }

    /// Merge additional keywords (e.g. agent-card skill tags).
    pub(crate) fn merge_keywords<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for k in keywords {
            push_unique(&mut self.keywords, k.as_ref());
        }
    }

    pub(crate) fn merge_aliases<I, S>(&mut self, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for a in aliases {
            push_unique(&mut self.aliases, a.as_ref());
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim().to_lowercase();
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

// ── AgentResponse ─────────────────────────────────────────────────────────────

/// Content returned by a remote agent: free text plus any structured parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<serde_json::Value>,
    /// Conversation id the agent attached to its reply, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl ResponsePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.data.is_empty()
    }
}

/// A successful reply from one dispatched call.  Failures are carried as
/// [`crate::error::DispatchError`] alongside it, so `Result<AgentResponse, _>`
/// is the per-call success indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub agent_id: String,
    pub payload: ResponsePayload,
    pub latency: Duration,
}
