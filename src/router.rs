//! Query routing: keyword scoring with inclusive tie handling.
//!
//! Score per agent = number of its keywords found in the normalised query,
//! plus [`NAME_BONUS`] when any form of its name appears.  The highest
//! strictly-greater score wins outright; ties fan out to every tied agent;
//! no match at all fans out to every registered agent.  Routing never
//! returns an empty target set while agents are registered.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::query::Query;
use crate::registry::{AgentDescriptor, AgentRegistry};

/// Added to an agent's score when the query names it.
pub const NAME_BONUS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// Single winner on keyword matches.
    ExactKeyword,
    /// Single winner on its name alone.
    PartialName,
    /// Several agents tied at the top score.
    AmbiguousFallback,
    /// Nothing matched; every agent is tried.
    NoMatchFallback,
    /// The caller addressed one agent by name.
    Named,
    /// Registry is empty.
    NoAgents,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteReason::ExactKeyword => "exact_keyword",
            RouteReason::PartialName => "partial_name",
            RouteReason::AmbiguousFallback => "ambiguous_fallback",
            RouteReason::NoMatchFallback => "no_match_fallback",
            RouteReason::Named => "named",
            RouteReason::NoAgents => "no_agents",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteTarget {
    pub agent: AgentDescriptor,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub query: Query,
    /// Ordered by score descending, then registration order.
    pub targets: Vec<RouteTarget>,
    pub reason: RouteReason,
}

impl RoutingDecision {
    pub fn is_fan_out(&self) -> bool {
        self.targets.len() > 1
    }

    pub fn target_ids(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.agent.id.as_str()).collect()
    }
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Per-agent match breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Score {
    pub keyword_hits: u32,
    pub name_hit: bool,
}

impl Score {
    pub fn total(&self) -> u32 {
        self.keyword_hits + if self.name_hit { NAME_BONUS } else { 0 }
    }
}

/// Lowercase and collapse every run of non-alphanumerics to one space, so
/// `"Customs-Office?"` and `"customs office"` compare equal.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

/// Whether `term` occurs in `haystack`, both normalised.  A substring match
/// counts, so `"invoice"` is found in `"invoices"`.
fn contains_term(haystack: &str, term: &str) -> bool {
    let term = normalize(term);
    !term.is_empty() && haystack.contains(&term)
}

pub fn score(agent: &AgentDescriptor, normalized_query: &str) -> Score {
    let keyword_hits = agent
        .keywords
        .iter()
        .filter(|k| contains_term(normalized_query, k))
        .count() as u32;
    let name_hit = agent
        .name_forms()
        .iter()
        .any(|form| contains_term(normalized_query, form));
    Score { keyword_hits, name_hit }
}

/// Route against a fixed set of agents (registration order).  Pure.
pub fn route_with(query: &Query, agents: &[AgentDescriptor]) -> RoutingDecision {
    if agents.is_empty() {
        return RoutingDecision { query: query.clone(), targets: Vec::new(), reason: RouteReason::NoAgents };
    }

    let normalized = normalize(&query.text);
    let scored: Vec<(&AgentDescriptor, Score)> =
        agents.iter().map(|a| (a, score(a, &normalized))).collect();

    for (agent, s) in &scored {
        debug!(agent_id = %agent.id, keyword_hits = s.keyword_hits, name_hit = s.name_hit, score = s.total(), "route score");
    }

    let top = scored.iter().map(|(_, s)| s.total()).max().unwrap_or(0);

    let (mut targets, reason) = if top == 0 {
        let all: Vec<RouteTarget> = scored
            .iter()
            .map(|(a, s)| RouteTarget { agent: (*a).clone(), score: s.total() })
            .collect();
        (all, RouteReason::NoMatchFallback)
    } else {
        let tied: Vec<&(&AgentDescriptor, Score)> =
            scored.iter().filter(|(_, s)| s.total() == top).collect();
        let reason = match tied.as_slice() {
            [(_, only)] if only.keyword_hits == 0 => RouteReason::PartialName,
            [_] => RouteReason::ExactKeyword,
            _ => RouteReason::AmbiguousFallback,
        };
        let targets: Vec<RouteTarget> = tied
            .into_iter()
            .map(|(a, s)| RouteTarget { agent: (*a).clone(), score: s.total() })
            .collect();
        (targets, reason)
    };

    // Stable: equal scores keep registration order.
    targets.sort_by(|a, b| b.score.cmp(&a.score));

    RoutingDecision { query: query.clone(), targets, reason }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Routes against the live registry.  Holds no state of its own.
#[derive(Clone)]
pub struct Router {
    registry: Arc<AgentRegistry>,
}

impl Router {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub async fn route(&self, query: &Query) -> RoutingDecision {
        let snapshot = self.registry.snapshot().await;
        let decision = route_with(query, &snapshot);
        debug!(
            reason = decision.reason.as_str(),
            targets = ?decision.target_ids(),
            "routing decision"
        );
        decision
    }

    /// Skip scoring and target the agent `name` resolves to.  `None` when
    /// no registered agent matches.
    pub async fn route_named(&self, query: &Query, name: &str) -> Option<RoutingDecision> {
        let agent = self.registry.resolve_name(name).await?;
        let score = score(&agent, &normalize(&query.text)).total();
        debug!(requested = name, agent_id = %agent.id, "routing to named agent");
        Some(RoutingDecision {
            query: query.clone(),
            targets: vec![RouteTarget { agent, score }],
            reason: RouteReason::Named,
        })
    }
}
