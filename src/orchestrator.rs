//! Request orchestration: route → dispatch → verify → present.
//!
//! One [`Orchestrator`] serves every inbound channel.  Per request it:
//!
//! 1. asks the [`Router`] for targets,
//! 2. dispatches to all targets concurrently under one overall deadline,
//!    leaving stragglers running but counting them as timed out,
//! 3. verifies each successful reply,
//! 4. assembles a [`FinalOutput`].
//!
//! A reply that fails the safety check never appears in the output, in
//! whole or in part.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::query::Query;
use crate::registry::{AgentDescriptor, AgentRegistry, AgentResponse};
use crate::router::{RouteReason, Router, RoutingDecision};
use crate::verifier::{RiskLevel, VerificationResult, VerificationStatus, Verifier};

// ── Request phase ─────────────────────────────────────────────────────────────

/// Per-request lifecycle.  Linear; `Presenting` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Routing,
    Dispatching,
    Verifying,
    Presenting,
}

struct RequestTrace {
    id: Uuid,
    phase: RequestPhase,
    started: Instant,
}

impl RequestTrace {
    fn start() -> Self {
        let trace = Self { id: Uuid::new_v4(), phase: RequestPhase::Routing, started: Instant::now() };
        debug!(request_id = %trace.id, phase = ?trace.phase, "request phase");
        trace
    }

    fn advance(&mut self, next: RequestPhase) {
        debug!(
            request_id = %self.id,
            from = ?self.phase,
            to = ?next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "request phase"
        );
        self.phase = next;
    }
}

// ── Output types ──────────────────────────────────────────────────────────────

/// One agent that produced no usable reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentFailure {
    pub agent_id: String,
    pub agent_name: String,
    /// `unreachable`, `timeout` or `protocol_error`.
    pub reason_code: String,
}

/// Verified content from one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerSection {
    pub agent_id: String,
    pub agent_name: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<serde_json::Value>,
    pub possibly_irrelevant: bool,
    /// Only local checks ran.
    pub degraded: bool,
    pub risk_level: RiskLevel,
}

impl AnswerSection {
    pub fn status(&self) -> VerificationStatus {
        if self.possibly_irrelevant || self.degraded {
            VerificationStatus::Warning
        } else {
            VerificationStatus::Verified
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Some targets did not answer.
    AgentUnavailable { agents: Vec<AgentFailure> },
    /// Some replies failed the safety check and were dropped.
    ContentWithheld { agents: Vec<String>, risk_level: RiskLevel },
    /// Shown, but off the agent's declared domain.
    PossiblyIrrelevant { agents: Vec<String> },
    /// External analysis was unavailable for these replies.
    VerificationDegraded { agents: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Security,
    AgentUnavailable,
}

/// The only thing a caller ever receives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalOutput {
    Answer {
        sections: Vec<AnswerSection>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        notices: Vec<Notice>,
        route_reason: RouteReason,
    },
    Alert {
        alert: AlertKind,
        reason_code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        risk_level: Option<RiskLevel>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        unavailable: Vec<AgentFailure>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        detected_issues: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        scope_topics: Vec<String>,
    },
}

pub const REASON_NO_AGENTS: &str = "no_agents_registered";
pub const REASON_ALL_FAILED: &str = "all_agents_failed";
pub const REASON_WITHHELD: &str = "content_withheld";
pub const REASON_UNKNOWN_AGENT: &str = "unknown_agent";

impl FinalOutput {
    pub fn is_alert(&self) -> bool {
        matches!(self, FinalOutput::Alert { .. })
    }

    /// Console rendering.
    pub fn render(&self) -> String {
        match self {
            FinalOutput::Answer { sections, notices, .. } => {
                let mut blocks: Vec<String> = sections
                    .iter()
                    .map(|s| {
                        let label = if s.possibly_irrelevant {
                            format!("{} {} (possibly irrelevant)", s.status().marker(), s.agent_name)
                        } else {
                            format!("{} {}", s.status().marker(), s.agent_name)
                        };
                        format!("{label}\n{}", s.content.trim())
                    })
                    .collect();
                blocks.extend(notices.iter().map(render_notice));
                blocks.join("\n\n")
            }
            FinalOutput::Alert { alert, message, risk_level, unavailable, detected_issues, scope_topics, .. } => {
                let mut out = match (alert, risk_level) {
                    (AlertKind::Security, Some(level)) => {
                        format!("{} Security alert (risk: {level})\n{message}", VerificationStatus::Alert.marker())
                    }
                    (AlertKind::Security, None) => {
                        format!("{} Security alert\n{message}", VerificationStatus::Alert.marker())
                    }
                    (AlertKind::AgentUnavailable, _) => {
                        format!("{} {message}", VerificationStatus::Warning.marker())
                    }
                };
                if !unavailable.is_empty() {
                    out.push_str(&format!("\nUnavailable: {}", describe_failures(unavailable)));
                }
                if !detected_issues.is_empty() {
                    out.push_str(&format!("\nDetected issues: {}", detected_issues.join(", ")));
                }
                if !scope_topics.is_empty() {
                    out.push_str("\nI can help with:");
                    for topic in scope_topics {
                        out.push_str(&format!("\n- {topic}"));
                    }
                }
                out
            }
        }
    }
}

fn render_notice(notice: &Notice) -> String {
    let warn = VerificationStatus::Warning.marker();
    match notice {
        Notice::AgentUnavailable { agents } => {
            format!("{warn} Unavailable: {}", describe_failures(agents))
        }
        Notice::ContentWithheld { agents, risk_level } => format!(
            "{} Content from {} was withheld after a security check (risk: {risk_level}).",
            VerificationStatus::Alert.marker(),
            agents.join(", ")
        ),
        Notice::PossiblyIrrelevant { agents } => {
            format!("{warn} The answer from {} may not match your question.", agents.join(", "))
        }
        Notice::VerificationDegraded { agents } => format!(
            "{warn} Safety analysis was unavailable for {}; only local checks were applied.",
            agents.join(", ")
        ),
    }
}

fn describe_failures(failures: &[AgentFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.agent_name, f.reason_code))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    router: Router,
    verifier: Arc<Verifier>,
    deadline: Duration,
}

type DispatchOutcome = Result<AgentResponse, DispatchError>;

impl Orchestrator {
    pub fn new(registry: Arc<AgentRegistry>, verifier: Verifier, deadline: Duration) -> Self {
        Self {
            router: Router::new(Arc::clone(&registry)),
            registry,
            verifier: Arc::new(verifier),
            deadline,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Answer one query.  Always returns a [`FinalOutput`].
    pub async fn handle(&self, query: Query) -> FinalOutput {
        let trace = RequestTrace::start();
        let deadline = Instant::now() + self.deadline;
        let decision = self.router.route(&query).await;
        self.run(trace, deadline, query, decision).await
    }

    /// Answer one query from the agent `name` resolves to, bypassing keyword
    /// routing.  An unknown name yields an `unknown_agent` alert.
    pub async fn handle_addressed(&self, query: Query, name: &str) -> FinalOutput {
        let mut trace = RequestTrace::start();
        let deadline = Instant::now() + self.deadline;
        match self.router.route_named(&query, name).await {
            Some(decision) => self.run(trace, deadline, query, decision).await,
            None => {
                trace.advance(RequestPhase::Presenting);
                warn!(request_id = %trace.id, requested = name, "no agent matches requested name");
                FinalOutput::Alert {
                    alert: AlertKind::AgentUnavailable,
                    reason_code: REASON_UNKNOWN_AGENT.to_string(),
                    message: format!("No agent named '{}' is registered.", name.trim()),
                    risk_level: None,
                    unavailable: Vec::new(),
                    detected_issues: Vec::new(),
                    scope_topics: self.verifier.scope_topics().to_vec(),
                }
            }
        }
    }

    async fn run(
        &self,
        mut trace: RequestTrace,
        deadline: Instant,
        query: Query,
        decision: RoutingDecision,
    ) -> FinalOutput {
        info!(
            request_id = %trace.id,
            reason = decision.reason.as_str(),
            targets = ?decision.target_ids(),
            "query routed"
        );
        if decision.targets.is_empty() {
            trace.advance(RequestPhase::Presenting);
            return FinalOutput::Alert {
                alert: AlertKind::AgentUnavailable,
                reason_code: REASON_NO_AGENTS.to_string(),
                message: "No agents are configured to answer questions right now.".to_string(),
                risk_level: None,
                unavailable: Vec::new(),
                detected_issues: Vec::new(),
                scope_topics: self.verifier.scope_topics().to_vec(),
            };
        }

        trace.advance(RequestPhase::Dispatching);
        let mut outcomes = self.dispatch_all(&decision, deadline).await;

        let mut failures = Vec::new();
        let mut replies = Vec::new();
        for target in &decision.targets {
            match outcomes.remove(&target.agent.id) {
                Some(Ok(response)) => replies.push((target.agent.clone(), response)),
                Some(Err(e)) => failures.push(failure(&target.agent, e.reason_code())),
                None => {
                    warn!(
                        request_id = %trace.id,
                        agent_id = %target.agent.id,
                        deadline_ms = self.deadline.as_millis() as u64,
                        "agent still outstanding at request deadline"
                    );
                    failures.push(failure(&target.agent, "timeout"));
                }
            }
        }

        if replies.is_empty() {
            trace.advance(RequestPhase::Presenting);
            warn!(request_id = %trace.id, failed = failures.len(), "all dispatched agents failed");
            return FinalOutput::Alert {
                alert: AlertKind::AgentUnavailable,
                reason_code: REASON_ALL_FAILED.to_string(),
                message: "None of the agents could answer right now. Please try again later.".to_string(),
                risk_level: None,
                unavailable: failures,
                detected_issues: Vec::new(),
                scope_topics: Vec::new(),
            };
        }

        trace.advance(RequestPhase::Verifying);
        let verified = self.verify_all(&query, replies, deadline).await;

        trace.advance(RequestPhase::Presenting);
        let output = self.present(&decision, verified, failures);
        info!(
            request_id = %trace.id,
            alert = output.is_alert(),
            elapsed_ms = trace.started.elapsed().as_millis() as u64,
            "request complete"
        );
        output
    }

    /// Fan out to every target; collect whatever settles before `deadline`.
    /// Calls still running at the deadline keep running detached.
    async fn dispatch_all(&self, decision: &RoutingDecision, deadline: Instant) -> HashMap<String, DispatchOutcome> {
        let (tx, mut rx) = mpsc::channel::<(String, DispatchOutcome)>(decision.targets.len().max(1));

        for target in &decision.targets {
            let registry = Arc::clone(&self.registry);
            let query = decision.query.clone();
            let agent_id = target.agent.id.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = registry.dispatch(&agent_id, &query).await;
                // Receiver is gone once the deadline passed; the result is dropped.
                let _ = tx.send((agent_id, outcome)).await;
            });
        }
        drop(tx);

        let mut outcomes = HashMap::with_capacity(decision.targets.len());
        while outcomes.len() < decision.targets.len() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((agent_id, outcome))) => {
                    outcomes.insert(agent_id, outcome);
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
        outcomes
    }

    async fn verify_all(
        &self,
        query: &Query,
        replies: Vec<(AgentDescriptor, AgentResponse)>,
        deadline: Instant,
    ) -> Vec<(AgentDescriptor, AgentResponse, VerificationResult)> {
        let mut set = JoinSet::new();
        for (idx, (agent, response)) in replies.into_iter().enumerate() {
            let verifier = Arc::clone(&self.verifier);
            let query = query.clone();
            set.spawn(async move {
                let result = verifier.verify_before(&query, &response, &agent, deadline).await;
                (idx, agent, response, result)
            });
        }

        let mut verified = Vec::new();
        while let Some(res) = set.join_next().await {
            match res {
                Ok(v) => verified.push(v),
                Err(e) => warn!("verification task failed: {e}"),
            }
        }
        // Back to routing order.
        verified.sort_by_key(|(idx, ..)| *idx);
        verified.into_iter().map(|(_, a, r, v)| (a, r, v)).collect()
    }

    fn present(
        &self,
        decision: &RoutingDecision,
        verified: Vec<(AgentDescriptor, AgentResponse, VerificationResult)>,
        failures: Vec<AgentFailure>,
    ) -> FinalOutput {
        let mut sections = Vec::new();
        let mut withheld = Vec::new();
        let mut withheld_risk = RiskLevel::None;
        let mut withheld_issues: Vec<String> = Vec::new();
        let mut irrelevant = Vec::new();
        let mut degraded = Vec::new();

        for (agent, response, result) in verified {
            if result.degraded {
                degraded.push((agent.id.clone(), agent.name.clone()));
            }
            if !result.is_safe {
                warn!(
                    agent_id = %agent.id,
                    risk = %result.risk_level,
                    reason = result.reason.as_deref().unwrap_or(""),
                    "response withheld"
                );
                withheld_risk = withheld_risk.max(result.risk_level);
                for issue in result.detected_issues {
                    if !withheld_issues.contains(&issue) {
                        withheld_issues.push(issue);
                    }
                }
                withheld.push(agent.name);
                continue;
            }
            if !result.is_relevant {
                irrelevant.push(agent.name.clone());
            }
            sections.push(AnswerSection {
                agent_id: agent.id,
                agent_name: agent.name,
                content: response.payload.text,
                data: response.payload.data,
                possibly_irrelevant: !result.is_relevant,
                degraded: result.degraded,
                risk_level: result.risk_level,
            });
        }

        if sections.is_empty() {
            return FinalOutput::Alert {
                alert: AlertKind::Security,
                reason_code: REASON_WITHHELD.to_string(),
                message: "The response was withheld because it did not pass the security check. \
                          Please rephrase your question."
                    .to_string(),
                risk_level: Some(withheld_risk.max(RiskLevel::Low)),
                unavailable: failures,
                detected_issues: withheld_issues,
                scope_topics: self.verifier.scope_topics().to_vec(),
            };
        }

        let mut notices = Vec::new();
        if !failures.is_empty() {
            notices.push(Notice::AgentUnavailable { agents: failures });
        }
        if !withheld.is_empty() {
            notices.push(Notice::ContentWithheld { agents: withheld, risk_level: withheld_risk.max(RiskLevel::Low) });
        }
        if !irrelevant.is_empty() {
            notices.push(Notice::PossiblyIrrelevant { agents: irrelevant });
        }
        // Sections already carry the warning marker; the notice explains it.
        let degraded_shown: Vec<String> = degraded
            .into_iter()
            .filter(|(id, _)| sections.iter().any(|s| &s.agent_id == id))
            .map(|(_, name)| name)
            .collect();
        if !degraded_shown.is_empty() {
            notices.push(Notice::VerificationDegraded { agents: degraded_shown });
        }

        FinalOutput::Answer { sections, notices, route_reason: decision.reason }
    }
}

fn failure(agent: &AgentDescriptor, reason_code: &str) -> AgentFailure {
    AgentFailure {
        agent_id: agent.id.clone(),
        agent_name: agent.name.clone(),
        reason_code: reason_code.to_string(),
    }
}
