//! Response verification: safety and relevance screening.
//!
//! Every successful agent reply passes through [`Verifier::verify`] before
//! the orchestrator may show it.  Local checks always run; the external
//! [`ContentAnalyzer`] strengthens them when configured, bounded by its own
//! timeout.  When the external judgment is missing the result is marked
//! `degraded` instead of failing the request.

mod local;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::analysis::{AnalysisJudgment, AnalysisRequest, ContentAnalyzer};
use crate::config::VerifierConfig;
use crate::error::AppError;
use crate::query::Query;
use crate::registry::{AgentDescriptor, AgentResponse};

pub use local::{Findings, LocalScanner};

/// Reason recorded when the external analysis call failed or timed out.
pub const DEGRADED_REASON: &str = "external_analysis_unavailable";

/// Stands in for external issues too long to pass as a label.  Model-written
/// issue text can quote the content being withheld.
pub const UNLABELLED_ISSUE: &str = "analysis:unlabelled";

const MAX_LABEL_WORDS: usize = 3;
const MAX_LABEL_LEN: usize = 32;

// ── RiskLevel ─────────────────────────────────────────────────────────────────

/// Ordered severity: `None < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(RiskLevel::None),
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level: {other:?}")),
        }
    }
}

// ── VerificationResult ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub is_safe: bool,
    pub is_relevant: bool,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// External analysis was configured but unavailable for this response.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detected_issues: Vec<String>,
}

/// Presentation bucket for a verified response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified,
    Warning,
    Alert,
}

impl VerificationStatus {
    pub fn marker(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "✅",
            VerificationStatus::Warning => "⚠️",
            VerificationStatus::Alert => "🚨",
        }
    }
}

impl VerificationResult {
    pub fn status(&self) -> VerificationStatus {
        if !self.is_safe {
            VerificationStatus::Alert
        } else if !self.is_relevant || self.degraded {
            VerificationStatus::Warning
        } else {
            VerificationStatus::Verified
        }
    }

    /// Fold an external judgment into a local result.  Unsafe wins, risk takes
    /// the maximum, relevance follows the external call.
    fn combine(mut self, judgment: AnalysisJudgment) -> Self {
        let flagged = !judgment.is_safe || !judgment.is_relevant;
        self.is_safe = self.is_safe && judgment.is_safe;
        self.is_relevant = judgment.is_relevant;
        self.risk_level = self.risk_level.max(judgment.risk_level);
        for issue in &judgment.detected_issues {
            let label = external_label(issue).unwrap_or_else(|| UNLABELLED_ISSUE.to_string());
            if !self.detected_issues.contains(&label) {
                self.detected_issues.push(label);
            }
        }
        if flagged && !judgment.explanation.trim().is_empty() {
            self.reason = Some(judgment.explanation);
        }
        self.with_floor()
    }

    fn degrade(mut self) -> Self {
        self.degraded = true;
        if self.is_safe {
            self.reason = Some(DEGRADED_REASON.to_string());
        }
        self
    }

    /// An unsafe verdict always carries at least `Low` risk.
    fn with_floor(mut self) -> Self {
        if !self.is_safe && self.risk_level == RiskLevel::None {
            self.risk_level = RiskLevel::Low;
        }
        self
    }
}

// ── Verifier ──────────────────────────────────────────────────────────────────

pub struct Verifier {
    scanner: LocalScanner,
    analyzer: Option<ContentAnalyzer>,
    timeout: Duration,
    scope_topics: Vec<String>,
}

impl Verifier {
    pub fn new(config: &VerifierConfig, analyzer: Option<ContentAnalyzer>) -> Result<Self, AppError> {
        Ok(Self {
            scanner: LocalScanner::new(&config.risk_terms, &config.risk_patterns)?,
            analyzer,
            timeout: config.timeout,
            scope_topics: config.scope_topics.clone(),
        })
    }

    /// Topics the deployment serves; listed in security alerts.
    pub fn scope_topics(&self) -> &[String] {
        &self.scope_topics
    }

    pub fn has_external_analysis(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Screen one response.  Never fails: external problems degrade the
    /// result rather than propagating.
    pub async fn verify(
        &self,
        query: &Query,
        response: &AgentResponse,
        agent: &AgentDescriptor,
    ) -> VerificationResult {
        self.verify_within(query, response, agent, self.timeout).await
    }

    /// Like [`verify`](Self::verify), but the external call also stops at
    /// `deadline` when that comes first.
    pub async fn verify_before(
        &self,
        query: &Query,
        response: &AgentResponse,
        agent: &AgentDescriptor,
        deadline: Instant,
    ) -> VerificationResult {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.verify_within(query, response, agent, self.timeout.min(remaining)).await
    }

    async fn verify_within(
        &self,
        query: &Query,
        response: &AgentResponse,
        agent: &AgentDescriptor,
        budget: Duration,
    ) -> VerificationResult {
        let content = response_content(response);
        let local = self.verify_local(&content, agent);

        let Some(analyzer) = &self.analyzer else {
            return local;
        };

        let topic = describe_domain(agent);
        let request = AnalysisRequest {
            topic: &topic,
            query: &query.text,
            response: &content,
        };

        match tokio::time::timeout(budget, analyzer.analyze(&request)).await {
            Ok(Ok(judgment)) => {
                debug!(
                    agent_id = %agent.id,
                    is_safe = judgment.is_safe,
                    is_relevant = judgment.is_relevant,
                    risk = %judgment.risk_level,
                    "external analysis judgment"
                );
                local.combine(judgment)
            }
            Ok(Err(e)) => {
                warn!(agent_id = %agent.id, error = %e, "external analysis failed, using local checks");
                local.degrade()
            }
            Err(_) => {
                warn!(
                    agent_id = %agent.id,
                    timeout_ms = budget.as_millis() as u64,
                    "external analysis timed out, using local checks"
                );
                local.degrade()
            }
        }
    }

    fn verify_local(&self, content: &str, agent: &AgentDescriptor) -> VerificationResult {
        let findings = self.scanner.scan(content);
        let is_safe = findings.issues.is_empty();
        let is_relevant = local::mentions_domain(agent, content);

        let reason = if !is_safe {
            Some(format!("matched risk indicators: {}", findings.issues.join(", ")))
        } else if !is_relevant {
            Some("response does not mention the agent's declared domain".to_string())
        } else {
            None
        };

        VerificationResult {
            is_safe,
            is_relevant,
            risk_level: findings.level,
            reason,
            degraded: false,
            detected_issues: findings.issues,
        }
        .with_floor()
    }
}

/// Reduce an external issue to a short snake_case label, or `None` when it
/// reads like prose.
fn external_label(issue: &str) -> Option<String> {
    let words: Vec<String> = issue
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    let label = words.join("_");
    if words.is_empty() || words.len() > MAX_LABEL_WORDS || label.len() > MAX_LABEL_LEN {
        return None;
    }
    Some(format!("analysis:{label}"))
}

/// Everything the user could see from a response: text plus structured parts.
fn response_content(response: &AgentResponse) -> String {
    let mut content = response.payload.text.clone();
    for item in &response.payload.data {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&item.to_string());
    }
    content
}

fn describe_domain(agent: &AgentDescriptor) -> String {
    let mut topic = match &agent.description {
        Some(desc) if !desc.trim().is_empty() => format!("{} ({})", agent.name, desc.trim()),
        _ => agent.name.clone(),
    };
    if !agent.keywords.is_empty() {
        topic.push_str(": ");
        topic.push_str(&agent.keywords.join(", "));
    }
    topic
}
