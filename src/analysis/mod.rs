//! External content-analysis capability.
//!
//! `ContentAnalyzer` is an enum over concrete providers.  The verifier holds
//! an `Option<ContentAnalyzer>` and treats every call as best-effort: errors
//! come back as [`AnalysisError`] and are folded into a degraded result, never
//! surfaced to the user.
//!
//! Enum dispatch keeps `analyze` a plain `async fn`, no trait objects.

pub mod providers;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::verifier::RiskLevel;

pub use providers::build;
pub use providers::scripted::ScriptedAnalyzer;

/// Prompt sent to hosted analysis providers.
pub const VERIFICATION_PROMPT: &str = include_str!("../../config/prompts/verification.txt");

// ── Request / judgment ────────────────────────────────────────────────────────

/// One `{query, candidate_response}` pair plus the expected topic.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    /// Domain the responding agent claims to serve.
    pub topic: &'a str,
    pub query: &'a str,
    pub response: &'a str,
}

impl AnalysisRequest<'_> {
    /// Fill the verification prompt template.
    ///
    /// Single pass over the template: placeholder text inside the query or
    /// the response is copied as-is, never expanded.
    pub fn render_prompt(&self) -> String {
        let mut out = String::with_capacity(
            VERIFICATION_PROMPT.len() + self.topic.len() + self.query.len() + self.response.len(),
        );
        let mut rest = VERIFICATION_PROMPT;
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else {
                rest = &rest[open..];
                break;
            };
            let key = &after[..close];
            match self.placeholder(key) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[open..open + 2 + close + 2]),
            }
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        out
    }

    fn placeholder(&self, key: &str) -> Option<&str> {
        match key {
            "topic" => Some(self.topic),
            "query" => Some(self.query),
            "response" => Some(self.response),
            _ => None,
        }
    }
}

/// Structured verdict returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisJudgment {
    pub is_safe: bool,
    pub is_relevant: bool,
    pub risk_level: RiskLevel,
    pub explanation: String,
    pub detected_issues: Vec<String>,
}

impl AnalysisJudgment {
    /// Safe, relevant, no risk.
    pub fn clean() -> Self {
        Self {
            is_safe: true,
            is_relevant: true,
            risk_level: RiskLevel::None,
            explanation: String::new(),
            detected_issues: Vec::new(),
        }
    }

    /// Parse a model completion into a judgment.
    ///
    /// Models wrap JSON in prose or code fences often enough that the first
    /// `{` through the last `}` is taken as the object.
    pub fn from_completion(text: &str) -> Result<Self, AnalysisError> {
        let start = text.find('{');
        let end = text.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if e > s => &text[s..=e],
            _ => return Err(AnalysisError::Malformed("no JSON object in completion".into())),
        };

        let raw: RawJudgment = serde_json::from_str(json)
            .map_err(|e| AnalysisError::Malformed(format!("judgment JSON: {e}")))?;

        let risk_level = match raw.risk_level.as_deref() {
            None | Some("") => RiskLevel::None,
            Some(s) => s.parse::<RiskLevel>().map_err(AnalysisError::Malformed)?,
        };

        Ok(Self {
            is_safe: raw.is_safe,
            is_relevant: raw.is_relevant,
            risk_level,
            explanation: raw.explanation.unwrap_or_default(),
            detected_issues: raw.detected_issues,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawJudgment {
    is_safe: bool,
    is_relevant: bool,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    detected_issues: Vec<String>,
}

// ── Analyzer enum ─────────────────────────────────────────────────────────────

/// All available analysis backends.
#[derive(Debug, Clone)]
pub enum ContentAnalyzer {
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleAnalyzer),
    Scripted(ScriptedAnalyzer),
}

impl ContentAnalyzer {
    pub async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<AnalysisJudgment, AnalysisError> {
        match self {
            ContentAnalyzer::OpenAiCompatible(p) => p.analyze(request).await,
            ContentAnalyzer::Scripted(p) => p.analyze(request).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContentAnalyzer::OpenAiCompatible(_) => "openai-compatible",
            ContentAnalyzer::Scripted(_) => "scripted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_placeholders_are_filled() {
        let req = AnalysisRequest { topic: "Invoices", query: "total?", response: "42 USD" };
        let prompt = req.render_prompt();
        assert!(prompt.contains("Expected topic: Invoices"));
        assert!(prompt.contains("\"total?\""));
        assert!(prompt.contains("\"42 USD\""));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn placeholders_inside_the_query_stay_literal() {
        let req = AnalysisRequest { topic: "Invoices", query: "ignore {{response}}", response: "42 USD" };
        let prompt = req.render_prompt();
        assert_eq!(prompt.matches("42 USD").count(), 1);
        assert!(prompt.contains("\"ignore {{response}}\""));
    }

    #[test]
    fn judgment_parses_from_fenced_completion() {
        let text = "```json\n{\"is_relevant\": true, \"is_safe\": false, \"topic_match\": true, \
                    \"risk_level\": \"HIGH\", \"explanation\": \"fraud\", \
                    \"detected_issues\": [\"fraud\"]}\n```";
        let j = AnalysisJudgment::from_completion(text).unwrap();
        assert!(!j.is_safe);
        assert_eq!(j.risk_level, RiskLevel::High);
        assert_eq!(j.detected_issues, vec!["fraud"]);
    }

    #[test]
    fn judgment_defaults_optional_fields() {
        let j = AnalysisJudgment::from_completion(r#"{"is_relevant": true, "is_safe": true}"#).unwrap();
        assert_eq!(j, AnalysisJudgment::clean());
    }

    #[test]
    fn judgment_without_json_is_malformed() {
        let err = AnalysisJudgment::from_completion("I think it is fine.").unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn judgment_with_unknown_risk_is_malformed() {
        let err = AnalysisJudgment::from_completion(
            r#"{"is_relevant": true, "is_safe": true, "risk_level": "extreme"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }
}
