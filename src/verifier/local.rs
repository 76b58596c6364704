//! Local, deterministic checks: risk-indicator scan and domain relevance.

use regex::Regex;

use crate::config::{RiskPatternConfig, RiskTermConfig};
use crate::error::AppError;
use crate::registry::AgentDescriptor;

use super::RiskLevel;

struct TermRule {
    /// Lowercased, for the soft substring check.
    term: String,
    explicit: Regex,
    level: RiskLevel,
}

struct PatternRule {
    regex: Regex,
    label: String,
    level: RiskLevel,
}

/// Outcome of a local scan.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Findings {
    /// Highest level across all hits; `None` when clean.
    pub level: RiskLevel,
    /// `risk_term:<term>`, `soft_match:<term>` or `pattern:<label>` per hit.
    pub issues: Vec<String>,
}

/// Compiled risk indicators.
///
/// Terms match explicitly on word boundaries (`(?i)\bterm\b`) at their
/// configured level; a substring-only hit is soft and scores [`RiskLevel::Low`].
/// Patterns report their label, never the matched text.
pub struct LocalScanner {
    terms: Vec<TermRule>,
    patterns: Vec<PatternRule>,
}

impl LocalScanner {
    pub fn new(terms: &[RiskTermConfig], patterns: &[RiskPatternConfig]) -> Result<Self, AppError> {
        let mut term_rules = Vec::with_capacity(terms.len());
        for t in terms {
            let explicit = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&t.term)))
                .map_err(|e| AppError::Config(format!("risk term {:?}: {e}", t.term)))?;
            term_rules.push(TermRule {
                term: t.term.to_lowercase(),
                explicit,
                level: t.level,
            });
        }

        let mut pattern_rules = Vec::with_capacity(patterns.len());
        for p in patterns {
            let regex = Regex::new(&p.pattern)
                .map_err(|e| AppError::Config(format!("risk pattern {:?}: {e}", p.pattern)))?;
            pattern_rules.push(PatternRule { regex, label: p.label.clone(), level: p.level });
        }

        Ok(Self { terms: term_rules, patterns: pattern_rules })
    }

    pub fn scan(&self, content: &str) -> Findings {
        let mut findings = Findings::default();
        let lowered = content.to_lowercase();

        for rule in &self.terms {
            if rule.explicit.is_match(content) {
                findings.record(rule.level, format!("risk_term:{}", rule.term));
            } else if lowered.contains(&rule.term) {
                findings.record(RiskLevel::Low, format!("soft_match:{}", rule.term));
            }
        }

        for rule in &self.patterns {
            if rule.regex.is_match(content) {
                findings.record(rule.level, format!("pattern:{}", rule.label));
            }
        }

        findings
    }
}

impl Findings {
    fn record(&mut self, level: RiskLevel, issue: String) {
        // A matched rule always counts, even one configured at `none`.
        self.level = self.level.max(level).max(RiskLevel::Low);
        self.issues.push(issue);
    }
}

/// Whether `content` mentions any keyword, alias or name form of `agent`.
/// Empty content is never relevant.
pub(super) fn mentions_domain(agent: &AgentDescriptor, content: &str) -> bool {
    let lowered = content.to_lowercase();
    if lowered.trim().is_empty() {
        return false;
    }
    agent
        .keywords
        .iter()
        .chain(agent.name_forms().iter())
        .any(|term| lowered.contains(term.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> LocalScanner {
        LocalScanner::new(
            &[
                RiskTermConfig { term: "money laundering".into(), level: RiskLevel::High },
                RiskTermConfig { term: "password".into(), level: RiskLevel::Medium },
            ],
            &[RiskPatternConfig {
                pattern: r"(?i)api[_-]?key\s*=\s*\S+".into(),
                level: RiskLevel::High,
                label: "credential".into(),
            }],
        )
        .unwrap()
    }

    #[test]
    fn clean_text_has_no_findings() {
        assert_eq!(scanner().scan("Invoice 42 is paid."), Findings::default());
    }

    #[test]
    fn explicit_multi_word_term_is_case_insensitive() {
        let f = scanner().scan("This looks like Money Laundering to me.");
        assert_eq!(f.level, RiskLevel::High);
        assert_eq!(f.issues, vec!["risk_term:money laundering"]);
    }

    #[test]
    fn embedded_term_is_soft() {
        let f = scanner().scan("Reset your passwords regularly.");
        assert_eq!(f.level, RiskLevel::Low);
        assert_eq!(f.issues, vec!["soft_match:password"]);
    }

    #[test]
    fn pattern_reports_label_not_match() {
        let f = scanner().scan("config: api_key = sk-abcdef123456");
        assert_eq!(f.level, RiskLevel::High);
        assert_eq!(f.issues, vec!["pattern:credential"]);
    }

    #[test]
    fn highest_level_wins() {
        let f = scanner().scan("password and money laundering");
        assert_eq!(f.level, RiskLevel::High);
        assert_eq!(f.issues.len(), 2);
    }

    #[test]
    fn relevance_uses_keywords_and_name_forms() {
        let agent = AgentDescriptor::new("imports", "Imports Agent", "http://x")
            .with_keywords(["customs"]);
        assert!(mentions_domain(&agent, "The CUSTOMS office opens at 9."));
        assert!(mentions_domain(&agent, "Imports are handled separately."));
        assert!(!mentions_domain(&agent, "Nice weather today."));
        assert!(!mentions_domain(&agent, "   "));
    }
}
