//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs the core consumes.
//! Raw TOML deserialization types live in `raw.rs`.

use std::path::PathBuf;
use std::time::Duration;

use crate::verifier::RiskLevel;

// ── Comms ───────────────────────────────────────────────────────────────────

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Whether the PTY channel is explicitly enabled.
    pub enabled: bool,
}

/// HTTP (axum) channel configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whether the HTTP channel is explicitly enabled.
    pub enabled: bool,
    /// Socket address to bind the HTTP channel to.
    pub bind: String,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub http: HttpConfig,
}

// ── Agents ───────────────────────────────────────────────────────────────────

/// One remote specialist agent, from an `[[agents]]` entry.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Stable identifier: explicit `id`, or the slug of `name`.
    pub id: String,
    pub name: String,
    /// Base endpoint (already env-overridden via `url_env`).
    pub url: String,
    /// Capability keywords used by the router and the relevance check.
    pub keywords: Vec<String>,
    /// Extra recognisable name forms (e.g. `"imports"` for "Imports Agent").
    pub aliases: Vec<String>,
}

/// Connection-manager timing and discovery knobs (`[dispatch]`).
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Per-call deadline; never longer than the request deadline.
    pub timeout: Duration,
    /// Deadline for a single health probe (agent-card fetch).
    pub probe_timeout: Duration,
    /// Background probe period; `None` disables the monitor.
    pub health_interval: Option<Duration>,
    /// Fetch agent cards at startup to enrich descriptors.
    pub discover_cards: bool,
}

// ── Verifier ─────────────────────────────────────────────────────────────────

/// A plain risk-indicator term.
#[derive(Debug, Clone)]
pub struct RiskTermConfig {
    pub term: String,
    /// Level assigned to an explicit (word-bounded) hit.
    pub level: RiskLevel,
}

/// A regex risk indicator (PII markers and the like).
#[derive(Debug, Clone)]
pub struct RiskPatternConfig {
    pub pattern: String,
    pub level: RiskLevel,
    /// Name reported in detected issues instead of the raw match.
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Deadline for the external analysis call, independent of dispatch.
    pub timeout: Duration,
    /// Topics listed in security alerts so the user can rephrase.
    pub scope_topics: Vec<String>,
    pub risk_terms: Vec<RiskTermConfig>,
    pub risk_patterns: Vec<RiskPatternConfig>,
}

// ── Analysis ─────────────────────────────────────────────────────────────────

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[analysis.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Upper bound on judgment length.
    pub max_tokens: u32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// External content-analysis configuration.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Which provider is active (`"none"`, `"openai"`, `"openai-compatible"`).
    pub provider: String,
    pub openai: OpenAiConfig,
}

// ── Root ─────────────────────────────────────────────────────────────────────

/// Fully-resolved orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Overall per-request deadline covering the whole fan-out.
    pub request_deadline: Duration,
    pub dispatch: DispatchConfig,
    pub agents: Vec<AgentConfig>,
    pub verifier: VerifierConfig,
    pub analysis: AnalysisConfig,
    /// API key from `LLM_API_KEY` env var; `None` for keyless local models.
    /// Never sourced from TOML.
    pub analysis_api_key: Option<String>,
    pub comms: CommsConfig,
}

impl Config {
    /// Returns `true` if the PTY channel should be loaded.
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    /// Returns `true` if the HTTP channel should be loaded.
    pub fn comms_http_should_load(&self) -> bool {
        self.comms.http.enabled
    }
}
