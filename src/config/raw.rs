//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape: serde target before resolution.
#[derive(Deserialize)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub orchestrator: RawOrchestrator,
    #[serde(default)]
    pub dispatch: RawDispatch,
    #[serde(default)]
    pub agents: Vec<RawAgent>,
    #[serde(default)]
    pub verifier: RawVerifier,
    #[serde(default)]
    pub analysis: RawAnalysis,
    #[serde(default)]
    pub comms: RawComms,
}

#[derive(Deserialize)]
pub(super) struct RawOrchestrator {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,
}

impl Default for RawOrchestrator {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_file: None,
            request_deadline_ms: default_request_deadline_ms(),
        }
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawDispatch {
    #[serde(default = "default_dispatch_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// `0` disables the background health monitor.
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default = "default_true")]
    pub discover_cards: bool,
}

impl Default for RawDispatch {
    fn default() -> Self {
        Self {
            timeout_ms: default_dispatch_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            health_interval_secs: default_health_interval_secs(),
            discover_cards: true,
        }
    }
}

// ── Agents ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawAgent {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Env var that, when set, replaces `url`.
    #[serde(default)]
    pub url_env: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Defaults to `true`; set to `false` to disable without removing the entry.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ── Verifier ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawVerifier {
    #[serde(default = "default_verifier_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub scope_topics: Vec<String>,
    #[serde(default)]
    pub risk_terms: Vec<RawRiskTerm>,
    #[serde(default)]
    pub risk_patterns: Vec<RawRiskPattern>,
}

impl Default for RawVerifier {
    fn default() -> Self {
        Self {
            timeout_ms: default_verifier_timeout_ms(),
            scope_topics: Vec::new(),
            risk_terms: Vec::new(),
            risk_patterns: Vec::new(),
        }
    }
}

/// Either a bare string (`"fraud"`) or `{ term = "fraud", level = "medium" }`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(super) enum RawRiskTerm {
    Bare(String),
    Detailed {
        term: String,
        #[serde(default)]
        level: Option<String>,
    },
}

#[derive(Deserialize)]
pub(super) struct RawRiskPattern {
    pub pattern: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

// ── Analysis ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawAnalysis {
    #[serde(default = "default_analysis_provider")]
    pub provider: String,
    #[serde(default)]
    pub openai: RawOpenAiConfig,
}

impl Default for RawAnalysis {
    fn default() -> Self {
        Self { provider: default_analysis_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
pub(super) struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_temperature")]
    pub temperature: f32,
    #[serde(default = "default_openai_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_openai_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            max_tokens: default_openai_max_tokens(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

// ── Comms ───────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawComms {
    #[serde(default)]
    pub pty: RawPty,
    #[serde(default)]
    pub http: RawHttp,
}

#[derive(Deserialize)]
pub(super) struct RawPty {
    /// Defaults to `true`: the console is the zero-config entry point.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
pub(super) struct RawHttp {
    /// Defaults to `false`: HTTP must be explicitly enabled.
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_http_bind")]
    pub bind: String,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { enabled: false, bind: default_http_bind() }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_name() -> String { "concierge".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_request_deadline_ms() -> u64 { 20_000 }
fn default_dispatch_timeout_ms() -> u64 { 15_000 }
fn default_probe_timeout_ms() -> u64 { 3_000 }
fn default_health_interval_secs() -> u64 { 30 }
fn default_verifier_timeout_ms() -> u64 { 5_000 }
fn default_analysis_provider() -> String { "none".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_temperature() -> f32 { 0.1 }
fn default_openai_max_tokens() -> u32 { 500 }
fn default_openai_timeout_seconds() -> u64 { 10 }

pub(super) fn default_http_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}
