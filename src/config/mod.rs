//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or an explicit `-f` path), then applies `CONCIERGE_*` env overrides and
//! per-agent `url_env` overrides.
//!
//! # Module layout
//!
//! - **types**: Public configuration structs consumed by the core
//!   (`Config`, `AgentConfig`, `VerifierConfig`, …).
//! - **raw**: Raw TOML deserialization types (`RawConfig`, `RawAgent`, …).
//!   These mirror the file shape and use serde defaults; kept private.
//! - **load**: Loading logic: `merge_toml`, `load_raw_merged`, `load`,
//!   `load_from`, `load_str`, plus validation.

mod load;
mod raw;
mod types;

pub use load::{DEFAULT_CONFIG_TOML, load, load_from, load_str, slugify};
pub use types::*;

#[cfg(test)]
impl Config {
    /// Safe `Config` for unit tests: no agents, no analyzer, no channels.
    pub fn test_default() -> Self {
        use std::time::Duration;

        Self {
            name: "test".into(),
            log_level: "info".into(),
            log_file: None,
            request_deadline: Duration::from_millis(2_000),
            dispatch: DispatchConfig {
                timeout: Duration::from_millis(1_000),
                probe_timeout: Duration::from_millis(500),
                health_interval: None,
                discover_cards: false,
            },
            agents: Vec::new(),
            verifier: VerifierConfig {
                timeout: Duration::from_millis(500),
                scope_topics: Vec::new(),
                risk_terms: Vec::new(),
                risk_patterns: Vec::new(),
            },
            analysis: AnalysisConfig {
                provider: "none".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    max_tokens: 100,
                    timeout_seconds: 1,
                },
            },
            analysis_api_key: None,
            comms: CommsConfig {
                pty: PtyConfig { enabled: false },
                http: HttpConfig { enabled: false, bind: raw::default_http_bind() },
            },
        }
    }
}
