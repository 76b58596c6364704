//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! applies `CONCIERGE_LOG_LEVEL`, `CONCIERGE_REQUEST_DEADLINE_MS`, per-agent
//! `url_env` overrides and `LLM_API_KEY`, then validates the result.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::verifier::RiskLevel;

use super::raw::{RawConfig, RawRiskTerm};
use super::types::*;

/// Built-in configuration used when no file is present on disk.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../config/default.toml");

/// Deep-merge two TOML values.
/// Tables are merged recursively: the overlay only needs to specify keys that
/// differ from the base. For every other type (string, integer, array, …)
/// the overlay value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(
    path: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply
/// env-var overrides. If no path is given and `config/default.toml` does not
/// exist, the built-in default is used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let process_env = |key: &str| env::var(key).ok();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &process_env);
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(default_path, &process_env)
    } else {
        load_str(DEFAULT_CONFIG_TOML, &process_env)
    }
}

/// Load from an explicit path. `env` resolves environment variables: tests
/// pass a closure instead of mutating the process environment.
pub fn load_from(path: &Path, env: &dyn Fn(&str) -> Option<String>) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val)
        .map_err(|e: toml::de::Error| {
            AppError::Config(format!("config error in {}: {e}", path.display()))
        })?;

    resolve(parsed, env)
}

/// Load from an in-memory TOML document (no `[meta] base` support).
pub fn load_str(raw: &str, env: &dyn Fn(&str) -> Option<String>) -> Result<Config, AppError> {
    let parsed: RawConfig = toml::from_str(raw)
        .map_err(|e| AppError::Config(format!("parse error in inline config: {e}")))?;
    resolve(parsed, env)
}

fn resolve(parsed: RawConfig, env: &dyn Fn(&str) -> Option<String>) -> Result<Config, AppError> {
    let o = parsed.orchestrator;

    let log_level = env("CONCIERGE_LOG_LEVEL").unwrap_or(o.log_level);

    let deadline_ms = match env("CONCIERGE_REQUEST_DEADLINE_MS") {
        Some(v) => v.trim().parse::<u64>().map_err(|e| {
            AppError::Config(format!("CONCIERGE_REQUEST_DEADLINE_MS is not a number: {e}"))
        })?,
        None => o.request_deadline_ms,
    };
    if deadline_ms == 0 {
        return Err(AppError::Config("request_deadline_ms must be greater than zero".into()));
    }

    let d = parsed.dispatch;
    if d.timeout_ms == 0 {
        return Err(AppError::Config("dispatch.timeout_ms must be greater than zero".into()));
    }
    if d.timeout_ms > deadline_ms {
        return Err(AppError::Config(format!(
            "dispatch.timeout_ms ({}) exceeds request_deadline_ms ({deadline_ms})",
            d.timeout_ms
        )));
    }

    let mut agents = Vec::new();
    let mut seen_ids = HashSet::new();
    for raw_agent in parsed.agents.into_iter().filter(|a| a.enabled) {
        let id = raw_agent
            .id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| slugify(&raw_agent.name));
        if id.is_empty() {
            return Err(AppError::Config(format!(
                "agent {:?} has no usable id",
                raw_agent.name
            )));
        }
        if !seen_ids.insert(id.clone()) {
            return Err(AppError::Config(format!("duplicate agent id: {id}")));
        }

        let url = raw_agent
            .url_env
            .as_deref()
            .and_then(|key| env(key))
            .or(raw_agent.url)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::Config(format!("agent {id} has no url")))?;

        agents.push(AgentConfig {
            id,
            name: raw_agent.name,
            url: url.trim_end_matches('/').to_string(),
            keywords: normalise_terms(raw_agent.keywords),
            aliases: normalise_terms(raw_agent.aliases),
        });
    }

    let v = parsed.verifier;
    let mut risk_terms = Vec::with_capacity(v.risk_terms.len());
    for raw_term in v.risk_terms {
        let (term, level) = match raw_term {
            RawRiskTerm::Bare(term) => (term, None),
            RawRiskTerm::Detailed { term, level } => (term, level),
        };
        let term = term.trim().to_string();
        if term.is_empty() {
            continue;
        }
        let level = parse_level(level.as_deref(), RiskLevel::High)?;
        risk_terms.push(RiskTermConfig { term, level });
    }

    let mut risk_patterns = Vec::with_capacity(v.risk_patterns.len());
    for raw_pattern in v.risk_patterns {
        regex::Regex::new(&raw_pattern.pattern).map_err(|e| {
            AppError::Config(format!("invalid risk pattern {:?}: {e}", raw_pattern.pattern))
        })?;
        let level = parse_level(raw_pattern.level.as_deref(), RiskLevel::Medium)?;
        let label = raw_pattern.label.unwrap_or_else(|| raw_pattern.pattern.clone());
        risk_patterns.push(RiskPatternConfig { pattern: raw_pattern.pattern, level, label });
    }

    Ok(Config {
        name: o.name,
        log_level,
        log_file: o.log_file.map(PathBuf::from),
        request_deadline: Duration::from_millis(deadline_ms),
        dispatch: DispatchConfig {
            timeout: Duration::from_millis(d.timeout_ms),
            probe_timeout: Duration::from_millis(d.probe_timeout_ms.max(1)),
            health_interval: (d.health_interval_secs > 0)
                .then(|| Duration::from_secs(d.health_interval_secs)),
            discover_cards: d.discover_cards,
        },
        agents,
        verifier: VerifierConfig {
            timeout: Duration::from_millis(v.timeout_ms.max(1)),
            scope_topics: v.scope_topics,
            risk_terms,
            risk_patterns,
        },
        analysis: AnalysisConfig {
            provider: parsed.analysis.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.analysis.openai.api_base_url,
                model: parsed.analysis.openai.model,
                temperature: parsed.analysis.openai.temperature,
                max_tokens: parsed.analysis.openai.max_tokens,
                timeout_seconds: parsed.analysis.openai.timeout_seconds,
            },
        },
        analysis_api_key: env("LLM_API_KEY"),
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            http: HttpConfig {
                enabled: parsed.comms.http.enabled,
                bind: parsed.comms.http.bind,
            },
        },
    })
}

fn parse_level(raw: Option<&str>, default: RiskLevel) -> Result<RiskLevel, AppError> {
    match raw {
        None => Ok(default),
        Some(s) => s.parse::<RiskLevel>().map_err(AppError::Config),
    }
}

fn normalise_terms(terms: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(terms.len());
    for t in terms {
        let t = t.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

/// Lowercase `name`, replace runs of non-alphanumerics with `_`, trim `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}
