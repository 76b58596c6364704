//! Content-analysis provider implementations.
//!
//! `build(config, api_key)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

pub mod openai_compatible;
pub mod scripted;

use crate::analysis::ContentAnalyzer;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

/// Construct the configured analyzer, or `None` when external analysis is
/// switched off (`provider = "none"`).
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML) and is `None`
/// for keyless local models.
pub fn build(
    config: &AnalysisConfig,
    api_key: Option<String>,
) -> Result<Option<ContentAnalyzer>, AnalysisError> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        // Judges everything clean; exercises the full verification path
        // without network access.
        "scripted" => Ok(Some(ContentAnalyzer::Scripted(scripted::ScriptedAnalyzer::default()))),
        "openai" | "openai-compatible" => {
            let p = openai_compatible::OpenAiCompatibleAnalyzer::new(&config.openai, api_key)?;
            Ok(Some(ContentAnalyzer::OpenAiCompatible(p)))
        }
        other => Err(AnalysisError::UnknownProvider(other.to_string())),
    }
}
