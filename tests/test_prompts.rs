//! Tests for the prompt templates shipped under config/prompts

use std::fs;
use std::path::{Path, PathBuf};

fn prompts_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config/prompts")
}

fn prompt_path(name: &str) -> PathBuf {
    prompts_dir().join(name)
}

#[test]
fn test_verification_prompt_file_exists() {
    assert!(prompt_path("verification.txt").exists(), "verification.txt prompt file missing");
}

#[test]
fn test_verification_prompt_template_vars() {
    let text = fs::read_to_string(prompt_path("verification.txt")).unwrap();
    assert!(text.contains("{{topic}}"), "verification.txt should contain {{topic}} variable");
    assert!(text.contains("{{query}}"), "verification.txt should contain {{query}} variable");
    assert!(text.contains("{{response}}"), "verification.txt should contain {{response}} variable");
}

#[test]
fn test_verification_prompt_names_judgment_fields() {
    let text = fs::read_to_string(prompt_path("verification.txt")).unwrap();
    for field in ["is_relevant", "is_safe", "risk_level", "explanation", "detected_issues"] {
        assert!(text.contains(field), "verification.txt should describe `{field}`");
    }
}

#[test]
fn test_default_config_exists() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    assert!(path.exists(), "config/default.toml missing");
}
