//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is resolved
//! (CLI `-v` flags > `CONCIERGE_LOG_LEVEL` > config).
//!
//! A plain level such as `"debug"` applies to concierge itself; the HTTP
//! stack (hyper, reqwest, h2) stays at `warn` so agent traffic does not
//! drown the routing and verification logs.  Pass a full directive string
//! (`"concierge=debug,hyper=trace"`) to override that.

use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Dependencies held at `warn` unless a directive names them.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Initialise the global tracing subscriber.
///
/// If `prefer_level` is `true`, `level` takes precedence and `RUST_LOG` is only
/// used as a fallback when `level` is invalid. If `prefer_level` is `false`,
/// `RUST_LOG` takes precedence and `level` is the fallback.
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(level, prefer_level, rust_log.as_deref())?;

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| AppError::Logger(format!("failed to open log file '{}': {e}", path.display())))?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        // Log files are read with grep, not a terminal.
        .with_ansi(log_file.is_none())
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Resolve the filter from the configured `level` and the `RUST_LOG` value.
fn build_filter(level: &str, prefer_level: bool, rust_log: Option<&str>) -> Result<EnvFilter, AppError> {
    let from_level = || {
        EnvFilter::try_new(directives_for(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
    };
    let from_env = || {
        rust_log
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Logger("RUST_LOG is not set".into()))
            .and_then(|s| {
                EnvFilter::try_new(s).map_err(|e| AppError::Logger(format!("invalid RUST_LOG '{s}': {e}")))
            })
    };

    if prefer_level {
        from_level().or_else(|level_err| {
            from_env().map_err(|env_err| AppError::Logger(format!("{level_err}; fallback failed: {env_err}")))
        })
    } else {
        from_env().or_else(|_| from_level())
    }
}

/// Expand a bare level into directives that keep the HTTP stack quiet.
/// Anything that already looks like a directive list passes through.
fn directives_for(level: &str) -> String {
    let level = level.trim();
    if parse_level(level).is_err() {
        return level.to_string();
    }
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|dep| format!("{dep}=warn")));
    directives.join(",")
}

/// Parse a log level string into a [`LevelFilter`], returning an error on
/// unrecognised values. Used to validate config before initialising.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_levels_parse() {
        for l in &["error", "warn", "info", "debug", "trace"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
    }

    #[test]
    fn invalid_level_errors() {
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("").is_err());
    }

    #[test]
    fn bare_level_quiets_http_stack() {
        let d = directives_for("debug");
        assert!(d.starts_with("debug,"));
        assert!(d.contains("hyper=warn"));
        assert!(d.contains("reqwest=warn"));
    }

    #[test]
    fn directive_list_passes_through() {
        assert_eq!(directives_for("concierge=trace,hyper=info"), "concierge=trace,hyper=info");
    }

    #[test]
    fn filter_precedence() {
        // Preferred level wins even with RUST_LOG set.
        assert!(build_filter("info", true, Some("debug")).is_ok());
        // RUST_LOG missing falls back to the level.
        assert!(build_filter("info", false, None).is_ok());
        // Both unusable is an error naming the level.
        let err = build_filter("concierge=loud", true, None).unwrap_err().to_string();
        assert!(err.contains("concierge=loud"));
    }

    #[test]
    fn init_info_succeeds_or_already_init() {
        // May already be set by a prior test in the same process.
        match init("info", false, None) {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
