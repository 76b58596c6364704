//! Application-wide error types.
//!
//! [`AppError`] covers process bootstrap (config, logging, channels).  The
//! per-request taxonomy lives in [`DispatchError`], [`RegistryError`] and
//! [`AnalysisError`]; none of these ever reach the end user verbatim: the
//! orchestrator folds them into reason codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Failure of a single call to a single remote agent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("agent {agent_id} unreachable: {detail}")]
    Unreachable { agent_id: String, detail: String },

    #[error("agent {agent_id} timed out after {timeout_ms} ms")]
    Timeout { agent_id: String, timeout_ms: u64 },

    #[error("agent {agent_id} sent a malformed reply: {detail}")]
    Protocol { agent_id: String, detail: String },
}

impl DispatchError {
    /// Stable reason code surfaced to callers instead of the raw message.
    pub fn reason_code(&self) -> &'static str {
        match self {
            DispatchError::Unreachable { .. } => "unreachable",
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::Protocol { .. } => "protocol_error",
        }
    }

    pub fn agent_id(&self) -> &str {
        match self {
            DispatchError::Unreachable { agent_id, .. }
            | DispatchError::Timeout { agent_id, .. }
            | DispatchError::Protocol { agent_id, .. } => agent_id,
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Same identity already registered against a different endpoint.
    #[error("agent {agent_id} already registered at {existing_url} (attempted {attempted_url})")]
    Duplicate {
        agent_id: String,
        existing_url: String,
        attempted_url: String,
    },

    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}

// ── Analysis ──────────────────────────────────────────────────────────────────

/// Failure of the external content-analysis capability.  Always recoverable:
/// the verifier falls back to local checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("unknown analysis provider: {0}")]
    UnknownProvider(String),

    #[error("analysis request failed: {0}")]
    Request(String),

    #[error("analysis reply unparseable: {0}")]
    Malformed(String),
}
