//! Agent registry and connection manager.
//!
//! `AgentRegistry` is the single owner of every [`AgentDescriptor`].  It is
//! constructed once at startup, wrapped in an `Arc`, and handed to the
//! orchestrator, the health monitor and the comms channels.  Nothing else
//! mutates agent state.
//!
//! Locking: descriptors sit behind a read-mostly `RwLock` and per-session
//! context ids behind a `Mutex`.  Neither lock is held across a network
//! call, so dispatches to different agents (or the same agent) never wait
//! on each other.

pub mod descriptor;
pub mod monitor;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::{DispatchError, RegistryError};
use crate::query::Query;

pub use descriptor::{AgentDescriptor, AgentResponse, HealthState, ResponsePayload};
pub use monitor::HealthMonitor;
pub use transport::{AgentCard, AgentTransport, OutboundMessage};

/// `(agent_id, session_id)` → context id the agent last replied under.
type SessionMap = HashMap<(String, String), String>;

pub struct AgentRegistry {
    agents: RwLock<Vec<AgentDescriptor>>,
    sessions: Mutex<SessionMap>,
    transport: AgentTransport,
    dispatch_timeout: Duration,
    probe_timeout: Duration,
}

impl AgentRegistry {
    pub fn new(transport: AgentTransport, config: &DispatchConfig) -> Self {
        Self::with_timeouts(transport, config.timeout, config.probe_timeout)
    }

    pub fn with_timeouts(transport: AgentTransport, dispatch_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            transport,
            dispatch_timeout,
            probe_timeout,
        }
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Add an agent, or update the entry with the same identity.
    ///
    /// Identity is the id or (case-insensitively) the name.  Registering a
    /// known identity at a different url fails with
    /// [`RegistryError::Duplicate`]; at the same url it updates keywords,
    /// aliases and description while keeping the recorded health.  An id
    /// and a name that belong to two different agents are also a
    /// `Duplicate`: names stay unique.
    pub async fn register(&self, descriptor: AgentDescriptor) -> Result<(), RegistryError> {
        let mut agents = self.agents.write().await;

        let by_id = agents.iter().position(|a| a.id == descriptor.id);
        let by_name = agents.iter().position(|a| a.name.eq_ignore_ascii_case(&descriptor.name));
        let existing = match (by_id, by_name) {
            (Some(i), Some(n)) if i != n => {
                let owner = &agents[n];
                return Err(RegistryError::Duplicate {
                    agent_id: owner.id.clone(),
                    existing_url: owner.url.clone(),
                    attempted_url: descriptor.url,
                });
            }
            (Some(i), _) | (None, Some(i)) => Some(&mut agents[i]),
            (None, None) => None,
        };

        match existing {
            Some(current) if current.url != descriptor.url => Err(RegistryError::Duplicate {
                agent_id: current.id.clone(),
                existing_url: current.url.clone(),
                attempted_url: descriptor.url,
            }),
            Some(current) => {
                debug!(agent_id = %current.id, "updating registered agent");
                current.name = descriptor.name;
                current.keywords = descriptor.keywords;
                current.aliases = descriptor.aliases;
                if descriptor.description.is_some() {
                    current.description = descriptor.description;
                }
                Ok(())
            }
            None => {
                info!(agent_id = %descriptor.id, url = %descriptor.url, "agent registered");
                agents.push(descriptor);
                Ok(())
            }
        }
    }

    pub async fn deregister(&self, agent_id: &str) -> Result<AgentDescriptor, RegistryError> {
        let removed = {
            let mut agents = self.agents.write().await;
            let idx = agents
                .iter()
                .position(|a| a.id == agent_id)
                .ok_or_else(|| RegistryError::UnknownAgent(agent_id.to_string()))?;
            agents.remove(idx)
        };
        self.sessions.lock().await.retain(|(id, _), _| id != agent_id);
        info!(agent_id, "agent deregistered");
        Ok(removed)
    }

    /// Copy of every descriptor, in registration order.
    pub async fn snapshot(&self) -> Vec<AgentDescriptor> {
        self.agents.read().await.clone()
    }

    pub async fn get(&self, agent_id: &str) -> Option<AgentDescriptor> {
        self.agents.read().await.iter().find(|a| a.id == agent_id).cloned()
    }

    /// Resolve a user-supplied agent name: exact id, exact name
    /// (case-insensitive), then the first agent whose name contains the
    /// request or is contained in it.
    pub async fn resolve_name(&self, name: &str) -> Option<AgentDescriptor> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        let agents = self.agents.read().await;
        agents
            .iter()
            .find(|a| a.id == wanted)
            .or_else(|| agents.iter().find(|a| a.name.to_lowercase() == wanted))
            .or_else(|| {
                agents.iter().find(|a| {
                    let n = a.name.to_lowercase();
                    n.contains(&wanted) || wanted.contains(&n)
                })
            })
            .cloned()
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Send `query` to one agent and wait for its reply, bounded by the
    /// per-call timeout.
    pub async fn dispatch(&self, agent_id: &str, query: &Query) -> Result<AgentResponse, DispatchError> {
        let agent = self.get(agent_id).await.ok_or_else(|| DispatchError::Unreachable {
            agent_id: agent_id.to_string(),
            detail: "agent not registered".into(),
        })?;

        let context_id = self.context_for(&agent.id, query).await;
        let message = OutboundMessage::new(&query.text, context_id);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(
            self.dispatch_timeout,
            self.transport.send(&agent, &message, self.dispatch_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                agent_id: agent.id.clone(),
                timeout_ms: self.dispatch_timeout.as_millis() as u64,
            }),
        };
        let latency = started.elapsed();

        match outcome {
            Ok(payload) => {
                if let (Some(session), Some(ctx)) = (&query.session_id, &payload.context_id) {
                    self.sessions
                        .lock()
                        .await
                        .insert((agent.id.clone(), session.clone()), ctx.clone());
                }
                self.set_health(&agent.id, HealthState::Reachable).await;
                info!(
                    agent_id = %agent.id,
                    latency_ms = latency.as_millis() as u64,
                    text_len = payload.text.len(),
                    "agent replied"
                );
                Ok(AgentResponse { agent_id: agent.id, payload, latency })
            }
            Err(e) => {
                match &e {
                    DispatchError::Unreachable { .. } => {
                        self.set_health(&agent.id, HealthState::Unreachable).await;
                    }
                    // It answered, just badly.
                    DispatchError::Protocol { .. } => {
                        self.set_health(&agent.id, HealthState::Reachable).await;
                    }
                    DispatchError::Timeout { .. } => {}
                }
                warn!(
                    agent_id = %agent.id,
                    reason = e.reason_code(),
                    latency_ms = latency.as_millis() as u64,
                    error = %e,
                    "dispatch failed"
                );
                Err(e)
            }
        }
    }

    /// Context id to send: the one the agent last used for this session, the
    /// session id itself, or a fresh id for sessionless queries.
    async fn context_for(&self, agent_id: &str, query: &Query) -> String {
        match &query.session_id {
            Some(session) => self
                .sessions
                .lock()
                .await
                .get(&(agent_id.to_string(), session.clone()))
                .cloned()
                .unwrap_or_else(|| session.clone()),
            None => uuid::Uuid::new_v4().to_string(),
        }
    }

    // ── Health ───────────────────────────────────────────────────────────────

    /// Probe one agent (agent-card fetch) and record the result.  Never
    /// fails; an unknown id reports [`HealthState::Unknown`].
    pub async fn health_check(&self, agent_id: &str) -> HealthState {
        let Some(agent) = self.get(agent_id).await else {
            warn!(agent_id, "health check for unknown agent");
            return HealthState::Unknown;
        };

        let state = match self.probe(&agent).await {
            Ok(_) => HealthState::Reachable,
            Err(e) => {
                debug!(agent_id, reason = e.reason_code(), error = %e, "health probe failed");
                HealthState::Unreachable
            }
        };
        self.set_health(agent_id, state).await;
        state
    }

    /// Probe every agent concurrently.  Results follow registration order.
    pub async fn health_check_all(self: &Arc<Self>) -> Vec<(String, HealthState)> {
        let ids: Vec<String> = self.snapshot().await.into_iter().map(|a| a.id).collect();

        let mut set = JoinSet::new();
        for id in ids.iter().cloned() {
            let registry = Arc::clone(self);
            set.spawn(async move {
                let state = registry.health_check(&id).await;
                (id, state)
            });
        }

        let mut states = HashMap::new();
        while let Some(res) = set.join_next().await {
            match res {
                Ok((id, state)) => {
                    states.insert(id, state);
                }
                Err(e) => warn!("health probe task failed: {e}"),
            }
        }

        ids.into_iter()
            .map(|id| {
                let state = states.remove(&id).unwrap_or(HealthState::Unknown);
                (id, state)
            })
            .collect()
    }

    /// Fetch the agent card and enrich the descriptor: card description,
    /// card name as an alias, skill tags as routing keywords.
    pub async fn discover(&self, agent_id: &str) -> Result<AgentCard, DispatchError> {
        let agent = self.get(agent_id).await.ok_or_else(|| DispatchError::Unreachable {
            agent_id: agent_id.to_string(),
            detail: "agent not registered".into(),
        })?;

        match self.probe(&agent).await {
            Ok(card) => {
                let mut agents = self.agents.write().await;
                if let Some(entry) = agents.iter_mut().find(|a| a.id == agent_id) {
                    if !card.description.trim().is_empty() {
                        entry.description = Some(card.description.trim().to_string());
                    }
                    entry.merge_aliases([card.name.as_str()]);
                    entry.merge_keywords(card.skill_tags());
                    entry.health = HealthState::Reachable;
                    entry.last_checked = Some(Utc::now());
                }
                info!(
                    agent_id,
                    card_name = %card.name,
                    skills = card.skills.len(),
                    "agent card discovered"
                );
                Ok(card)
            }
            Err(e) => {
                self.set_health(agent_id, HealthState::Unreachable).await;
                warn!(agent_id, reason = e.reason_code(), error = %e, "agent card discovery failed");
                Err(e)
            }
        }
    }

    async fn probe(&self, agent: &AgentDescriptor) -> Result<AgentCard, DispatchError> {
        match tokio::time::timeout(
            self.probe_timeout,
            self.transport.fetch_card(agent, self.probe_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                agent_id: agent.id.clone(),
                timeout_ms: self.probe_timeout.as_millis() as u64,
            }),
        }
    }

    async fn set_health(&self, agent_id: &str, state: HealthState) {
        let mut agents = self.agents.write().await;
        if let Some(entry) = agents.iter_mut().find(|a| a.id == agent_id) {
            if entry.health != state {
                debug!(agent_id, from = entry.health.as_str(), to = state.as_str(), "health changed");
            }
            entry.health = state;
            entry.last_checked = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::transport::{AgentSkill, ScriptedReply, ScriptedTransport};

    fn invoices() -> AgentDescriptor {
        AgentDescriptor::new("invoices", "Invoices Agent", "http://inv").with_keywords(["invoice"])
    }

    fn imports() -> AgentDescriptor {
        AgentDescriptor::new("imports", "Imports Agent", "http://imp").with_keywords(["customs"])
    }

    fn registry(transport: ScriptedTransport) -> Arc<AgentRegistry> {
        Arc::new(AgentRegistry::with_timeouts(
            AgentTransport::Scripted(transport),
            Duration::from_millis(500),
            Duration::from_millis(200),
        ))
    }

    #[tokio::test]
    async fn register_same_identity_same_url_updates() {
        let reg = registry(ScriptedTransport::new());
        reg.register(invoices()).await.unwrap();
        reg.register(invoices().with_keywords(["payment"])).await.unwrap();
        let snap = reg.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].keywords, vec!["invoice", "payment"]);
    }

    #[tokio::test]
    async fn register_same_identity_other_url_is_duplicate() {
        let reg = registry(ScriptedTransport::new());
        reg.register(invoices()).await.unwrap();
        let clash = AgentDescriptor::new("billing", "invoices agent", "http://elsewhere");
        let err = reg.register(clash).await.unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { ref agent_id, .. } if agent_id == "invoices"));
        assert_eq!(reg.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn register_cannot_take_another_agents_name() {
        let reg = registry(ScriptedTransport::new());
        reg.register(AgentDescriptor::new("a", "Alpha", "http://a")).await.unwrap();
        reg.register(AgentDescriptor::new("b", "Beta", "http://b")).await.unwrap();

        let err = reg.register(AgentDescriptor::new("a", "beta", "http://a")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { ref agent_id, .. } if agent_id == "b"));

        let names: Vec<_> = reg.snapshot().await.into_iter().map(|d| (d.id, d.name)).collect();
        assert_eq!(names, vec![("a".to_string(), "Alpha".to_string()), ("b".to_string(), "Beta".to_string())]);
    }

    #[tokio::test]
    async fn deregister_unknown_agent_errors() {
        let reg = registry(ScriptedTransport::new());
        reg.register(imports()).await.unwrap();
        assert_eq!(reg.deregister("imports").await.unwrap().id, "imports");
        assert_eq!(
            reg.deregister("imports").await.unwrap_err(),
            RegistryError::UnknownAgent("imports".into())
        );
    }

    #[tokio::test]
    async fn resolve_name_prefers_exact_then_partial() {
        let reg = registry(ScriptedTransport::new());
        reg.register(imports()).await.unwrap();
        reg.register(invoices()).await.unwrap();
        assert_eq!(reg.resolve_name("Invoices Agent").await.unwrap().id, "invoices");
        assert_eq!(reg.resolve_name("imports").await.unwrap().id, "imports");
        assert_eq!(reg.resolve_name("invoices").await.unwrap().id, "invoices");
        assert_eq!(reg.resolve_name("the imports agent please").await.unwrap().id, "imports");
        assert!(reg.resolve_name("weather").await.is_none());
    }

    #[tokio::test]
    async fn dispatch_success_marks_reachable() {
        let reg = registry(ScriptedTransport::new().reply("invoices", "Total: 10"));
        reg.register(invoices()).await.unwrap();
        let resp = reg.dispatch("invoices", &Query::new("invoice total")).await.unwrap();
        assert_eq!(resp.payload.text, "Total: 10");
        assert_eq!(reg.get("invoices").await.unwrap().health, HealthState::Reachable);
    }

    #[tokio::test]
    async fn dispatch_unreachable_marks_unreachable() {
        let reg = registry(ScriptedTransport::new());
        reg.register(imports()).await.unwrap();
        let err = reg.dispatch("imports", &Query::new("customs")).await.unwrap_err();
        assert_eq!(err.reason_code(), "unreachable");
        assert_eq!(reg.get("imports").await.unwrap().health, HealthState::Unreachable);
    }

    #[tokio::test]
    async fn dispatch_unknown_agent_is_unreachable() {
        let reg = registry(ScriptedTransport::new());
        let err = reg.dispatch("ghost", &Query::new("q")).await.unwrap_err();
        assert_eq!(err.agent_id(), "ghost");
        assert_eq!(err.reason_code(), "unreachable");
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_times_out_at_per_call_deadline() {
        let reg = registry(ScriptedTransport::new().reply_with(
            "imports",
            ScriptedReply::Delayed(Duration::from_secs(30), Box::new(ScriptedReply::Text("late".into()))),
        ));
        reg.register(imports()).await.unwrap();
        let err = reg.dispatch("imports", &Query::new("customs")).await.unwrap_err();
        assert_eq!(err, DispatchError::Timeout { agent_id: "imports".into(), timeout_ms: 500 });
    }

    #[tokio::test]
    async fn session_reuses_agent_context() {
        let payload = ResponsePayload {
            text: "ok".into(),
            data: Vec::new(),
            context_id: Some("agent-ctx".into()),
        };
        let transport = ScriptedTransport::new().reply_with("invoices", ScriptedReply::Payload(payload));
        let reg = registry(transport.clone());
        reg.register(invoices()).await.unwrap();

        let q = Query::new("invoice").with_session("s-1");
        reg.dispatch("invoices", &q).await.unwrap();
        reg.dispatch("invoices", &q).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].context_id, "s-1");
        assert_eq!(calls[1].context_id, "agent-ctx");
    }

    #[tokio::test]
    async fn health_check_all_follows_registration_order() {
        let reg = registry(ScriptedTransport::new().reply("invoices", "x"));
        reg.register(imports()).await.unwrap();
        reg.register(invoices()).await.unwrap();
        let states = reg.health_check_all().await;
        assert_eq!(
            states,
            vec![
                ("imports".to_string(), HealthState::Unreachable),
                ("invoices".to_string(), HealthState::Reachable),
            ]
        );
        assert!(reg.get("imports").await.unwrap().last_checked.is_some());
    }

    #[tokio::test]
    async fn health_check_unknown_agent_never_fails() {
        let reg = registry(ScriptedTransport::new());
        assert_eq!(reg.health_check("ghost").await, HealthState::Unknown);
    }

    #[tokio::test]
    async fn discover_enriches_descriptor() {
        let card = AgentCard {
            name: "Billing Desk".into(),
            description: "Looks up invoices".into(),
            url: None,
            version: Some("1.0".into()),
            skills: vec![AgentSkill {
                id: "vat".into(),
                name: "VAT".into(),
                description: None,
                tags: vec!["VAT".into(), "withholding".into()],
            }],
        };
        let reg = registry(ScriptedTransport::new().reply("invoices", "x").card("invoices", card));
        reg.register(invoices()).await.unwrap();
        reg.discover("invoices").await.unwrap();

        let d = reg.get("invoices").await.unwrap();
        assert_eq!(d.description.as_deref(), Some("Looks up invoices"));
        assert!(d.aliases.contains(&"billing desk".to_string()));
        assert_eq!(d.keywords, vec!["invoice", "vat", "withholding"]);
        assert_eq!(d.health, HealthState::Reachable);
    }
}
