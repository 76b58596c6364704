//! Comms subsystem: the inbound surfaces of the orchestrator.
//!
//! # Architecture
//!
//! Each channel (console, HTTP) implements [`Component`] and is spawned as
//! an independent task by [`start`] via [`spawn_components`].  Channels
//! capture their shared [`Arc<CommsState>`] at construction time, so no state
//! is passed through the generic `Component::run` signature.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events, sessions).  It is drained by a
//! short-lived background task that ends when all channel senders drop.

mod state;
#[cfg(feature = "channel-pty")]
pub mod pty;
#[cfg(feature = "channel-axum")]
pub mod axum_channel;

pub use state::{AgentHealth, CommsEvent, CommsState, HealthReport};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::AppError;
use crate::orchestrator::Orchestrator;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

/// Capacity of the channel → manager event queue.
const EVENT_QUEUE: usize = 32;

/// Build the shared state and the event drain.  Split from [`start`] so
/// tests can drive channels without spawning them.
pub fn build_state(config: &Config, orchestrator: Arc<Orchestrator>) -> Arc<CommsState> {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(EVENT_QUEUE);

    // Monitoring only; ends when every channel has dropped its sender.
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::SessionStarted { ref channel_id, ref session_id } => {
                    debug!(channel_id, session_id, "channel session started");
                }
            }
        }
    });

    Arc::new(CommsState::new(config.name.clone(), orchestrator, event_tx))
}

/// Spawn all configured channels and return a [`SubsystemHandle`].
///
/// Synchronous: returns as soon as the tasks are spawned.  If any channel
/// exits with an error the shared `shutdown` token is cancelled.  Fails when
/// no channel is enabled, since the process would have nothing to serve.
pub fn start(
    config: &Config,
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
) -> Result<SubsystemHandle, AppError> {
    let mut components: Vec<Box<dyn Component>> = Vec::new();
    let state = build_state(config, orchestrator);

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            components.push(Box::new(pty::PtyChannel::new("pty0", Arc::clone(&state))));
        }
    }

    #[cfg(feature = "channel-axum")]
    {
        if config.comms_http_should_load() {
            info!(bind = %config.comms.http.bind, "loading axum channel");
            components.push(Box::new(axum_channel::AxumChannel::new(
                "http0",
                config.comms.http.bind.clone(),
                Arc::clone(&state),
            )));
        }
    }

    if components.is_empty() {
        return Err(AppError::Comms(
            "no channel enabled: run with -i for the console or set [comms.http] enabled = true".into(),
        ));
    }

    Ok(spawn_components(components, shutdown))
}
