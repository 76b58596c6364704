//! Background health monitor: probes every agent on a fixed interval so
//! health state stays current between requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::subsystems::runtime::{Component, ComponentFuture};

use super::{AgentRegistry, HealthState};

pub struct HealthMonitor {
    registry: Arc<AgentRegistry>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<AgentRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }
}

impl Component for HealthMonitor {
    fn id(&self) -> &str {
        "health-monitor"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; startup discovery already probed.
            ticker.tick().await;

            info!(interval_secs = self.interval.as_secs(), "health monitor started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let states = self.registry.health_check_all().await;
                        let down = states.iter().filter(|(_, s)| *s == HealthState::Unreachable).count();
                        debug!(agents = states.len(), unreachable = down, "health sweep complete");
                    }
                }
            }
            info!("health monitor stopped");
            Ok(())
        })
    }
}
