//! Long-running component scaffolding.
//!
//! A [`Component`] is anything that runs for the life of the process: an
//! inbound channel (console, HTTP) or the registry health monitor.  Each one
//! captures its shared state (`Arc<CommsState>`, `Arc<AgentRegistry>`) when
//! constructed, then [`spawn_components`] runs the set concurrently under
//! one [`CancellationToken`].
//!
//! A component that fails cancels the token, so its siblings wind down and
//! the process exits instead of limping along with half its surfaces gone.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

// ── Component ─────────────────────────────────────────────────────────────────

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the component and return its run loop.  The loop should exit
    /// once `shutdown` is cancelled.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

// ── SubsystemHandle ───────────────────────────────────────────────────────────

/// Resolves when every component in the set has exited.
pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    /// Await all components and return the first error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Runtime(format!("component manager panicked: {e}"))),
        }
    }
}

// ── spawn_components ──────────────────────────────────────────────────────────

/// Spawn each component as its own task.
///
/// - Any `Err` or panic cancels `shutdown`; siblings stop cooperatively.
/// - The handle yields the first error once all components are drained.
/// - An empty set resolves immediately.
pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> SubsystemHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<(String, Result<(), AppError>)> = JoinSet::new();

        for component in components {
            let id = component.id().to_string();
            debug!(component = %id, "spawning component");
            let fut = component.run(shutdown.clone());
            set.spawn(async move { (id, fut.await) });
        }

        let mut first_err: Option<AppError> = None;

        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("component panicked: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Runtime(format!("component panicked: {e}")));
                }
                Ok((id, Err(e))) => {
                    error!(component = %id, "component error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok((id, Ok(()))) => debug!(component = %id, "component exited"),
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    SubsystemHandle { inner: handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Waits;

    impl Component for Waits {
        fn id(&self) -> &str {
            "waits"
        }

        fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async move {
                shutdown.cancelled().await;
                Ok(())
            })
        }
    }

    struct Fails;

    impl Component for Fails {
        fn id(&self) -> &str {
            "fails"
        }

        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async { Err(AppError::Comms("bind failed".into())) })
        }
    }

    #[tokio::test]
    async fn empty_set_resolves() {
        spawn_components(Vec::new(), CancellationToken::new()).join().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_stops_components() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Waits), Box::new(Waits)], token.clone());
        token.cancel();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn failure_cancels_siblings_and_surfaces_error() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Waits), Box::new(Fails)], token.clone());
        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("bind failed"));
        assert!(token.is_cancelled());
    }
}
