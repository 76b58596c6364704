//! PTY (console) comms channel: reads questions from stdin, prints the
//! rendered answer to stdout.
//!
//! One console run is one conversation: every line shares a session id, so
//! agents that thread by `contextId` see a continuous exchange.  Runs until
//! the `shutdown` token is cancelled (Ctrl-C) or stdin is closed.
//!
//! A line starting with `@name` is sent to that agent only, e.g.
//! `@invoices what is still unpaid?`.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

use super::state::{CommsEvent, CommsState};

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, shutdown))
    }
}

// ── run_pty ──────────────────────────────────────────────────────────────────

async fn run_pty(channel_id: String, state: Arc<CommsState>, shutdown: CancellationToken) -> Result<(), AppError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(%channel_id, %session_id, "pty channel started: type a question and press Enter. Ctrl-C to quit.");
    state.report_event(CommsEvent::SessionStarted {
        channel_id: channel_id.clone(),
        session_id: session_id.clone(),
    });

    println!("─────────────────────────────────");
    println!(" Concierge console  (Ctrl-C to quit)");
    println!("─────────────────────────────────");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!("\n[pty] shutdown signal received: closing console channel");
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        let input = input.trim().to_string();
                        if input.is_empty() { continue; }

                        debug!(input_len = input.len(), "pty received line");

                        let (agent, text) = split_addressee(&input);
                        if text.is_empty() {
                            println!("usage: @agent <question>\n");
                            continue;
                        }

                        // A request must not outlive shutdown.
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                info!("pty channel shutting down mid-request");
                                break;
                            }
                            output = state.handle_query(&channel_id, text.to_string(), Some(session_id.clone()), agent) => {
                                println!("{}\n", output.render());
                            }
                        }
                    }
                }
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

/// Split a leading `@name` off a console line.
fn split_addressee(line: &str) -> (Option<&str>, &str) {
    let Some(rest) = line.strip_prefix('@') else {
        return (None, line);
    };
    match rest.split_once(char::is_whitespace) {
        Some((name, text)) if !name.is_empty() => (Some(name), text.trim()),
        Some(_) => (None, line),
        None if rest.is_empty() => (None, line),
        None => (Some(rest), ""),
    }
}
