//! Concierge: host orchestrator entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Register configured agents, optionally discover their cards
//!   6. Build verifier (local rules + optional external analyzer)
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Start comms channels (at least one must be enabled)
//!   9. Spawn health monitor (when an interval is configured)
//!  10. Run until comms exits, then cancel token + join background components

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use concierge::analysis;
use concierge::config::{self, Config};
use concierge::error::AppError;
use concierge::logger;
use concierge::orchestrator::Orchestrator;
use concierge::registry::transport::A2aClient;
use concierge::registry::{AgentDescriptor, AgentRegistry, AgentTransport, HealthMonitor};
use concierge::subsystems::{self, runtime::{Component, spawn_components}};
use concierge::verifier::Verifier;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;

    // Without -i the console stays off (daemon-safe default).
    if !args.interactive {
        config.comms.pty.enabled = false;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        name = %config.name,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = %args.interactive,
        agents = config.agents.len(),
        "config loaded"
    );

    let transport = AgentTransport::A2a(A2aClient::new()?);
    let registry = Arc::new(AgentRegistry::new(transport, &config.dispatch));

    for agent in &config.agents {
        registry.register(AgentDescriptor::from_config(agent)).await?;
    }

    if config.dispatch.discover_cards {
        // Failures are logged by the registry and leave the agent Unreachable.
        let mut discovered = 0usize;
        for agent in &config.agents {
            if registry.discover(&agent.id).await.is_ok() {
                discovered += 1;
            }
        }
        info!(discovered, total = config.agents.len(), "agent card discovery complete");
    }

    let analyzer = analysis::build(&config.analysis, config.analysis_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    if analyzer.is_none() {
        warn!("external content analysis disabled: verification uses local rules only");
    }
    let verifier = Verifier::new(&config.verifier, analyzer)?;
    let external_analysis = verifier.has_external_analysis();

    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&registry), verifier, config.request_deadline));

    // Shared shutdown token. Ctrl-C cancels it and every task watches it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received: initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    // Errors out here, before the health monitor starts, when no channel is enabled.
    let comms = subsystems::comms::start(&config, orchestrator, shutdown.clone())?;

    let mut background: Vec<Box<dyn Component>> = Vec::new();
    if let Some(interval) = config.dispatch.health_interval {
        background.push(Box::new(HealthMonitor::new(Arc::clone(&registry), interval)));
    }
    let background = spawn_components(background, shutdown.clone());

    print_startup_summary(&config, args.interactive, external_analysis);

    let comms_result = comms.join().await;

    // If comms exited on its own (console EOF), still stop everything.
    shutdown.cancel();
    let background_result = background.join().await;

    if args.interactive {
        use std::io::Write as _;
        println!("\nBye :) ...");
        let _ = std::io::stdout().flush();
    }

    comms_result.and(background_result)
}

fn print_startup_summary(config: &Config, interactive: bool, external_analysis: bool) {
    let fit = |text: String| -> String {
        const WIDTH: usize = 58;
        let char_count = text.chars().count();
        if char_count >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let pid = std::process::id();
    let mode_text = if interactive { "interactive" } else { "daemon" };

    let mut comms_lines = Vec::new();
    #[cfg(feature = "channel-pty")]
    comms_lines.push(format!("⌨️  pty: {}", if config.comms_pty_should_load() { "enabled" } else { "disabled" }));
    #[cfg(feature = "channel-axum")]
    {
        if config.comms_http_should_load() {
            comms_lines.push(format!("🌐 http: {}", config.comms.http.bind));
        } else {
            comms_lines.push("🌐 http: disabled".to_string());
        }
    }
    #[cfg(not(feature = "channel-axum"))]
    if config.comms.http.enabled {
        comms_lines.push("🌐 http: configured but not compiled in".to_string());
    }

    let mut agent_lines: Vec<String> = config
        .agents
        .iter()
        .map(|a| format!("{} ({}): {}", a.name, a.id, a.url))
        .collect();
    if agent_lines.is_empty() {
        agent_lines.push("none registered".to_string());
    }

    let analysis_line = if external_analysis {
        format!(
            "provider={} model={} timeout={}ms",
            config.analysis.provider,
            config.analysis.openai.model,
            config.verifier.timeout.as_millis()
        )
    } else {
        "local rules only".to_string()
    };
    let health_line = match config.dispatch.health_interval {
        Some(every) => format!("probe every {}s", every.as_secs()),
        None => "on demand".to_string(),
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ 🛎️  Concierge Status                                          ║");
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🧾 Name: {:<51}║", config.name);
    println!("║ 🧠 PID: {:<52}║", pid);
    println!("║ 🛰️  Mode: {:<51}║", mode_text);
    println!("║ ⏱️  Deadline: {:<47}║", format!("{}ms", config.request_deadline.as_millis()));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 📡 Comms                                                     ║");
    for line in comms_lines {
        println!("║   {}║", fit(line));
    }
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🤝 Agents                                                    ║");
    for line in agent_lines {
        println!("║   {}║", fit(line));
    }
    println!("║   {}║", fit(format!("health: {health_line}")));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🛡️  Verification                                              ║");
    println!("║   {}║", fit(analysis_line));
    println!("╚══════════════════════════════════════════════════════════════╝");
}

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: concierge [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Run in interactive mode (enables the console)");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (routing decisions, dispatch outcomes)
    //   -vvvv+  → trace  (full agent and analyzer payloads)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, interactive, config_path }
}
