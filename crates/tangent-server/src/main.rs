use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tangent_domain::config::{Config, ConfigSeverity};

mod api;
mod bootstrap;

use bootstrap::AppState;

/// Tangent — a session runtime for catalog-defined skills.
#[derive(Debug, Parser)]
#[command(name = "tangent", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the orchestrator and skill-service endpoint (default).
    Serve,
    /// Parse the config file and report any errors.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Validate the resolved configuration.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _path) = load_config()?;
            run_server(config).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, path) = load_config()?;
            let issues = config.validate();
            for issue in &issues {
                match issue.severity {
                    ConfigSeverity::Warning => println!("WARN {issue}"),
                    ConfigSeverity::Error => println!("ERROR {issue}"),
                }
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                anyhow::bail!("{path}: config validation failed");
            }
            println!("{path}: ok");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = load_config()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("tangent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tangent=debug")),
        )
        .json()
        .init();
}

fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("TANGENT_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {config_path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {config_path}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("tangent starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let state = AppState::build(config.clone())?;

    // ── Skill-service endpoint (§4.G) ───────────────────────────────────
    let skill_service_shutdown = CancellationToken::new();
    let skill_service_state = tangent_skill_service::SkillServiceState {
        registry: state.registry.clone(),
    };
    let socket_path = std::path::PathBuf::from(&state.socket_path);
    let skill_service_task = {
        let shutdown = skill_service_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tangent_skill_service::serve(socket_path, skill_service_state, shutdown).await {
                tracing::error!(error = %e, "skill-service endpoint exited with error");
            }
        })
    };

    // ── Orchestrator HTTP router ────────────────────────────────────────
    let app = api::router(state.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "tangent orchestrator listening");

    let shutdown_grace = Duration::from_millis(config.server.shutdown_grace_ms);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    tracing::info!(grace_ms = shutdown_grace.as_millis(), "shutting down");
    skill_service_shutdown.cancel();
    let _ = tokio::time::timeout(shutdown_grace, skill_service_task).await;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM (§4.G, §5: "Server shutdown: 5 s").
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("installing Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
