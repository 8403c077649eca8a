//! metrics-feed CLI
//!
//! Runs the streaming metrics client and logs what it observes:
//! - Watch a metrics feed, reconnecting automatically
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_feed::{Config, ConfigOrigin, LoggingConfig, MetricsClient};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "metrics-feed")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resilient client for a live system metrics stream")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the feed and log status changes and snapshots
    Watch {
        /// WebSocket endpoint (overrides config)
        #[arg(long)]
        url: Option<String>,
        /// Reconnect delay in milliseconds (overrides config)
        #[arg(long)]
        reconnect_delay_ms: Option<u64>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            url,
            reconnect_delay_ms,
        } => {
            let (mut config, origin) = match &cli.config {
                Some(path) => {
                    let config = Config::load_with_env(path)
                        .with_context(|| format!("loading config from {}", path.display()))?;
                    let origin = ConfigOrigin {
                        path: Some(path.clone()),
                        ..ConfigOrigin::default()
                    };
                    (config, origin)
                }
                None => Config::load_default(),
            };
            if let Some(url) = url {
                config.stream.url = url;
            }
            if let Some(ms) = reconnect_delay_ms {
                config.stream.reconnect_delay_ms = ms;
            }

            init_logging(&config.logging);
            origin.log();
            watch(config).await?;
        }
        Commands::Config { output } => {
            let content = metrics_feed::config::generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("metrics_feed={}", config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn watch(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        url = %config.stream.url,
        reconnect_delay_ms = config.stream.reconnect_delay_ms,
        "metrics-feed v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = MetricsClient::websocket(&config.stream);
    if !config.stream.auto_connect {
        client.connect()?;
    }

    let mut state = client.watch_state();
    let mut snapshots = client.watch_snapshot();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current.observed.is_connected() {
                    tracing::info!(url = %config.stream.url, "Streaming metrics");
                } else {
                    tracing::info!(
                        status = %current.observed,
                        desired = ?current.desired,
                        "Status changed"
                    );
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(metrics) = snapshots.borrow_and_update().clone() {
                    let recorded_at = metrics
                        .recorded_at()
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default();
                    tracing::info!(recorded_at = %recorded_at, "{}", metrics);
                }
            }
        }
    }

    client.shutdown().await?;
    tracing::info!("metrics-feed stopped");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
