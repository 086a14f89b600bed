//! flowgated — the Flowgate daemon.
//!
//! Starts every runtime of a flow in-process, binds the gateway's
//! protocol front-ends, and pre-warms every path once the targets are up.
//!
//! # Usage
//!
//! ```text
//! flowgated run --config flow.toml
//! flowgated targets --config flow.toml --json
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use flowgate_core::{FlowConfig, compute_warmup_targets};
use flowgated::{Flow, FlowOptions};

#[derive(Parser)]
#[command(name = "flowgated", about = "Flowgate daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a flow until Ctrl-C.
    Run {
        /// Path to the flow config.
        #[arg(long, default_value = "flow.toml")]
        config: PathBuf,
    },
    /// Print the endpoints warmup would probe for a flow.
    Targets {
        /// Path to the flow config.
        #[arg(long, default_value = "flow.toml")]
        config: PathBuf,

        /// Emit JSON instead of one endpoint per line.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flowgated=debug,flowgate_warmup=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run(config).await,
        Command::Targets { config, json } => targets(config, json),
    }
}

fn load(path: &Path) -> anyhow::Result<FlowConfig> {
    FlowConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

async fn run(path: PathBuf) -> anyhow::Result<()> {
    let config = load(&path)?;
    let options = FlowOptions::from_config(&config)?;
    info!(config = %path.display(), "flowgated starting");

    let mut flow = Flow::start(options).await?;
    for (protocol, addr) in flow.gateway_addresses() {
        info!(%protocol, %addr, "serving");
    }

    let ready = tokio::select! {
        ready = flow.wait_ready() => Some(ready),
        _ = tokio::signal::ctrl_c() => None,
    };

    match ready {
        Some(true) => info!("all deployments ready"),
        Some(false) => warn!("flow did not become ready"),
        None => {
            info!("shutdown signal received");
            flow.shutdown().await;
            return Ok(());
        }
    }

    let settled = tokio::select! {
        phase = flow.warmup_settled() => Some(phase),
        _ = tokio::signal::ctrl_c() => None,
    };

    if let Some(phase) = settled {
        info!(?phase, "warmup settled");
        tokio::signal::ctrl_c()
            .await
            .context("failed to install CTRL+C handler")?;
    }
    info!("shutdown signal received");
    let report = flow.shutdown().await;
    info!(
        probed = report.probed(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped(),
        "warmup report"
    );

    info!("flowgated stopped");
    Ok(())
}

fn targets(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let config = load(&path)?;
    let topology = config.topology()?;
    let targets = compute_warmup_targets(&topology)?;

    if json {
        let endpoints: Vec<_> = targets.iter().collect();
        println!("{}", serde_json::to_string_pretty(&endpoints)?);
    } else {
        for endpoint in targets.iter() {
            let needs: Vec<String> = endpoint.dependencies.iter().map(|c| c.to_string()).collect();
            println!("{}  (after: {})", endpoint.id, needs.join(", "));
        }
        println!("{} endpoint(s)", targets.len());
    }
    Ok(())
}
