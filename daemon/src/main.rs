//! Daemon entry point.
//!
//! Exit codes: 0 on clean shutdown, 1 on invalid network, config parse
//! failure or initialization failure.

use anyhow::Context;
use clap::Parser;
use lattica_node::{DaemonConfig, Node};
use lattica_types::{set_active_network, NetworkKind, NetworkParams};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lattica-daemon", version, about = "Lattica node daemon")]
struct Cli {
    /// Run the node.
    #[arg(long)]
    daemon: bool,

    /// Data directory for the ledger database and configuration.
    #[arg(long, default_value = "./lattica")]
    data_path: PathBuf,

    /// Network to participate in: live, beta or test.
    #[arg(long, default_value = "live")]
    network: String,

    /// Configuration overrides, key=value, dotted section keys.
    #[arg(long = "config", value_name = "KEY=VALUE")]
    config_overrides: Vec<String>,
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let kind = NetworkKind::from_str_opt(&cli.network)
        .with_context(|| format!("invalid network '{}'", cli.network))?;
    set_active_network(kind);

    let config_path = cli.data_path.join("config.toml");
    let mut config = if config_path.exists() {
        DaemonConfig::load(&config_path).context("loading config.toml")?
    } else {
        DaemonConfig::default()
    };
    for entry in &cli.config_overrides {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("malformed --config override '{entry}'"))?;
        config
            .apply_override(key, value)
            .with_context(|| format!("applying --config override '{entry}'"))?;
    }

    lattica_utils::init_tracing(&config.node.log_level, config.node.log_json);

    if !cli.daemon {
        // Nothing asked of us; configuration was validated.
        return Ok(());
    }

    std::fs::create_dir_all(&cli.data_path).context("creating data directory")?;
    let params = NetworkParams::new(kind);
    let runtime = tokio::runtime::Runtime::new().context("starting io runtime")?;
    let _guard = runtime.enter();

    let mut node = Node::new(config.node.clone(), params, &cli.data_path)
        .context("initializing node")?;
    node.start();
    tracing::info!(network = kind.as_str(), path = %cli.data_path.display(), "daemon running");

    runtime.block_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    tracing::info!("interrupt received, shutting down");
    node.stop();
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}
