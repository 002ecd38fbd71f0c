//! stagelined — the Stageline daemon.
//!
//! Single binary that assembles the deployment-progression controller:
//! - State store (redb)
//! - Marathon client + cached orchestrator views
//! - Lease-based leader election
//! - Reconciliation engine + tick driver
//!
//! # Usage
//!
//! ```text
//! stagelined run --marathon-address marathon:8080 --data-dir /var/lib/stageline
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use stageline_cluster::LeaseElector;
use stageline_marathon::{MarathonCache, MarathonClient};
use stageline_progression::{
    DriverConfig, Engine, EngineConfig, IncreaseTimeBase, ProgressionDriver,
};
use stageline_state::StateStore;

#[derive(Parser)]
#[command(name = "stagelined", about = "Stageline deployment-progression daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the progression controller.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Data directory for persistent state.
    #[arg(long, default_value = "/var/lib/stageline")]
    data_dir: PathBuf,

    /// Marathon API endpoint as `host:port`.
    #[arg(long, default_value = "127.0.0.1:8080")]
    marathon_address: String,

    /// Node identity used for leader-lease ownership.
    #[arg(long, default_value = "stagelined-1")]
    node_id: String,

    /// Delay before the first reconciliation pass, in milliseconds.
    #[arg(long, default_value = "1000")]
    initial_delay_ms: u64,

    /// Interval between reconciliation passes, in milliseconds.
    #[arg(long, default_value = "3000")]
    tick_interval_ms: u64,

    /// Leader-lease time-to-live, in milliseconds.
    #[arg(long, default_value = "10000")]
    lease_ttl_ms: u64,

    /// Reconcile only while this node holds the leadership lease.
    /// Pass `false` to invert the gate.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    run_when_leader: bool,

    /// Window feeding the canary increase-phase denominator.
    #[arg(long, value_enum, default_value_t = TimeBase::DecreaseWindow)]
    increase_time_base: TimeBase,
}

/// Command-line spelling of [`IncreaseTimeBase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TimeBase {
    /// The inherited control law: divide by the decrease window.
    DecreaseWindow,
    /// Divide by the increase window itself.
    IncreaseWindow,
}

impl From<TimeBase> for IncreaseTimeBase {
    fn from(base: TimeBase) -> Self {
        match base {
            TimeBase::DecreaseWindow => IncreaseTimeBase::DecreaseWindow,
            TimeBase::IncreaseWindow => IncreaseTimeBase::IncreaseWindow,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stagelined=debug,stageline=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    info!("Stageline daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&args.data_dir)?;
    let db_path = args.data_dir.join("stageline.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // State store.
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Marathon client and cached views.
    let client = MarathonClient::new(args.marathon_address.clone());
    let cache = MarathonCache::new(client);
    info!(address = %args.marathon_address, "marathon client initialized");

    // Leader election over the shared state store.
    let elector = LeaseElector::new(state.clone(), args.node_id.clone())
        .with_ttl(Duration::from_millis(args.lease_ttl_ms));
    info!(node = %args.node_id, ttl_ms = args.lease_ttl_ms, "leader elector initialized");

    // Reconciliation engine + tick driver.
    let engine = Engine::with_config(
        state.clone(),
        EngineConfig {
            increase_time_base: args.increase_time_base.into(),
            ..EngineConfig::default()
        },
    );
    let config = DriverConfig {
        initial_delay: Duration::from_millis(args.initial_delay_ms),
        tick_interval: Duration::from_millis(args.tick_interval_ms),
        run_when_leader: args.run_when_leader,
    };
    let driver = ProgressionDriver::new(state, engine, elector, cache.clone(), cache, config);
    info!(
        initial_delay_ms = args.initial_delay_ms,
        tick_interval_ms = args.tick_interval_ms,
        run_when_leader = args.run_when_leader,
        time_base = ?args.increase_time_base,
        "progression driver initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start the driver loop ──────────────────────────────────

    let driver_handle = tokio::spawn(async move {
        driver.run(shutdown_rx).await;
    });

    // Graceful shutdown on Ctrl-C.
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    driver_handle.await?;
    info!("Stageline daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_match_the_documented_contract() {
        let cli = Cli::try_parse_from(["stagelined", "run"]).unwrap();
        let Command::Run(args) = cli.command;

        assert_eq!(args.initial_delay_ms, 1000);
        assert_eq!(args.tick_interval_ms, 3000);
        assert!(args.run_when_leader);
        assert_eq!(args.increase_time_base, TimeBase::DecreaseWindow);
    }

    #[test]
    fn gate_polarity_is_settable_from_the_command_line() {
        let cli = Cli::try_parse_from(["stagelined", "run", "--run-when-leader", "false"]).unwrap();
        let Command::Run(args) = cli.command;
        assert!(!args.run_when_leader);
    }

    #[test]
    fn increase_time_base_is_settable_from_the_command_line() {
        let cli = Cli::try_parse_from([
            "stagelined",
            "run",
            "--increase-time-base",
            "increase-window",
        ])
        .unwrap();
        let Command::Run(args) = cli.command;
        assert_eq!(args.increase_time_base, TimeBase::IncreaseWindow);
        assert_eq!(
            IncreaseTimeBase::from(args.increase_time_base),
            IncreaseTimeBase::IncreaseWindow
        );
    }
}
