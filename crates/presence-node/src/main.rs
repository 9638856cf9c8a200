//! presence-node: the 7ay presence daemon.
//!
//! Startup sequence:
//!   1. Load node config (JSON) and apply CLI overrides
//!   2. Open the sled state database, or in-memory stores with `--memory`
//!   3. Seed the epoch schedule if one is given
//!   4. Run the main loop: tick the phase monitor, serve console commands
//!      from stdin, stop on Ctrl-C

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use presence_node::console::{execute, ConsoleLine};
use presence_node::{Node, NodeConfig};
use presence_state::parse_schedule;

#[derive(Parser, Debug)]
#[command(
    name = "presence-node",
    version,
    about = "7ay presence node: epoch lifecycle, quorum validation, ephemeral data"
)]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, default_value = "~/.7ay/presence")]
    data_dir: PathBuf,

    /// Keep all state in memory; nothing is written to disk.
    #[arg(long, default_value_t = false)]
    memory: bool,

    /// Path to node config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validation quorum override.
    #[arg(long)]
    quorum_size: Option<u32>,

    /// Phase monitor interval override, in seconds.
    #[arg(long)]
    tick_secs: Option<u64>,

    /// Epoch schedule JSON to seed; epochs already known are skipped.
    #[arg(long)]
    epochs: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,presence=debug")),
        )
        .init();

    let args = Args::parse();
    info!("presence node starting");

    // ── Config ────────────────────────────────────────────────────────────────
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path).context("loading node config")?,
        None => NodeConfig::default(),
    };
    if let Some(q) = args.quorum_size {
        config.quorum.quorum_size = q;
    }
    if let Some(t) = args.tick_secs {
        config.monitor.tick_interval_secs = t;
    }
    config.validate().context("validating node config")?;

    // ── State ─────────────────────────────────────────────────────────────────
    let node = if args.memory {
        info!("running with in-memory state");
        Node::in_memory(config)?
    } else {
        let data_dir = expand_tilde(&args.data_dir);
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;
        Node::open(&data_dir, config).context("opening state database")?
    };

    if let Some(path) = &args.epochs {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading epoch schedule from {}", path.display()))?;
        let specs = parse_schedule(&json).context("parsing epoch schedule")?;
        node.seed(specs).context("seeding epoch schedule")?;
    }

    // ── Main loop ─────────────────────────────────────────────────────────────
    let mut interval = tokio::time::interval(Duration::from_secs(config.monitor.tick_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        quorum = config.quorum.quorum_size,
        tick_secs = config.monitor.tick_interval_secs,
        persistent = node.is_persistent(),
        "node ready"
    );
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = node.monitor.tick(node.now()) {
                    warn!(error = %e, "phase monitor tick failed");
                }
            }
            line = lines.next_line(), if console_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match ConsoleLine::parse_line(&line) {
                    Ok(cmd) => match execute(&node, cmd, node.now()) {
                        Ok(reply) => println!("{reply}"),
                        Err(e) => println!("error: {e}"),
                    },
                    Err(usage) => println!("{usage}"),
                },
                Ok(None) => {
                    info!("stdin closed; console disabled");
                    console_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "reading console input failed; console disabled");
                    console_open = false;
                }
            },
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
    }

    node.flush().context("flushing state database")?;
    info!("presence node stopped");
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
