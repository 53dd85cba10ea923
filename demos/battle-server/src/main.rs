//! Standalone crewsync battle server.
//!
//! ```bash
//! battle-server --bind 0.0.0.0:8080 --round-duration-secs 90
//! RUST_LOG=crewsync_room=debug battle-server --json-logs
//! ```

mod logging;

use std::time::Duration;

use clap::Parser;
use crewsync::prelude::*;
use tracing::info;

/// Runs a battle-room server over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "battle-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Seconds between task announcements during a match
    #[arg(long, default_value = "5")]
    task_interval_secs: u64,

    /// Seconds before a round is completed automatically
    #[arg(long, default_value = "60")]
    round_duration_secs: u64,

    /// Minimum milliseconds between two attacks from one connection
    #[arg(long, default_value = "800")]
    attack_cooldown_ms: u64,

    /// Minimum milliseconds between throttled state snapshots
    #[arg(long, default_value = "250")]
    broadcast_interval_ms: u64,

    /// Seconds of silence before a connection is closed
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn battle_config(&self) -> BattleConfig {
        BattleConfig {
            task_interval: Duration::from_secs(self.task_interval_secs),
            round_duration: Duration::from_secs(self.round_duration_secs),
            attack_cooldown: Duration::from_millis(self.attack_cooldown_ms),
            min_broadcast_interval: Duration::from_millis(self.broadcast_interval_ms),
            ..BattleConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(&args.log_level, args.json_logs)?;

    let server = CrewsyncServer::builder()
        .bind(&args.bind)
        .battle_config(args.battle_config())
        .idle_timeout(Duration::from_secs(args.idle_timeout_secs))
        .build()
        .await?;
    info!(addr = %server.local_addr()?, version = env!("CARGO_PKG_VERSION"), "battle server ready");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("ctrl-c received");
        })
        .await?;
    Ok(())
}
