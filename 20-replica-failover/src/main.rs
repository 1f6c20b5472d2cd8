use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use replica_failover::{
    Cluster,
    cli::{Cli, Command, IngestArgs},
    codec::pump_lines,
    scenario::run_scenario,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().into_command() {
        Command::Scenario(args) => {
            let report = run_scenario(args.to_config())
                .await
                .context("failover scenario failed")?;
            println!("\n=== Final node state ===");
            print!("{report}");
        }
        Command::Ingest(args) => ingest(args).await?,
    }

    Ok(())
}

async fn ingest(args: IngestArgs) -> Result<()> {
    let mut cluster = Cluster::new(args.cluster_config())?;
    cluster.start()?;

    let transport = cluster.transport();
    let mut stdin = BufReader::new(tokio::io::stdin());
    let report = pump_lines(&mut stdin, &*transport, args.entry)
        .await
        .context("failed to read envelopes from stdin")?;
    info!(
        accepted = report.accepted,
        rejected = report.rejected,
        undeliverable = report.undeliverable,
        "stdin closed"
    );

    tokio::time::sleep(Duration::from_millis(args.settle_ms)).await;
    let snapshot = cluster.snapshot();
    cluster.shutdown().await;

    for (node, log) in snapshot {
        println!("Node {node}: {log:?}");
    }
    Ok(())
}
