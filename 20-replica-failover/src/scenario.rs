//! Scripted failover run: start a cluster, feed it items, silence one node,
//! bring it back and report what every node ended up with.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::info;

use crate::client::{DriverConfig, DriverReport};
use crate::cluster::{Cluster, ClusterConfig};
use crate::envelope::NodeId;
use crate::transport::BroadcastReport;
use crate::view::Snapshot;

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub cluster: ClusterConfig,
    pub driver: DriverConfig,
    /// Node that gets silenced and later recovered.
    pub failed_node: NodeId,
    /// Offset from the start of the run at which `failed_node` is silenced.
    pub fail_at: Duration,
    /// Offset from the start of the run at which `failed_node` is recovered.
    pub recover_at: Duration,
    /// How long to let the cluster settle after the client finishes.
    pub settle: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::scaled(Duration::from_secs(1))
    }
}

impl ScenarioConfig {
    /// Default timings expressed in multiples of `unit`.
    ///
    /// With a one second unit this is the classic run: inserts every 1.5s,
    /// node 1 down from 3s to 7s, 3s of settling.
    pub fn scaled(unit: Duration) -> Self {
        let cluster = ClusterConfig {
            cycle_pause: unit / 2,
            observe_interval: (unit / 10).max(Duration::from_millis(1)),
            ..ClusterConfig::default()
        };
        let driver = DriverConfig {
            interval: unit * 3 / 2,
            ..DriverConfig::default()
        };
        Self {
            cluster,
            driver,
            failed_node: 1,
            fail_at: unit * 3,
            recover_at: unit * 7,
            settle: unit * 3,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        ensure!(
            self.failed_node < self.cluster.nodes,
            "failed node {} is not part of a {}-node cluster",
            self.failed_node,
            self.cluster.nodes
        );
        ensure!(
            self.fail_at <= self.recover_at,
            "recovery ({:?}) scheduled before failure ({:?})",
            self.recover_at,
            self.fail_at
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub final_state: Snapshot,
    pub client: DriverReport,
    pub recovery: BroadcastReport,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (node, log) in &self.final_state {
            writeln!(f, "Node {node}: {log:?}")?;
        }
        Ok(())
    }
}

/// Runs the failover script to completion and shuts the cluster down.
pub async fn run_scenario(config: ScenarioConfig) -> Result<ScenarioReport> {
    config.validate()?;

    let mut cluster = Cluster::new(config.cluster.clone())?;
    let started = Instant::now();
    cluster.start()?;
    let client = cluster
        .spawn_client(config.driver.clone())
        .context("failed to start client driver")?;
    info!(
        nodes = config.cluster.nodes,
        items = config.driver.count,
        entry = config.driver.entry,
        "scenario started"
    );

    sleep_until(started + config.fail_at).await;
    cluster.inject_failure(config.failed_node)?;
    info!(node = config.failed_node, "node down");

    sleep_until(started + config.recover_at).await;
    let recovery = cluster.inject_recovery(config.failed_node)?;
    info!(node = config.failed_node, "node back, recovery requested");

    let client = client
        .join()
        .await
        .map_err(|err| anyhow!("client driver task failed: {err}"))?;
    info!(sent = client.sent, failed = client.failed, "client done, settling");

    sleep(config.settle).await;
    let final_state = cluster.snapshot();
    cluster.shutdown().await;

    Ok(ScenarioReport {
        final_state,
        client,
        recovery,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_keeps_the_ratios() {
        let config = ScenarioConfig::scaled(Duration::from_millis(10));
        assert_eq!(config.fail_at, Duration::from_millis(30));
        assert_eq!(config.recover_at, Duration::from_millis(70));
        assert_eq!(config.settle, Duration::from_millis(30));
        assert_eq!(config.driver.interval, Duration::from_millis(15));
        assert_eq!(config.cluster.cycle_pause, Duration::from_millis(5));
        assert_eq!(config.cluster.observe_interval, Duration::from_millis(1));
    }

    #[test]
    fn recovery_before_failure_is_rejected() {
        let config = ScenarioConfig {
            fail_at: Duration::from_secs(5),
            recover_at: Duration::from_secs(1),
            ..ScenarioConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn failed_node_must_exist() {
        let config = ScenarioConfig {
            failed_node: 2,
            ..ScenarioConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn report_prints_one_line_per_node() {
        let mut final_state = Snapshot::new();
        final_state.insert(0, vec!["a".into(), "b".into()]);
        final_state.insert(1, vec![]);
        let report = ScenarioReport {
            final_state,
            client: DriverReport::default(),
            recovery: BroadcastReport::default(),
        };
        assert_eq!(report.to_string(), "Node 0: [\"a\", \"b\"]\nNode 1: []\n");
    }
}
