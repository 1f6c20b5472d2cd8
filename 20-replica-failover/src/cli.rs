use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::cluster::ClusterConfig;
use crate::mailbox::DEFAULT_MAILBOX_CAPACITY;
use crate::scenario::ScenarioConfig;

/// Replicated log demo: fail a node, recover it, print what every node holds.
///
/// Without a subcommand the scripted failover scenario runs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub scenario: ScenarioArgs,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Scenario(self.scenario))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scripted failover scenario (the default).
    Scenario(ScenarioArgs),
    /// Feed JSON-line envelopes from stdin into one node and print the result.
    Ingest(IngestArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScenarioArgs {
    /// Number of replica nodes.
    #[arg(long, default_value_t = 2)]
    pub nodes: usize,

    /// Items the client inserts through node 0.
    #[arg(long, default_value_t = 5)]
    pub items: usize,

    /// Node silenced at 3 time units and recovered at 7.
    #[arg(long, default_value_t = 1)]
    pub failed_node: usize,

    /// Length of one time unit in milliseconds. Every timing scales with it.
    #[arg(long, default_value_t = 1000)]
    pub time_unit_ms: u64,

    /// Override the pause between node processing cycles, in milliseconds.
    #[arg(long)]
    pub cycle_pause_ms: Option<u64>,

    /// Envelopes a node mailbox holds before rejecting new ones.
    #[arg(long, default_value_t = DEFAULT_MAILBOX_CAPACITY)]
    pub mailbox_capacity: usize,
}

impl ScenarioArgs {
    pub fn to_config(&self) -> ScenarioConfig {
        let mut config = ScenarioConfig::scaled(Duration::from_millis(self.time_unit_ms));
        config.cluster.nodes = self.nodes;
        config.cluster.mailbox_capacity = self.mailbox_capacity;
        if let Some(ms) = self.cycle_pause_ms {
            config.cluster.cycle_pause = Duration::from_millis(ms);
        }
        config.driver.count = self.items;
        config.failed_node = self.failed_node;
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Number of replica nodes.
    #[arg(long, default_value_t = 2)]
    pub nodes: usize,

    /// Node that receives every envelope read from stdin.
    #[arg(long, default_value_t = 0)]
    pub entry: usize,

    /// Time given to the cluster after EOF before the state is printed.
    #[arg(long, default_value_t = 500)]
    pub settle_ms: u64,

    /// Pause between node processing cycles, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub cycle_pause_ms: u64,
}

impl IngestArgs {
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            nodes: self.nodes,
            cycle_pause: Duration::from_millis(self.cycle_pause_ms),
            ..ClusterConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_flags_run_the_scenario() {
        let cli = Cli::parse_from(["replica-failover", "--nodes", "3", "--time-unit-ms", "10"]);
        let Command::Scenario(args) = cli.into_command() else {
            panic!("expected scenario");
        };
        let config = args.to_config();
        assert_eq!(config.cluster.nodes, 3);
        assert_eq!(config.fail_at, Duration::from_millis(30));
        assert_eq!(config.cluster.cycle_pause, Duration::from_millis(5));
    }

    #[test]
    fn cycle_pause_override_wins() {
        let cli = Cli::parse_from(["replica-failover", "--cycle-pause-ms", "0"]);
        let Command::Scenario(args) = cli.into_command() else {
            panic!("expected scenario");
        };
        assert!(args.to_config().cluster.cycle_pause.is_zero());
    }

    #[test]
    fn ingest_subcommand_parses() {
        let cli = Cli::parse_from(["replica-failover", "ingest", "--entry", "1"]);
        let Command::Ingest(args) = cli.into_command() else {
            panic!("expected ingest");
        };
        assert_eq!(args.entry, 1);
        assert_eq!(args.cluster_config().nodes, 2);
    }
}
