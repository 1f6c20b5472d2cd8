//! Load generator that inserts items into a single entry node.

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::envelope::{Envelope, Item, NodeId, Origin};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Node every insert is addressed to.
    pub entry: NodeId,
    pub count: usize,
    /// Delay between two consecutive inserts.
    pub interval: Duration,
    pub prefix: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            entry: 0,
            count: 5,
            interval: Duration::from_millis(1500),
            prefix: "item-".to_string(),
        }
    }
}

impl DriverConfig {
    /// The `i`-th item this driver inserts.
    pub fn item(&self, i: usize) -> Item {
        format!("{}{i}", self.prefix)
    }

    /// Every item the driver would insert if nothing failed.
    pub fn items(&self) -> Vec<Item> {
        (0..self.count).map(|i| self.item(i)).collect()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriverReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct ClientDriver {
    config: DriverConfig,
    transport: Arc<dyn Transport>,
}

impl ClientDriver {
    pub fn new(config: DriverConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Sends `count` inserts to the entry node, one per `interval`.
    ///
    /// A failed send is logged and counted but never retried, and the driver
    /// does not fail over to another node. Returns early once `shutdown`
    /// turns true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> DriverReport {
        let mut report = DriverReport::default();
        let entry = self.config.entry;

        for i in 0..self.config.count {
            if *shutdown.borrow() {
                info!(entry, sent = report.sent, "client stopped by shutdown");
                return report;
            }

            let item = self.config.item(i);
            match self
                .transport
                .send(Origin::Client, entry, Envelope::Insert { item: item.clone() })
            {
                Ok(()) => {
                    report.sent += 1;
                    info!(entry, %item, "client inserted item");
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(entry, %item, %error, "client insert failed");
                }
            }

            if i + 1 < self.config.count {
                select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.config.interval) => {}
                }
            }
        }

        info!(entry, sent = report.sent, failed = report.failed, "client finished");
        report
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> ClientHandle {
        ClientHandle {
            task: tokio::spawn(self.run(shutdown)),
        }
    }
}

/// Handle to a spawned [`ClientDriver`].
pub struct ClientHandle {
    task: JoinHandle<DriverReport>,
}

impl ClientHandle {
    pub fn is_done(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<DriverReport, JoinError> {
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InProcessTransport;

    #[test]
    fn items_use_prefix_and_index() {
        let config = DriverConfig {
            count: 3,
            prefix: "k".into(),
            ..DriverConfig::default()
        };
        assert_eq!(config.items(), vec!["k0", "k1", "k2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_every_item_in_order() {
        let (transport, mut mailboxes) = InProcessTransport::with_mailboxes(2, 16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let report = ClientDriver::new(DriverConfig::default(), transport.clone())
            .run(shutdown_rx)
            .await;

        assert_eq!(report, DriverReport { sent: 5, failed: 0 });
        let received: Vec<_> = std::iter::from_fn(|| mailboxes[0].try_receive())
            .map(|delivery| (delivery.from, delivery.envelope))
            .collect();
        let expected: Vec<_> = DriverConfig::default()
            .items()
            .into_iter()
            .map(|item| (Origin::Client, Envelope::Insert { item }))
            .collect();
        assert_eq!(received, expected);
        assert!(mailboxes[1].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_counted_not_retried() {
        let (transport, mailboxes) = InProcessTransport::with_mailboxes(1, 2);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let report = ClientDriver::new(DriverConfig::default(), transport.clone())
            .run(shutdown_rx)
            .await;

        assert_eq!(report, DriverReport { sent: 2, failed: 3 });
        assert_eq!(transport.stats().inserts, 2);
        assert_eq!(mailboxes[0].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_driver_early() {
        let (transport, _mailboxes) = InProcessTransport::with_mailboxes(1, 16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = ClientDriver::new(DriverConfig::default(), transport.clone())
            .spawn(shutdown_rx);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        shutdown_tx.send_replace(true);

        let report = handle.join().await.expect("driver task");
        assert_eq!(report.sent, 2);
    }
}
