//! Cluster lifecycle and failure injection.
//!
//! [`Cluster`] owns the fixed set of nodes, their mailboxes (through the
//! transport) and the two signals that steer each node loop: the per-node
//! `active` flag and the cluster-wide shutdown flag. The cluster is the only
//! writer of both; nodes only read them.
//!
//! Silencing a node does not stop its task. It just stops draining its
//! mailbox, so envelopes keep queueing until it is reactivated.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::client::{ClientDriver, ClientHandle, DriverConfig};
use crate::envelope::{Envelope, Item, NodeId};
use crate::error::ClusterError;
use crate::mailbox::DEFAULT_MAILBOX_CAPACITY;
use crate::node::{DEFAULT_CYCLE_PAUSE, NodeSignals, ReplicaNode};
use crate::transport::{BroadcastReport, InProcessTransport, Transport};
use crate::view::{ClusterView, Snapshot};

/// Configuration for building a cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of nodes; ids are `0..nodes`.
    pub nodes: usize,
    /// Envelopes a mailbox holds before new ones are rejected.
    pub mailbox_capacity: usize,
    /// Pause each node takes after a processing cycle.
    pub cycle_pause: Duration,
    /// How often [`Cluster::wait_until`] re-reads the snapshot.
    pub observe_interval: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 2,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            cycle_pause: DEFAULT_CYCLE_PAUSE,
            observe_interval: Duration::from_millis(100),
        }
    }
}

impl ClusterConfig {
    pub fn with_nodes(nodes: usize) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.nodes == 0 {
            return Err(ClusterError::InvalidConfig(
                "a cluster needs at least one node".into(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(ClusterError::InvalidConfig(
                "mailbox capacity must be at least 1".into(),
            ));
        }
        if self.observe_interval.is_zero() {
            return Err(ClusterError::InvalidConfig(
                "observe interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

pub struct Cluster {
    config: ClusterConfig,
    transport: Arc<InProcessTransport>,
    view: ClusterView,
    active: Vec<watch::Sender<bool>>,
    shutdown: watch::Sender<bool>,
    pending: Vec<(ReplicaNode, NodeSignals)>,
    tasks: Vec<JoinHandle<()>>,
    lifecycle: Lifecycle,
}

impl Cluster {
    /// Builds every node with an empty log. Nothing runs until [`Cluster::start`].
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;

        let (transport, mailboxes) =
            InProcessTransport::with_mailboxes(config.nodes, config.mailbox_capacity);
        let view = ClusterView::new();
        let (shutdown, _) = watch::channel(false);

        let mut active = Vec::with_capacity(config.nodes);
        let mut pending = Vec::with_capacity(config.nodes);
        for (id, mailbox) in mailboxes.into_iter().enumerate() {
            let (active_tx, active_rx) = watch::channel(true);
            let node = ReplicaNode::new(id, mailbox, transport.clone(), view.clone());
            let signals = NodeSignals {
                active: active_rx,
                shutdown: shutdown.subscribe(),
                cycle_pause: config.cycle_pause,
            };
            active.push(active_tx);
            pending.push((node, signals));
        }

        Ok(Self {
            config,
            transport,
            view,
            active,
            shutdown,
            pending,
            tasks: Vec::new(),
            lifecycle: Lifecycle::Created,
        })
    }

    /// Spawns every node loop on the current tokio runtime.
    pub fn start(&mut self) -> Result<(), ClusterError> {
        match self.lifecycle {
            Lifecycle::Running => return Err(ClusterError::AlreadyStarted),
            Lifecycle::Stopped => return Err(ClusterError::ShutDown),
            Lifecycle::Created => {}
        }

        for (node, signals) in self.pending.drain(..) {
            self.tasks.push(tokio::spawn(node.run(signals)));
        }
        self.lifecycle = Lifecycle::Running;
        info!(nodes = self.config.nodes, "cluster started");
        Ok(())
    }

    /// Shared transport, for clients and tests that talk to nodes directly.
    pub fn transport(&self) -> Arc<InProcessTransport> {
        Arc::clone(&self.transport)
    }

    /// Sets the availability flag of `node`.
    ///
    /// Takes effect at the node's next cycle boundary; a cycle in progress
    /// finishes first.
    pub fn set_active(&self, node: NodeId, active: bool) -> Result<(), ClusterError> {
        self.ensure_not_stopped()?;
        let flag = self
            .active
            .get(node)
            .ok_or(ClusterError::UnknownNode { node })?;
        flag.send_if_modified(|current| {
            let changed = *current != active;
            *current = active;
            changed
        });
        Ok(())
    }

    pub fn is_active(&self, node: NodeId) -> Result<bool, ClusterError> {
        self.active
            .get(node)
            .map(|flag| *flag.borrow())
            .ok_or(ClusterError::UnknownNode { node })
    }

    /// Silences `node`: it stops draining its mailbox until reactivated.
    pub fn inject_failure(&self, node: NodeId) -> Result<(), ClusterError> {
        self.set_active(node, false)?;
        warn!(node, "failure injected, node silenced");
        Ok(())
    }

    /// Reactivates `node` and broadcasts a `SyncRequest` on its behalf.
    ///
    /// Returns the broadcast outcome so unreachable peers are visible to the
    /// caller. There is no retry and no timeout: if nobody answers, the node
    /// keeps whatever log it has.
    pub fn inject_recovery(&self, node: NodeId) -> Result<BroadcastReport, ClusterError> {
        self.set_active(node, true)?;
        let report = self
            .transport
            .broadcast(node, Envelope::SyncRequest { requester: node });
        for (peer, error) in &report.failed {
            warn!(node, peer, %error, "sync request not delivered");
        }
        info!(node, asked = report.delivered, "node reactivated, sync requested");
        Ok(report)
    }

    /// Same as [`Cluster::inject_recovery`].
    pub fn trigger_recovery(&self, node: NodeId) -> Result<BroadcastReport, ClusterError> {
        self.inject_recovery(node)
    }

    /// Last published log of every node.
    pub fn snapshot(&self) -> Snapshot {
        self.view.snapshot()
    }

    pub fn log_of(&self, node: NodeId) -> Option<Vec<Item>> {
        self.view.log_of(node)
    }

    /// Re-reads the snapshot every `observe_interval` until `predicate` holds.
    ///
    /// Returns `false` if `timeout` elapses first. A timeout too large to
    /// represent as an instant means no deadline.
    pub async fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut(&BTreeMap<NodeId, Vec<Item>>) -> bool,
    {
        if predicate(&self.snapshot()) {
            return true;
        }
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return false;
            }
            tokio::time::sleep(self.config.observe_interval).await;
            if predicate(&self.snapshot()) {
                return true;
            }
        }
    }

    /// Starts a client driver bound to this cluster's shutdown signal.
    pub fn spawn_client(&self, config: DriverConfig) -> Result<ClientHandle, ClusterError> {
        self.ensure_not_stopped()?;
        if config.entry >= self.config.nodes {
            return Err(ClusterError::UnknownNode { node: config.entry });
        }
        let transport: Arc<dyn Transport> = self.transport();
        Ok(ClientDriver::new(config, transport).spawn(self.shutdown.subscribe()))
    }

    /// Stops every node loop and any client driver, then waits for the node
    /// loops to exit.
    ///
    /// Calling it again is a no-op. In-flight envelopes are not drained.
    pub async fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        self.lifecycle = Lifecycle::Stopped;
        self.shutdown.send_replace(true);
        self.pending.clear();

        for task in self.tasks.drain(..) {
            if let Err(error) = task.await {
                warn!(?error, "replica task ended abnormally");
            }
        }
        info!("cluster shut down");
    }

    fn ensure_not_stopped(&self) -> Result<(), ClusterError> {
        if self.lifecycle == Lifecycle::Stopped {
            return Err(ClusterError::ShutDown);
        }
        Ok(())
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        // Best effort: tasks notice on their next select and exit on their own.
        self.shutdown.send_replace(true);
    }
}
