//! Point-to-point delivery between clients and replica nodes.
//!
//! Nodes only need two things from the network: send a typed envelope to a
//! named peer, and send the same envelope to every peer. [`Transport`] is that
//! seam. [`InProcessTransport`] implements it over the in-memory mailboxes and
//! counts successful deliveries per envelope kind, which is how tests observe
//! replication traffic.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::envelope::{Delivery, Envelope, EnvelopeKind, NodeId, Origin};
use crate::error::ClusterError;
use crate::mailbox::{Mailbox, MailboxSender, mailbox};

/// Outcome of sending one envelope to every peer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<(NodeId, ClusterError)>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub trait Transport: Send + Sync {
    /// Queues `envelope` for `to`. Never blocks; no retry on failure.
    fn send(&self, from: Origin, to: NodeId, envelope: Envelope) -> Result<(), ClusterError>;

    /// Every node reachable through this transport.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Sends `envelope` to every node except `from`.
    ///
    /// A failed destination does not stop delivery to the remaining ones.
    fn broadcast(&self, from: NodeId, envelope: Envelope) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for to in self.node_ids().into_iter().filter(|&to| to != from) {
            match self.send(Origin::Node(from), to, envelope.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => report.failed.push((to, err)),
            }
        }
        report
    }
}

/// Successful deliveries per envelope kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrafficStats {
    pub inserts: u64,
    pub updates: u64,
    pub sync_requests: u64,
    pub sync_responses: u64,
}

#[derive(Debug, Default)]
struct TrafficCounters {
    inserts: AtomicU64,
    updates: AtomicU64,
    sync_requests: AtomicU64,
    sync_responses: AtomicU64,
}

impl TrafficCounters {
    fn record(&self, kind: EnvelopeKind) {
        let counter = match kind {
            EnvelopeKind::Insert => &self.inserts,
            EnvelopeKind::Update => &self.updates,
            EnvelopeKind::SyncRequest => &self.sync_requests,
            EnvelopeKind::SyncResponse => &self.sync_responses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TrafficStats {
        TrafficStats {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            sync_requests: self.sync_requests.load(Ordering::Relaxed),
            sync_responses: self.sync_responses.load(Ordering::Relaxed),
        }
    }
}

/// Routes envelopes straight into the destination node's mailbox.
#[derive(Debug)]
pub struct InProcessTransport {
    routes: BTreeMap<NodeId, MailboxSender>,
    counters: TrafficCounters,
}

impl InProcessTransport {
    pub fn new(routes: impl IntoIterator<Item = MailboxSender>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|sender| (sender.node(), sender))
                .collect(),
            counters: TrafficCounters::default(),
        }
    }

    /// Builds mailboxes for nodes `0..nodes` and a transport routing to them.
    ///
    /// Mailboxes are returned in id order.
    pub fn with_mailboxes(nodes: usize, capacity: usize) -> (Arc<Self>, Vec<Mailbox>) {
        let (senders, mailboxes): (Vec<_>, Vec<_>) =
            (0..nodes).map(|id| mailbox(id, capacity)).unzip();
        (Arc::new(Self::new(senders)), mailboxes)
    }

    pub fn stats(&self) -> TrafficStats {
        self.counters.snapshot()
    }
}

impl Transport for InProcessTransport {
    fn send(&self, from: Origin, to: NodeId, envelope: Envelope) -> Result<(), ClusterError> {
        let route = self
            .routes
            .get(&to)
            .ok_or(ClusterError::DestinationUnavailable { node: to })?;
        let kind = envelope.kind();
        route.deliver(Delivery { from, envelope })?;
        self.counters.record(kind);
        Ok(())
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.routes.keys().copied().collect()
    }
}
