use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a node in the cluster, `0 <= id < N`.
pub type NodeId = usize;

/// Opaque value replicated between nodes.
pub type Item = String;

/// Messages exchanged between clients and replica nodes.
///
/// Envelopes are immutable once built; the mailbox owns them until the
/// destination node consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Client request, addressed to exactly one node.
    Insert { item: Item },
    /// Replication of an accepted insert, sent to every peer but the originator.
    Update { item: Item },
    /// Recovery probe sent on behalf of a reactivated node.
    SyncRequest { requester: NodeId },
    /// Full copy of a peer's log, addressed to the requester.
    SyncResponse { log: Vec<Item> },
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Insert { .. } => EnvelopeKind::Insert,
            Envelope::Update { .. } => EnvelopeKind::Update,
            Envelope::SyncRequest { .. } => EnvelopeKind::SyncRequest,
            Envelope::SyncResponse { .. } => EnvelopeKind::SyncResponse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Insert,
    Update,
    SyncRequest,
    SyncResponse,
}

/// Sender of a delivered envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Client,
    Node(NodeId),
}

impl From<NodeId> for Origin {
    fn from(id: NodeId) -> Self {
        Origin::Node(id)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Client => f.write_str("client"),
            Origin::Node(id) => write!(f, "node {id}"),
        }
    }
}

/// An envelope as it sits in a mailbox, tagged with who sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: Origin,
    pub envelope: Envelope,
}

impl Delivery {
    pub fn new(from: Origin, envelope: Envelope) -> Self {
        Self { from, envelope }
    }
}
