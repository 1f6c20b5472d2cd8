use thiserror::Error;

use crate::envelope::NodeId;

/// Failures surfaced by the transport and the cluster authority.
///
/// None of these are fatal to a node loop. Nodes log them and keep going;
/// the authority and the client driver hand them back to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// The destination does not exist or its loop has terminated.
    #[error("node {node} is unavailable")]
    DestinationUnavailable { node: NodeId },
    /// The destination mailbox is at capacity; the envelope was not queued.
    #[error("mailbox of node {node} is full")]
    MailboxFull { node: NodeId },
    #[error("no node with id {node} in this cluster")]
    UnknownNode { node: NodeId },
    #[error("cluster is already running")]
    AlreadyStarted,
    #[error("cluster has been shut down")]
    ShutDown,
    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),
}
