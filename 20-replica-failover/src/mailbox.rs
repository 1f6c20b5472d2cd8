//! Bounded per-node inbound queue.
//!
//! Each node owns exactly one [`Mailbox`]; any number of [`MailboxSender`]
//! clones feed it. Order is FIFO per sender, and no ordering is promised
//! between different senders.
//!
//! Delivery never blocks. When the queue is at capacity the new envelope is
//! rejected with [`ClusterError::MailboxFull`] and everything already queued
//! stays put. Once the owning node has terminated, deliveries fail with
//! [`ClusterError::DestinationUnavailable`].

use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};

use crate::envelope::{Delivery, NodeId};
use crate::error::ClusterError;

/// Default number of envelopes a mailbox holds before rejecting new ones.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Creates the mailbox of `node` along with its first sender.
pub fn mailbox(node: NodeId, capacity: usize) -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailboxSender { node, tx }, Mailbox { rx })
}

#[derive(Debug, Clone)]
pub struct MailboxSender {
    node: NodeId,
    tx: mpsc::Sender<Delivery>,
}

impl MailboxSender {
    /// Node this sender delivers to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Queues a delivery without waiting for room.
    pub fn deliver(&self, delivery: Delivery) -> Result<(), ClusterError> {
        self.tx.try_send(delivery).map_err(|err| match err {
            TrySendError::Full(_) => ClusterError::MailboxFull { node: self.node },
            TrySendError::Closed(_) => ClusterError::DestinationUnavailable { node: self.node },
        })
    }
}

#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Delivery>,
}

impl Mailbox {
    /// Returns the next queued delivery, or `None` right away if there is none.
    pub fn try_receive(&mut self) -> Option<Delivery> {
        match self.rx.try_recv() {
            Ok(delivery) => Some(delivery),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits for the next delivery.
    ///
    /// Cancel safe: dropping the future before it completes loses nothing, so
    /// the node loop can race it against shutdown and `active` changes.
    /// Returns `None` once every sender is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Number of deliveries currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
