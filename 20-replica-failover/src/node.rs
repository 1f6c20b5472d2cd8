//! Replica node: apply rules and the per-node processing loop.
//!
//! A [`ReplicaNode`] owns its log and its mailbox. Nothing else mutates the
//! log; every change comes from applying an envelope:
//!
//! - `Insert`: append, then broadcast `Update` to every peer
//! - `Update`: append, nothing else (no re-broadcast)
//! - `SyncRequest`: answer the requester with a full copy of the log
//! - `SyncResponse`: replace the log wholesale
//!
//! The async [`ReplicaNode::run`] loop gates consumption on the `active` flag
//! owned by the cluster. While inactive the mailbox is left untouched, so
//! everything sent in the meantime is applied in receipt order once the node
//! comes back.

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::envelope::{Delivery, Envelope, Item, NodeId, Origin};
use crate::mailbox::Mailbox;
use crate::transport::{BroadcastReport, Transport};
use crate::view::ClusterView;

/// Pause between processing cycles.
///
/// Receiving already blocks until work arrives, so this only paces the loop.
/// It also gives peers a window to queue more envelopes before the next drain.
pub const DEFAULT_CYCLE_PAUSE: Duration = Duration::from_millis(500);

/// Tally of one or more applied envelopes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub sent: usize,
    pub failed_sends: usize,
}

impl ApplyOutcome {
    fn record_broadcast(&mut self, report: &BroadcastReport) {
        self.sent += report.delivered;
        self.failed_sends += report.failed.len();
    }
}

impl AddAssign for ApplyOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.applied += rhs.applied;
        self.sent += rhs.sent;
        self.failed_sends += rhs.failed_sends;
    }
}

/// Signals the cluster uses to steer a running node.
///
/// The node only reads these; the cluster is the single writer of both.
pub struct NodeSignals {
    pub active: watch::Receiver<bool>,
    pub shutdown: watch::Receiver<bool>,
    pub cycle_pause: Duration,
}

pub struct ReplicaNode {
    id: NodeId,
    log: Vec<Item>,
    mailbox: Mailbox,
    transport: Arc<dyn Transport>,
    view: ClusterView,
}

impl ReplicaNode {
    /// Creates a node with an empty log and publishes that empty log.
    pub fn new(
        id: NodeId,
        mailbox: Mailbox,
        transport: Arc<dyn Transport>,
        view: ClusterView,
    ) -> Self {
        let node = Self {
            id,
            log: Vec::new(),
            mailbox,
            transport,
            view,
        };
        node.publish();
        node
    }

    pub fn log(&self) -> &[Item] {
        &self.log
    }

    /// Applies a single delivery according to its envelope.
    pub fn apply(&mut self, delivery: Delivery) -> ApplyOutcome {
        let Delivery { from, envelope } = delivery;
        let mut outcome = ApplyOutcome {
            applied: 1,
            ..Default::default()
        };

        match envelope {
            Envelope::Insert { item } => {
                self.log.push(item.clone());
                let report = self
                    .transport
                    .broadcast(self.id, Envelope::Update { item: item.clone() });
                self.warn_failed(&report, "update");
                outcome.record_broadcast(&report);
                info!(
                    node = self.id,
                    %from,
                    %item,
                    peers = report.delivered,
                    "inserted and replicated"
                );
            }
            Envelope::Update { item } => {
                info!(node = self.id, %from, %item, "applied replicated item");
                self.log.push(item);
            }
            Envelope::SyncRequest { requester } if requester == self.id => {
                warn!(node = self.id, %from, "ignoring sync request addressed from self");
            }
            Envelope::SyncRequest { requester } => {
                let response = Envelope::SyncResponse {
                    log: self.log.clone(),
                };
                match self.transport.send(Origin::Node(self.id), requester, response) {
                    Ok(()) => {
                        outcome.sent += 1;
                        info!(
                            node = self.id,
                            requester,
                            entries = self.log.len(),
                            "answered sync request"
                        );
                    }
                    Err(error) => {
                        outcome.failed_sends += 1;
                        warn!(node = self.id, requester, %error, "failed to answer sync request");
                    }
                }
            }
            Envelope::SyncResponse { log } => {
                let discarded = std::mem::replace(&mut self.log, log);
                info!(
                    node = self.id,
                    %from,
                    adopted = self.log.len(),
                    discarded = discarded.len(),
                    "recovered state from peer"
                );
            }
        }

        outcome
    }

    /// Drains what is queued right now, applies it and publishes the result.
    ///
    /// Envelopes that arrive while draining wait for the next call. Does not
    /// look at the `active` flag; the run loop decides when to call this.
    pub fn process_available(&mut self) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for _ in 0..self.mailbox.len() {
            let Some(delivery) = self.mailbox.try_receive() else {
                break;
            };
            outcome += self.apply(delivery);
        }
        self.publish();
        outcome
    }

    /// Runs processing cycles until the cluster signals shutdown.
    ///
    /// Each cycle waits for the first envelope, drains the rest of what is
    /// queued, applies everything in receipt order, publishes the log and then
    /// pauses. A cycle that has started always runs to completion.
    pub async fn run(mut self, mut signals: NodeSignals) {
        info!(node = self.id, "replica started");

        loop {
            if *signals.shutdown.borrow() {
                break;
            }

            if !*signals.active.borrow_and_update() {
                debug!(node = self.id, "replica silenced, mailbox left untouched");
                select! {
                    biased;
                    changed = signals.shutdown.changed() => if changed.is_err() { break },
                    changed = signals.active.changed() => if changed.is_err() { break },
                }
                continue;
            }

            let first = select! {
                biased;
                changed = signals.shutdown.changed() => {
                    if changed.is_err() { break }
                    continue;
                }
                changed = signals.active.changed() => {
                    if changed.is_err() { break }
                    continue;
                }
                delivery = self.mailbox.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let mut outcome = self.apply(first);
            outcome += self.process_available();
            trace!(
                node = self.id,
                applied = outcome.applied,
                sent = outcome.sent,
                failed = outcome.failed_sends,
                "cycle complete"
            );

            if !signals.cycle_pause.is_zero() {
                select! {
                    biased;
                    _ = signals.shutdown.changed() => {}
                    _ = tokio::time::sleep(signals.cycle_pause) => {}
                }
            }
        }

        self.publish();
        info!(node = self.id, entries = self.log.len(), "replica stopped");
    }

    fn publish(&self) {
        self.view.publish(self.id, &self.log);
    }

    fn warn_failed(&self, report: &BroadcastReport, what: &str) {
        for (peer, error) in &report.failed {
            warn!(node = self.id, peer, %error, "failed to send {what}");
        }
    }
}
