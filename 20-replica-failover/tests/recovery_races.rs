//! Recovery interleavings driven one processing step at a time.
//!
//! Nodes are built without the cluster so each test decides exactly which
//! node drains its mailbox and when. These pin down the overwrite semantics of
//! `SyncResponse`, including the cases where it loses data.

use std::sync::Arc;

use anyhow::Result;
use replica_failover::mailbox::DEFAULT_MAILBOX_CAPACITY;
use replica_failover::node::ReplicaNode;
use replica_failover::transport::{InProcessTransport, Transport};
use replica_failover::view::ClusterView;
use replica_failover::{Envelope, Item, Origin};

struct StepCluster {
    transport: Arc<InProcessTransport>,
    view: ClusterView,
    nodes: Vec<ReplicaNode>,
}

impl StepCluster {
    fn new(n: usize) -> Self {
        let (transport, mailboxes) =
            InProcessTransport::with_mailboxes(n, DEFAULT_MAILBOX_CAPACITY);
        let view = ClusterView::new();
        let nodes = mailboxes
            .into_iter()
            .enumerate()
            .map(|(id, mailbox)| ReplicaNode::new(id, mailbox, transport.clone(), view.clone()))
            .collect();
        Self {
            transport,
            view,
            nodes,
        }
    }

    fn step(&mut self, node: usize) {
        self.nodes[node].process_available();
    }

    fn log(&self, node: usize) -> &[Item] {
        self.nodes[node].log()
    }
}

fn items(values: &[&str]) -> Vec<Item> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn backlog_applied_before_sync_response_is_lost() -> Result<()> {
    let mut cluster = StepCluster::new(2);

    cluster
        .transport
        .send(Origin::Client, 0, Envelope::Insert { item: "a".into() })?;
    cluster.step(0);

    // Node 1 is down: it accepts a client insert into its mailbox and the
    // recovery probe goes out on its behalf before it drains anything.
    cluster
        .transport
        .send(Origin::Client, 1, Envelope::Insert { item: "x".into() })?;
    let report = cluster
        .transport
        .broadcast(1, Envelope::SyncRequest { requester: 1 });
    assert_eq!(report.delivered, 1);

    // Node 0 answers with a log that has never seen x.
    cluster.step(0);
    assert_eq!(cluster.log(0), items(&["a"]).as_slice());

    // Update(a), Insert(x), SyncResponse([a]) in that order.
    cluster.step(1);
    assert_eq!(cluster.log(1), items(&["a"]).as_slice(), "x is overwritten");

    // The update node 1 broadcast for x still reaches node 0.
    cluster.step(0);
    assert_eq!(cluster.log(0), items(&["a", "x"]).as_slice());

    assert_eq!(cluster.view.log_of(0), Some(items(&["a", "x"])));
    assert_eq!(cluster.view.log_of(1), Some(items(&["a"])));
    Ok(())
}

#[test]
fn backlog_after_sync_response_survives() -> Result<()> {
    let mut cluster = StepCluster::new(2);

    cluster
        .transport
        .send(Origin::Client, 0, Envelope::Insert { item: "a".into() })?;
    cluster.step(0);
    cluster.step(1);

    cluster
        .transport
        .broadcast(1, Envelope::SyncRequest { requester: 1 });
    cluster.step(0);
    // Queued behind the response, so it is applied on top of it.
    cluster
        .transport
        .send(Origin::Client, 0, Envelope::Insert { item: "b".into() })?;
    cluster.step(0);

    cluster.step(1);
    assert_eq!(cluster.log(1), items(&["a", "b"]).as_slice());
    assert_eq!(cluster.log(0), cluster.log(1));
    Ok(())
}

#[test]
fn last_processed_sync_response_wins() -> Result<()> {
    let mut cluster = StepCluster::new(3);

    cluster
        .transport
        .send(Origin::Node(0), 1, Envelope::Update { item: "p".into() })?;
    for item in ["q", "r"] {
        cluster
            .transport
            .send(Origin::Node(0), 2, Envelope::Update { item: item.into() })?;
    }
    cluster.step(1);
    cluster.step(2);

    let report = cluster
        .transport
        .broadcast(0, Envelope::SyncRequest { requester: 0 });
    assert_eq!(report.delivered, 2);

    // Node 2 answers first, node 1 second; node 0 ends up with node 1's log.
    cluster.step(2);
    cluster.step(1);
    cluster.step(0);
    assert_eq!(cluster.log(0), items(&["p"]).as_slice());
    Ok(())
}

#[test]
fn response_order_decides_the_winner() -> Result<()> {
    let mut cluster = StepCluster::new(3);

    cluster
        .transport
        .send(Origin::Node(0), 1, Envelope::Update { item: "p".into() })?;
    cluster
        .transport
        .send(Origin::Node(0), 2, Envelope::Update { item: "q".into() })?;
    cluster.step(1);
    cluster.step(2);

    cluster
        .transport
        .broadcast(0, Envelope::SyncRequest { requester: 0 });
    cluster.step(1);
    cluster.step(2);
    cluster.step(0);
    assert_eq!(cluster.log(0), items(&["q"]).as_slice());
    assert_eq!(cluster.transport.stats().sync_responses, 2);
    Ok(())
}
