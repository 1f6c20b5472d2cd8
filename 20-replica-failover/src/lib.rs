//! Replicated in-memory log with crash injection and full-state recovery.
//!
//! A small fixed cluster of replica nodes copies client-inserted items to each
//! other over per-node mailboxes. Any node can be silenced ("crashed") by the
//! cluster authority and later brought back, at which point it asks every peer
//! for its full log and adopts whatever response it processes.
//!
//! # Architecture
//!
//! - **One tokio task per node**: owns the node's log, drains its mailbox,
//!   applies envelopes and publishes a snapshot after every cycle
//! - **One task for the client driver**: inserts items into an entry node at a
//!   fixed cadence
//! - **The caller's task is the authority**: flips `active` flags, triggers
//!   recovery, reads snapshots, shuts everything down
//!
//! Nodes never share mutable state. The only cross-node effects are envelopes
//! delivered through the [`transport`]. The `active` flag of each node is
//! written by the cluster and only read by the node, through a `watch` channel.
//!
//! The replication protocol is deliberately naive: a `SyncResponse` overwrites
//! the requester's log wholesale, so backlog applied before the overwrite is
//! lost on the recovering node. See `tests/recovery_races.rs`.
//!
//! # Modules
//!
//! - [`envelope`]: node ids, items and the messages nodes exchange
//! - [`mailbox`]: bounded per-node inbound queue
//! - [`transport`]: `send` / `broadcast` over the mailboxes, with traffic counters
//! - [`view`]: observation map of published node logs
//! - [`node`]: replica apply rules and processing loop
//! - [`cluster`]: node lifecycle and failure injection
//! - [`client`]: load generator inserting items into one entry node
//! - [`scenario`]: scripted fail/recover run
//! - [`codec`]: JSON line encoding of envelopes and line ingress
//! - [`cli`]: command-line interface of the demo binary

pub mod cli;
pub mod client;
pub mod cluster;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod mailbox;
pub mod node;
pub mod scenario;
pub mod transport;
pub mod view;

pub use cluster::{Cluster, ClusterConfig};
pub use envelope::{Delivery, Envelope, Item, NodeId, Origin};
pub use error::ClusterError;
