//! Observation map of node logs.
//!
//! Each node publishes a copy of its own log after every processing cycle.
//! Readers get whatever was last published; there is no atomicity across
//! nodes and the map is never consulted by the replication protocol itself.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::envelope::{Item, NodeId};

/// Last published log of every node, keyed by node id.
pub type Snapshot = BTreeMap<NodeId, Vec<Item>>;

/// Shared, cloneable handle to the observation map.
///
/// BTreeMap keeps iteration in node-id order, so printed snapshots are stable.
#[derive(Debug, Clone, Default)]
pub struct ClusterView {
    logs: Arc<Mutex<Snapshot>>,
}

impl ClusterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published log of `node`.
    pub fn publish(&self, node: NodeId, log: &[Item]) {
        self.lock().insert(node, log.to_vec());
    }

    /// Copy of every published log.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn log_of(&self, node: NodeId) -> Option<Vec<Item>> {
        self.lock().get(&node).cloned()
    }

    // A publisher that panicked mid-insert leaves a complete map behind, so a
    // poisoned lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_overwrites_previous_copy() {
        let view = ClusterView::new();
        view.publish(1, &["a".to_string(), "b".to_string()]);
        view.publish(1, &["c".to_string()]);
        view.publish(0, &[]);

        let snapshot = view.snapshot();
        assert_eq!(snapshot.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(view.log_of(1), Some(vec!["c".to_string()]));
        assert_eq!(view.log_of(5), None);
    }
}
