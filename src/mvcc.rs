//! Snapshot publication for committed state.
//!
//! Records and adjacency are published together:
//! - `Snapshot` owns an immutable copy of the [`RecordStore`] and [`GraphIndex`]
//! - `ArcSwap` swaps in a whole new snapshot on commit
//! - readers holding an older `Arc<Snapshot>` keep seeing exactly that state

use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;

use crate::graph_index::GraphIndex;
use crate::store::RecordStore;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub store: RecordStore,
    pub graph: GraphIndex,
    /// Number of commits applied to produce this state
    pub sequence: u64,
    pub created_at: SystemTime,
}

impl Snapshot {
    pub fn new(store: RecordStore, graph: GraphIndex, sequence: u64) -> Self {
        Self {
            store,
            graph,
            sequence,
            created_at: SystemTime::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(RecordStore::new(), GraphIndex::new(), 0)
    }

    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[derive(Debug)]
pub struct SnapshotManager {
    current: ArcSwap<Snapshot>,
}

impl SnapshotManager {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::new(Arc::new(initial)),
        }
    }

    /// Publishes `next` atomically; concurrent readers see either the old or the new state.
    pub fn publish(&self, next: Snapshot) {
        self.current.store(Arc::new(next));
    }

    pub fn acquire(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self::new(Snapshot::empty())
    }
}
