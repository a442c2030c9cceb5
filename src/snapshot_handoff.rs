use std::{sync::Arc, time::Instant};

use arc_swap::{ArcSwap, Guard};
use generational_arena::Index;

use crate::skinning::DeformedMesh;

pub type SnapshotGuard = Guard<Arc<SnapshotPair>>;

/// Deformed buffers of one entity as of the end of a frame
#[derive(Clone, Debug)]
pub struct EntitySnapshot {
    pub id: Index,
    pub name: String,
    pub frame_counter: u64,
    pub mesh: Arc<DeformedMesh>,
}

#[derive(Clone, Debug, Default)]
pub struct RenderSnapshot {
    pub frame: u64,
    pub entities: Vec<EntitySnapshot>,
}

impl RenderSnapshot {
    pub fn entity(&self, id: Index) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id)
    }
}

#[derive(Clone)]
pub struct SnapshotPair {
    pub prev: Arc<RenderSnapshot>,
    pub prev_timestamp: Instant,
    pub curr: Arc<RenderSnapshot>,
    pub curr_timestamp: Instant,
}

/// Single writer (the frame loop), any number of lock-free readers
pub struct SnapshotHandoff {
    pair: ArcSwap<SnapshotPair>,
}

impl SnapshotHandoff {
    pub fn new(init: RenderSnapshot) -> Self {
        let init = Arc::new(init);
        let now = Instant::now();
        let pair = SnapshotPair {
            prev: init.clone(),
            prev_timestamp: now,
            curr: init,
            curr_timestamp: now,
        };
        Self {
            pair: ArcSwap::from(Arc::new(pair)),
        }
    }

    /// Load then store, not a compare-and-swap: only one thread may publish.
    pub fn publish(&self, snap: RenderSnapshot) {
        let old = self.pair.load();
        let next = SnapshotPair {
            prev: old.curr.clone(),
            prev_timestamp: old.curr_timestamp,
            curr: Arc::new(snap),
            curr_timestamp: Instant::now(),
        };
        self.pair.store(Arc::new(next));
    }

    pub fn load(&self) -> SnapshotGuard {
        self.pair.load()
    }
}
