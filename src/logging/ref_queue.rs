//! ref_queue.rs
//! Recent-samples ring for control threads.
//! - Single producer (the data logger), any number of readers
//! - Drop-oldest at capacity; snapshots are owned copies, newest first

use crate::{
    component::{Component, ComponentKind},
    model::{LinkedDataModel, Record, downcast_record},
};
use parking_lot::Mutex;
use std::{collections::VecDeque, fmt, sync::Arc};

pub const DEFAULT_CAPACITY: usize = 100;

/// Clones share the same ring.
#[derive(Clone)]
pub struct RefQueue {
    ring: Arc<Mutex<VecDeque<Arc<dyn Record>>>>,
    capacity: usize,
}

impl Default for RefQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RefQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, record: Arc<dyn Record>) {
        let mut ring = self.ring.lock();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    /// Everything retained, newest first.
    pub fn snapshot(&self) -> Vec<Arc<dyn Record>> {
        self.ring.lock().iter().rev().cloned().collect()
    }

    /// Retained aggregates of type `L`, newest first; other types are skipped.
    pub fn snapshot_as<L: LinkedDataModel>(&self) -> Vec<Arc<L>> {
        self.snapshot()
            .into_iter()
            .filter_map(downcast_record::<L>)
            .collect()
    }

    pub fn latest(&self) -> Option<Arc<dyn Record>> {
        self.ring.lock().back().cloned()
    }

    /// Newest aggregate, if it is an `L`.
    pub fn latest_as<L: LinkedDataModel>(&self) -> Option<Arc<L>> {
        self.latest().and_then(downcast_record::<L>)
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.ring.lock().clear();
    }
}

impl fmt::Debug for RefQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Component for RefQueue {
    fn name(&self) -> &str {
        "RefQueue"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Logger
    }
}
