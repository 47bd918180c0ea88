use std::collections::{HashMap, VecDeque};

use crate::resolver::Resolution;

/// Matches the in-process memoization bound of the workload this replaced.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// In-run memoization of resolutions, keyed by link. Bounded: once at
/// capacity, the least-recently-used entry is evicted. Each distinct link is
/// normally requested once per run, so eviction is a safety valve rather
/// than a hot path.
///
/// Not persisted across runs; resume uses the checkpoint store instead.
pub struct ResultCache {
    capacity: usize,
    entries: HashMap<String, Resolution>,
    // Front = least recently used.
    order: VecDeque<String>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        ResultCache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Look up a link, refreshing its recency on a hit.
    pub fn get(&mut self, link: &str) -> Option<Resolution> {
        let resolution = self.entries.get(link)?.clone();
        self.touch(link);
        Some(resolution)
    }

    pub fn insert(&mut self, link: String, resolution: Resolution) {
        if self.entries.contains_key(&link) {
            self.entries.insert(link.clone(), resolution);
            self.touch(&link);
            return;
        }

        if self.entries.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(link.clone());
        self.entries.insert(link, resolution);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, link: &str) {
        if let Some(pos) = self.order.iter().position(|l| l == link) {
            if let Some(l) = self.order.remove(pos) {
                self.order.push_back(l);
            }
        }
    }
}
