//! The reaction queue (spec §4.1): one binary-heap priority queue per
//! level, each ordered by [`Reaction::index`](crate::Reaction::index)
//! ascending (the deadline tiebreak, since level is constant within a
//! bucket). Organizing storage this way — rather than one heap spanning
//! every level — is what lets the scheduler refuse to hand out a reaction
//! from level `L+1` while level `L` is still draining, even though both
//! may already be sitting in the queue (spec §4.2's level boundaries: see
//! `SPEC_FULL.md` for how this was resolved against the `scheduler_GEDF_NP.c`
//! source, which allocates a single queue but indexes it as if it were
//! per-level).
//!
//! Reactions store a back-pointer (`position`) into their level's backing
//! array so that, beyond the `insert`/`pop` the scheduler actually calls,
//! removal and priority change are possible in `O(log n)` without a linear
//! scan — the "position-tracking protocol" spec §4.1 calls for.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::reaction::{Reaction, NOT_QUEUED};

#[derive(Default)]
struct LevelHeap {
    heap: Vec<Arc<Reaction>>,
}

impl LevelHeap {
    fn insert(&mut self, reaction: Arc<Reaction>) {
        debug_assert_eq!(
            reaction.position.load(Ordering::Relaxed),
            NOT_QUEUED,
            "reaction already has a queue position"
        );
        let i = self.heap.len();
        reaction.position.store(i, Ordering::Relaxed);
        self.heap.push(reaction);
        self.sift_up(i);
    }

    fn pop(&mut self) -> Option<Arc<Reaction>> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let popped = self.heap.pop().unwrap();
        popped.position.store(NOT_QUEUED, Ordering::Relaxed);
        if !self.heap.is_empty() {
            self.heap[0].position.store(0, Ordering::Relaxed);
            self.sift_down(0);
        }
        Some(popped)
    }

    fn remove(&mut self, reaction: &Arc<Reaction>) -> bool {
        let pos = reaction.position.load(Ordering::Relaxed);
        if pos == NOT_QUEUED || pos >= self.heap.len() || !Arc::ptr_eq(&self.heap[pos], reaction) {
            return false;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(pos, last);
        let removed = self.heap.pop().unwrap();
        removed.position.store(NOT_QUEUED, Ordering::Relaxed);
        if pos < self.heap.len() {
            self.heap[pos].position.store(pos, Ordering::Relaxed);
            self.sift_down(pos);
            self.sift_up(pos);
        }
        true
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].index() < self.heap[parent].index() {
                self.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < self.heap.len() && self.heap[left].index() < self.heap[smallest].index() {
                smallest = left;
            }
            if right < self.heap.len() && self.heap[right].index() < self.heap[smallest].index() {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.heap[a].position.store(a, Ordering::Relaxed);
        self.heap[b].position.store(b, Ordering::Relaxed);
    }
}

/// Not thread-safe by itself; callers serialize access through
/// `queue_mutex` (spec §3), except during `distribute_ready_reactions`,
/// where the "all workers idle" barrier makes locking unnecessary (spec §9).
pub struct ReactionQueue {
    levels: Vec<LevelHeap>,
}

impl ReactionQueue {
    /// `max_level` is the highest valid (0-based) reaction level; levels
    /// `0..=max_level` each get their own bucket.
    pub fn new(max_level: u32) -> Self {
        Self {
            levels: (0..=max_level).map(|_| LevelHeap::default()).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.levels.iter().map(|l| l.heap.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn size_at(&self, level: u32) -> usize {
        self.levels[level as usize].heap.len()
    }

    /// Insert `reaction` into its level's bucket. Must not already be queued.
    pub fn insert(&mut self, reaction: Arc<Reaction>) {
        let level = reaction.level() as usize;
        self.levels[level].insert(reaction);
    }

    /// Pop the highest-priority (by deadline) reaction at `level`, if any.
    pub fn pop_at(&mut self, level: u32) -> Option<Arc<Reaction>> {
        self.levels[level as usize].pop()
    }

    /// Remove a specific reaction from its level's bucket. `O(log n)`.
    pub fn remove(&mut self, reaction: &Arc<Reaction>) -> bool {
        self.levels[reaction.level() as usize].remove(reaction)
    }
}
