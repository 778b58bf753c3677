//! Priority frontier with dedup and bounded growth.
//!
//! Admission and pop are plain mutex-guarded operations and never suspend;
//! workers coordinate waiting outside the frontier.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::models::FrontierEntry;

struct HeapSlot {
    priority: i64,
    seq: u64,
    entry: FrontierEntry,
}

impl PartialEq for HeapSlot {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for HeapSlot {}

impl PartialOrd for HeapSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapSlot {
    // Max-heap on priority; FIFO among equal priorities via admission seq.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    heap: BinaryHeap<HeapSlot>,
    discovered: HashSet<String>,
    next_seq: u64,
}

/// Priority-ordered queue of URLs awaiting fetch, with a `discovered` set
/// that bounds total admissions at `max_pages`.
pub struct Frontier {
    inner: Mutex<Inner>,
    max_pages: usize,
}

impl Frontier {
    pub fn new(max_pages: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                discovered: HashSet::new(),
                next_seq: 0,
            }),
            max_pages,
        }
    }

    /// Admit an entry. Silently refuses duplicates and admissions past the
    /// page cap; returns whether the entry was queued.
    pub fn admit(&self, entry: FrontierEntry) -> bool {
        let mut inner = self.inner.lock();
        if inner.discovered.len() >= self.max_pages {
            return false;
        }
        if !inner.discovered.insert(entry.url.clone()) {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(HeapSlot {
            priority: entry.priority,
            seq,
            entry,
        });
        true
    }

    /// Remove and return the highest-priority entry.
    pub fn pop(&self) -> Option<FrontierEntry> {
        self.inner.lock().heap.pop().map(|slot| slot.entry)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Number of URLs ever admitted (the cap operand).
    pub fn discovered_len(&self) -> usize {
        self.inner.lock().discovered.len()
    }

    pub fn is_discovered(&self, url: &str) -> bool {
        self.inner.lock().discovered.contains(url)
    }

    /// Snapshot for checkpointing: the discovered set and the pending
    /// entries in pop order.
    pub fn snapshot(&self) -> (Vec<String>, Vec<FrontierEntry>) {
        let inner = self.inner.lock();
        let discovered = inner.discovered.iter().cloned().collect();
        let mut slots: Vec<&HeapSlot> = inner.heap.iter().collect();
        slots.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.seq.cmp(&b.seq)));
        let pending = slots.into_iter().map(|slot| slot.entry.clone()).collect();
        (discovered, pending)
    }

    /// Rebuild from a checkpoint. Pending entries are re-admitted in their
    /// stored order, so FIFO ties survive the round trip.
    pub fn restore(&self, discovered: Vec<String>, pending: Vec<FrontierEntry>) {
        let mut inner = self.inner.lock();
        inner.heap.clear();
        inner.discovered = discovered.into_iter().collect();
        inner.next_seq = 0;
        for entry in pending {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(HeapSlot {
                priority: entry.priority,
                seq,
                entry,
            });
        }
    }
}
