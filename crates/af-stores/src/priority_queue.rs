//! PriorityQueue: max-heap ordered waiting room for queued jobs, FIFO within
//! a priority band (spec §4.4).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use af_core::{JobId, Priority};
use parking_lot::Mutex;

#[derive(Debug, Clone, Eq, PartialEq)]
struct Entry {
    priority: Priority,
    // Lower sequence dequeues first within the same priority (FIFO), so the
    // heap ordering inverts it.
    sequence: u64,
    job_id: JobId,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<Entry>,
    next_sequence: u64,
}

/// Priority-first, FIFO-within-priority queue of waiting job ids.
pub struct PriorityQueue {
    inner: Mutex<Inner>,
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { heap: BinaryHeap::new(), next_sequence: 0 }) }
    }

    /// Push a job at the given priority, assigning the next monotonic
    /// sequence number. Used both for fresh enqueues and for retry-requeue
    /// (where the caller passes the already-decayed priority).
    pub fn push(&self, job_id: JobId, priority: Priority) -> u64 {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.heap.push(Entry { priority, sequence, job_id });
        sequence
    }

    /// Push preserving a specific sequence number (used when a placement
    /// attempt fails and the job must go back to the queue with its
    /// original position, per spec §4.5 step 2).
    pub fn push_with_sequence(&self, job_id: JobId, priority: Priority, sequence: u64) {
        self.inner.lock().heap.push(Entry { priority, sequence, job_id });
    }

    pub fn pop(&self) -> Option<(JobId, Priority, u64)> {
        self.inner.lock().heap.pop().map(|e| (e.job_id, e.priority, e.sequence))
    }

    pub fn size(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn snapshot(&self) -> Vec<JobId> {
        let inner = self.inner.lock();
        let mut entries: Vec<&Entry> = inner.heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|e| e.job_id).collect()
    }
}

#[cfg(test)]
#[path = "priority_queue_tests.rs"]
mod tests;
