//! Bounded work queues for kernel worker threads. Enqueue must be safe
//! to call from IRQ context: lock-free from the producer's point of
//! view is not required (a short spinlock hold is acceptable, as the
//! reference kernel's own IRQ-context users of `spin::Mutex` assume),
//! but it must never block indefinitely or allocate.

use alloc::collections::VecDeque;
use spin::Mutex;

use crate::config::WORKER_QUEUE_CAPACITY;

pub type WorkFn = fn(u64);

#[derive(Clone, Copy)]
pub struct WorkItem {
    pub func: WorkFn,
    pub arg: u64,
}

pub struct WorkerQueue {
    items: Mutex<VecDeque<WorkItem>>,
    capacity: usize,
}

impl WorkerQueue {
    pub fn new(capacity: usize) -> Self {
        WorkerQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Enqueues a work item. Returns `false` (and drops the item) if
    /// the queue is at capacity; callers in IRQ context (e.g. the
    /// keyboard driver) must check this and log the drop rather than
    /// retry.
    pub fn try_enqueue(&self, item: WorkItem) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(item);
        true
    }

    pub fn dequeue(&self) -> Option<WorkItem> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkerQueue {
    fn default() -> Self {
        Self::new(WORKER_QUEUE_CAPACITY)
    }
}
