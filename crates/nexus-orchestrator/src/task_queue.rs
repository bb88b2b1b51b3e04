use crate::types::TaskHandle;
use nexus_core::{NexusError, NexusResult};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::Notify;

/// Heap slot: ordered by priority rank, then by submission sequence.
struct QueueEntry {
    rank: u8,
    sequence: u64,
    handle: TaskHandle,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.sequence == other.sequence
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher rank first, then lower sequence (earlier submission)
        match self.rank.cmp(&other.rank) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    next_sequence: u64,
    closed: bool,
}

/// Concurrency-safe priority queue of pending tasks.
///
/// Dequeues strictly by priority and, within one priority, in submission
/// order. Consumers suspend in [`pop`](Self::pop) while the queue is empty.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Notify,
    capacity: Option<usize>,
}

impl TaskQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_sequence: 0,
                closed: false,
            }),
            available: Notify::new(),
            capacity: None,
        }
    }

    /// Create a queue that rejects pushes once `capacity` tasks are pending.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Enqueue a task. Fails with [`NexusError::QueueFull`] when bounded and full.
    pub fn push(&self, handle: TaskHandle) -> NexusResult<()> {
        let rank = handle.priority().rank();
        {
            let mut state = self.state.lock();
            if let Some(capacity) = self.capacity {
                if state.heap.len() >= capacity {
                    return Err(NexusError::QueueFull(capacity));
                }
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.heap.push(QueueEntry {
                rank,
                sequence,
                handle,
            });
        }
        self.available.notify_one();
        Ok(())
    }

    /// Wait for the next task. Returns `None` once the queue is closed.
    ///
    /// Cancel-safe: an item is only removed in the same step that returns it.
    pub async fn pop(&self) -> Option<TaskHandle> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(entry) = state.heap.pop() {
                    return Some(entry.handle);
                }
            }

            notified.await;
        }
    }

    /// Take the next task without waiting.
    pub fn try_pop(&self) -> Option<TaskHandle> {
        self.state.lock().heap.pop().map(|entry| entry.handle)
    }

    /// Number of pending tasks. A snapshot only.
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    /// Wake every waiting consumer with `None`. Pending tasks stay queued.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Accept consumers again after [`close`](Self::close).
    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
