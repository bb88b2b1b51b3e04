use crate::types::{AgentKind, TaskDescriptor, TaskStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Default number of finished tasks kept by the orchestrator.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Bounded, append-only log of finished tasks.
///
/// Once `capacity` entries are stored the oldest entry is evicted for each
/// new one. A capacity of zero disables retention.
pub struct ExecutionHistory {
    entries: Mutex<VecDeque<TaskDescriptor>>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a finished task, evicting the oldest entry when full.
    pub fn record(&self, task: TaskDescriptor) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// All retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<TaskDescriptor> {
        self.entries.lock().iter().cloned().collect()
    }

    /// The `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<TaskDescriptor> {
        self.entries.lock().iter().rev().take(n).cloned().collect()
    }

    /// Most recent entry for a task id.
    pub fn find(&self, id: &str) -> Option<TaskDescriptor> {
        self.entries.lock().iter().rev().find(|t| t.id() == id).cloned()
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|t| t.status() == status)
            .count()
    }

    pub fn by_kind(&self, kind: AgentKind) -> Vec<TaskDescriptor> {
        self.entries
            .lock()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::TaskOutput;

    fn finished(kind: AgentKind, ok: bool) -> TaskDescriptor {
        let mut task = TaskDescriptor::new(kind);
        task.mark_running().unwrap();
        if ok {
            task.complete(TaskOutput::new()).unwrap();
        } else {
            task.fail("boom").unwrap();
        }
        task
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let history = ExecutionHistory::new(3);
        let tasks: Vec<TaskDescriptor> = (0..5).map(|_| finished(AgentKind::Search, true)).collect();
        for task in &tasks {
            history.record(task.clone());
        }

        assert_eq!(history.len(), 3);
        let kept: Vec<String> = history.snapshot().iter().map(|t| t.id().to_string()).collect();
        let expected: Vec<String> = tasks[2..].iter().map(|t| t.id().to_string()).collect();
        assert_eq!(kept, expected);
        assert!(history.find(tasks[0].id()).is_none());
        assert!(history.find(tasks[4].id()).is_some());
    }

    #[test]
    fn test_recent_is_newest_first() {
        let history = ExecutionHistory::new(10);
        let a = finished(AgentKind::Repair, true);
        let b = finished(AgentKind::Repair, false);
        history.record(a.clone());
        history.record(b.clone());

        let recent = history.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id(), b.id());
    }

    #[test]
    fn test_counts_and_filters() {
        let history = ExecutionHistory::default();
        history.record(finished(AgentKind::Repair, true));
        history.record(finished(AgentKind::Monitor, false));
        history.record(finished(AgentKind::Monitor, true));

        assert_eq!(history.count_by_status(TaskStatus::Completed), 2);
        assert_eq!(history.count_by_status(TaskStatus::Failed), 1);
        assert_eq!(history.by_kind(AgentKind::Monitor).len(), 2);

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let history = ExecutionHistory::new(0);
        history.record(finished(AgentKind::Backup, true));
        assert!(history.is_empty());
    }
}
