use crate::types::{AgentKind, TaskDescriptor, TaskStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentMetrics {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Sum of execution time over finished tasks.
    pub duration_ms: u64,
}

impl AgentMetrics {
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.cancelled
    }

    fn add(&mut self, other: &AgentMetrics) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.duration_ms += other.duration_ms;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub kind: AgentKind,
    pub status: WorkerStatus,
    /// Tasks of this kind currently executing across all workers.
    pub active_tasks: u32,
    pub last_task: Option<String>,
    pub last_error: Option<String>,
    pub metrics: AgentMetrics,
}

impl AgentState {
    fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            status: WorkerStatus::Idle,
            active_tasks: 0,
            last_task: None,
            last_error: None,
            metrics: AgentMetrics::default(),
        }
    }
}

/// Tracks per-kind activity and outcome counters for the orchestrator.
pub struct AgentMonitor {
    states: Arc<RwLock<BTreeMap<AgentKind, AgentState>>>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        let states = AgentKind::ALL
            .iter()
            .map(|kind| (*kind, AgentState::new(*kind)))
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// Mark a task of `kind` as executing.
    pub async fn start_task(&self, kind: AgentKind, task_id: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&kind) {
            state.active_tasks += 1;
            state.status = WorkerStatus::Working;
            state.last_task = Some(task_id.to_string());
        }
    }

    /// Record the outcome of a terminal task. `was_running` is false for
    /// tasks that never reached an agent (cancelled while queued).
    pub async fn finish_task(&self, task: &TaskDescriptor, was_running: bool) {
        let mut states = self.states.write().await;
        let Some(state) = states.get_mut(&task.kind()) else {
            return;
        };
        if was_running {
            state.active_tasks = state.active_tasks.saturating_sub(1);
            if state.active_tasks == 0 {
                state.status = WorkerStatus::Idle;
            }
        }
        match task.status() {
            TaskStatus::Completed => state.metrics.completed += 1,
            TaskStatus::Failed => {
                state.metrics.failed += 1;
                state.last_error = task.error().map(str::to_string);
            }
            TaskStatus::Cancelled => state.metrics.cancelled += 1,
            TaskStatus::Idle | TaskStatus::Running => return,
        }
        state.metrics.duration_ms += task.duration_ms().unwrap_or(0);
    }

    /// All states, ordered by kind.
    pub async fn snapshot(&self) -> Vec<AgentState> {
        let states = self.states.read().await;
        states.values().cloned().collect()
    }

    pub async fn get_state(&self, kind: AgentKind) -> Option<AgentState> {
        let states = self.states.read().await;
        states.get(&kind).cloned()
    }

    pub async fn aggregate_metrics(&self) -> AgentMetrics {
        let states = self.states.read().await;
        let mut total = AgentMetrics::default();
        for state in states.values() {
            total.add(&state.metrics);
        }
        total
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "agents": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
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
            task.fail("disk unplugged").unwrap();
        }
        task
    }

    #[tokio::test]
    async fn test_initial_state() {
        let monitor = AgentMonitor::new();
        let states = monitor.snapshot().await;
        assert_eq!(states.len(), AgentKind::ALL.len());
        for state in &states {
            assert_eq!(state.status, WorkerStatus::Idle);
            assert_eq!(state.active_tasks, 0);
        }
    }

    #[tokio::test]
    async fn test_start_and_finish_task() {
        let monitor = AgentMonitor::new();
        let task = finished(AgentKind::Search, true);

        monitor.start_task(AgentKind::Search, task.id()).await;
        let state = monitor.get_state(AgentKind::Search).await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.last_task.as_deref(), Some(task.id()));

        monitor.finish_task(&task, true).await;
        let state = monitor.get_state(AgentKind::Search).await.unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
        assert_eq!(state.metrics.completed, 1);
    }

    #[tokio::test]
    async fn test_overlapping_tasks_stay_working() {
        let monitor = AgentMonitor::new();
        monitor.start_task(AgentKind::Repair, "aaaaaaaa").await;
        monitor.start_task(AgentKind::Repair, "bbbbbbbb").await;
        monitor.finish_task(&finished(AgentKind::Repair, true), true).await;

        let state = monitor.get_state(AgentKind::Repair).await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.active_tasks, 1);
    }

    #[tokio::test]
    async fn test_failure_and_cancellation_counters() {
        let monitor = AgentMonitor::new();
        monitor.start_task(AgentKind::Backup, "cccccccc").await;
        monitor.finish_task(&finished(AgentKind::Backup, false), true).await;

        let mut cancelled = TaskDescriptor::new(AgentKind::Backup);
        cancelled.cancel(None).unwrap();
        monitor.finish_task(&cancelled, false).await;

        let state = monitor.get_state(AgentKind::Backup).await.unwrap();
        assert_eq!(state.metrics.failed, 1);
        assert_eq!(state.metrics.cancelled, 1);
        assert_eq!(state.last_error.as_deref(), Some("disk unplugged"));
        assert_eq!(state.status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_aggregate_and_json() {
        let monitor = AgentMonitor::new();
        monitor.finish_task(&finished(AgentKind::Cleanup, true), false).await;
        monitor.finish_task(&finished(AgentKind::Monitor, false), false).await;

        let agg = monitor.aggregate_metrics().await;
        assert_eq!(agg.completed, 1);
        assert_eq!(agg.failed, 1);
        assert_eq!(agg.finished(), 2);

        let json = monitor.to_json().await;
        assert!(json["agents"].is_array());
        assert_eq!(json["aggregate"]["completed"], 1);
    }
}
