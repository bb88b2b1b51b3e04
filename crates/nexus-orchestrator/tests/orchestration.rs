//! End-to-end orchestration tests.
//!
//! Drives the orchestrator through its public surface: submission, the
//! worker pool lifecycle, cancellation, fault containment, and the built-in
//! filesystem agents against temporary directories.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use nexus_core::{NexusError, NexusResult};
use nexus_orchestrator::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Test agents
// ---------------------------------------------------------------------------

/// Counts executions and panics on tasks described as "explode".
struct FlakyAgent {
    config: AgentConfig,
    history: ExecutionHistory,
    runs: AtomicUsize,
    order: Mutex<Vec<String>>,
}

impl FlakyAgent {
    fn new(kind: AgentKind) -> Arc<Self> {
        Arc::new(Self {
            config: AgentConfig::default_for(kind),
            history: ExecutionHistory::new(100),
            runs: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Agent for FlakyAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    async fn execute(&self, task: &TaskDescriptor) -> NexusResult<TaskOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.order.lock().push(task.description().to_string());
        if task.description() == "explode" {
            panic!("agent blew up");
        }
        if task.description() == "refuse" {
            return Err(NexusError::Agent("refused".into()));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut out = TaskOutput::new();
        out.insert("ok".into(), json!(true));
        Ok(out)
    }
}

fn described(kind: AgentKind, description: &str) -> TaskDescriptor {
    TaskDescriptor::new(kind).with_description(description)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_status_across_lifecycle() {
    let orchestrator = Orchestrator::default();
    orchestrator.register_all_agents();

    let status = orchestrator.get_status();
    assert!(!status.running);
    assert_eq!(status.workers, 0);
    assert_eq!(status.agents.len(), 6);

    orchestrator.start(3);
    let status = orchestrator.get_status();
    assert!(status.running);
    assert_eq!(status.workers, 3);

    orchestrator.stop().await;
    let status = orchestrator.get_status();
    assert!(!status.running);
    assert_eq!(status.workers, 0);
}

#[tokio::test]
async fn test_submit_then_drain() {
    let orchestrator = Orchestrator::default();
    orchestrator.register_all_agents();
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("readme.txt"), b"hello").unwrap();

    let before = orchestrator.get_status().queue_size;
    let monitor = orchestrator
        .submit_task(TaskDescriptor::new(AgentKind::Monitor).with_param("action", "status"))
        .unwrap();
    let repair = orchestrator
        .submit_task(
            TaskDescriptor::new(AgentKind::Repair)
                .with_param("path", tmp.path().to_string_lossy().into_owned()),
        )
        .unwrap();
    assert_eq!(orchestrator.get_status().queue_size, before + 2);

    orchestrator.start(2);
    orchestrator.wait_until_idle().await;
    orchestrator.stop().await;

    assert_eq!(orchestrator.get_status().queue_size, 0);
    assert_eq!(monitor.status(), TaskStatus::Completed);
    assert_eq!(repair.status(), TaskStatus::Completed);

    let repaired = repair.snapshot();
    assert!(repaired.result().unwrap()["issues_found"].as_u64().is_some());
    assert!(repaired.duration_ms().is_some());
    assert_eq!(orchestrator.history().len(), 2);
}

#[tokio::test]
async fn test_stop_leaves_queued_tasks_for_next_start() {
    let orchestrator = Orchestrator::default();
    let agent = FlakyAgent::new(AgentKind::Search);
    orchestrator.register_agent(agent.clone());

    orchestrator.start(1);
    orchestrator.stop().await;

    let handle = orchestrator
        .submit_task(described(AgentKind::Search, "later"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.status(), TaskStatus::Idle);
    assert_eq!(orchestrator.get_status().queue_size, 1);

    orchestrator.start(1);
    orchestrator.wait_until_idle().await;
    orchestrator.stop().await;
    assert_eq!(handle.status(), TaskStatus::Completed);
    assert_eq!(agent.runs.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Ordering and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_high_priority_drains_first() {
    let orchestrator = Orchestrator::default();
    let agent = FlakyAgent::new(AgentKind::Cleanup);
    orchestrator.register_agent(agent.clone());

    orchestrator
        .submit_task(described(AgentKind::Cleanup, "low").with_priority(TaskPriority::Low))
        .unwrap();
    orchestrator
        .submit_task(described(AgentKind::Cleanup, "first-normal"))
        .unwrap();
    orchestrator
        .submit_task(described(AgentKind::Cleanup, "high").with_priority(TaskPriority::High))
        .unwrap();
    orchestrator
        .submit_task(described(AgentKind::Cleanup, "second-normal"))
        .unwrap();

    orchestrator.start(1);
    orchestrator.wait_until_idle().await;
    orchestrator.stop().await;

    assert_eq!(
        *agent.order.lock(),
        vec!["high", "first-normal", "second-normal", "low"]
    );
}

#[tokio::test]
async fn test_cancelled_task_never_reaches_agent() {
    let orchestrator = Orchestrator::default();
    let agent = FlakyAgent::new(AgentKind::Organizer);
    orchestrator.register_agent(agent.clone());

    let keep = orchestrator
        .submit_task(described(AgentKind::Organizer, "keep"))
        .unwrap();
    let dropped = orchestrator
        .submit_task(described(AgentKind::Organizer, "drop"))
        .unwrap();
    dropped.cancel(None).unwrap();

    orchestrator.start(2);
    orchestrator.wait_until_idle().await;
    orchestrator.stop().await;

    let cancelled = dropped.snapshot();
    assert_eq!(cancelled.status(), TaskStatus::Cancelled);
    assert!(cancelled.result().is_none());
    assert!(cancelled.error().is_none());
    assert_eq!(keep.status(), TaskStatus::Completed);
    assert_eq!(*agent.order.lock(), vec!["keep"]);

    let metrics = orchestrator
        .monitor()
        .get_state(AgentKind::Organizer)
        .await
        .unwrap()
        .metrics;
    assert_eq!(metrics.cancelled, 1);
    assert_eq!(metrics.completed, 1);
}

#[tokio::test]
async fn test_cancel_with_reason_and_terminal_rejection() {
    let orchestrator = Orchestrator::default();
    let handle = orchestrator
        .submit_task(TaskDescriptor::new(AgentKind::Search))
        .unwrap();
    handle.cancel(Some("Cancelled by user")).unwrap();
    assert_eq!(handle.snapshot().error(), Some("Cancelled by user"));

    assert!(matches!(
        handle.cancel(None),
        Err(NexusError::InvalidTransition { .. })
    ));
    assert_eq!(handle.status(), TaskStatus::Cancelled);
}

// ---------------------------------------------------------------------------
// Fault containment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_panicking_agent_does_not_kill_worker() {
    let orchestrator = Orchestrator::default();
    let agent = FlakyAgent::new(AgentKind::Search);
    orchestrator.register_agent(agent.clone());

    let boom = orchestrator
        .submit_task(described(AgentKind::Search, "explode").with_priority(TaskPriority::High))
        .unwrap();
    let after = orchestrator
        .submit_task(described(AgentKind::Search, "fine"))
        .unwrap();
    let refused = orchestrator
        .submit_task(described(AgentKind::Search, "refuse").with_priority(TaskPriority::Low))
        .unwrap();

    orchestrator.start(1);
    orchestrator.wait_until_idle().await;
    orchestrator.stop().await;

    assert_eq!(boom.status(), TaskStatus::Failed);
    assert_eq!(boom.snapshot().error(), Some("Unexpected agent fault"));
    assert_eq!(after.status(), TaskStatus::Completed);
    assert_eq!(refused.snapshot().error(), Some("Agent error: refused"));
    assert_eq!(agent.runs.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_tasks_reach_terminal_state() {
    let orchestrator = Orchestrator::default();
    let agent = FlakyAgent::new(AgentKind::Monitor);
    orchestrator.register_agent(agent.clone());

    let handles: Vec<TaskHandle> = (0..200)
        .map(|i| {
            let description = if i % 10 == 0 { "refuse" } else { "work" };
            orchestrator
                .submit_task(described(AgentKind::Monitor, description))
                .unwrap()
        })
        .collect();
    for handle in handles.iter().skip(1).step_by(25) {
        handle.cancel(None).unwrap();
    }

    orchestrator.start(8);
    orchestrator.wait_until_idle().await;
    orchestrator.stop().await;

    assert!(handles.iter().all(|h| h.snapshot().is_terminal()));
    let cancelled = handles
        .iter()
        .filter(|h| h.status() == TaskStatus::Cancelled)
        .count();
    assert_eq!(cancelled, 8);
    assert_eq!(agent.runs.load(Ordering::SeqCst), 192);
    assert_eq!(orchestrator.history().len(), 200);
    assert_eq!(orchestrator.monitor().aggregate_metrics().await.finished(), 200);
    assert_eq!(orchestrator.get_status().in_flight, 0);
}

// ---------------------------------------------------------------------------
// Registry policy and global access
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unregistered_kind_policies() {
    let strict = Orchestrator::default();
    let handle = strict.submit_task(TaskDescriptor::new(AgentKind::Backup)).unwrap();
    strict.start(1);
    strict.wait_until_idle().await;
    strict.stop().await;
    assert_eq!(handle.snapshot().error(), Some("Agent not found: backup"));

    let lenient = Orchestrator::new(
        OrchestratorConfig::default().with_policy(UnregisteredAgentPolicy::RegisterDefault),
    );
    let done = lenient
        .execute_task(TaskDescriptor::new(AgentKind::Monitor))
        .await;
    assert_eq!(done.status(), TaskStatus::Completed);
    assert_eq!(lenient.get_status().agents, vec![AgentKind::Monitor]);
}

#[tokio::test]
async fn test_global_orchestrator() {
    let a = global();
    let b = global();
    assert!(std::ptr::eq(a, b));
    assert!(a.get_agent(AgentKind::Repair).is_some());

    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("quarterly report.pdf"), b"%PDF").unwrap();
    let mut params = Parameters::new();
    params.insert("path".into(), json!(tmp.path().to_string_lossy()));
    params.insert("query".into(), json!("report"));

    let result = quick_task(AgentKind::Search, params, "find reports")
        .await
        .unwrap();
    assert_eq!(result["total_matches"], 1);
}

#[tokio::test]
async fn test_task_ids_are_short_and_unique() {
    let ids: std::collections::HashSet<String> = (0..10_000)
        .map(|_| TaskDescriptor::new(AgentKind::Search).id().to_string())
        .collect();
    assert!(ids.len() >= 9_990);
    assert!(ids.iter().all(|id| id.len() == 8));
}
