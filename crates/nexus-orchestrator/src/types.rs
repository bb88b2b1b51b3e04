use chrono::{DateTime, Utc};
use nexus_core::{NexusError, NexusResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Agent-interpreted task parameters.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Result map produced by a successful agent run.
pub type TaskOutput = serde_json::Map<String, serde_json::Value>;

/// Length of a task identifier, in characters.
pub const TASK_ID_LEN: usize = 8;

/// Maximum length of a task error message, in characters.
pub const MAX_ERROR_LEN: usize = 500;

/// Category of behavior an agent implements. One agent instance is
/// registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Groups files into category folders.
    Organizer,
    /// Finds and removes temporary and empty entries.
    Cleanup,
    /// Finds files by name.
    Search,
    /// Manages filesystem watchers.
    Monitor,
    /// Scans a tree for integrity issues.
    Repair,
    /// Copies a tree to a verified backup location.
    Backup,
}

impl AgentKind {
    /// Every kind, in registration order.
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Organizer,
        AgentKind::Cleanup,
        AgentKind::Search,
        AgentKind::Monitor,
        AgentKind::Repair,
        AgentKind::Backup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Organizer => "organizer",
            AgentKind::Cleanup => "cleanup",
            AgentKind::Search => "search",
            AgentKind::Monitor => "monitor",
            AgentKind::Repair => "repair",
            AgentKind::Backup => "backup",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| NexusError::Validation(format!("unknown agent kind '{s}'")))
    }
}

/// Scheduling priority of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// Queue ordering key. Higher ranks are dequeued first.
    ///
    /// This is the only place the priority-to-order mapping lives; the queue
    /// calls it once per insertion.
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Low => 0,
            TaskPriority::Normal => 1,
            TaskPriority::High => 2,
            TaskPriority::Critical => 3,
        }
    }
}

impl FromStr for TaskPriority {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "normal" => Ok(TaskPriority::Normal),
            "high" => Ok(TaskPriority::High),
            "critical" => Ok(TaskPriority::Critical),
            other => Err(NexusError::Validation(format!("unknown priority '{other}'"))),
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, failed and cancelled tasks never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Idle, TaskStatus::Running)
                | (TaskStatus::Idle, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Idle => write!(f, "idle"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Immutable identity of an agent instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub kind: AgentKind,
    pub name: String,
    pub description: String,
}

impl AgentConfig {
    pub fn new(kind: AgentKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
        }
    }

    /// Canonical identity used when registering the built-in variants.
    pub fn default_for(kind: AgentKind) -> Self {
        let description = match kind {
            AgentKind::Organizer => "Groups files into category folders",
            AgentKind::Cleanup => "Finds temporary files and empty entries",
            AgentKind::Search => "Finds files by name",
            AgentKind::Monitor => "Watches directories for changes",
            AgentKind::Repair => "Scans a tree for integrity issues",
            AgentKind::Backup => "Copies a tree to a verified backup",
        };
        Self::new(kind, format!("{kind}_agent"), description)
    }
}

/// A unit of work dispatched to exactly one agent.
///
/// State fields are private: they move only through the checked transition
/// methods, so a terminal task can never be reopened.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDescriptor {
    id: String,
    kind: AgentKind,
    description: String,
    parameters: Parameters,
    priority: TaskPriority,
    status: TaskStatus,
    result: Option<TaskOutput>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskDescriptor {
    pub fn new(kind: AgentKind) -> Self {
        Self {
            id: new_task_id(),
            kind,
            description: String::new(),
            parameters: Parameters::new(),
            priority: TaskPriority::default(),
            status: TaskStatus::Idle,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }

    /// String parameter, `None` when absent or not a string.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(serde_json::Value::as_str)
    }

    /// Boolean parameter with a fallback for absent or non-boolean values.
    pub fn param_bool(&self, key: &str, default: bool) -> bool {
        self.parameters
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(default)
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&TaskOutput> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Wall-clock run time, once the task has both started and finished.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        u64::try_from((completed - started).num_milliseconds()).ok()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `Idle -> Running`.
    pub fn mark_running(&mut self) -> NexusResult<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `Running -> Completed`.
    pub fn complete(&mut self, result: TaskOutput) -> NexusResult<()> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `Running -> Failed`. The message is truncated to [`MAX_ERROR_LEN`].
    pub fn fail(&mut self, message: impl AsRef<str>) -> NexusResult<()> {
        self.transition(TaskStatus::Failed)?;
        self.result = None;
        self.error = Some(truncate_message(message.as_ref()));
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `Idle -> Cancelled`. Without a reason, neither result nor error is set.
    pub fn cancel(&mut self, reason: Option<&str>) -> NexusResult<()> {
        self.transition(TaskStatus::Cancelled)?;
        self.error = reason.map(truncate_message);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> NexusResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(NexusError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

fn new_task_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(TASK_ID_LEN);
    id
}

/// Cut a diagnostic down to [`MAX_ERROR_LEN`] characters, marking the cut.
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_LEN {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(MAX_ERROR_LEN - 1).collect();
    cut.push('…');
    cut
}

/// Shared handle to a submitted task.
///
/// The caller keeps one clone and the queue holds another. Callers read
/// snapshots and may cancel while the task is still idle; the dispatching
/// worker is the only writer of running and terminal transitions.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: String,
    inner: Arc<Mutex<TaskDescriptor>>,
    /// Set while the handle sits in (or has passed through) a queue.
    submitted: Arc<AtomicBool>,
    /// Set once the terminal task has been written to the history.
    recorded: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new(task: TaskDescriptor) -> Self {
        Self {
            id: task.id.clone(),
            inner: Arc::new(Mutex::new(task)),
            submitted: Arc::new(AtomicBool::new(false)),
            recorded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the descriptor as it is right now.
    pub fn snapshot(&self) -> TaskDescriptor {
        self.inner.lock().clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.lock().status
    }

    pub fn priority(&self) -> TaskPriority {
        self.inner.lock().priority
    }

    pub fn kind(&self) -> AgentKind {
        self.inner.lock().kind
    }

    /// Cancel the task if no worker has picked it up yet.
    pub fn cancel(&self, reason: Option<&str>) -> NexusResult<()> {
        self.inner.lock().cancel(reason)
    }

    /// Claim the task for dispatch: `Idle -> Running`, returning the claimed
    /// snapshot. Fails if the task was cancelled in the meantime.
    pub(crate) fn begin(&self) -> NexusResult<TaskDescriptor> {
        let mut guard = self.inner.lock();
        guard.mark_running()?;
        Ok(guard.clone())
    }

    /// Publish the finished copy of a running task back to the handle.
    pub(crate) fn settle(&self, finished: TaskDescriptor) -> NexusResult<()> {
        let mut guard = self.inner.lock();
        if guard.status != TaskStatus::Running || !finished.is_terminal() {
            return Err(NexusError::InvalidTransition {
                from: guard.status.to_string(),
                to: finished.status.to_string(),
            });
        }
        *guard = finished;
        Ok(())
    }

    /// Claim the single submission slot. `false` if already submitted.
    pub(crate) fn mark_submitted(&self) -> bool {
        !self.submitted.swap(true, Ordering::SeqCst)
    }

    /// Give the submission slot back after a rejected push.
    pub(crate) fn clear_submitted(&self) {
        self.submitted.store(false, Ordering::SeqCst);
    }

    /// Claim the single history entry. `false` if already recorded.
    pub(crate) fn mark_recorded(&self) -> bool {
        !self.recorded.swap(true, Ordering::SeqCst)
    }
}

impl From<TaskDescriptor> for TaskHandle {
    fn from(task: TaskDescriptor) -> Self {
        Self::new(task)
    }
}
