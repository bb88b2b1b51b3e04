use crate::agent::{run_task, Agent};
use crate::agents::default_agent;
use crate::config::{OrchestratorConfig, UnregisteredAgentPolicy};
use crate::history::ExecutionHistory;
use crate::monitor::AgentMonitor;
use crate::task_queue::TaskQueue;
use crate::types::{AgentKind, TaskDescriptor, TaskHandle, TaskStatus};
use nexus_core::{AiProvider, NexusError, NexusResult};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Observational snapshot returned by [`Orchestrator::get_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub workers: usize,
    pub queue_size: usize,
    /// Registered kinds, in declaration order.
    pub agents: Vec<AgentKind>,
    /// Tasks currently executing.
    pub in_flight: usize,
    pub history_size: usize,
}

/// State shared between the orchestrator facade and its workers.
struct Shared {
    config: OrchestratorConfig,
    provider: Option<Arc<dyn AiProvider>>,
    registry: RwLock<HashMap<AgentKind, Arc<dyn Agent>>>,
    queue: TaskQueue,
    history: ExecutionHistory,
    monitor: AgentMonitor,
    /// Submitted or directly executed tasks not yet finished.
    outstanding: AtomicUsize,
    /// Tasks between dequeue and their terminal transition.
    active: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn resolve_agent(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        if let Some(agent) = self.registry.read().get(&kind) {
            return Some(Arc::clone(agent));
        }
        match self.config.unregistered_agent {
            UnregisteredAgentPolicy::FailFast => None,
            UnregisteredAgentPolicy::RegisterDefault => {
                let mut registry = self.registry.write();
                let agent = registry.entry(kind).or_insert_with(|| {
                    info!(kind = %kind, "Registering default agent on first use");
                    default_agent(
                        kind,
                        self.config.agent_history_capacity,
                        self.provider.clone(),
                    )
                });
                Some(Arc::clone(agent))
            }
        }
    }

    /// Drive one task to a terminal state and do the bookkeeping.
    async fn process(&self, handle: TaskHandle) {
        let kind = handle.kind();
        let claimed = match handle.begin() {
            Ok(task) => task,
            Err(_) => {
                let snapshot = handle.snapshot();
                if snapshot.status() == TaskStatus::Cancelled && handle.mark_recorded() {
                    info!(task_id = %snapshot.id(), "Skipping cancelled task");
                    self.history.record(snapshot.clone());
                    self.monitor.finish_task(&snapshot, false).await;
                } else if snapshot.is_terminal() {
                    debug!(
                        task_id = %snapshot.id(),
                        status = %snapshot.status(),
                        "Task already finished, nothing to record"
                    );
                } else {
                    warn!(task_id = %snapshot.id(), status = %snapshot.status(), "Task could not be claimed");
                }
                return;
            }
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        self.monitor.start_task(kind, claimed.id()).await;

        let finished = match self.resolve_agent(kind) {
            Some(agent) => run_task(agent.as_ref(), claimed, self.config.task_timeout()).await,
            None => {
                let mut task = claimed;
                let err = NexusError::AgentNotFound(kind.to_string());
                warn!(task_id = %task.id(), kind = %kind, "No agent registered for task");
                if let Err(e) = task.fail(err.to_string()) {
                    error!(task_id = %task.id(), error = %e, "Could not record task outcome");
                }
                task
            }
        };

        if let Err(e) = handle.settle(finished.clone()) {
            error!(task_id = %finished.id(), error = %e, "Could not publish task outcome");
        }
        if handle.mark_recorded() {
            self.history.record(finished.clone());
        }
        self.monitor.finish_task(&finished, true).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

async fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    debug!(worker_id, "Worker started");
    while let Some(handle) = shared.queue.pop().await {
        shared.process(handle).await;
        shared.finish_one();
    }
    debug!(worker_id, "Worker stopped");
}

/// Owns the task queue, the worker pool and the agent registry.
///
/// Tasks are either submitted to the queue and picked up by workers started
/// with [`start`](Self::start), or run inline with
/// [`execute_task`](Self::execute_task). Both paths end with the same
/// bookkeeping: the handle is updated, the task is appended to the history
/// and the per-kind metrics are recorded.
pub struct Orchestrator {
    shared: Arc<Shared>,
    running: AtomicBool,
    worker_count: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create an orchestrator with an empty registry.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_provider(config, None)
    }

    /// Create an orchestrator whose organizer agent can consult `provider`.
    pub fn with_provider(
        config: OrchestratorConfig,
        provider: Option<Arc<dyn AiProvider>>,
    ) -> Self {
        let queue = match config.queue_capacity {
            Some(capacity) => TaskQueue::bounded(capacity),
            None => TaskQueue::new(),
        };
        let history = ExecutionHistory::new(config.history_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                provider,
                registry: RwLock::new(HashMap::new()),
                queue,
                history,
                monitor: AgentMonitor::new(),
                outstanding: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            running: AtomicBool::new(false),
            worker_count: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Register an agent for its kind, replacing any previous one.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        let kind = agent.kind();
        let name = agent.config().name.clone();
        let replaced = self.shared.registry.write().insert(kind, agent).is_some();
        info!(kind = %kind, agent = %name, replaced, "Registered agent");
    }

    /// Register the canonical agent for every kind.
    pub fn register_all_agents(&self) {
        for kind in AgentKind::ALL {
            self.register_agent(default_agent(
                kind,
                self.shared.config.agent_history_capacity,
                self.shared.provider.clone(),
            ));
        }
    }

    pub fn get_agent(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        self.shared.registry.read().get(&kind).cloned()
    }

    /// Enqueue an idle task and return a handle to follow it.
    pub fn submit_task(&self, task: TaskDescriptor) -> NexusResult<TaskHandle> {
        let handle = TaskHandle::new(task);
        self.submit_handle(handle.clone())?;
        Ok(handle)
    }

    /// Enqueue a task the caller already holds a handle to.
    pub fn submit_handle(&self, handle: TaskHandle) -> NexusResult<()> {
        let status = handle.status();
        if status != TaskStatus::Idle {
            return Err(NexusError::Validation(format!(
                "task {} is {status}; only idle tasks can be submitted",
                handle.id()
            )));
        }

        if !handle.mark_submitted() {
            return Err(NexusError::Validation(format!(
                "task {} was already submitted",
                handle.id()
            )));
        }

        let task_id = handle.id().to_string();
        let kind = handle.kind();
        let priority = handle.priority();
        self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.shared.queue.push(handle.clone()) {
            handle.clear_submitted();
            self.shared.finish_one();
            warn!(task_id = %task_id, error = %e, "Task rejected");
            return Err(e);
        }
        debug!(task_id = %task_id, kind = %kind, priority = ?priority, "Task queued");
        Ok(())
    }

    /// Run a task inline, bypassing the queue, and return it finished.
    ///
    /// Dispatch runs on its own Tokio task, so dropping the returned future
    /// does not strand the task: it still finishes and is recorded. A task
    /// that is not idle is returned unchanged without any bookkeeping.
    pub async fn execute_task(&self, task: TaskDescriptor) -> TaskDescriptor {
        if task.status() != TaskStatus::Idle {
            warn!(task_id = %task.id(), status = %task.status(), "Only idle tasks can be executed");
            return task;
        }

        let handle = TaskHandle::new(task);
        let shared = Arc::clone(&self.shared);
        let dispatched = handle.clone();
        shared.outstanding.fetch_add(1, Ordering::SeqCst);
        let run = tokio::spawn(async move {
            shared.process(dispatched).await;
            shared.finish_one();
        });
        if let Err(e) = run.await {
            error!(task_id = %handle.id(), error = %e, "Inline dispatch aborted");
        }
        handle.snapshot()
    }

    /// Spawn `num_workers` workers on the current Tokio runtime.
    ///
    /// Calling this while running only logs a warning.
    pub fn start(&self, num_workers: usize) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "Orchestrator must be started inside a Tokio runtime");
                self.running.store(false, Ordering::SeqCst);
                return;
            }
        };
        let num_workers = if num_workers == 0 {
            warn!("Requested zero workers, starting one");
            1
        } else {
            num_workers
        };

        self.shared.queue.reopen();
        let mut workers = self.workers.lock();
        for worker_id in 0..num_workers {
            workers.push(runtime.spawn(worker_loop(Arc::clone(&self.shared), worker_id)));
        }
        self.worker_count.store(num_workers, Ordering::SeqCst);
        info!(
            workers = num_workers,
            queued = self.shared.queue.len(),
            "Orchestrator started"
        );
    }

    /// Stop accepting work into workers and wait for them to exit.
    ///
    /// Running tasks finish normally. Tasks still queued stay queued and are
    /// picked up by the next [`start`](Self::start).
    pub async fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            warn!("Orchestrator is not running");
            return;
        }
        self.shared.queue.close();

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker exited abnormally");
            }
        }

        self.worker_count.store(0, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        info!(queued = self.shared.queue.len(), "Orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolve once every submitted task has finished.
    ///
    /// Queued tasks only finish while workers run, so with tasks queued and
    /// the orchestrator stopped this waits until the next `start`.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn get_status(&self) -> OrchestratorStatus {
        let registered = self.shared.registry.read();
        let agents = AgentKind::ALL
            .into_iter()
            .filter(|kind| registered.contains_key(kind))
            .collect();
        OrchestratorStatus {
            running: self.is_running(),
            workers: self.worker_count.load(Ordering::SeqCst),
            queue_size: self.shared.queue.len(),
            agents,
            in_flight: self.shared.active.load(Ordering::SeqCst),
            history_size: self.shared.history.len(),
        }
    }

    /// Orchestrator-wide log of finished tasks.
    pub fn history(&self) -> &ExecutionHistory {
        &self.shared.history
    }

    /// Per-kind activity and outcome counters.
    pub fn monitor(&self) -> &AgentMonitor {
        &self.shared.monitor
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shared.queue.close();
        for worker in self.workers.get_mut().drain(..) {
            worker.abort();
        }
    }
}
