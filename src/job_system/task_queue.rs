use std::any::Any;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{error, warn};

use crate::error::{EngineError, Result};

use super::worker_pool::WorkerPool;

pub type TaskId = usize;

/// Unit of work run once by the queue
pub trait Task: Send {
    fn name(&self) -> &str;
    fn process(&mut self) -> Result<()>;
}

pub struct FunctionTask<F> {
    name: String,
    f: F,
}

impl<F> FunctionTask<F>
where
    F: FnMut() -> Result<()> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Task for FunctionTask<F>
where
    F: FnMut() -> Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self) -> Result<()> {
        (self.f)()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Queued,
    Running,
    Completed,
}

#[derive(Clone, Debug)]
pub struct TimerData {
    pub task_name: String,
    /// 0 for the thread owning the queue, workers count from 1
    pub thread_id: usize,
    pub start: Option<Instant>,
    pub end: Option<Instant>,
}

#[derive(Debug)]
pub struct TaskFailure {
    pub task: TaskId,
    pub name: String,
    pub error: EngineError,
}

#[derive(Default)]
struct QueueState {
    /// None while the task is running
    tasks: Vec<Option<Box<dyn Task>>>,
    states: Vec<TaskState>,
    successors: Vec<Vec<TaskId>>,
    remaining: Vec<usize>,
    timers: Vec<TimerData>,
    pending_from_name: Vec<(String, TaskId)>,
    pending_to_name: Vec<(TaskId, String)>,
    failures: Vec<TaskFailure>,
    /// queued + running
    outstanding: usize,
}

impl QueueState {
    fn task_id(&self, name: &str) -> Option<TaskId> {
        self.timers.iter().position(|t| t.task_name == name)
    }

    fn add_dependency(&mut self, predecessor: TaskId, successor: TaskId) -> Result<()> {
        let n = self.tasks.len();
        if predecessor >= n || successor >= n {
            return Err(EngineError::TaskGraph(format!(
                "dependency {} -> {} references an unknown task",
                predecessor, successor
            )));
        }
        if predecessor == successor {
            return Err(EngineError::TaskGraph(format!("task {} cannot depend on itself", predecessor)));
        }
        if self.successors[predecessor].contains(&successor) {
            return Err(EngineError::TaskGraph(format!(
                "dependency {} -> {} added twice",
                predecessor, successor
            )));
        }
        self.successors[predecessor].push(successor);
        self.remaining[successor] += 1;
        Ok(())
    }

    fn resolve_dependencies(&mut self) {
        for (pred, name) in std::mem::take(&mut self.pending_to_name) {
            let resolved = self.task_id(&name).map(|succ| self.add_dependency(pred, succ));
            if !matches!(resolved, Some(Ok(()))) {
                warn!(
                    "pending dependency unresolved: {} -> ({})",
                    self.timers[pred].task_name, name
                );
            }
        }
        for (name, succ) in std::mem::take(&mut self.pending_from_name) {
            let resolved = self.task_id(&name).map(|pred| self.add_dependency(pred, succ));
            if !matches!(resolved, Some(Ok(()))) {
                warn!(
                    "pending dependency unresolved: ({}) -> {}",
                    name, self.timers[succ].task_name
                );
            }
        }
    }

    /// Kahn's algorithm over the task graph
    fn detect_cycles(&self) -> Result<()> {
        let mut remaining = self.remaining.clone();
        let mut ready: Vec<TaskId> = (0..remaining.len()).filter(|&t| remaining[t] == 0).collect();
        let mut visited = 0;
        while let Some(task) = ready.pop() {
            visited += 1;
            for &succ in &self.successors[task] {
                remaining[succ] -= 1;
                if remaining[succ] == 0 {
                    ready.push(succ);
                }
            }
        }
        if visited != remaining.len() {
            let stuck = (0..remaining.len()).find(|&t| remaining[t] > 0).unwrap_or(0);
            return Err(EngineError::TaskGraph(format!(
                "cycle detected through task '{}'",
                self.timers[stuck].task_name
            )));
        }
        Ok(())
    }

    /// Marks the created tasks without unmet dependencies as queued
    fn queue_ready(&mut self) -> Vec<TaskId> {
        let ready: Vec<TaskId> = (0..self.tasks.len())
            .filter(|&t| self.states[t] == TaskState::Created && self.remaining[t] == 0)
            .collect();
        for &t in &ready {
            self.states[t] = TaskState::Queued;
        }
        self.outstanding += ready.len();
        ready
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    idle: Condvar,
}

impl Shared {
    // tasks never run while the lock is held, a poisoned lock still has consistent state
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one queued task and returns the successors it made ready
    pub(crate) fn execute(&self, id: TaskId, thread_id: usize) -> Vec<TaskId> {
        let mut task = {
            let mut state = self.lock();
            state.states[id] = TaskState::Running;
            state.timers[id].start = Some(Instant::now());
            state.timers[id].thread_id = thread_id;
            state.tasks[id].take()
        };

        let result = match task.as_mut() {
            Some(task) => match catch_unwind(AssertUnwindSafe(|| task.process())) {
                Ok(result) => result,
                Err(payload) => Err(EngineError::TaskPanicked {
                    name: task.name().to_string(),
                    message: panic_message(payload),
                }),
            },
            None => Ok(()),
        };

        let mut state = self.lock();
        state.timers[id].end = Some(Instant::now());
        state.tasks[id] = task;
        state.states[id] = TaskState::Completed;
        if let Err(err) = result {
            let name = state.timers[id].task_name.clone();
            error!("task '{}' failed: {}", name, err);
            state.failures.push(TaskFailure { task: id, name, error: err });
        }

        let mut ready = Vec::new();
        for i in 0..state.successors[id].len() {
            let succ = state.successors[id][i];
            state.remaining[succ] -= 1;
            if state.remaining[succ] == 0 && state.states[succ] == TaskState::Created {
                state.states[succ] = TaskState::Queued;
                ready.push(succ);
            }
        }
        state.outstanding = state.outstanding + ready.len() - 1;
        if state.outstanding == 0 {
            self.idle.notify_all();
        }
        ready
    }
}

/// Dependency-ordered task graph executed by a fixed set of worker threads.
/// Built, started, waited on and flushed once per frame.
pub struct TaskQueue {
    shared: Arc<Shared>,
    pool: WorkerPool,
}

impl TaskQueue {
    pub fn new(num_threads: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            idle: Condvar::new(),
        });
        let pool = WorkerPool::init(num_threads, shared.clone());
        Self { shared, pool }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.len()
    }

    pub fn register_task(&self, task: impl Task + 'static) -> TaskId {
        self.register_boxed(Box::new(task))
    }

    pub fn register_boxed(&self, task: Box<dyn Task>) -> TaskId {
        let mut state = self.shared.lock();
        state.timers.push(TimerData {
            task_name: task.name().to_string(),
            thread_id: 0,
            start: None,
            end: None,
        });
        state.tasks.push(Some(task));
        state.states.push(TaskState::Created);
        state.successors.push(Vec::new());
        state.remaining.push(0);
        state.tasks.len() - 1
    }

    /// Replaces a task that has not run yet by a no-op, keeping its name and dependencies
    pub fn remove_task(&self, id: TaskId) {
        let mut state = self.shared.lock();
        if id >= state.tasks.len() || state.states[id] != TaskState::Created {
            log::debug!("cannot remove task {}", id);
            return;
        }
        let name = state.timers[id].task_name.clone();
        state.tasks[id] = Some(Box::new(FunctionTask::new(name, || Ok(()))));
    }

    pub fn task_id(&self, name: &str) -> Option<TaskId> {
        self.shared.lock().task_id(name)
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.shared.lock().states.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_dependency(&self, predecessor: TaskId, successor: TaskId) -> Result<()> {
        self.shared.lock().add_dependency(predecessor, successor)
    }

    /// Returns false if no task is named `predecessor`
    pub fn add_dependency_from_name(&self, predecessor: &str, successor: TaskId) -> bool {
        let mut state = self.shared.lock();
        match state.task_id(predecessor) {
            Some(pred) => state.add_dependency(pred, successor).is_ok(),
            None => false,
        }
    }

    /// Returns false if no task is named `successor`
    pub fn add_dependency_to_name(&self, predecessor: TaskId, successor: &str) -> bool {
        let mut state = self.shared.lock();
        match state.task_id(successor) {
            Some(succ) => state.add_dependency(predecessor, succ).is_ok(),
            None => false,
        }
    }

    /// Resolved when the tasks start, so the named task may be registered later
    pub fn add_pending_dependency_from_name(&self, predecessor: impl Into<String>, successor: TaskId) {
        self.shared.lock().pending_from_name.push((predecessor.into(), successor));
    }

    pub fn add_pending_dependency_to_name(&self, predecessor: TaskId, successor: impl Into<String>) {
        self.shared.lock().pending_to_name.push((predecessor, successor.into()));
    }

    fn prepare(&self) -> Result<Vec<TaskId>> {
        let mut state = self.shared.lock();
        state.resolve_dependencies();
        state.detect_cycles()?;
        Ok(state.queue_ready())
    }

    /// Dispatches every task without pending dependencies to the workers.
    /// Without workers the tasks run on this thread before returning.
    pub fn start_tasks(&self) -> Result<()> {
        if self.pool.is_empty() {
            warn!("task queue has no worker threads, running tasks on the calling thread");
            return self.run_tasks_in_this_thread();
        }
        for task in self.prepare()? {
            self.pool.dispatch(task);
        }
        Ok(())
    }

    pub fn run_tasks_in_this_thread(&self) -> Result<()> {
        let mut ready: VecDeque<TaskId> = self.prepare()?.into();
        while let Some(task) = ready.pop_front() {
            ready.extend(self.shared.execute(task, 0));
        }
        Ok(())
    }

    /// Frame barrier: blocks until no task is queued or running
    pub fn wait_for_tasks(&self) {
        let mut state = self.shared.lock();
        while state.outstanding > 0 {
            state = self.shared.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Drops all tasks, dependencies, timers and failures. Waits for running tasks first.
    pub fn flush_task_queue(&self) {
        self.wait_for_tasks();
        let mut state = self.shared.lock();
        *state = QueueState::default();
    }

    pub fn timer_data(&self) -> Vec<TimerData> {
        self.shared.lock().timers.clone()
    }

    pub fn take_failures(&self) -> Vec<TaskFailure> {
        std::mem::take(&mut self.shared.lock().failures)
    }

    /// Graphviz description of the task graph; unknown pending names are suffixed with '?'
    pub fn task_graph_dot(&self) -> String {
        let state = self.shared.lock();
        let name = |id: TaskId| &state.timers[id].task_name;
        let known = |n: &str| if state.task_id(n).is_some() { n.to_string() } else { format!("{}?", n) };

        let mut out = String::from("digraph tasks {\n");
        for timer in &state.timers {
            let _ = writeln!(out, "\"{}\"", timer.task_name);
        }
        for (pred, succs) in state.successors.iter().enumerate() {
            for &succ in succs {
                let _ = writeln!(out, "\"{}\" -> \"{}\"", name(pred), name(succ));
            }
        }
        for (pred, succ) in &state.pending_to_name {
            let _ = writeln!(out, "\"{}\" -> \"{}\"", name(*pred), known(succ));
        }
        for (pred, succ) in &state.pending_from_name {
            let _ = writeln!(out, "\"{}\" -> \"{}\"", known(pred), name(*succ));
        }
        out.push_str("}\n");
        out
    }

    pub fn print_task_graph(&self, output: &mut impl io::Write) -> io::Result<()> {
        output.write_all(self.task_graph_dot().as_bytes())
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        // workers must be idle before they are told to stop
        self.wait_for_tasks();
    }
}
