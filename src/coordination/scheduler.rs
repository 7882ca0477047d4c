//! Task scheduler with dependency gating and priority ordering.
//!
//! The scheduler owns every submitted task and keeps each id in exactly one of
//! four sets:
//! - pending: ordered by priority rank (descending), then task id (ascending)
//! - in progress: handed out by [`Scheduler::next_available_task`]
//! - completed: insertion ordered, the authoritative completion sequence
//! - failed: tasks explicitly reported as failed
//!
//! A pending task is ready once every one of its dependencies is completed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::coordination::events::{Event, EventBus};
use crate::error::{Error, Result};
use crate::task::{Task, TaskId, TaskStatus};

/// Configuration for the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Reject tasks whose dependencies have not been submitted yet.
    pub strict_dependencies: bool,
}

/// A pending task id with its ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEntry {
    /// Priority rank (higher = runs first).
    rank: u8,
    /// Task ID.
    id: TaskId,
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher rank sorts first, equal ranks by id
        other.rank.cmp(&self.rank).then_with(|| self.id.cmp(&other.id))
    }
}

/// A pending task that can never become ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckTask {
    /// The blocked task.
    pub id: TaskId,
    /// Dependencies that are unknown, failed, or themselves stuck.
    pub unresolved: Vec<TaskId>,
}

/// Dependency-aware priority scheduler.
pub struct Scheduler {
    /// Configuration.
    config: SchedulerConfig,
    /// Shared event bus.
    bus: Arc<EventBus>,
    /// Every submitted task by id.
    tasks: HashMap<TaskId, Task>,
    /// Pending tasks in scheduling order.
    pending: BTreeSet<PendingEntry>,
    /// Tasks handed out and not yet finished.
    in_progress: BTreeSet<TaskId>,
    /// Completion order.
    completed: Vec<TaskId>,
    /// Fast membership check for `completed`.
    completed_set: HashSet<TaskId>,
    /// Failure order.
    failed: Vec<TaskId>,
}

impl Scheduler {
    /// Create a scheduler with default configuration.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_config(bus, SchedulerConfig::default())
    }

    /// Create a new scheduler.
    pub fn with_config(bus: Arc<EventBus>, config: SchedulerConfig) -> Self {
        Self {
            config,
            bus,
            tasks: HashMap::new(),
            pending: BTreeSet::new(),
            in_progress: BTreeSet::new(),
            completed: Vec::new(),
            completed_set: HashSet::new(),
            failed: Vec::new(),
        }
    }

    /// Admit a task as pending.
    ///
    /// Publishes `TaskCreated` followed by `TaskStatusChanged(Pending)`.
    /// Duplicate ids are rejected without any event.
    pub fn submit_task(&mut self, mut task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(Error::DuplicateTask { id: task.id });
        }

        if self.config.strict_dependencies
            && let Some(missing) = task.dependencies.iter().find(|d| !self.tasks.contains_key(*d))
        {
            return Err(Error::UnknownDependency {
                id: task.id.clone(),
                dependency: missing.clone(),
            });
        }

        task.status = TaskStatus::Pending;
        let id = task.id.clone();
        let description = task.description.clone();

        log::debug!(
            "Submitting task {} (priority={}, deps={})",
            id,
            task.priority,
            task.dependencies.len()
        );

        self.pending.insert(PendingEntry {
            rank: task.priority.rank(),
            id: id.clone(),
        });
        self.tasks.insert(id.clone(), task);

        self.bus.publish(Event::task_created(id.clone(), description));
        self.bus.publish(Event::task_status_changed(id, TaskStatus::Pending));
        Ok(())
    }

    /// Take the first ready task in scheduling order.
    ///
    /// The task moves from pending to in progress. Its status stays `Pending`
    /// until [`Scheduler::start_task`] is called.
    pub fn next_available_task(&mut self) -> Option<Task> {
        let entry = self
            .pending
            .iter()
            .find(|e| self.tasks.get(&e.id).is_some_and(|t| self.dependencies_met(t)))
            .cloned()?;

        self.pending.remove(&entry);
        self.in_progress.insert(entry.id.clone());
        self.tasks.get(&entry.id).cloned()
    }

    /// Record that a dequeued task is now running and publish the transition.
    pub fn start_task(&mut self, id: &TaskId) -> Result<()> {
        self.transition(id, TaskStatus::InProgress)?;
        self.bus
            .publish(Event::task_status_changed(id.clone(), TaskStatus::InProgress));
        Ok(())
    }

    /// Retire an in-progress task as completed.
    ///
    /// Calling this for a task that is not in progress (including a second
    /// call for the same id) returns an error and leaves the completion list
    /// unchanged.
    pub fn mark_task_completed(&mut self, id: &TaskId) -> Result<()> {
        self.finish(id, TaskStatus::Completed)?;
        self.completed.push(id.clone());
        self.completed_set.insert(id.clone());
        self.bus
            .publish(Event::task_status_changed(id.clone(), TaskStatus::Completed));
        Ok(())
    }

    /// Retire an in-progress task as failed.
    ///
    /// Tasks depending on it can no longer become ready.
    pub fn mark_task_failed(&mut self, id: &TaskId) -> Result<()> {
        self.finish(id, TaskStatus::Failed)?;
        self.failed.push(id.clone());
        self.bus
            .publish(Event::task_status_changed(id.clone(), TaskStatus::Failed));
        Ok(())
    }

    /// Validate and apply a status change for a task in the in-progress set.
    fn transition(&mut self, id: &TaskId, to: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound { id: id.clone() })?;

        if !self.in_progress.contains(id) {
            return Err(Error::TaskNotInProgress {
                id: id.clone(),
                status: task.status,
            });
        }

        if !task.status.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                id: id.clone(),
                from: task.status,
                to,
            });
        }

        task.status = to;
        Ok(())
    }

    /// Move a task out of the in-progress set into a terminal status.
    fn finish(&mut self, id: &TaskId, to: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound { id: id.clone() })?;

        if !to.is_terminal() {
            return Err(Error::InvalidStateTransition {
                id: id.clone(),
                from: task.status,
                to,
            });
        }

        if !self.in_progress.remove(id) {
            return Err(Error::TaskNotInProgress {
                id: id.clone(),
                status: task.status,
            });
        }

        task.status = to;
        Ok(())
    }

    fn dependencies_met(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|d| self.completed_set.contains(d))
    }

    /// Whether some pending task could be handed out right now.
    pub fn has_ready_task(&self) -> bool {
        self.pending
            .iter()
            .any(|e| self.tasks.get(&e.id).is_some_and(|t| self.dependencies_met(t)))
    }

    /// Pending tasks that can never become ready.
    ///
    /// A dependency is resolvable if it is completed, in progress, or a pending
    /// task whose own dependencies are resolvable. Unknown ids, failed tasks and
    /// dependency cycles are never resolvable.
    pub fn stuck_tasks(&self) -> Vec<StuckTask> {
        let mut resolvable: HashSet<&TaskId> = self.completed_set.iter().chain(self.in_progress.iter()).collect();

        loop {
            let before = resolvable.len();
            for entry in &self.pending {
                if resolvable.contains(&entry.id) {
                    continue;
                }
                if let Some(task) = self.tasks.get(&entry.id)
                    && task.dependencies.iter().all(|d| resolvable.contains(d))
                {
                    resolvable.insert(&entry.id);
                }
            }
            if resolvable.len() == before {
                break;
            }
        }

        self.pending
            .iter()
            .filter(|e| !resolvable.contains(&e.id))
            .filter_map(|e| self.tasks.get(&e.id))
            .map(|task| StuckTask {
                id: task.id.clone(),
                unresolved: task
                    .dependencies
                    .iter()
                    .filter(|d| !resolvable.contains(d))
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// Look up a task.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Current status of a task.
    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks.get(id).map(|t| t.status)
    }

    /// Pending task ids in scheduling order.
    pub fn pending_task_ids(&self) -> Vec<TaskId> {
        self.pending.iter().map(|e| e.id.clone()).collect()
    }

    /// In-progress task ids, sorted by id.
    pub fn in_progress_task_ids(&self) -> Vec<TaskId> {
        self.in_progress.iter().cloned().collect()
    }

    /// Completed task ids in completion order.
    pub fn completed_task_ids(&self) -> &[TaskId] {
        &self.completed
    }

    /// Failed task ids in failure order.
    pub fn failed_task_ids(&self) -> &[TaskId] {
        &self.failed
    }

    /// Number of completed or failed tasks.
    pub fn finished_count(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// True when nothing is pending or in progress.
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.in_progress.is_empty()
    }

    /// Number of submitted tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
