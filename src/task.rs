//! Task types for QuantaLista.
//!
//! A [`Task`] is the scheduler's record of a unit of work. The JSON shape that
//! travels through the file queue is [`TaskRecord`]; conversion between the two
//! is where boundary validation happens.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new task ID using UUID v7 (time-ordered).
    pub fn generate() -> Self {
        Self(format!("task-{}", Uuid::now_v7()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Priority tier of a task.
///
/// Parsing is lenient: any string other than `high` or `medium` is `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    High,
    Medium,
    #[default]
    Low,
}

impl Priority {
    /// Numeric rank used for ordering (higher runs first).
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 2,
            Priority::Medium => 1,
            Priority::Low => 0,
        }
    }

    /// Lenient conversion from the wire representation.
    pub fn from_label(label: &str) -> Self {
        match label {
            "high" => Priority::High,
            "medium" => Priority::Medium,
            _ => Priority::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_label(s))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status as tracked by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, waiting for dependencies or an agent
    Pending,
    /// Assigned to an agent
    InProgress,
    /// Simulated deadline elapsed
    Completed,
    /// Explicitly reported as failed
    Failed,
}

impl TaskStatus {
    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Check if the task can transition to the given status.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!((self, to), (Pending, InProgress) | (InProgress, Completed | Failed))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// A schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,
    /// Human-readable description
    pub description: String,
    /// Priority tier
    pub priority: Priority,
    /// Tasks that must complete first, in declaration order
    pub dependencies: Vec<TaskId>,
    /// Component/category tag (opaque)
    pub component: String,
    /// Simulated execution time
    pub max_runtime: Duration,
    /// Current status
    pub status: TaskStatus,
}

impl Task {
    /// Create a new pending task with no dependencies.
    pub fn new(id: impl Into<TaskId>, description: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority,
            dependencies: Vec::new(),
            component: String::new(),
            max_runtime: Duration::from_secs(1),
            status: TaskStatus::Pending,
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<TaskId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn with_max_runtime(mut self, max_runtime: Duration) -> Self {
        self.max_runtime = max_runtime;
        self
    }
}

/// Wire representation of a task in the file queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub max_runtime_sec: i64,
}

impl TaskRecord {
    /// Validate the record and build a pending task from it.
    ///
    /// Dependency ids are de-duplicated, keeping first occurrence order.
    pub fn into_task(self) -> Result<Task> {
        if self.task_id.trim().is_empty() {
            return Err(Error::Validation("task_id must not be empty".to_string()));
        }
        if self.max_runtime_sec < 0 {
            return Err(Error::Validation(format!(
                "task {}: max_runtime_sec must not be negative (got {})",
                self.task_id, self.max_runtime_sec
            )));
        }

        let mut task = Task::new(self.task_id, self.description, Priority::from_label(&self.priority))
            .with_component(self.component)
            .with_max_runtime(Duration::from_secs(self.max_runtime_sec as u64));
        for dep in self.dependencies {
            task = task.depends_on(dep);
        }
        Ok(task)
    }
}

/// Seconds in `runtime`, rounded up and clamped to `i64::MAX`.
fn whole_seconds(runtime: Duration) -> i64 {
    let secs = runtime.as_secs().saturating_add(u64::from(runtime.subsec_nanos() > 0));
    i64::try_from(secs).unwrap_or(i64::MAX)
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.0.clone(),
            description: task.description.clone(),
            priority: task.priority.as_str().to_string(),
            dependencies: task.dependencies.iter().map(|d| d.0.clone()).collect(),
            component: task.component.clone(),
            max_runtime_sec: whole_seconds(task.max_runtime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_generation() {
        let id1 = TaskId::generate();
        let id2 = TaskId::generate();
        assert_ne!(id1, id2);
        assert!(id1.0.starts_with("task-"));
    }

    #[test]
    fn test_priority_rank() {
        assert_eq!(Priority::High.rank(), 2);
        assert_eq!(Priority::Medium.rank(), 1);
        assert_eq!(Priority::Low.rank(), 0);
    }

    #[test]
    fn test_unknown_priority_is_low() {
        assert_eq!(Priority::from_label("urgent"), Priority::Low);
        assert_eq!(Priority::from_label("HIGH"), Priority::Low);
        assert_eq!(Priority::from_label(""), Priority::Low);
        assert_eq!("medium".parse::<Priority>().unwrap(), Priority::Medium);
    }

    #[test]
    fn test_status_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Failed));

        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Pending));

        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_record_into_task() {
        let json = r#"{
            "task_id": "t4",
            "description": "dependent task",
            "priority": "high",
            "dependencies": ["t2", "t2", "t1"],
            "component": "c1",
            "max_runtime_sec": 3
        }"#;
        let record: TaskRecord = serde_json::from_str(json).unwrap();
        let task = record.into_task().unwrap();

        assert_eq!(task.id, TaskId::from("t4"));
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.dependencies, vec![TaskId::from("t2"), TaskId::from("t1")]);
        assert_eq!(task.component, "c1");
        assert_eq!(task.max_runtime, Duration::from_secs(3));
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_record_rejects_empty_id() {
        let record = TaskRecord {
            task_id: "  ".to_string(),
            description: String::new(),
            priority: "low".to_string(),
            dependencies: Vec::new(),
            component: String::new(),
            max_runtime_sec: 1,
        };
        assert!(matches!(record.into_task(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_record_rejects_negative_runtime() {
        let json = r#"{"task_id": "t1", "max_runtime_sec": -5}"#;
        let record: TaskRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(record.into_task(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_record_from_task_keeps_unknown_priority_as_low() {
        let task = Task::new("t1", "x", Priority::from_label("whatever")).depends_on("t0");
        let record = TaskRecord::from(&task);
        assert_eq!(record.priority, "low");
        assert_eq!(record.dependencies, vec!["t0".to_string()]);
        assert_eq!(record.max_runtime_sec, 1);
    }

    #[test]
    fn test_record_runtime_rounds_up_and_clamps() {
        let task = Task::new("t1", "x", Priority::Low).with_max_runtime(Duration::from_millis(1500));
        let back = TaskRecord::from(&task).into_task().unwrap();
        assert_eq!(back.max_runtime, Duration::from_secs(2));

        let task = Task::new("t2", "x", Priority::Low).with_max_runtime(Duration::ZERO);
        assert_eq!(TaskRecord::from(&task).max_runtime_sec, 0);

        let task = Task::new("t3", "x", Priority::Low).with_max_runtime(Duration::MAX);
        assert_eq!(TaskRecord::from(&task).max_runtime_sec, i64::MAX);
    }
}
