//! File-backed task queue.
//!
//! Task records live as `<task_id>.json` files under a queue root:
//!
//! ```text
//! queue/
//!   pending/       submitted, not yet started
//!   in_progress/   moved here when the task starts
//!   completed/     result record written on completion
//!   failed/        result record written on failure
//! ```
//!
//! The scheduler core never touches these files. [`QueueSync`] subscribes to
//! status changes on the event bus and mirrors them into the directories.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordination::events::{Event, Subscriber};
use crate::error::{Error, Result};
use crate::task::{TaskId, TaskRecord, TaskStatus};

/// One of the queue directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueFolder {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl QueueFolder {
    pub const ALL: [QueueFolder; 4] = [
        QueueFolder::Pending,
        QueueFolder::InProgress,
        QueueFolder::Completed,
        QueueFolder::Failed,
    ];

    /// Directory name under the queue root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            QueueFolder::Pending => "pending",
            QueueFolder::InProgress => "in_progress",
            QueueFolder::Completed => "completed",
            QueueFolder::Failed => "failed",
        }
    }

    /// Heading used when listing the queue.
    pub fn title(&self) -> &'static str {
        match self {
            QueueFolder::Pending => "Pending Tasks",
            QueueFolder::InProgress => "In Progress Tasks",
            QueueFolder::Completed => "Completed Tasks",
            QueueFolder::Failed => "Failed Tasks",
        }
    }
}

/// Result record written when a task finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    /// "completed" or "failed".
    pub status: String,
    pub output: String,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of reading the pending directory.
#[derive(Debug, Default)]
pub struct PendingLoad {
    /// Decoded records, sorted by file name.
    pub records: Vec<TaskRecord>,
    /// Files that could not be used, with the reason.
    pub rejected: Vec<(PathBuf, String)>,
}

/// Directory-backed queue of task records.
#[derive(Debug, Clone)]
pub struct FileQueue {
    /// Queue root directory.
    root: PathBuf,
}

impl FileQueue {
    /// Create a queue handle rooted at `root`. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one queue directory.
    pub fn folder(&self, folder: QueueFolder) -> PathBuf {
        self.root.join(folder.dir_name())
    }

    /// Create all queue directories.
    pub fn init(&self) -> Result<()> {
        for folder in QueueFolder::ALL {
            fs::create_dir_all(self.folder(folder))?;
        }
        Ok(())
    }

    fn task_path(&self, folder: QueueFolder, task_id: &str) -> PathBuf {
        self.folder(folder).join(format!("{}.json", task_id))
    }

    fn validate_id(task_id: &str) -> Result<()> {
        if task_id.trim().is_empty() {
            return Err(Error::Validation("task_id must not be empty".to_string()));
        }
        if task_id.contains(['/', '\\']) || task_id == "." || task_id == ".." {
            return Err(Error::Validation(format!(
                "task_id '{}' cannot be used as a file name",
                task_id
            )));
        }
        Ok(())
    }

    /// Write a record into `pending/`.
    pub fn enqueue(&self, record: &TaskRecord) -> Result<PathBuf> {
        Self::validate_id(&record.task_id)?;
        let pending = self.folder(QueueFolder::Pending);
        fs::create_dir_all(&pending)?;

        let path = self.task_path(QueueFolder::Pending, &record.task_id);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;
        log::debug!("Enqueued task {} at {}", record.task_id, path.display());
        Ok(path)
    }

    /// Read every `*.json` record in `pending/`.
    ///
    /// Files that fail to decode, or whose name does not match their
    /// `task_id`, are reported in [`PendingLoad::rejected`] and left in place.
    pub fn load_pending(&self) -> Result<PendingLoad> {
        let mut paths: Vec<PathBuf> = fs::read_dir(self.folder(QueueFolder::Pending))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut load = PendingLoad::default();
        for path in paths {
            match Self::read_record(&path) {
                Ok(record) => load.records.push(record),
                Err(reason) => {
                    log::warn!("Skipping {}: {}", path.display(), reason);
                    load.rejected.push((path, reason));
                }
            }
        }
        Ok(load)
    }

    fn read_record(path: &Path) -> std::result::Result<TaskRecord, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        let record: TaskRecord = serde_json::from_str(&content).map_err(|e| e.to_string())?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem != record.task_id {
            return Err(format!(
                "file name does not match task_id '{}'",
                record.task_id
            ));
        }
        Ok(record)
    }

    /// Move a task's record from `pending/` to `in_progress/`.
    ///
    /// Returns false if there was no pending file for the task.
    pub fn mark_started(&self, task_id: &TaskId) -> Result<bool> {
        let from = self.task_path(QueueFolder::Pending, task_id.as_ref());
        if !from.exists() {
            return Ok(false);
        }
        let to = self.task_path(QueueFolder::InProgress, task_id.as_ref());
        fs::create_dir_all(self.folder(QueueFolder::InProgress))?;
        fs::rename(&from, &to)?;
        Ok(true)
    }

    /// Drop the in-progress record and write a result record.
    pub fn mark_finished(&self, task_id: &TaskId, status: TaskStatus) -> Result<PathBuf> {
        let (folder, label, output) = match status {
            TaskStatus::Completed => (QueueFolder::Completed, "completed", "Task processed successfully."),
            TaskStatus::Failed => (QueueFolder::Failed, "failed", "Task failed."),
            other => {
                return Err(Error::Validation(format!(
                    "task {} is not finished (status {})",
                    task_id, other
                )));
            }
        };

        let in_progress = self.task_path(QueueFolder::InProgress, task_id.as_ref());
        if in_progress.exists() {
            fs::remove_file(&in_progress)?;
        }

        let result = TaskResult {
            task_id: task_id.0.clone(),
            status: label.to_string(),
            output: output.to_string(),
            finished_at: Utc::now(),
        };
        fs::create_dir_all(self.folder(folder))?;
        let path = self.task_path(folder, task_id.as_ref());
        fs::write(&path, serde_json::to_string_pretty(&result)?)?;
        Ok(path)
    }

    /// Read a result record.
    pub fn result(&self, task_id: &TaskId) -> Result<Option<TaskResult>> {
        for folder in [QueueFolder::Completed, QueueFolder::Failed] {
            let path = self.task_path(folder, task_id.as_ref());
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                return Ok(Some(serde_json::from_str(&content)?));
            }
        }
        Ok(None)
    }

    /// File names in each folder, sorted. Missing folders list as empty.
    pub fn list(&self) -> Result<Vec<(QueueFolder, Vec<String>)>> {
        let mut listing = Vec::with_capacity(QueueFolder::ALL.len());
        for folder in QueueFolder::ALL {
            let dir = self.folder(folder);
            let mut names = Vec::new();
            if dir.is_dir() {
                for entry in fs::read_dir(&dir)? {
                    let entry = entry?;
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            names.sort();
            listing.push((folder, names));
        }
        Ok(listing)
    }
}

/// Mirrors task status changes into a [`FileQueue`].
///
/// Filesystem errors are logged and otherwise ignored; they never reach the
/// scheduler.
pub struct QueueSync {
    queue: FileQueue,
}

impl QueueSync {
    pub fn new(queue: FileQueue) -> Self {
        Self { queue }
    }
}

impl Subscriber for QueueSync {
    fn on_event(&self, event: &Event) {
        let Event::TaskStatusChanged { task_id, new_status } = event else {
            return;
        };

        match new_status {
            TaskStatus::InProgress => match self.queue.mark_started(task_id) {
                Ok(true) => {}
                Ok(false) => log::debug!("No pending queue file for task {}", task_id),
                Err(e) => log::warn!("Failed to move task {} to in_progress: {}", task_id, e),
            },
            TaskStatus::Completed | TaskStatus::Failed => {
                if let Err(e) = self.queue.mark_finished(task_id, *new_status) {
                    log::warn!("Failed to write result for task {}: {}", task_id, e);
                }
            }
            TaskStatus::Pending => {}
        }
    }
}
