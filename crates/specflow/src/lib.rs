#![doc = include_str!("../README.md")]

pub mod approvals;
pub mod archive;
pub mod classify;
pub mod config;
pub mod error;
#[cfg(feature = "live")]
pub mod hub;
pub mod io;
pub mod paths;
pub mod specs;
pub mod steering;
pub mod tasks;
#[cfg(feature = "live")]
pub mod watcher;

pub use approvals::{
    ApprovalRecord, ApprovalStatus, ApprovalStore, ApprovalType, Comment, CommentType, Decision,
    NewApproval,
};
pub use archive::ArchiveManager;
pub use classify::{ChangeEvent, ChangeKind, Subsystem, classify};
pub use config::Config;
pub use error::{ErrorKind, Result, WorkflowError};
#[cfg(feature = "live")]
pub use hub::{ClientMessage, NotificationHub, ObserverId, PushMessage};
pub use io::FileLocks;
pub use paths::{DocumentKind, SpecLocation, SteeringKind, WorkflowPaths};
pub use specs::{DocumentStatus, SpecSummary, TaskProgress};
pub use steering::SteeringStatus;
pub use tasks::{ParsedTasks, TaskRecord, TaskStatus, TaskSummary};
#[cfg(feature = "live")]
pub use watcher::{WatcherHandle, WorkflowWatcher};

use std::path::{Path, PathBuf};
use tracing::info;

/// High-level interface over one workflow tree.
///
/// Every read goes to disk; nothing is cached between calls. Writes that
/// rewrite a single file share one set of per-path locks, so clones of a
/// `SpecWorkflow` never interleave writes to the same document.
///
/// # Example
///
/// ```rust,no_run
/// use specflow::{SpecWorkflow, TaskStatus, WorkflowPaths};
///
/// let workflow = SpecWorkflow::new(WorkflowPaths::new("/path/to/project"));
///
/// for spec in workflow.list_specs(specflow::SpecLocation::Active)? {
///     println!("{} ({:?})", spec.display_name, spec.task_progress);
/// }
///
/// workflow.set_task_status("user-auth", "2.1", TaskStatus::Completed)?;
/// # Ok::<(), specflow::WorkflowError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SpecWorkflow {
    paths: WorkflowPaths,
    locks: FileLocks,
    approvals: ApprovalStore,
    archive: ArchiveManager,
}

impl SpecWorkflow {
    pub fn new(paths: WorkflowPaths) -> Self {
        let locks = FileLocks::new();
        let approvals = ApprovalStore::with_locks(paths.clone(), locks.clone());
        let archive = ArchiveManager::new(approvals.clone());
        Self {
            paths,
            locks,
            approvals,
            archive,
        }
    }

    pub fn paths(&self) -> &WorkflowPaths {
        &self.paths
    }

    pub fn approvals(&self) -> &ApprovalStore {
        &self.approvals
    }

    pub fn locate(&self, name: &str) -> Result<Option<SpecLocation>> {
        self.archive.locate(name)
    }

    /// Like [`locate`](Self::locate), but a missing spec is an error.
    pub fn require_location(&self, name: &str) -> Result<SpecLocation> {
        self.locate(name)?
            .ok_or_else(|| WorkflowError::SpecNotFound(name.to_string()))
    }

    pub fn archive(&self, name: &str) -> Result<()> {
        self.archive.archive(name)
    }

    pub fn unarchive(&self, name: &str) -> Result<()> {
        self.archive.unarchive(name)
    }

    pub fn list_specs(&self, location: SpecLocation) -> Result<Vec<SpecSummary>> {
        specs::list_specs(&self.paths, location)
    }

    pub fn spec_summary(&self, name: &str) -> Result<SpecSummary> {
        let location = self.require_location(name)?;
        specs::summarize(&self.paths, name, location)
    }

    /// Parsed task document of a spec in whichever root holds it.
    pub fn read_tasks(&self, name: &str) -> Result<ParsedTasks> {
        let location = self.require_location(name)?;
        specs::read_tasks(&self.paths, name, location)
    }

    /// Sets one task's status in an active spec and returns the updated task.
    ///
    /// At most one task may be in progress: asking to start a task while a
    /// different one is in progress fails with
    /// [`WorkflowError::TaskAlreadyInProgress`] and leaves the document as is.
    pub fn set_task_status(
        &self,
        name: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<TaskRecord> {
        let path = self.active_document(name, DocumentKind::Tasks)?;
        self.locks.with_lock(&path, || {
            let text = read_existing(&path)?;
            let updated = rewrite_task_status(&text, task_id, status)?;
            if updated != text {
                io::write_atomic(&path, updated.as_bytes())?;
                info!(spec = %name, task = %task_id, status = %status, "Task status updated");
            }
            tasks::parse(&updated)
                .find(task_id)
                .cloned()
                .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))
        })
    }

    /// Returns the task document before and after the status change that
    /// [`SpecWorkflow::set_task_status`] would make, without writing it.
    pub fn preview_task_status(
        &self,
        name: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(String, String)> {
        let path = self.active_document(name, DocumentKind::Tasks)?;
        let text = read_existing(&path)?;
        let updated = rewrite_task_status(&text, task_id, status)?;
        Ok((text, updated))
    }

    pub fn read_document(&self, name: &str, kind: DocumentKind) -> Result<String> {
        let location = self.require_location(name)?;
        specs::read_document(&self.paths, name, location, kind)
    }

    /// Replaces a document of an active spec. Archived specs are read-only.
    pub fn save_document(&self, name: &str, kind: DocumentKind, content: &str) -> Result<()> {
        let path = self.active_document(name, kind)?;
        self.locks
            .with_lock(&path, || io::write_atomic(&path, content.as_bytes()))?;
        info!(spec = %name, document = %kind, "Document saved");
        Ok(())
    }

    pub fn steering_status(&self) -> SteeringStatus {
        steering::steering_status(&self.paths)
    }

    pub fn read_steering(&self, kind: SteeringKind) -> Result<String> {
        steering::read_steering(&self.paths, kind)
    }

    /// Content of the artifact an approval refers to.
    pub fn approval_content(&self, id: &str) -> Result<String> {
        let record = self.approvals.get(id)?;
        self.approvals.resolve_artifact(&record).ok_or_else(|| {
            WorkflowError::DocumentNotFound(PathBuf::from(&record.file_path))
        })
    }

    fn active_document(&self, name: &str, kind: DocumentKind) -> Result<PathBuf> {
        match self.require_location(name)? {
            SpecLocation::Active => self.paths.document_file(name, SpecLocation::Active, kind),
            SpecLocation::Archived => Err(WorkflowError::AlreadyArchived(name.to_string())),
        }
    }
}

fn read_existing(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(WorkflowError::DocumentNotFound(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Marker rewrite plus the single in-progress rule. Unknown ids fail with
/// [`WorkflowError::TaskNotFound`] before any conflict is reported.
fn rewrite_task_status(text: &str, task_id: &str, status: TaskStatus) -> Result<String> {
    let updated = tasks::set_status(text, task_id, status)?;
    if status == TaskStatus::InProgress
        && let Some(current) = tasks::parse(text)
            .in_progress_tasks()
            .find(|t| t.id != task_id)
    {
        return Err(WorkflowError::TaskAlreadyInProgress {
            requested: task_id.to_string(),
            current: current.id.clone(),
        });
    }
    Ok(updated)
}
