use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Coarse classification of a [`WorkflowError`], used by outer surfaces to
/// pick a status code or exit code without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    MalformedRecord,
    IoFailure,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task id {id} is ambiguous: it appears on lines {lines:?}")]
    AmbiguousTask { id: String, lines: Vec<usize> },

    #[error("Cannot start task {requested}: task {current} is already in progress")]
    TaskAlreadyInProgress { requested: String, current: String },

    #[error("Approval not found: {0}")]
    ApprovalNotFound(String),

    #[error("Approval {id} is no longer pending (status: {status})")]
    ApprovalNotPending { id: String, status: String },

    #[error("Approval {0} is still pending and cannot be deleted")]
    ApprovalStillPending(String),

    #[error("Specification not found: {0}")]
    SpecNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("Invalid specification name: {0:?}")]
    InvalidSpecName(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid comment {id}: {reason}")]
    InvalidComment { id: String, reason: String },

    #[error("Specification {0} is already archived")]
    AlreadyArchived(String),

    #[error("Specification {0} is already active")]
    AlreadyActive(String),

    #[error("Specification {name} has {count} pending approval(s)")]
    PendingApprovalsExist { name: String, count: usize },

    #[error("Malformed record {path}: {source}")]
    MalformedRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "live")]
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::TaskNotFound(_)
            | WorkflowError::ApprovalNotFound(_)
            | WorkflowError::SpecNotFound(_)
            | WorkflowError::DocumentNotFound(_) => ErrorKind::NotFound,
            WorkflowError::AmbiguousTask { .. }
            | WorkflowError::TaskAlreadyInProgress { .. }
            | WorkflowError::ApprovalNotPending { .. }
            | WorkflowError::ApprovalStillPending(_)
            | WorkflowError::InvalidSpecName(_)
            | WorkflowError::InvalidDocument(_)
            | WorkflowError::InvalidComment { .. }
            | WorkflowError::AlreadyArchived(_)
            | WorkflowError::AlreadyActive(_)
            | WorkflowError::PendingApprovalsExist { .. }
            | WorkflowError::Config(_) => ErrorKind::PreconditionFailed,
            WorkflowError::MalformedRecord { .. } | WorkflowError::Json(_) => {
                ErrorKind::MalformedRecord
            }
            WorkflowError::Io(_) => ErrorKind::IoFailure,
            #[cfg(feature = "live")]
            WorkflowError::Watch(_) => ErrorKind::IoFailure,
        }
    }
}
