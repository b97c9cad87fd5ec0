//! Approval records and their store.
//!
//! Records live at `approvals/<category>/<id>.json`. Older installs wrote them
//! flat at `approvals/<id>.json`; both layouts are read and merged. Every
//! record is normalized to the current schema when it is read, so legacy
//! shapes (missing `schemaVersion`, single-line comment anchors) never leak
//! past this module, and every write produces the current schema.

use crate::error::{Result, WorkflowError};
use crate::io::{FileLocks, write_atomic};
use crate::paths::{WorkflowPaths, validate_spec_name};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Schema version written by this crate. Records without a version are legacy.
pub const SCHEMA_VERSION: u32 = 2;

/// The only category this workflow uses: every approval belongs to a spec.
pub const SPEC_CATEGORY: &str = "spec";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    NeedsRevision,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
            ApprovalStatus::NeedsRevision => write!(f, "needs-revision"),
        }
    }
}

/// The outcome a reviewer can record on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Approved,
    Rejected,
    NeedsRevision,
}

impl From<Decision> for ApprovalStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
            Decision::NeedsRevision => ApprovalStatus::NeedsRevision,
        }
    }
}

impl FromStr for Decision {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "approved" | "approve" => Ok(Decision::Approved),
            "rejected" | "reject" => Ok(Decision::Rejected),
            "needs-revision" | "needs_revision" | "revise" => Ok(Decision::NeedsRevision),
            other => Err(WorkflowError::InvalidDocument(format!(
                "unknown decision {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalType {
    #[default]
    Document,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentType {
    General,
    Selection,
}

/// A reviewer comment, optionally anchored to a 1-based inclusive line range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawComment")]
pub struct Comment {
    pub id: String,
    #[serde(rename = "type")]
    pub comment_type: CommentType,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub resolved: bool,
}

impl Comment {
    /// A comment anchored to `start_line..=end_line`.
    pub fn on_lines(text: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            id: String::new(),
            comment_type: CommentType::Selection,
            text: text.into(),
            start_line: Some(start_line),
            end_line: Some(end_line),
            selected_text: None,
            highlight_color: None,
            timestamp: None,
            resolved: false,
        }
    }

    /// A comment on the document as a whole.
    pub fn general(text: impl Into<String>) -> Self {
        Self {
            comment_type: CommentType::General,
            start_line: None,
            end_line: None,
            ..Self::on_lines(text, 1, 1)
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| WorkflowError::InvalidComment {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        match (self.start_line, self.end_line) {
            (Some(0), _) | (_, Some(0)) => Err(invalid("line numbers are 1-based")),
            (Some(start), Some(end)) if end < start => Err(invalid("range ends before it starts")),
            (None, Some(_)) => Err(invalid("range has an end but no start")),
            _ => Ok(()),
        }
    }
}

/// Every comment shape ever written, including the single-line `lineNumber`
/// anchor and the `comment` text field of early versions.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComment {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    comment_type: Option<CommentType>,
    #[serde(default, alias = "comment")]
    text: String,
    #[serde(default)]
    start_line: Option<u32>,
    #[serde(default)]
    end_line: Option<u32>,
    #[serde(default)]
    line_number: Option<u32>,
    #[serde(default)]
    selected_text: Option<String>,
    #[serde(default)]
    highlight_color: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    resolved: bool,
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        let start_line = raw.start_line.or(raw.line_number);
        let end_line = raw.end_line.or(start_line);
        let comment_type = raw.comment_type.unwrap_or(if start_line.is_some() {
            CommentType::Selection
        } else {
            CommentType::General
        });
        Comment {
            id: raw.id,
            comment_type,
            text: raw.text,
            start_line,
            end_line,
            selected_text: raw.selected_text,
            highlight_color: raw.highlight_color,
            timestamp: raw.timestamp,
            resolved: raw.resolved,
        }
    }
}

fn default_category() -> String {
    SPEC_CATEGORY.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    #[serde(default)]
    pub schema_version: u32,
    pub id: String,
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub category_name: String,
    #[serde(rename = "type", default)]
    pub approval_type: ApprovalType,
    pub file_path: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    /// Fields written by other tools; carried through rewrites untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ApprovalRecord {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

/// Input for [`ApprovalStore::create`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApproval {
    pub title: String,
    pub file_path: String,
    pub category_name: String,
    #[serde(rename = "type", default)]
    pub approval_type: ApprovalType,
}

/// Which on-disk layout a record was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    Categorized,
    LegacyFlat,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    path: PathBuf,
    record: ApprovalRecord,
}

fn read_record(path: &Path) -> Result<ApprovalRecord> {
    let data = std::fs::read_to_string(path)?;
    let record: ApprovalRecord =
        serde_json::from_str(&data).map_err(|source| WorkflowError::MalformedRecord {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(normalize(record, path))
}

/// Brings a record read from disk up to the current schema.
fn normalize(mut record: ApprovalRecord, path: &Path) -> ApprovalRecord {
    if record.category_name.is_empty()
        && let Some(dir) = path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str())
        && dir != "approvals"
    {
        record.category_name = dir.to_string();
    }
    record.schema_version = SCHEMA_VERSION;
    record
}

fn write_record(path: &Path, record: &ApprovalRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    write_atomic(path, json.as_bytes())
}

fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{prefix}_{}_{suffix}", Utc::now().timestamp_millis())
}

#[derive(Debug, Clone)]
pub struct ApprovalStore {
    paths: WorkflowPaths,
    locks: FileLocks,
}

impl ApprovalStore {
    pub fn new(paths: WorkflowPaths) -> Self {
        Self::with_locks(paths, FileLocks::new())
    }

    pub fn with_locks(paths: WorkflowPaths, locks: FileLocks) -> Self {
        Self { paths, locks }
    }

    pub fn paths(&self) -> &WorkflowPaths {
        &self.paths
    }

    /// Every `*.json` file in either layout, with the layout it came from.
    pub fn record_files(&self) -> Result<Vec<(PathBuf, RecordLayout)>> {
        let root = self.paths.approvals_dir();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                let sub = match std::fs::read_dir(&path) {
                    Ok(sub) => sub,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable approval category");
                        continue;
                    }
                };
                for record in sub.flatten() {
                    let record_path = record.path();
                    if is_json(&record_path) && record_path.is_file() {
                        files.push((record_path, RecordLayout::Categorized));
                    }
                }
            } else if file_type.is_file() && is_json(&path) {
                files.push((path, RecordLayout::LegacyFlat));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    fn stored_records(&self) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();
        for (path, _) in self.record_files()? {
            match read_record(&path) {
                Ok(record) => records.push(StoredRecord { path, record }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed approval record");
                }
            }
        }
        Ok(records)
    }

    /// All readable records from both layouts, newest first.
    pub fn list(&self) -> Result<Vec<ApprovalRecord>> {
        let mut records: Vec<ApprovalRecord> = self
            .stored_records()?
            .into_iter()
            .map(|stored| stored.record)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<ApprovalRecord> {
        self.find(id).map(|stored| stored.record)
    }

    /// Pending records whose category name is `spec_name`.
    pub fn pending_for(&self, spec_name: &str) -> Result<Vec<ApprovalRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.is_pending() && r.category_name == spec_name)
            .collect())
    }

    fn find(&self, id: &str) -> Result<StoredRecord> {
        // Records are named after their id, so try the direct paths first.
        let root = self.paths.approvals_dir();
        let flat = root.join(format!("{id}.json"));
        let mut direct = vec![flat];
        if let Ok(entries) = std::fs::read_dir(&root) {
            for entry in entries.flatten() {
                if entry.path().is_dir() {
                    direct.push(entry.path().join(format!("{id}.json")));
                }
            }
        }
        for path in direct {
            if path.is_file()
                && let Ok(record) = read_record(&path)
                && record.id == id
            {
                return Ok(StoredRecord { path, record });
            }
        }

        self.stored_records()?
            .into_iter()
            .find(|stored| stored.record.id == id)
            .ok_or_else(|| WorkflowError::ApprovalNotFound(id.to_string()))
    }

    /// Creates a pending record under `<category_name>/<id>.json`.
    pub fn create(&self, request: NewApproval) -> Result<ApprovalRecord> {
        validate_spec_name(&request.category_name)?;
        let id = generate_id("approval");
        let record = ApprovalRecord {
            schema_version: SCHEMA_VERSION,
            id: id.clone(),
            title: request.title,
            category: SPEC_CATEGORY.to_string(),
            category_name: request.category_name.clone(),
            approval_type: request.approval_type,
            file_path: request.file_path,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            response: None,
            responded_at: None,
            annotations: None,
            comments: Vec::new(),
            extra: BTreeMap::new(),
        };
        let path = self
            .paths
            .approvals_dir()
            .join(&request.category_name)
            .join(format!("{id}.json"));
        self.locks.with_lock(&path, || write_record(&path, &record))?;
        debug!(approval_id = %id, spec = %record.category_name, "Created approval");
        Ok(record)
    }

    /// Records a reviewer decision on a pending approval.
    ///
    /// The record is re-read under its write lock, so the decision is
    /// applied to what is on disk now rather than to an earlier listing.
    pub fn transition(
        &self,
        id: &str,
        decision: Decision,
        response: impl Into<String>,
        annotations: Option<String>,
        comments: Option<Vec<Comment>>,
    ) -> Result<ApprovalRecord> {
        let located = self.find(id)?;
        let response = response.into();

        self.locks.with_lock(&located.path, || {
            let mut record = read_record(&located.path)?;
            if !record.is_pending() {
                return Err(WorkflowError::ApprovalNotPending {
                    id: id.to_string(),
                    status: record.status.to_string(),
                });
            }

            let now = Utc::now();
            record.status = decision.into();
            record.response = Some(response);
            record.responded_at = Some(now);
            if annotations.is_some() {
                record.annotations = annotations;
            }
            if let Some(mut comments) = comments {
                for (idx, comment) in comments.iter_mut().enumerate() {
                    if comment.id.is_empty() {
                        comment.id = format!("comment_{}_{idx}", now.timestamp_millis());
                    }
                    if comment.timestamp.is_none() {
                        comment.timestamp = Some(now);
                    }
                    comment.validate()?;
                }
                record.comments = comments;
            }

            write_record(&located.path, &record)?;
            debug!(approval_id = %id, status = %record.status, "Approval transitioned");
            Ok(record)
        })
    }

    /// Deletes a record once its decision has been consumed. Pending records
    /// are kept, since they are what blocks archiving their spec.
    pub fn delete(&self, id: &str) -> Result<ApprovalRecord> {
        let located = self.find(id)?;
        self.locks.with_lock(&located.path, || {
            let record = read_record(&located.path)?;
            if record.is_pending() {
                return Err(WorkflowError::ApprovalStillPending(id.to_string()));
            }
            std::fs::remove_file(&located.path)?;
            Ok(record)
        })
    }

    /// Candidate locations for a record's artifact, in the order they are tried.
    pub fn artifact_candidates(&self, record: &ApprovalRecord) -> Vec<PathBuf> {
        let normalized = record.file_path.replace('\\', "/");
        let given = Path::new(&normalized);
        let workflow = self.paths.workflow_dir();
        let specs = self.paths.specs_dir();
        let category = validate_spec_name(&record.category_name)
            .ok()
            .map(|_| record.category_name.as_str());

        let mut candidates = Vec::new();
        if given.is_absolute() {
            candidates.push(given.to_path_buf());
        } else if !normalized.is_empty() {
            candidates.push(self.paths.project_dir().join(given));
            candidates.push(workflow.join(given));
            candidates.push(specs.join(given));
            if let Some(category) = category {
                candidates.push(specs.join(category).join(given));
            }
        }
        if let Some(category) = category
            && let Some(file_name) = given.file_name()
        {
            candidates.push(specs.join(category).join(file_name));
            candidates.push(self.paths.archive_specs_dir().join(category).join(file_name));
        }

        let mut unique = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        unique
    }

    /// Content of the first candidate that is a readable file.
    pub fn resolve_artifact(&self, record: &ApprovalRecord) -> Option<String> {
        self.artifact_candidates(record)
            .into_iter()
            .filter(|candidate| candidate.is_file())
            .find_map(|candidate| std::fs::read_to_string(candidate).ok())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}
