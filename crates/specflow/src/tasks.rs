//! Task document model.
//!
//! A task document is a markdown checklist written by the agent:
//!
//! ```text
//! # Tasks
//!
//! ## 1. Foundation
//!
//! - [x] 1.1 Create the data model
//!   - File: src/model.rs
//!   - Define the record types
//!   - _Requirements: 1.1, 1.2_
//!   - _Leverage: src/util/ids.rs_
//! - [-] 1.2 Wire the store
//!   - _Purpose: persist records between runs_
//!   - _Prompt: Role: backend developer | Task: ..._
//! - [ ] 2. Add the HTTP surface
//! ```
//!
//! Parsing is lenient: anything that does not look like a header, a checklist
//! line, or a recognized sub-line is skipped. Lines inside fenced code blocks
//! are never treated as tasks.

use crate::error::{Result, WorkflowError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static CHECKLIST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)[-*+][ \t]+(?P<marker>\[[^\]\r\n]\])(?P<rest>.*)$")
        .expect("valid checklist regex")
});

static TASK_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*\*?[ \t]*(?P<id>\d+(?:\.\d+)*)\.?(?:[ \t]+(?P<desc>.*))?$")
        .expect("valid task id regex")
});

static HEADING_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)#{1,6}[ \t]+(?P<id>\d+(?:\.\d+)*)\.?[ \t]+(?P<desc>\S.*)$")
        .expect("valid heading regex")
});

static LIST_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*+][ \t]+)?(?P<id>\d+(?:\.\d+)*)\.[ \t]+(?P<desc>\S.*)$")
        .expect("valid list header regex")
});

static METADATA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[ \t]*(?:[-*+][ \t]+)?_?(?:\*\*)?(?P<key>files?|requirements?|leverage|purpose|prompt)(?:\*\*)?[ \t]*:(?:\*\*)?[ \t]*(?P<value>.*)$",
    )
    .expect("valid metadata regex")
});

static DETAIL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]+[-*+][ \t]+(?P<text>\S.*)$").expect("valid detail regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// The canonical marker written for this status.
    pub fn marker(self) -> &'static str {
        match self {
            TaskStatus::Pending => "[ ]",
            TaskStatus::InProgress => "[-]",
            TaskStatus::Completed => "[x]",
        }
    }

    /// Maps a recognized marker to its status; `None` for any other token.
    pub fn recognize(marker: &str) -> Option<Self> {
        match marker {
            "[ ]" => Some(TaskStatus::Pending),
            "[-]" => Some(TaskStatus::InProgress),
            "[x]" | "[X]" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// Lenient mapping used by the parser: unknown markers read as pending.
    pub fn from_marker(marker: &str) -> Self {
        Self::recognize(marker).unwrap_or(TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in-progress"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" | "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(WorkflowError::InvalidDocument(format!(
                "unknown task status {other:?}"
            ))),
        }
    }
}

/// Annotations written as indented sub-lines beneath a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub purposes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implementation_details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl TaskMetadata {
    pub fn is_empty(&self) -> bool {
        *self == TaskMetadata::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub is_header: bool,
    /// 1-based line of the task in its document.
    pub line_number: usize,
    pub indent_level: usize,
    #[serde(flatten)]
    pub metadata: TaskMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTasks {
    pub tasks: Vec<TaskRecord>,
    pub summary: TaskSummary,
    /// Id of the first in-progress task, in document order.
    pub in_progress: Option<String>,
}

impl ParsedTasks {
    pub fn find(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| !t.is_header && t.id == id)
    }

    /// First actionable pending task in document order.
    pub fn next_pending(&self) -> Option<&TaskRecord> {
        self.tasks
            .iter()
            .find(|t| !t.is_header && t.status == TaskStatus::Pending)
    }

    /// Every in-progress task; more than one means the document breaks the
    /// single-in-progress convention.
    pub fn in_progress_tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks
            .iter()
            .filter(|t| !t.is_header && t.status == TaskStatus::InProgress)
    }
}

/// A physical line with its byte offset and without its line terminator.
struct Line<'a> {
    number: usize,
    offset: usize,
    content: &'a str,
    in_fence: bool,
}

fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    let mut in_fence = false;
    text.split_inclusive('\n')
        .enumerate()
        .map(move |(idx, raw)| {
            let content = raw
                .strip_suffix('\n')
                .map(|l| l.strip_suffix('\r').unwrap_or(l))
                .unwrap_or(raw);
            let trimmed = content.trim_start();
            let is_fence = trimmed.starts_with("```") || trimmed.starts_with("~~~");
            let line = Line {
                number: idx + 1,
                offset,
                content,
                in_fence: in_fence || is_fence,
            };
            if is_fence {
                in_fence = !in_fence;
            }
            offset += raw.len();
            line
        })
}

fn indent_level(indent: &str) -> usize {
    let width: usize = indent.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum();
    width / 2
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_end_matches('_')
        .trim_end_matches("**")
        .trim()
        .to_string()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().trim_matches('`').trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn apply_metadata(meta: &mut TaskMetadata, key: &str, value: &str) {
    let value = clean_value(value);
    if value.is_empty() {
        return;
    }
    match key.to_ascii_lowercase().as_str() {
        "file" | "files" => meta.files.extend(split_list(&value)),
        "requirement" | "requirements" => meta.requirements.extend(split_list(&value)),
        "leverage" => {
            meta.leverage = Some(match meta.leverage.take() {
                Some(existing) => format!("{existing}, {value}"),
                None => value,
            })
        }
        "purpose" => meta.purposes.push(value),
        "prompt" => meta.prompt = Some(value),
        _ => {}
    }
}

/// Parses a task document into ordered task records.
pub fn parse(text: &str) -> ParsedTasks {
    let mut tasks: Vec<TaskRecord> = Vec::new();
    // Index of the checklist task that sub-lines attach to, with its indent.
    let mut current: Option<(usize, usize)> = None;

    for line in lines(text) {
        if line.in_fence {
            continue;
        }
        let content = line.content;

        if let Some(caps) = CHECKLIST_LINE.captures(content) {
            let indent = caps.name("indent").map_or("", |m| m.as_str());
            let rest = caps.name("rest").map_or("", |m| m.as_str());
            if let Some(id_caps) = TASK_ID.captures(rest) {
                let marker = caps.name("marker").map_or("", |m| m.as_str());
                tasks.push(TaskRecord {
                    id: id_caps["id"].to_string(),
                    description: id_caps
                        .name("desc")
                        .map_or("", |m| m.as_str())
                        .trim()
                        .to_string(),
                    status: TaskStatus::from_marker(marker),
                    is_header: false,
                    line_number: line.number,
                    indent_level: indent_level(indent),
                    metadata: TaskMetadata::default(),
                });
                current = Some((tasks.len() - 1, indent.len()));
                continue;
            }
        }

        let header = HEADING_HEADER
            .captures(content)
            .map(|caps| {
                let indent = caps.name("indent").map_or("", |m| m.as_str());
                (caps["id"].to_string(), caps["desc"].trim().to_string(), indent_level(indent))
            })
            .or_else(|| {
                LIST_HEADER
                    .captures(content)
                    .map(|caps| (caps["id"].to_string(), caps["desc"].trim().to_string(), 0))
            });
        if let Some((id, description, level)) = header {
            tasks.push(TaskRecord {
                id,
                description,
                status: TaskStatus::Pending,
                is_header: true,
                line_number: line.number,
                indent_level: level,
                metadata: TaskMetadata::default(),
            });
            current = None;
            continue;
        }

        if content.trim_start().starts_with('#') {
            current = None;
            continue;
        }
        let Some((idx, task_indent)) = current else {
            continue;
        };
        let line_indent = content.len() - content.trim_start().len();
        if content.trim().is_empty() {
            continue;
        }
        if line_indent <= task_indent {
            current = None;
            continue;
        }
        let task = &mut tasks[idx];

        if let Some(caps) = METADATA_LINE.captures(content) {
            apply_metadata(&mut task.metadata, &caps["key"], &caps["value"]);
            continue;
        }

        if let Some(caps) = DETAIL_LINE.captures(content) {
            task.metadata
                .implementation_details
                .push(caps["text"].trim().to_string());
        }
    }

    let mut summary = TaskSummary::default();
    for task in tasks.iter().filter(|t| !t.is_header) {
        summary.total += 1;
        match task.status {
            TaskStatus::Completed => summary.completed += 1,
            TaskStatus::InProgress => summary.in_progress += 1,
            TaskStatus::Pending => summary.pending += 1,
        }
    }
    let in_progress = tasks
        .iter()
        .find(|t| !t.is_header && t.status == TaskStatus::InProgress)
        .map(|t| t.id.clone());

    ParsedTasks {
        tasks,
        summary,
        in_progress,
    }
}

/// Rewrites the status marker of the checklist line whose id is `task_id`.
///
/// Every other byte of `text` is preserved. A marker that already reads as
/// `status` is left untouched.
pub fn set_status(text: &str, task_id: &str, status: TaskStatus) -> Result<String> {
    let mut matches: Vec<(usize, usize, usize)> = Vec::new();

    for line in lines(text) {
        if line.in_fence {
            continue;
        }
        let Some(caps) = CHECKLIST_LINE.captures(line.content) else {
            continue;
        };
        let rest = caps.name("rest").map_or("", |m| m.as_str());
        let Some(id_caps) = TASK_ID.captures(rest) else {
            continue;
        };
        if &id_caps["id"] != task_id {
            continue;
        }
        if let Some(marker) = caps.name("marker") {
            matches.push((
                line.number,
                line.offset + marker.start(),
                line.offset + marker.end(),
            ));
        }
    }

    match matches.as_slice() {
        [] => Err(WorkflowError::TaskNotFound(task_id.to_string())),
        [(_, start, end)] => {
            let existing = &text[*start..*end];
            if TaskStatus::recognize(existing) == Some(status) {
                return Ok(text.to_string());
            }
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..*start]);
            out.push_str(status.marker());
            out.push_str(&text[*end..]);
            Ok(out)
        }
        many => Err(WorkflowError::AmbiguousTask {
            id: task_id.to_string(),
            lines: many.iter().map(|(number, _, _)| *number).collect(),
        }),
    }
}
