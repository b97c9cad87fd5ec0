//! Mapping raw filesystem paths under the workflow root to typed change events.

use crate::paths::{DocumentKind, SpecLocation, SteeringKind, WorkflowPaths};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// The part of the workflow tree a change belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "kebab-case")]
pub enum Subsystem {
    TaskDocument,
    /// Requirements or design document.
    SpecDocument(DocumentKind),
    /// A specification directory itself appearing or disappearing.
    SpecDirectory,
    /// `None` for records in the legacy flat layout.
    ApprovalRecord { category: Option<String> },
    Steering(SteeringKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub subsystem: Subsystem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SpecLocation>,
    pub path: PathBuf,
}

/// Classifies a path by its shape relative to the workflow root.
///
/// Returns `None` for anything outside the recognized zones, including
/// editor swap files and paths outside the root.
pub fn classify(paths: &WorkflowPaths, path: &Path, kind: ChangeKind) -> Option<ChangeEvent> {
    let root = paths.workflow_dir();
    let relative = path.strip_prefix(&root).ok()?;
    let parts = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<&str>>>()?;

    let event = |subsystem, spec_name: Option<&str>, location| ChangeEvent {
        kind,
        subsystem,
        spec_name: spec_name.map(str::to_string),
        location,
        path: path.to_path_buf(),
    };

    match parts.as_slice() {
        ["specs", rest @ ..] => classify_spec(rest)
            .map(|(sub, name)| event(sub, Some(name), Some(SpecLocation::Active))),
        ["archive", "specs", rest @ ..] => classify_spec(rest)
            .map(|(sub, name)| event(sub, Some(name), Some(SpecLocation::Archived))),
        ["approvals", file] if is_record(file) => {
            Some(event(Subsystem::ApprovalRecord { category: None }, None, None))
        }
        ["approvals", category, file] if is_record(file) && !category.starts_with('.') => Some(event(
            Subsystem::ApprovalRecord {
                category: Some(category.to_string()),
            },
            Some(*category),
            None,
        )),
        ["steering", file] => {
            SteeringKind::from_file_name(file).map(|k| event(Subsystem::Steering(k), None, None))
        }
        _ => None,
    }
}

fn classify_spec<'a>(rest: &[&'a str]) -> Option<(Subsystem, &'a str)> {
    match rest {
        [name] if !name.starts_with('.') => Some((Subsystem::SpecDirectory, *name)),
        [name, file] if !name.starts_with('.') => match DocumentKind::from_file_name(file)? {
            DocumentKind::Tasks => Some((Subsystem::TaskDocument, *name)),
            kind => Some((Subsystem::SpecDocument(kind), *name)),
        },
        _ => None,
    }
}

fn is_record(file: &str) -> bool {
    file.ends_with(".json") && !file.starts_with('.')
}
