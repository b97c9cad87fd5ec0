//! Read-through projections of specification bundles.

use crate::error::{Result, WorkflowError};
use crate::io::modified_time;
use crate::paths::{DocumentKind, SpecLocation, WorkflowPaths};
use crate::tasks::{self, ParsedTasks};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatus {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl DocumentStatus {
    pub(crate) fn probe(path: &std::path::Path) -> Self {
        let last_modified = modified_time(path);
        Self {
            exists: last_modified.is_some(),
            last_modified,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDocuments {
    pub requirements: DocumentStatus,
    pub design: DocumentStatus,
    pub tasks: DocumentStatus,
}

impl SpecDocuments {
    pub fn get(&self, kind: DocumentKind) -> &DocumentStatus {
        match kind {
            DocumentKind::Requirements => &self.requirements,
            DocumentKind::Design => &self.design,
            DocumentKind::Tasks => &self.tasks,
        }
    }

    fn present_times(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        DocumentKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).last_modified)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}

impl From<&ParsedTasks> for TaskProgress {
    fn from(parsed: &ParsedTasks) -> Self {
        Self {
            total: parsed.summary.total,
            completed: parsed.summary.completed,
            pending: parsed.summary.total - parsed.summary.completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecSummary {
    pub name: String,
    pub display_name: String,
    pub location: SpecLocation,
    pub created_at: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub documents: SpecDocuments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_progress: Option<TaskProgress>,
}

/// `user-auth_flow` -> `User Auth Flow`.
pub fn display_name(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn read_document(
    paths: &WorkflowPaths,
    name: &str,
    location: SpecLocation,
    kind: DocumentKind,
) -> Result<String> {
    let path = paths.document_file(name, location, kind)?;
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(WorkflowError::DocumentNotFound(path))
        }
        Err(e) => Err(e.into()),
    }
}

/// Parsed task document of a spec; a missing document reads as empty.
pub fn read_tasks(paths: &WorkflowPaths, name: &str, location: SpecLocation) -> Result<ParsedTasks> {
    match read_document(paths, name, location, DocumentKind::Tasks) {
        Ok(text) => Ok(tasks::parse(&text)),
        Err(WorkflowError::DocumentNotFound(_)) => Ok(ParsedTasks::default()),
        Err(e) => Err(e),
    }
}

pub fn summarize(paths: &WorkflowPaths, name: &str, location: SpecLocation) -> Result<SpecSummary> {
    let dir = paths.spec_dir(name, location)?;
    if !dir.is_dir() {
        return Err(WorkflowError::SpecNotFound(name.to_string()));
    }

    let documents = SpecDocuments {
        requirements: DocumentStatus::probe(&dir.join(DocumentKind::Requirements.file_name())),
        design: DocumentStatus::probe(&dir.join(DocumentKind::Design.file_name())),
        tasks: DocumentStatus::probe(&dir.join(DocumentKind::Tasks.file_name())),
    };
    let task_progress = if documents.tasks.exists {
        Some(TaskProgress::from(&read_tasks(paths, name, location)?))
    } else {
        None
    };

    Ok(SpecSummary {
        name: name.to_string(),
        display_name: display_name(name),
        location,
        created_at: documents.present_times().min(),
        last_modified: documents.present_times().max(),
        documents,
        task_progress,
    })
}

/// Every spec under one root, most recently modified first. A spec that
/// cannot be read is logged and left out.
pub fn list_specs(paths: &WorkflowPaths, location: SpecLocation) -> Result<Vec<SpecSummary>> {
    let mut specs = Vec::new();
    for name in paths.list_spec_dirs(location)? {
        match summarize(paths, &name, location) {
            Ok(summary) => specs.push(summary),
            Err(e) => {
                warn!(spec = %name, location = %location, error = %e, "Skipping unreadable specification");
            }
        }
    }
    specs.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WorkflowPaths) {
        let temp = TempDir::new().unwrap();
        let paths = WorkflowPaths::new(temp.path());
        (temp, paths)
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("user-auth_flow"), "User Auth Flow");
        assert_eq!(display_name("api"), "Api");
        assert_eq!(display_name("--x--"), "X");
    }

    #[test]
    fn test_summarize_spec_bundle() {
        let (_temp, paths) = setup();
        let dir = paths.specs_dir().join("user-auth");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("requirements.md"), "# Requirements").unwrap();
        fs::write(
            dir.join("tasks.md"),
            "- [x] 1. Setup\n- [-] 2. Build\n- [ ] 3. Ship\n",
        )
        .unwrap();

        let summary = summarize(&paths, "user-auth", SpecLocation::Active).unwrap();
        assert_eq!(summary.display_name, "User Auth");
        assert!(summary.documents.requirements.exists);
        assert!(!summary.documents.design.exists);
        assert!(summary.documents.tasks.exists);
        assert_eq!(
            summary.task_progress,
            Some(TaskProgress {
                total: 3,
                completed: 1,
                pending: 2,
            })
        );
        assert!(summary.created_at <= summary.last_modified);
        assert_eq!(
            summary.last_modified,
            [
                summary.documents.requirements.last_modified,
                summary.documents.tasks.last_modified
            ]
            .into_iter()
            .max()
            .flatten()
        );
    }

    #[test]
    fn test_summarize_empty_and_missing() {
        let (_temp, paths) = setup();
        fs::create_dir_all(paths.specs_dir().join("empty")).unwrap();
        let summary = summarize(&paths, "empty", SpecLocation::Active).unwrap();
        assert_eq!(summary.created_at, None);
        assert_eq!(summary.task_progress, None);

        assert!(matches!(
            summarize(&paths, "nope", SpecLocation::Active),
            Err(WorkflowError::SpecNotFound(_))
        ));
    }

    #[test]
    fn test_list_specs_by_location() {
        let (_temp, paths) = setup();
        fs::create_dir_all(paths.specs_dir().join("a")).unwrap();
        fs::create_dir_all(paths.specs_dir().join("b")).unwrap();
        fs::create_dir_all(paths.archive_specs_dir().join("old")).unwrap();

        let active = list_specs(&paths, SpecLocation::Active).unwrap();
        assert_eq!(active.len(), 2);
        let archived = list_specs(&paths, SpecLocation::Archived).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].location, SpecLocation::Archived);
    }

    #[test]
    fn test_read_tasks_missing_document() {
        let (_temp, paths) = setup();
        fs::create_dir_all(paths.specs_dir().join("a")).unwrap();
        let parsed = read_tasks(&paths, "a", SpecLocation::Active).unwrap();
        assert!(parsed.tasks.is_empty());
        assert!(matches!(
            read_document(&paths, "a", SpecLocation::Active, DocumentKind::Design),
            Err(WorkflowError::DocumentNotFound(_))
        ));
    }
}
