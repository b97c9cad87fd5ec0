//! Layout of the workflow tree on disk.
//!
//! ```text
//! <project>/.spec-workflow/
//! ├── specs/<name>/{requirements,design,tasks}.md
//! ├── archive/specs/<name>/{requirements,design,tasks}.md
//! ├── approvals/<category>/<id>.json
//! ├── approvals/<id>.json                 (legacy flat layout, read only)
//! ├── steering/{product,tech,structure}.md
//! └── config.toml
//! ```

use crate::error::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const WORKFLOW_DIR_NAME: &str = ".spec-workflow";

/// Which of the two parallel roots holds a specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecLocation {
    Active,
    Archived,
}

impl fmt::Display for SpecLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecLocation::Active => write!(f, "active"),
            SpecLocation::Archived => write!(f, "archived"),
        }
    }
}

/// One of the three documents a specification bundle may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Requirements,
    Design,
    Tasks,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Requirements,
        DocumentKind::Design,
        DocumentKind::Tasks,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            DocumentKind::Requirements => "requirements.md",
            DocumentKind::Design => "design.md",
            DocumentKind::Tasks => "tasks.md",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.file_name() == name)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Requirements => write!(f, "requirements"),
            DocumentKind::Design => write!(f, "design"),
            DocumentKind::Tasks => write!(f, "tasks"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_end_matches(".md") {
            "requirements" => Ok(DocumentKind::Requirements),
            "design" => Ok(DocumentKind::Design),
            "tasks" => Ok(DocumentKind::Tasks),
            other => Err(WorkflowError::InvalidDocument(format!(
                "unknown document kind {other:?}"
            ))),
        }
    }
}

/// Project-wide guidance documents that live outside any specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SteeringKind {
    Product,
    Tech,
    Structure,
}

impl SteeringKind {
    pub const ALL: [SteeringKind; 3] = [
        SteeringKind::Product,
        SteeringKind::Tech,
        SteeringKind::Structure,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            SteeringKind::Product => "product.md",
            SteeringKind::Tech => "tech.md",
            SteeringKind::Structure => "structure.md",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.file_name() == name)
    }
}

impl FromStr for SteeringKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_file_name(&format!("{}.md", s.trim_end_matches(".md"))).ok_or_else(|| {
            WorkflowError::InvalidDocument(format!("unknown steering document {s:?}"))
        })
    }
}

/// Rejects names that could escape the specs root.
pub fn validate_spec_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(WorkflowError::InvalidSpecName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct WorkflowPaths {
    project_dir: PathBuf,
    workflow_dir: Option<PathBuf>,
}

impl WorkflowPaths {
    pub fn new<P: Into<PathBuf>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.into(),
            workflow_dir: None,
        }
    }

    /// Overrides the workflow root (defaults to `<project>/.spec-workflow`).
    pub fn with_workflow_dir<P: Into<PathBuf>>(mut self, workflow_dir: P) -> Self {
        self.workflow_dir = Some(workflow_dir.into());
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn workflow_dir(&self) -> PathBuf {
        match self.workflow_dir {
            Some(ref dir) => dir.clone(),
            None => self.project_dir.join(WORKFLOW_DIR_NAME),
        }
    }

    pub fn specs_dir(&self) -> PathBuf {
        self.workflow_dir().join("specs")
    }

    pub fn archive_specs_dir(&self) -> PathBuf {
        self.workflow_dir().join("archive").join("specs")
    }

    pub fn approvals_dir(&self) -> PathBuf {
        self.workflow_dir().join("approvals")
    }

    pub fn steering_dir(&self) -> PathBuf {
        self.workflow_dir().join("steering")
    }

    pub fn config_file(&self) -> PathBuf {
        self.workflow_dir().join("config.toml")
    }

    pub fn root_for(&self, location: SpecLocation) -> PathBuf {
        match location {
            SpecLocation::Active => self.specs_dir(),
            SpecLocation::Archived => self.archive_specs_dir(),
        }
    }

    pub fn spec_dir(&self, name: &str, location: SpecLocation) -> Result<PathBuf> {
        validate_spec_name(name)?;
        Ok(self.root_for(location).join(name))
    }

    pub fn document_file(
        &self,
        name: &str,
        location: SpecLocation,
        kind: DocumentKind,
    ) -> Result<PathBuf> {
        Ok(self.spec_dir(name, location)?.join(kind.file_name()))
    }

    pub fn steering_file(&self, kind: SteeringKind) -> PathBuf {
        self.steering_dir().join(kind.file_name())
    }

    /// Names of the specification directories under one root, sorted.
    pub fn list_spec_dirs(&self, location: SpecLocation) -> Result<Vec<String>> {
        let root = self.root_for(location);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self) -> bool {
        self.workflow_dir().exists()
    }
}
