//! Moving specifications between the active and archive roots.

use crate::approvals::ApprovalStore;
use crate::error::{Result, WorkflowError};
use crate::paths::{SpecLocation, WorkflowPaths, validate_spec_name};
use std::fs;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ArchiveManager {
    paths: WorkflowPaths,
    approvals: ApprovalStore,
}

impl ArchiveManager {
    pub fn new(approvals: ApprovalStore) -> Self {
        Self {
            paths: approvals.paths().clone(),
            approvals,
        }
    }

    /// Where `name` currently lives, or `None` if it is in neither root.
    pub fn locate(&self, name: &str) -> Result<Option<SpecLocation>> {
        validate_spec_name(name)?;
        for location in [SpecLocation::Active, SpecLocation::Archived] {
            if self.paths.spec_dir(name, location)?.is_dir() {
                return Ok(Some(location));
            }
        }
        Ok(None)
    }

    /// Moves an active spec into the archive root.
    ///
    /// Refused while any approval for the spec is still pending. Every check
    /// runs before the move, so a refused call leaves the tree untouched.
    pub fn archive(&self, name: &str) -> Result<()> {
        validate_spec_name(name)?;
        let from = self.paths.spec_dir(name, SpecLocation::Active)?;
        let to = self.paths.spec_dir(name, SpecLocation::Archived)?;

        if to.exists() {
            return Err(WorkflowError::AlreadyArchived(name.to_string()));
        }
        if !from.is_dir() {
            return Err(WorkflowError::SpecNotFound(name.to_string()));
        }
        let pending = self.approvals.pending_for(name)?;
        if !pending.is_empty() {
            return Err(WorkflowError::PendingApprovalsExist {
                name: name.to_string(),
                count: pending.len(),
            });
        }

        fs::create_dir_all(self.paths.archive_specs_dir())?;
        fs::rename(&from, &to)?;
        info!(spec = %name, "Archived specification");
        Ok(())
    }

    /// Moves an archived spec back into the active root.
    pub fn unarchive(&self, name: &str) -> Result<()> {
        validate_spec_name(name)?;
        let from = self.paths.spec_dir(name, SpecLocation::Archived)?;
        let to = self.paths.spec_dir(name, SpecLocation::Active)?;

        if to.exists() {
            return Err(WorkflowError::AlreadyActive(name.to_string()));
        }
        if !from.is_dir() {
            return Err(WorkflowError::SpecNotFound(name.to_string()));
        }

        fs::create_dir_all(self.paths.specs_dir())?;
        fs::rename(&from, &to)?;
        info!(spec = %name, "Unarchived specification");
        Ok(())
    }
}
