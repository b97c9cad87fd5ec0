//! Steering documents: project-wide guidance outside any specification.

use crate::error::{Result, WorkflowError};
use crate::paths::{SteeringKind, WorkflowPaths};
use crate::specs::DocumentStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteeringStatus {
    pub exists: bool,
    pub product: DocumentStatus,
    pub tech: DocumentStatus,
    pub structure: DocumentStatus,
}

pub fn steering_status(paths: &WorkflowPaths) -> SteeringStatus {
    let probe = |kind| DocumentStatus::probe(&paths.steering_file(kind));
    SteeringStatus {
        exists: paths.steering_dir().is_dir(),
        product: probe(SteeringKind::Product),
        tech: probe(SteeringKind::Tech),
        structure: probe(SteeringKind::Structure),
    }
}

pub fn read_steering(paths: &WorkflowPaths, kind: SteeringKind) -> Result<String> {
    let path = paths.steering_file(kind);
    std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => WorkflowError::DocumentNotFound(path),
        _ => e.into(),
    })
}
