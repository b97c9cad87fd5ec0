//! Runtime settings for the reviewer surfaces.
//!
//! Values are layered: built-in defaults, then `<workflow>/config.toml`, then
//! `SPECFLOW_*` environment variables. Command-line flags are applied on top
//! by the binaries.

use crate::error::{Result, WorkflowError};
use crate::paths::WorkflowPaths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const ENV_PORT: &str = "SPECFLOW_PORT";
pub const ENV_BIND: &str = "SPECFLOW_BIND";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    /// Messages queued per observer before pushes to it start failing.
    pub observer_buffer: usize,
    /// Classified filesystem events queued between the watcher and the hub.
    pub watch_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind: "127.0.0.1".to_string(),
            observer_buffer: 64,
            watch_buffer: 256,
        }
    }
}

impl Config {
    /// Defaults overlaid with the workflow's `config.toml` and the process
    /// environment.
    pub fn load(paths: &WorkflowPaths) -> Result<Self> {
        let mut config = Self::from_file(&paths.config_file())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Reads a TOML file; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| WorkflowError::Config(format!("{}: {e}", path.display())))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| WorkflowError::Config(format!("{ENV_PORT}={port:?} is not a port")))?;
        }
        if let Some(bind) = lookup(ENV_BIND)
            && !bind.trim().is_empty()
        {
            self.bind = bind.trim().to_string();
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
