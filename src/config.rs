// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Runtime settings
//!
//! Loaded from `toolflow.toml`, either given explicitly, in the current
//! directory, or in the user's configuration directory. Every field has a
//! default, so a missing file is not an error.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ToolflowError, ToolflowResult};
use crate::executors::{LocalEnvironment, PollPolicy, RemoteBackend, RemoteEnvironment};

/// File name looked up in the working directory
pub const SETTINGS_FILE: &str = "toolflow.toml";

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of jobs the executor runs at once
    pub max_parallel: usize,

    /// Cancel running siblings as soon as one job fails
    pub fail_fast: bool,

    /// Shell used by the local environment
    pub shell: String,

    /// Cap on processes spawned at once by the local environment
    pub local_capacity: Option<usize>,

    /// First remote poll interval, in milliseconds
    pub poll_initial_ms: u64,

    /// Upper bound of the remote poll interval, in milliseconds
    pub poll_max_ms: u64,

    /// Directory receiving `<job-id>.out` and `<job-id>.err` logs
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_parallel: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            fail_fast: false,
            shell: String::from("bash"),
            local_capacity: None,
            poll_initial_ms: 250,
            poll_max_ms: 5000,
            log_dir: None,
        }
    }
}

impl Settings {
    /// Load settings
    ///
    /// `explicit` must exist when given. Otherwise `./toolflow.toml` and
    /// then the user configuration file are tried. Environment overrides
    /// are applied last.
    pub fn load(explicit: Option<&Path>, working_dir: &Path) -> ToolflowResult<Self> {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::candidates(working_dir).into_iter().find(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Parse a settings file
    pub fn from_file(path: &Path) -> ToolflowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ToolflowError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let settings: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        settings.validate()
    }

    fn candidates(working_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![working_dir.join(SETTINGS_FILE)];
        if let Some(dirs) = ProjectDirs::from("", "", "toolflow") {
            paths.push(dirs.config_dir().join("config.toml"));
        }
        paths
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> ToolflowResult<()> {
        if let Some(value) = var("TOOLFLOW_MAX_PARALLEL") {
            self.max_parallel = value.trim().parse().map_err(|_| {
                ToolflowError::configuration(format!("TOOLFLOW_MAX_PARALLEL is not a number: {value}"))
            })?;
        }
        if let Some(value) = var("TOOLFLOW_FAIL_FAST") {
            self.fail_fast = matches!(value.trim(), "1" | "true" | "yes" | "on");
        }
        *self = std::mem::take(self).validate()?;
        Ok(())
    }

    fn validate(self) -> ToolflowResult<Self> {
        if self.max_parallel == 0 {
            return Err(ToolflowError::configuration("max_parallel must be at least 1"));
        }
        if self.local_capacity == Some(0) {
            return Err(ToolflowError::configuration("local_capacity must be at least 1"));
        }
        if self.shell.trim().is_empty() {
            return Err(ToolflowError::configuration("shell must not be empty"));
        }
        Ok(self)
    }

    /// Local environment configured by these settings
    pub fn local_environment(&self) -> LocalEnvironment {
        let env = LocalEnvironment::new(&self.shell);
        match self.local_capacity {
            Some(capacity) => env.with_capacity(capacity),
            None => env,
        }
    }

    /// Poll schedule for remote environments
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_initial_ms),
            Duration::from_millis(self.poll_max_ms),
        )
    }

    /// Remote environment over `backend`, polling on these settings' schedule
    pub fn remote_environment<B: RemoteBackend>(&self, backend: B) -> RemoteEnvironment<B> {
        RemoteEnvironment::new(backend).with_policy(self.poll_policy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::ExecuteEnvironment;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.max_parallel >= 1);
        assert!(!settings.fail_fast);
        assert_eq!(settings.shell, "bash");
        assert_eq!(settings.poll_policy(), PollPolicy::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "max_parallel = 3\nlocal_capacity = 2\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();

        assert_eq!(settings.max_parallel, 3);
        assert_eq!(settings.shell, "bash");
        assert_eq!(settings.local_environment().capacity(), Some(2));
    }

    #[test]
    fn test_working_dir_file_is_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "shell = \"sh\"\n").unwrap();

        let settings = Settings::load(None, dir.path()).unwrap();

        assert_eq!(settings.shell, "sh");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(Some(&dir.path().join("nope.toml")), dir.path());
        assert!(matches!(result, Err(ToolflowError::Configuration { .. })));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "max_parallel = 0\n").unwrap();
        assert!(Settings::from_file(&path).is_err());

        std::fs::write(&path, "max_parallel = \"many\"\n").unwrap();
        assert!(matches!(Settings::from_file(&path), Err(ToolflowError::Toml { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("TOOLFLOW_MAX_PARALLEL", "2"), ("TOOLFLOW_FAIL_FAST", "true")]);
        let mut settings = Settings::default();

        settings
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.max_parallel, 2);
        assert!(settings.fail_fast);

        let mut settings = Settings::default();
        let err = settings.apply_env(|key| (key == "TOOLFLOW_MAX_PARALLEL").then(|| "lots".to_string()));
        assert!(err.is_err());
    }
}
