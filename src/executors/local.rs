// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Local environment
//!
//! Runs commands through a shell on this machine.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{ExecuteEnvironment, ExecutionRequest, ExecutionResult};
use crate::errors::{ToolflowError, ToolflowResult};
use crate::jobs::{JobHandle, JobState};

/// Local process environment
#[derive(Debug, Clone)]
pub struct LocalEnvironment {
    shell: String,
    capacity: Option<usize>,
    slots: Option<Arc<Semaphore>>,
}

impl LocalEnvironment {
    /// Create an environment that runs commands with `<shell> -c`
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            capacity: None,
            slots: None,
        }
    }

    /// Cap the number of processes spawned at once
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        self.capacity = Some(capacity);
        self.slots = Some(Arc::new(Semaphore::new(capacity)));
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    fn cancelled(job: Option<&JobHandle>) -> ToolflowError {
        ToolflowError::Cancelled {
            job: job.map(|j| j.id().to_string()).unwrap_or_else(|| "local".into()),
        }
    }
}

impl Default for LocalEnvironment {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl ExecuteEnvironment for LocalEnvironment {
    fn name(&self) -> &str {
        "local"
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    async fn check_available(&self) -> ToolflowResult<bool> {
        Ok(which::which(&self.shell).is_ok())
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        job: Option<&JobHandle>,
        cancel: &CancellationToken,
    ) -> ToolflowResult<ExecutionResult> {
        if let Some(job) = job {
            job.set_state(JobState::Queued, None).await?;
        }

        let _permit = match &self.slots {
            Some(slots) => {
                let permit = tokio::select! {
                    permit = slots.clone().acquire_owned() => permit,
                    _ = cancel.cancelled() => return Err(Self::cancelled(job)),
                };
                Some(permit.map_err(|_| ToolflowError::execution(&self.shell, "process slots closed"))?)
            }
            None => None,
        };
        if cancel.is_cancelled() {
            return Err(Self::cancelled(job));
        }
        if let Some(job) = job {
            job.set_state(JobState::Running, None).await?;
        }

        tracing::debug!(command = %request.command, dir = %request.working_dir.display(), "Spawning");
        let start = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&request.command);
        cmd.current_dir(&request.working_dir);
        cmd.envs(&request.environment);
        cmd.kill_on_drop(true);

        let output = tokio::select! {
            output = cmd.output() => output.map_err(|e| ToolflowError::ExecutionFailed {
                tool: self.shell.clone(),
                message: e.to_string(),
                help: Some(format!("Shell '{}' may not be available", self.shell)),
            })?,
            _ = cancel.cancelled() => return Err(Self::cancelled(job)),
        };

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if let Some(job) = job {
            let snapshot = job.snapshot().await?;
            if let Some(ref log) = snapshot.log {
                append(log, &output.stdout).await?;
            }
            if let Some(ref log) = snapshot.error_log {
                append(log, &output.stderr).await?;
            }
        }

        if output.status.success() {
            Ok(ExecutionResult {
                success: true,
                stdout,
                stderr,
                exit_code: 0,
                duration,
            })
        } else {
            let exit_code = output.status.code().unwrap_or(-1);

            Ok(ExecutionResult {
                success: false,
                stdout,
                stderr,
                exit_code,
                duration,
            })
        }
    }
}

async fn append(path: &Path, bytes: &[u8]) -> ToolflowResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    Ok(())
}
