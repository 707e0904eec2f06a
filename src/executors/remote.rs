// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Remote environment
//!
//! Submits commands to a remote system and polls until they finish. The
//! submission protocol lives behind [`RemoteBackend`]; this module only
//! handles the waiting, which backs off exponentially and stays
//! responsive to cancellation.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::{ExecuteEnvironment, ExecutionRequest, ExecutionResult};
use crate::errors::{ToolflowError, ToolflowResult};
use crate::jobs::{JobHandle, JobState};

/// State of a remote job as reported by its backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub state: JobState,
    pub progress: Option<i32>,
    pub exit_code: Option<i32>,
    /// Output or diagnostic text, if the backend provides any
    pub message: Option<String>,
}

impl RemoteStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            progress: None,
            exit_code: None,
            message: None,
        }
    }
}

/// Submission protocol of a remote system
#[async_trait]
pub trait RemoteBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Submit a command, returning the remote id
    async fn submit(&self, request: &ExecutionRequest) -> ToolflowResult<String>;

    /// Current status of a submitted job
    async fn poll(&self, remote_id: &str) -> ToolflowResult<RemoteStatus>;

    /// Ask the remote system to stop a job
    async fn cancel(&self, remote_id: &str) -> ToolflowResult<()>;

    async fn check_available(&self) -> ToolflowResult<bool> {
        Ok(true)
    }
}

/// Poll interval schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl PollPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            factor: 2,
        }
    }

    /// Interval following `current`
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(self.factor.max(1)).min(self.max)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(5))
    }
}

/// Environment that runs commands on a remote backend
#[derive(Debug)]
pub struct RemoteEnvironment<B> {
    backend: B,
    policy: PollPolicy,
}

impl<B: RemoteBackend> RemoteEnvironment<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    async fn abort(&self, remote_id: &str, job: Option<&JobHandle>) -> ToolflowError {
        if let Err(e) = self.backend.cancel(remote_id).await {
            tracing::warn!(remote_id, error = %e, "Failed to cancel remote job");
        }
        ToolflowError::Cancelled {
            job: job.map(|j| j.id().to_string()).unwrap_or_else(|| remote_id.to_string()),
        }
    }
}

#[async_trait]
impl<B: RemoteBackend> ExecuteEnvironment for RemoteEnvironment<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn check_available(&self) -> ToolflowResult<bool> {
        self.backend.check_available().await
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        job: Option<&JobHandle>,
        cancel: &CancellationToken,
    ) -> ToolflowResult<ExecutionResult> {
        let start = Instant::now();
        let remote_id = self
            .backend
            .submit(&request)
            .await
            .map_err(|e| e.into_execution_failure(self.backend.name()))?;
        tracing::info!(backend = self.backend.name(), remote_id = %remote_id, "Submitted remote job");

        if let Some(job) = job {
            job.set_remote_id(&remote_id).await?;
            job.set_state(JobState::Queued, None).await?;
        }

        let mut delay = self.policy.initial;
        let mut last_state = JobState::Queued;
        let status = loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(self.abort(&remote_id, job).await),
            }

            let status = self
                .backend
                .poll(&remote_id)
                .await
                .map_err(|e| e.into_execution_failure(self.backend.name()))?;

            if let Some(job) = job {
                if !status.state.is_terminal() {
                    job.set_state(status.state, None).await?;
                }
                if let Some(progress) = status.progress {
                    job.set_progress(progress).await?;
                }
            }
            if status.state.is_terminal() {
                break status;
            }

            // back off while nothing changes, start over when something does
            delay = if status.state == last_state {
                self.policy.next(delay)
            } else {
                self.policy.initial
            };
            last_state = status.state;
        };

        let duration = start.elapsed();
        let text = status.message.unwrap_or_default();
        match status.state {
            JobState::Done => Ok(ExecutionResult::success(text, duration)),
            JobState::Canceled => Err(ToolflowError::Cancelled {
                job: job.map(|j| j.id().to_string()).unwrap_or(remote_id),
            }),
            _ => Ok(ExecutionResult::failure(
                text,
                status.exit_code.unwrap_or(-1),
                duration,
            )),
        }
    }
}
