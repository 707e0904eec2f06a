// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Execute environments
//!
//! An environment decides where and how a resolved command actually runs:
//! as a local process or as a job submitted to a remote system. The core
//! never assumes an environment is synchronous.

mod local;
mod remote;

pub use local::LocalEnvironment;
pub use remote::{PollPolicy, RemoteBackend, RemoteEnvironment, RemoteStatus};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::ToolflowResult;
use crate::jobs::JobHandle;
use crate::tools::Configuration;

/// Everything an environment needs to run one command
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Command line, already rendered from the tool's template
    pub command: String,

    /// Directory the command runs in
    pub working_dir: PathBuf,

    /// Environment variables
    pub environment: HashMap<String, String>,

    /// Resolved tool configuration
    pub configuration: Configuration,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>, working_dir: PathBuf) -> Self {
        Self {
            command: command.into(),
            working_dir,
            environment: HashMap::new(),
            configuration: Configuration::new(),
        }
    }
}

/// Result of running a command
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether execution succeeded
    pub success: bool,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code
    pub exit_code: i32,

    /// Execution duration
    pub duration: Duration,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(stdout: String, duration: Duration) -> Self {
        Self {
            success: true,
            stdout,
            stderr: String::new(),
            exit_code: 0,
            duration,
        }
    }

    /// Create a failed result
    pub fn failure(stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
            exit_code,
            duration,
        }
    }
}

/// Trait for execute environments
#[async_trait]
pub trait ExecuteEnvironment: Send + Sync + std::fmt::Debug {
    /// Name recorded on the jobs this environment runs
    fn name(&self) -> &str;

    /// Maximum number of commands run at once, if bounded
    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Check if the environment can run anything at all
    async fn check_available(&self) -> ToolflowResult<bool>;

    /// Run a command
    ///
    /// When a job is given, the environment reports `QUEUED`/`RUNNING`
    /// transitions and any remote id into it. The final state is left to
    /// the caller. Must return `Cancelled` promptly once `cancel` fires.
    async fn execute(
        &self,
        request: ExecutionRequest,
        job: Option<&JobHandle>,
        cancel: &CancellationToken,
    ) -> ToolflowResult<ExecutionResult>;
}
