// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Execution callbacks of leaf tools

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{template, Configuration, Tool};
use crate::errors::{ToolflowError, ToolflowResult};
use crate::executors::{ExecutionRequest, ExecutionResult};
use crate::jobs::{JobHandle, MessageLevel};

/// Body of a leaf tool
#[async_trait]
pub trait ExecutionCallback: Send + Sync {
    /// Run with the resolved configuration
    async fn call(&self, configuration: &Configuration, ctx: &ExecutionContext<'_>) -> ToolflowResult<()>;
}

/// Scope a callback runs in
///
/// Bound to the working directory of the run, exposes the templated view
/// of the configuration and reports status to the job that is running,
/// if any.
pub struct ExecutionContext<'a> {
    tool: &'a Tool,
    working_dir: PathBuf,
    configuration: &'a Configuration,
    job: Option<&'a JobHandle>,
    cancel: CancellationToken,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        tool: &'a Tool,
        working_dir: PathBuf,
        configuration: &'a Configuration,
        job: Option<&'a JobHandle>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tool,
            working_dir,
            configuration,
            job,
            cancel,
        }
    }

    pub fn tool(&self) -> &Tool {
        self.tool
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn configuration(&self) -> &Configuration {
        self.configuration
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.configuration.get(name)
    }

    /// Interpolate `${name}` placeholders with configuration values
    pub fn render(&self, template: &str) -> ToolflowResult<String> {
        template::render(template, self.configuration)
    }

    /// Interpolate placeholders as quoted shell words
    pub fn render_command(&self, template: &str) -> ToolflowResult<String> {
        template::render_shell(template, self.configuration)
    }

    pub fn job(&self) -> Option<&JobHandle> {
        self.job
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Report a message to the running job, or to the log without one
    pub async fn message(&self, level: MessageLevel, text: impl Into<String>) -> ToolflowResult<()> {
        let text = text.into();
        match self.job {
            Some(job) => job.message(level, text).await,
            None => {
                tracing::info!(tool = %self.tool.name(), "{}", text);
                Ok(())
            }
        }
    }

    pub async fn progress(&self, progress: i32) -> ToolflowResult<()> {
        match self.job {
            Some(job) => job.set_progress(progress).await,
            None => Ok(()),
        }
    }

    /// Run a command through the tool's execute environment
    ///
    /// A non-zero exit is returned as an `ExecutionFailed` error.
    pub async fn execute(&self, command: &str) -> ToolflowResult<ExecutionResult> {
        let request = ExecutionRequest {
            command: command.to_string(),
            working_dir: self.working_dir.clone(),
            environment: self.tool.env().clone(),
            configuration: self.configuration.clone(),
        };

        let result = self
            .tool
            .environment()
            .execute(request, self.job, &self.cancel)
            .await?;

        if result.success {
            Ok(result)
        } else {
            let stderr = result.stderr.trim();
            Err(ToolflowError::ExecutionFailed {
                tool: self.tool.name().to_string(),
                message: format!("command exited with code {}", result.exit_code),
                help: (!stderr.is_empty()).then(|| last_lines(stderr, 5)),
            })
        }
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Callback that renders a command template and runs it
#[derive(Debug, Clone)]
pub struct CommandCallback {
    template: String,
}

impl CommandCallback {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

#[async_trait]
impl ExecutionCallback for CommandCallback {
    async fn call(&self, _configuration: &Configuration, ctx: &ExecutionContext<'_>) -> ToolflowResult<()> {
        let command = ctx.render_command(&self.template)?;
        let result = ctx.execute(&command).await?;
        if !result.stdout.trim().is_empty() {
            tracing::debug!(tool = %ctx.tool().name(), stdout = %result.stdout.trim(), "Command output");
        }
        Ok(())
    }
}

struct FnCallback<F>(F);

#[async_trait]
impl<F> ExecutionCallback for FnCallback<F>
where
    F: Fn(&Configuration, &ExecutionContext<'_>) -> ToolflowResult<()> + Send + Sync,
{
    async fn call(&self, configuration: &Configuration, ctx: &ExecutionContext<'_>) -> ToolflowResult<()> {
        (self.0)(configuration, ctx)
    }
}

/// Wrap a synchronous closure as an execution callback
pub fn callback_fn<F>(f: F) -> Arc<dyn ExecutionCallback>
where
    F: Fn(&Configuration, &ExecutionContext<'_>) -> ToolflowResult<()> + Send + Sync + 'static,
{
    Arc::new(FnCallback(f))
}
