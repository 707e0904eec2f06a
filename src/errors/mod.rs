// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Error types
//!
//! Every failure the core can raise, from graph expansion through job
//! execution, is a variant of [`ToolflowError`]. Variants carry a miette
//! diagnostic code and, where we know one, a hint on how to fix it.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for toolflow operations
pub type ToolflowResult<T> = Result<T, ToolflowError>;

/// Main error type for toolflow
#[derive(Error, Debug, Diagnostic)]
pub enum ToolflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Tool Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline job '{job}' references unknown tool '{tool}'")]
    #[diagnostic(
        code(toolflow::unknown_tool),
        help("Check that '{tool}' is declared in the tool manifest")
    )]
    UnknownTool { job: String, tool: String },

    #[error("Tool '{tool}' not found in registry")]
    #[diagnostic(
        code(toolflow::tool_not_found),
        help("The tool disappeared between expansion and execution; is the registry shared?")
    )]
    ToolNotFound { tool: String },

    #[error("Tool '{tool}' is invalid: {reason}")]
    #[diagnostic(code(toolflow::invalid_tool))]
    InvalidTool { tool: String, reason: String },

    #[error("No run context available for tool '{tool}'; unable to evaluate and run its pipeline")]
    #[diagnostic(
        code(toolflow::missing_context),
        help("Composite tools must be run with a RunContext that carries the tool registry and evaluator")
    )]
    MissingContext { tool: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cyclic pipeline: {}", cycle.join(" -> "))]
    #[diagnostic(
        code(toolflow::cyclic_pipeline),
        help("Review job dependencies and composite tool references to remove the cycle")
    )]
    CyclicPipeline { cycle: Vec<String> },

    #[error("Pipeline job '{job}' depends on unknown job '{dependency}'")]
    #[diagnostic(
        code(toolflow::unknown_dependency),
        help("Check that '{dependency}' is defined in the same pipeline")
    )]
    UnknownDependency { job: String, dependency: String },

    #[error("Pipeline job id '{job}' is used more than once")]
    #[diagnostic(code(toolflow::duplicate_job))]
    DuplicateJob { job: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(toolflow::configuration))]
    Configuration { message: String },

    #[error("Tool manifest not found: {path}")]
    #[diagnostic(
        code(toolflow::manifest_not_found),
        help("Create a toolflow.yaml or point to one with --manifest")
    )]
    ManifestNotFound { path: PathBuf },

    #[error("Invalid tool manifest: {reason}")]
    #[diagnostic(code(toolflow::invalid_manifest))]
    InvalidManifest {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Tool '{tool}' execution failed: {message}")]
    #[diagnostic(code(toolflow::execution_failed))]
    ExecutionFailed {
        tool: String,
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Job '{job}' not found")]
    #[diagnostic(code(toolflow::job_not_found))]
    JobNotFound { job: String },

    #[error("Job '{job}' was canceled")]
    #[diagnostic(code(toolflow::cancelled))]
    Cancelled { job: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(toolflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(toolflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(toolflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(toolflow::toml_error))]
    Toml { message: String },
}

impl From<std::io::Error> for ToolflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for ToolflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for ToolflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for ToolflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl ToolflowError {
    /// Shorthand for a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap an arbitrary failure raised while executing `tool`
    pub fn execution(tool: &str, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool: tool.to_string(),
            message: message.into(),
            help: None,
        }
    }

    /// Whether this is one of the two tool lookup failures
    pub fn is_unknown_tool(&self) -> bool {
        matches!(self, Self::UnknownTool { .. } | Self::ToolNotFound { .. })
    }

    /// Whether this error is the result of a cancellation request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Wrap a failure raised inside a tool, leaving cancellations and
    /// already-wrapped execution failures untouched
    pub fn into_execution_failure(self, tool: &str) -> Self {
        match self {
            e @ (Self::Cancelled { .. } | Self::ExecutionFailed { .. }) => e,
            other => Self::execution(tool, other.to_string()),
        }
    }
}
