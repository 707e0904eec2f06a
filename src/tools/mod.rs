// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Tools
//!
//! A [`Tool`] is either a leaf, run by an execution callback, or a
//! composite whose pipeline expands into a graph of other tools. Both kinds
//! resolve their file parameters before doing anything else.

mod callback;
mod parameter;
pub mod resolver;
pub mod template;

pub use callback::{callback_fn, CommandCallback, ExecutionCallback, ExecutionContext};
pub use parameter::{Parameter, Parameters};

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RunContext;
use crate::errors::{ToolflowError, ToolflowResult};
use crate::executors::{ExecuteEnvironment, LocalEnvironment};
use crate::jobs::JobHandle;
use crate::pipeline::{PipelineExecutor, PipelineGraph};

/// Tool configuration: parameter name to value
pub type Configuration = BTreeMap<String, Value>;

/// Boxed future returned by [`Tool::run`]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a tool does when run
#[derive(Clone)]
pub enum ToolKind {
    /// Runs an execution callback
    Leaf(Arc<dyn ExecutionCallback>),
    /// Expands into a pipeline; holds the raw pipeline spec handed to the evaluator
    Composite(Value),
}

impl std::fmt::Debug for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf(_) => f.write_str("Leaf"),
            Self::Composite(spec) => f.debug_tuple("Composite").field(spec).finish(),
        }
    }
}

/// A named, versioned runnable unit
#[derive(Debug, Clone)]
pub struct Tool {
    name: String,
    version: Option<String>,
    description: Option<String>,
    parameters: Parameters,
    default_input: Option<String>,
    default_output: Option<String>,
    installer: Vec<String>,
    env: HashMap<String, String>,
    environment: Arc<dyn ExecuteEnvironment>,
    kind: ToolKind,
}

impl Tool {
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn default_input(&self) -> Option<&str> {
        self.default_input.as_deref()
    }

    pub fn default_output(&self) -> Option<&str> {
        self.default_output.as_deref()
    }

    /// Dependencies needed to install the tool, informational only
    pub fn installer(&self) -> &[String] {
        &self.installer
    }

    /// Environment variables set for every run
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn environment(&self) -> &Arc<dyn ExecuteEnvironment> {
        &self.environment
    }

    pub fn kind(&self) -> &ToolKind {
        &self.kind
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, ToolKind::Composite(_))
    }

    /// Run the tool
    ///
    /// File parameters in `configuration` are made absolute against
    /// `working_dir` (the current directory when `None`) first. With an
    /// empty configuration the directory is passed on as given, `.` when
    /// `None`, without looking up the current directory. A leaf
    /// tool then invokes its callback; a composite tool evaluates its
    /// pipeline, expands and reduces the graph, and runs every node
    /// through `context`. Status reports go to `job` when given.
    pub fn run<'a>(
        &'a self,
        context: Option<&'a RunContext>,
        working_dir: Option<&'a Path>,
        configuration: &'a Configuration,
        job: Option<&'a JobHandle>,
    ) -> BoxFuture<'a, ToolflowResult<()>> {
        Box::pin(async move {
            let (working_dir, configuration) = if configuration.is_empty() {
                let dir = working_dir.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
                (dir, Configuration::new())
            } else {
                let dir = resolver::working_directory(working_dir)?;
                let configuration = resolver::resolve(Some(&dir), &self.parameters, configuration)?;
                (dir, configuration)
            };

            match &self.kind {
                ToolKind::Leaf(callback) => {
                    self.run_leaf(callback.as_ref(), context, working_dir, &configuration, job)
                        .await
                }
                ToolKind::Composite(spec) => {
                    let context = context.ok_or_else(|| ToolflowError::MissingContext {
                        tool: self.name.clone(),
                    })?;
                    self.run_pipeline(spec, context, &working_dir, &configuration, job)
                        .await
                }
            }
        })
    }

    async fn run_leaf(
        &self,
        callback: &dyn ExecutionCallback,
        context: Option<&RunContext>,
        working_dir: PathBuf,
        configuration: &Configuration,
        job: Option<&JobHandle>,
    ) -> ToolflowResult<()> {
        let cancel = context.map(|c| c.cancel_token().clone()).unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(ToolflowError::Cancelled {
                job: job.map(|j| j.id().to_string()).unwrap_or_else(|| self.name.clone()),
            });
        }

        tracing::debug!(tool = %self.name, dir = %working_dir.display(), "Running tool");
        let ctx = ExecutionContext::new(self, working_dir, configuration, job, cancel);
        callback
            .call(configuration, &ctx)
            .await
            .map_err(|e| e.into_execution_failure(&self.name))
    }

    async fn run_pipeline(
        &self,
        spec: &Value,
        context: &RunContext,
        working_dir: &Path,
        configuration: &Configuration,
        job: Option<&JobHandle>,
    ) -> ToolflowResult<()> {
        let description = context
            .evaluator()
            .evaluate(&self.name, spec, configuration)?;
        let mut graph = PipelineGraph::prepare(
            &description,
            context.tools(),
            context.evaluator(),
            Some(working_dir),
        )?;
        graph.reduce_dependencies()?;

        let result = PipelineExecutor::new(context.clone())
            .execute(&graph, working_dir, job)
            .await?;

        if result.success {
            Ok(())
        } else if context.cancel_token().is_cancelled() {
            Err(ToolflowError::Cancelled {
                job: job.map(|j| j.id().to_string()).unwrap_or_else(|| self.name.clone()),
            })
        } else {
            Err(ToolflowError::execution(&self.name, result.failure_summary()))
        }
    }
}

/// Builder for [`Tool`]
///
/// Exactly one of [`callback`](Self::callback) and
/// [`pipeline`](Self::pipeline) must be set.
pub struct ToolBuilder {
    name: String,
    version: Option<String>,
    description: Option<String>,
    parameters: Parameters,
    default_input: Option<String>,
    default_output: Option<String>,
    installer: Vec<String>,
    env: HashMap<String, String>,
    environment: Option<Arc<dyn ExecuteEnvironment>>,
    callback: Option<Arc<dyn ExecutionCallback>>,
    pipeline: Option<Value>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            parameters: Parameters::new(),
            default_input: None,
            default_output: None,
            installer: Vec::new(),
            env: HashMap::new(),
            environment: None,
            callback: None,
            pipeline: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.insert(parameter.name.clone(), parameter);
        self
    }

    pub fn parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        for parameter in parameters {
            self = self.parameter(parameter);
        }
        self
    }

    pub fn default_input(mut self, name: impl Into<String>) -> Self {
        self.default_input = Some(name.into());
        self
    }

    pub fn default_output(mut self, name: impl Into<String>) -> Self {
        self.default_output = Some(name.into());
        self
    }

    pub fn installer(mut self, installer: Vec<String>) -> Self {
        self.installer = installer;
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn environment(mut self, environment: Arc<dyn ExecuteEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn callback(mut self, callback: Arc<dyn ExecutionCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn pipeline(mut self, spec: Value) -> Self {
        self.pipeline = Some(spec);
        self
    }

    pub fn build(self) -> ToolflowResult<Tool> {
        let invalid = |reason: &str| ToolflowError::InvalidTool {
            tool: self.name.clone(),
            reason: reason.to_string(),
        };

        let kind = match (self.callback.clone(), self.pipeline.clone()) {
            (Some(callback), None) => ToolKind::Leaf(callback),
            (None, Some(spec)) => ToolKind::Composite(spec),
            (None, None) => return Err(invalid("neither an execution callback nor a pipeline is defined")),
            (Some(_), Some(_)) => return Err(invalid("both an execution callback and a pipeline are defined")),
        };

        for (role, name) in [("input", &self.default_input), ("output", &self.default_output)] {
            if let Some(name) = name {
                if !self.parameters.contains_key(name) {
                    return Err(invalid(&format!("default {role} '{name}' is not a parameter")));
                }
            }
        }

        Ok(Tool {
            name: self.name,
            version: self.version,
            description: self.description,
            parameters: self.parameters,
            default_input: self.default_input,
            default_output: self.default_output,
            installer: self.installer,
            env: self.env,
            environment: self
                .environment
                .unwrap_or_else(|| Arc::new(LocalEnvironment::default())),
            kind,
        })
    }
}

/// Tools by name
///
/// Read-only while a run is in progress, so it is shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; names must be unique
    pub fn register(&mut self, tool: Tool) -> ToolflowResult<()> {
        if self.tools.contains_key(tool.name()) {
            return Err(ToolflowError::InvalidTool {
                tool: tool.name().to_string(),
                reason: "a tool with this name is already registered".into(),
            });
        }
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tool>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
