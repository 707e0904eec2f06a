// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for toolflow.

pub mod graph;
pub mod run;
pub mod tools;
pub mod validate;

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::errors::{ToolflowError, ToolflowResult};
use crate::manifest::Manifest;
use crate::pipeline::{PipelineDescription, PipelineEvaluator, PipelineGraph, PipelineJob, TemplateEvaluator};
use crate::tools::{Configuration, Tool, ToolKind, ToolRegistry};

/// Tool and pipeline runner
///
/// Runs tools declared in a manifest, expanding composite tools into
/// job graphs.
#[derive(Parser, Debug)]
#[clap(
    name = "toolflow",
    version,
    about = "Run tools and composite pipelines declared in toolflow.yaml",
    long_about = None,
    after_help = "Examples:\n\
        toolflow tools                          List declared tools\n\
        toolflow validate                       Check the manifest\n\
        toolflow graph sort-twice -f mermaid    Show a composite tool as a graph\n\
        toolflow run sort -s input=in.txt       Run a single tool\n\
        toolflow run                            Run the manifest pipeline\n\n\
        See 'toolflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Tool manifest (default: toolflow.yaml in the current directory)
    #[clap(short, long, global = true, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Settings file (default: toolflow.toml, then the user config)
    #[clap(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a tool, or the manifest pipeline when no tool is named
    Run {
        /// Tool to run
        tool: Option<String>,

        /// Configuration value (repeatable); values are parsed as JSON when possible
        #[clap(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Cancel running jobs as soon as one fails
        #[clap(long)]
        fail_fast: bool,

        /// Dry run (show the job graph without running it)
        #[clap(long)]
        dry_run: bool,
    },

    /// Show the expanded job graph
    Graph {
        /// Tool to expand (default: the manifest pipeline)
        tool: Option<String>,

        /// Configuration value (repeatable)
        #[clap(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Output format
        #[clap(short, long, default_value = "text", value_parser = clap::builder::TypedValueParser::map(clap::builder::PossibleValuesParser::new(["text", "dot", "mermaid"]), |s: String| s.parse::<GraphFormat>().unwrap()))]
        format: GraphFormat,
    },

    /// Validate the tool manifest
    Validate,

    /// List declared tools
    Tools,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Manifest and settings of the current directory
pub struct Workspace {
    pub dir: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
    pub settings: Settings,
}

impl Workspace {
    /// Load the manifest and settings, looking them up in the current
    /// directory unless given
    pub fn load(manifest: Option<&Path>, config: Option<&Path>) -> ToolflowResult<Self> {
        let dir = std::env::current_dir()?;
        let manifest_path = match manifest {
            Some(path) => path.to_path_buf(),
            None => Manifest::find(&dir)?,
        };
        let manifest = Manifest::from_file(&manifest_path)?;
        let settings = Settings::load(config, &dir)?;
        Ok(Self {
            dir,
            manifest_path,
            manifest,
            settings,
        })
    }

    pub fn registry(&self) -> ToolflowResult<ToolRegistry> {
        self.manifest.registry(&self.settings)
    }

    /// The tool to run: a declared tool, or the manifest pipeline wrapped
    /// as a composite tool
    pub fn root_tool(&self, registry: &ToolRegistry, name: Option<&str>) -> ToolflowResult<Arc<Tool>> {
        match name {
            Some(name) => registry
                .get(name)
                .ok_or_else(|| ToolflowError::ToolNotFound { tool: name.to_string() }),
            None => {
                let spec = self.manifest_pipeline()?;
                let tool = Tool::builder(self.manifest.pipeline_name())
                    .environment(Arc::new(self.settings.local_environment()))
                    .pipeline(spec.clone())
                    .build()?;
                Ok(Arc::new(tool))
            }
        }
    }

    /// Expanded and reduced graph of what `run` would execute
    pub fn graph(
        &self,
        registry: &ToolRegistry,
        name: Option<&str>,
        configuration: &Configuration,
    ) -> ToolflowResult<PipelineGraph> {
        let evaluator = TemplateEvaluator;
        let description = match name {
            None => evaluator.evaluate(self.manifest.pipeline_name(), self.manifest_pipeline()?, configuration)?,
            Some(name) => {
                let tool = self.root_tool(registry, Some(name))?;
                match tool.kind() {
                    ToolKind::Composite(spec) => evaluator.evaluate(name, spec, configuration)?,
                    ToolKind::Leaf(_) => PipelineDescription {
                        name: Some(name.to_string()),
                        ..PipelineDescription::new()
                    }
                    .job(PipelineJob::new(name, name).with_configuration(configuration.clone())),
                }
            }
        };

        let mut graph = PipelineGraph::prepare(&description, registry, &evaluator, Some(&self.dir))?;
        graph.reduce_dependencies()?;
        Ok(graph)
    }

    fn manifest_pipeline(&self) -> ToolflowResult<&Value> {
        self.manifest
            .pipeline
            .as_ref()
            .ok_or_else(|| ToolflowError::InvalidManifest {
                reason: format!("{} defines no pipeline", self.manifest_path.display()),
                help: Some("Name a tool to run, or add a top-level 'pipeline' section".into()),
            })
    }
}

/// Parse `key=value` assignments into a configuration
///
/// Values that parse as JSON keep their type; anything else is a string.
pub fn parse_assignments(assignments: &[String]) -> ToolflowResult<Configuration> {
    let mut configuration = Configuration::new();
    for assignment in assignments {
        let (key, raw) = assignment.split_once('=').ok_or_else(|| {
            ToolflowError::configuration(format!("expected KEY=VALUE, got '{assignment}'"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ToolflowError::configuration(format!("missing key in '{assignment}'")));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        configuration.insert(key.to_string(), value);
    }
    Ok(configuration)
}
