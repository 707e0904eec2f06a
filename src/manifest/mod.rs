// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Tool manifest
//!
//! Defines the schema of `toolflow.yaml`: the tools available to a run
//! and, optionally, a pipeline to run when no tool is named.

mod validation;

pub use validation::{ManifestValidator, ValidationResult};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::errors::{ToolflowError, ToolflowResult};
use crate::executors::ExecuteEnvironment;
use crate::tools::{CommandCallback, Parameter, Tool, ToolRegistry};

/// File names looked up when no manifest is given
pub const MANIFEST_FILES: [&str; 2] = ["toolflow.yaml", "toolflow.yml"];

/// Tool manifest from toolflow.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Name of the top-level pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool definitions
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,

    /// Pipeline run when no tool is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Value>,
}

impl Manifest {
    /// Load a manifest from a YAML file
    pub fn from_file(path: &Path) -> ToolflowResult<Self> {
        if !path.is_file() {
            return Err(ToolflowError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a manifest from a YAML string
    pub fn from_yaml(yaml: &str) -> ToolflowResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize the manifest to YAML
    pub fn to_yaml(&self) -> ToolflowResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Locate the manifest in `dir`
    pub fn find(dir: &Path) -> ToolflowResult<PathBuf> {
        MANIFEST_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ToolflowError::ManifestNotFound {
                path: dir.join(MANIFEST_FILES[0]),
            })
    }

    /// Get a tool definition by name
    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Name of the top-level pipeline
    pub fn pipeline_name(&self) -> &str {
        self.name.as_deref().unwrap_or("pipeline")
    }

    /// Build the tools, all sharing the local environment from `settings`
    pub fn registry(&self, settings: &Settings) -> ToolflowResult<ToolRegistry> {
        let environment: Arc<dyn ExecuteEnvironment> = Arc::new(settings.local_environment());
        let mut registry = ToolRegistry::new();
        for definition in &self.tools {
            registry.register(definition.build(environment.clone())?)?;
        }
        tracing::debug!(tools = registry.len(), "Built tool registry");
        Ok(registry)
    }
}

/// A tool declared in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must be unique within the manifest)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_input: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_output: Option<String>,

    /// Dependencies needed to install the tool
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installer: Vec<String>,

    /// Environment variables set when the command runs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Command template of a leaf tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Pipeline of a composite tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Value>,
}

impl ToolDefinition {
    pub fn is_composite(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Build the tool, running commands in `environment`
    pub fn build(&self, environment: Arc<dyn ExecuteEnvironment>) -> ToolflowResult<Tool> {
        let mut builder = Tool::builder(&self.name)
            .parameters(self.parameters.iter().cloned())
            .installer(self.installer.clone())
            .env(self.env.clone())
            .environment(environment);
        if let Some(ref version) = self.version {
            builder = builder.version(version);
        }
        if let Some(ref description) = self.description {
            builder = builder.description(description);
        }
        if let Some(ref input) = self.default_input {
            builder = builder.default_input(input);
        }
        if let Some(ref output) = self.default_output {
            builder = builder.default_output(output);
        }
        if let Some(ref command) = self.command {
            builder = builder.callback(Arc::new(CommandCallback::new(command)));
        }
        if let Some(ref pipeline) = self.pipeline {
            builder = builder.pipeline(pipeline.clone());
        }
        builder.build()
    }
}
