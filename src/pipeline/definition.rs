// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Pipeline description structures
//!
//! The evaluated, in-memory form of a composite tool's pipeline: which
//! tools to run, with what configuration, and in which order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::errors::{ToolflowError, ToolflowResult};
use crate::tools::Configuration;

/// Evaluated pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    /// Pipeline name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Jobs in declaration order
    #[serde(default)]
    pub jobs: Vec<PipelineJob>,
}

impl PipelineDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job
    pub fn job(mut self, job: PipelineJob) -> Self {
        self.jobs.push(job);
        self
    }

    /// Parse a description from YAML
    pub fn from_yaml(yaml: &str) -> ToolflowResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize the description to YAML
    pub fn to_yaml(&self) -> ToolflowResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Build a description from an already rendered JSON value
    pub fn from_value(value: Value) -> ToolflowResult<Self> {
        serde_json::from_value(value).map_err(Into::into)
    }

    /// Get a job by id
    pub fn get(&self, id: &str) -> Option<&PipelineJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.id.as_str()).collect()
    }

    /// Check that job ids are unique and every `after` reference resolves
    pub fn check_references(&self) -> ToolflowResult<()> {
        let mut ids = HashSet::new();
        for job in &self.jobs {
            if !ids.insert(job.id.as_str()) {
                return Err(ToolflowError::DuplicateJob { job: job.id.clone() });
            }
        }
        for job in &self.jobs {
            if let Some(dep) = job.after.iter().find(|d| !ids.contains(d.as_str())) {
                return Err(ToolflowError::UnknownDependency {
                    job: job.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }
}

/// One entry of a pipeline description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    /// Job id, unique within the pipeline
    pub id: String,

    /// Name of the tool to run
    pub tool: String,

    /// Raw configuration handed to the tool
    #[serde(default)]
    pub configuration: Configuration,

    /// Jobs that must finish before this one starts
    #[serde(default, alias = "depends_on", skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

impl PipelineJob {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            configuration: Configuration::new(),
            after: Vec::new(),
        }
    }

    /// Set one configuration value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Run after `id`
    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.after.push(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_simple_description() {
        let yaml = r#"
name: align
jobs:
  - id: index
    tool: bwa-index
    configuration:
      reference: ref.fa
  - id: align
    tool: bwa-mem
    depends_on: [index]
"#;

        let description = PipelineDescription::from_yaml(yaml).unwrap();

        assert_eq!(description.name.as_deref(), Some("align"));
        assert_eq!(description.job_ids(), vec!["index", "align"]);
        assert_eq!(description.get("index").unwrap().configuration["reference"], json!("ref.fa"));
        assert_eq!(description.get("align").unwrap().after, vec!["index"]);
        description.check_references().unwrap();
    }

    #[test]
    fn test_builder_matches_parsed_form() {
        let built = PipelineDescription::new()
            .job(PipelineJob::new("a", "sort").with("input", "in.txt"))
            .job(PipelineJob::new("b", "uniq").after("a"));

        let parsed = PipelineDescription::from_value(json!({
            "jobs": [
                { "id": "a", "tool": "sort", "configuration": { "input": "in.txt" } },
                { "id": "b", "tool": "uniq", "after": ["a"] }
            ]
        }))
        .unwrap();

        assert_eq!(built, parsed);
    }

    #[test]
    fn test_duplicate_job_ids() {
        let description = PipelineDescription::new()
            .job(PipelineJob::new("a", "sort"))
            .job(PipelineJob::new("a", "uniq"));

        assert!(matches!(
            description.check_references(),
            Err(ToolflowError::DuplicateJob { job }) if job == "a"
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let description = PipelineDescription::new().job(PipelineJob::new("a", "sort").after("missing"));

        assert!(matches!(
            description.check_references(),
            Err(ToolflowError::UnknownDependency { dependency, .. }) if dependency == "missing"
        ));
    }

    #[test]
    fn test_missing_tool_is_a_parse_error() {
        let result = PipelineDescription::from_value(json!({ "jobs": [{ "id": "a" }] }));
        assert!(matches!(result, Err(ToolflowError::Json { .. })));
    }
}
